//! Lotwatch - crowd-sourced campus parking-enforcement alerts
//!
//! This library provides core functionality for the Lotwatch client
//! tools: the typed REST binding, secure token storage, and the
//! application state machine that every front end drives.

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod logging;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use app::{App, AppState, AuthPhase, FeedView, ScanPhase};
pub use config::Config;
pub use error::{ApiError, LotwatchError, Result};
pub use store::{CredentialConfig, CredentialManager, StorageBackend, TokenStore};
pub use types::{ParkingLot, ParkingSession, Sighting, VoteKind};
