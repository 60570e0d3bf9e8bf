//! The application state machine
//!
//! This is the single source of truth for client state and the only
//! component permitted to mutate it. Front ends forward user intents as
//! method calls; every method drives the REST backend, folds the result
//! into the [`AppState`] snapshot, and publishes the new snapshot
//! through a `tokio::sync::watch` channel.
//!
//! # Architecture
//!
//! The transitions are grouped into focused modules, all implementing
//! methods on [`App`]:
//!
//! - `auth`: startup identity refresh, registration, both email
//!   verification flows, push registration
//! - `parking`: lot selection, check-in/out, refresh
//! - `sightings`: reporting, voting (optimistic with rollback), feed
//!   filtering, ticket scans, notifications
//!
//! # Failure policy
//!
//! No method returns an error for an API failure: every call site
//! converts failures into the snapshot's `error` field (or logs them,
//! for non-critical background refreshes) so a front end can never be
//! crashed by the network.
//!
//! # Example
//!
//! ```no_run
//! use liblotwatch::app::App;
//!
//! # async fn example() -> liblotwatch::error::Result<()> {
//! let app = App::new()?;
//! app.initialize().await;
//!
//! let mut states = app.subscribe();
//! tokio::spawn(async move {
//!     while states.changed().await.is_ok() {
//!         let state = states.borrow().clone();
//!         println!("phase: {:?}", state.phase);
//!     }
//! });
//! # Ok(())
//! # }
//! ```

pub mod state;

mod auth;
mod parking;
mod sightings;

pub use state::{AppState, AuthPhase, FeedView, ScanPhase};

use std::sync::Arc;
use tokio::sync::watch;
use tracing::warn;

use crate::api::rest::RestBackend;
use crate::api::Backend;
use crate::config::Config;
use crate::error::{ApiError, Result};
use crate::store::TokenStore;
use crate::types::AggregateFeed;

/// Handle to the application state machine.
///
/// Cheap to share behind an `Arc`; all methods take `&self`. Mutations
/// are serialized by the watch channel, and no state lock is ever held
/// across an await point.
pub struct App {
    backend: Arc<dyn Backend>,
    tokens: TokenStore,
    config: Arc<Config>,
    state: watch::Sender<AppState>,
}

impl App {
    /// Create an app against the default configuration and the
    /// production REST backend.
    pub fn new() -> Result<Self> {
        let config = Config::load()?;
        Self::from_config(config)
    }

    /// Create an app from an explicit configuration.
    pub fn from_config(config: Config) -> Result<Self> {
        let backend = Arc::new(RestBackend::new(&config.server)?);
        let tokens = TokenStore::open(&config)?;
        Ok(Self::with_backend(config, backend, tokens))
    }

    /// Create an app with a custom backend and token store. This is the
    /// constructor the integration tests use with the mock backend.
    pub fn with_backend(config: Config, backend: Arc<dyn Backend>, tokens: TokenStore) -> Self {
        let (state, _) = watch::channel(AppState::default());
        Self {
            backend,
            tokens,
            config: Arc::new(config),
            state,
        }
    }

    /// The latest state snapshot.
    pub fn snapshot(&self) -> AppState {
        self.state.borrow().clone()
    }

    /// Subscribe to snapshot changes.
    pub fn subscribe(&self) -> watch::Receiver<AppState> {
        self.state.subscribe()
    }

    /// Dismiss the current error notice.
    pub fn clear_error(&self) {
        self.update(|s| s.error = None);
    }

    /// Dismiss the current success notice.
    pub fn clear_success_message(&self) {
        self.update(|s| s.success_message = None);
    }

    pub(crate) fn update(&self, mutate: impl FnOnce(&mut AppState)) {
        self.state.send_modify(mutate);
    }

    /// Fold an API failure into the snapshot. Auth failures force the
    /// app back to the unauthenticated state (the device may have been
    /// deleted server-side); everything else lands in the `error` field,
    /// preferring the server's message over `fallback`.
    pub(crate) fn surface(&self, err: &ApiError, fallback: &str) {
        if err.is_auth() {
            warn!("authentication failure: {}", err);
            self.backend.set_token(None);
            self.update(|s| {
                s.authenticated = false;
                s.email_verified = false;
                s.phase = AuthPhase::Unauthenticated;
                s.error = Some(err.user_message("Session expired. Register this device again."));
            });
        } else {
            self.update(|s| s.error = Some(err.user_message(fallback)));
        }
    }

    /// Full data load after reaching `Ready`: lots, current session,
    /// active feed, selected-lot data, unread count, campus stats.
    pub(crate) async fn load_all(&self) {
        self.update(|s| s.is_loading = true);

        let (lots, session) =
            futures::join!(self.backend.lots(), self.backend.current_session());

        match lots {
            Ok(lots) => self.update(|s| s.lots = lots),
            Err(e) => self.surface(&e, "Could not load parking lots"),
        }
        match session {
            // A backend 404 arrives here as Ok(None): not parked, no error
            Ok(session) => self.update(|s| s.current_session = session),
            Err(e) => warn!("failed to load current session: {}", e),
        }

        self.reload_feed(false).await;
        if let Some(lot_id) = self.snapshot().selected_lot {
            self.reload_lot_data(&lot_id).await;
        }
        self.fetch_unread_count().await;
        self.load_campus_stats().await;

        self.update(|s| s.is_loading = false);
    }

    /// Reload whichever feed view the filter selects. Failures are
    /// surfaced only when the reload was an explicit user action.
    pub(crate) async fn reload_feed(&self, surface_failure: bool) {
        match self.snapshot().feed_filter {
            None => match self.backend.all_feeds().await {
                Ok(response) => self.update(|s| {
                    s.feed = FeedView::All(AggregateFeed::from_lot_feeds(
                        response.feeds,
                        response.total_sightings,
                    ));
                }),
                Err(e) if surface_failure => self.surface(&e, "Could not load the feed"),
                Err(e) => warn!("failed to load aggregate feed: {}", e),
            },
            Some(lot_id) => match self.backend.lot_feed(&lot_id).await {
                Ok(feed) => self.update(|s| {
                    // The filter may have moved while the request was in flight
                    if s.feed_filter.as_deref() == Some(feed.lot.id.as_str()) {
                        s.feed = FeedView::Lot(feed);
                    }
                }),
                Err(e) if surface_failure => self.surface(&e, "Could not load the lot feed"),
                Err(e) => warn!("failed to load feed for {}: {}", lot_id, e),
            },
        }
    }
}
