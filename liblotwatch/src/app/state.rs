//! The observable state snapshot
//!
//! One immutable-snapshot record owns every piece of client state. Front
//! ends read it (or subscribe to changes) and never hold independent
//! copies of any entity.

use std::collections::HashMap;
use std::path::PathBuf;

use crate::types::{
    AggregateFeed, CampusStats, LotFeed, LotStats, ParkingLot, ParkingSession, Prediction,
    ScanOutcome, Sighting, VoteKind,
};

/// Where the client is in the registration/verification lifecycle.
///
/// `Unauthenticated → AwaitingVerification → Ready`; there is no
/// terminal state. A server-side device deletion surfaces as auth
/// failures that drop the app back to `Unauthenticated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AuthPhase {
    #[default]
    Unauthenticated,
    AwaitingVerification,
    Ready,
}

/// The active sighting-feed view. The per-lot and aggregate forms are
/// mutually exclusive; which one is active follows the nullable feed
/// filter (`None` = all lots).
#[derive(Debug, Clone, Default)]
pub enum FeedView {
    #[default]
    NotLoaded,
    Lot(LotFeed),
    All(AggregateFeed),
}

impl FeedView {
    pub fn sightings(&self) -> &[Sighting] {
        match self {
            FeedView::NotLoaded => &[],
            FeedView::Lot(feed) => &feed.sightings,
            FeedView::All(feed) => &feed.sightings,
        }
    }

    pub fn find(&self, sighting_id: &str) -> Option<&Sighting> {
        self.sightings().iter().find(|s| s.id == sighting_id)
    }

    pub(crate) fn find_mut(&mut self, sighting_id: &str) -> Option<&mut Sighting> {
        let sightings = match self {
            FeedView::NotLoaded => return None,
            FeedView::Lot(feed) => &mut feed.sightings,
            FeedView::All(feed) => &mut feed.sightings,
        };
        sightings.iter_mut().find(|s| s.id == sighting_id)
    }

    /// This device's current vote on a sighting, if the sighting is in
    /// the active view.
    pub fn user_vote(&self, sighting_id: &str) -> Option<Option<VoteKind>> {
        self.find(sighting_id).map(|s| s.user_vote)
    }
}

/// Ticket-scan sub-machine: `idle → preview → processing →
/// success | error`, with both terminal states resettable to `idle`.
#[derive(Debug, Clone, Default)]
pub enum ScanPhase {
    #[default]
    Idle,
    Preview {
        image_path: PathBuf,
    },
    Processing,
    Success(ScanOutcome),
    Error(String),
}

/// The full client state snapshot.
#[derive(Debug, Clone, Default)]
pub struct AppState {
    pub phase: AuthPhase,
    pub authenticated: bool,
    pub email_verified: bool,
    pub device_id: Option<String>,

    pub lots: Vec<ParkingLot>,
    pub selected_lot: Option<String>,
    /// Live stats per lot id, for map display; the selected lot's entry
    /// doubles as the "current lot" card.
    pub lot_stats: HashMap<String, LotStats>,
    pub current_session: Option<ParkingSession>,

    /// `None` selects the aggregate all-lots feed.
    pub feed_filter: Option<String>,
    pub feed: FeedView,
    pub prediction: Option<Prediction>,

    pub campus_stats: Option<CampusStats>,
    pub unread_count: u32,
    pub scan: ScanPhase,

    pub is_loading: bool,
    pub error: Option<String>,
    pub success_message: Option<String>,
}

impl AppState {
    /// Whether the device currently holds an active parking session.
    pub fn is_parked(&self) -> bool {
        self.current_session
            .as_ref()
            .map(|s| s.is_active)
            .unwrap_or(false)
    }

    pub fn is_ready(&self) -> bool {
        self.phase == AuthPhase::Ready
    }

    /// Stats for the selected lot, when both are present.
    pub fn selected_stats(&self) -> Option<&LotStats> {
        let id = self.selected_lot.as_deref()?;
        self.lot_stats.get(id)
    }

    /// Look a lot up by id or code (case-insensitive on code).
    pub fn find_lot(&self, id_or_code: &str) -> Option<&ParkingLot> {
        self.lots
            .iter()
            .find(|l| l.id == id_or_code || l.code.eq_ignore_ascii_case(id_or_code))
    }
}
