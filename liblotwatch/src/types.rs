//! Core domain types for Lotwatch

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A parking lot: static reference data, read-only from the client side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ParkingLot {
    pub id: String,
    pub name: String,
    pub code: String,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    pub is_active: bool,
}

/// A lot together with its live occupancy and enforcement numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotStats {
    #[serde(flatten)]
    pub lot: ParkingLot,
    pub active_parkers: u32,
    pub recent_sightings: u32,
    /// Server-computed probability that TAPS is working this lot, in [0, 1].
    pub taps_probability: f64,
}

/// The open interval between a check-in and a check-out at one lot.
///
/// The backend guarantees at most one active session per device; the
/// client relies on that and keeps a single optional session in state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParkingSession {
    pub id: String,
    pub lot_id: String,
    pub lot_name: String,
    pub lot_code: String,
    pub checked_in_at: DateTime<Utc>,
    #[serde(default)]
    pub checked_out_at: Option<DateTime<Utc>>,
    pub is_active: bool,
}

/// Direction of a community vote on a sighting.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum VoteKind {
    Upvote,
    Downvote,
}

impl std::fmt::Display for VoteKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VoteKind::Upvote => write!(f, "upvote"),
            VoteKind::Downvote => write!(f, "downvote"),
        }
    }
}

/// Wire binding for the `user_vote` field, which the backend sends as
/// `"upvote"`, `"downvote"`, `"none"`, or null.
pub(crate) mod vote_option {
    use super::VoteKind;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &Option<VoteKind>, s: S) -> Result<S::Ok, S::Error> {
        match v {
            Some(VoteKind::Upvote) => s.serialize_str("upvote"),
            Some(VoteKind::Downvote) => s.serialize_str("downvote"),
            None => s.serialize_str("none"),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Option<VoteKind>, D::Error> {
        let raw: Option<String> = Option::deserialize(d)?;
        Ok(match raw.as_deref() {
            Some("upvote") => Some(VoteKind::Upvote),
            Some("downvote") => Some(VoteKind::Downvote),
            _ => None,
        })
    }
}

/// A reported TAPS sighting with its community vote tallies.
///
/// Invariant: `net_score == upvotes - downvotes` after every mutation.
/// `user_vote` reflects only this device's vote.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sighting {
    pub id: String,
    pub lot_id: String,
    pub lot_name: String,
    pub lot_code: String,
    pub reported_at: DateTime<Utc>,
    #[serde(default)]
    pub notes: Option<String>,
    pub upvotes: u32,
    pub downvotes: u32,
    pub net_score: i32,
    #[serde(default, with = "vote_option")]
    pub user_vote: Option<VoteKind>,
    pub minutes_ago: i64,
}

impl Sighting {
    /// Apply this device's vote locally: increment the new vote's counter,
    /// decrement the prior vote's counter if one existed, recompute the
    /// net score. Setting the vote that is already in place is a no-op;
    /// toggling off goes through [`Sighting::retract_vote`].
    pub fn cast_vote(&mut self, kind: VoteKind) {
        if self.user_vote == Some(kind) {
            return;
        }
        if let Some(prev) = self.user_vote {
            self.decrement(prev);
        }
        self.increment(kind);
        self.user_vote = Some(kind);
        self.recompute_net_score();
    }

    /// Remove this device's vote locally, decrementing the matching counter.
    pub fn retract_vote(&mut self) {
        if let Some(prev) = self.user_vote.take() {
            self.decrement(prev);
            self.recompute_net_score();
        }
    }

    fn increment(&mut self, kind: VoteKind) {
        match kind {
            VoteKind::Upvote => self.upvotes += 1,
            VoteKind::Downvote => self.downvotes += 1,
        }
    }

    fn decrement(&mut self, kind: VoteKind) {
        match kind {
            VoteKind::Upvote => self.upvotes = self.upvotes.saturating_sub(1),
            VoteKind::Downvote => self.downvotes = self.downvotes.saturating_sub(1),
        }
    }

    fn recompute_net_score(&mut self) {
        self.net_score = self.upvotes as i32 - self.downvotes as i32;
    }
}

/// Sighting feed scoped to a single lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LotFeed {
    pub lot: ParkingLot,
    pub sightings: Vec<Sighting>,
    pub total: u32,
}

/// Sighting feed aggregated across every lot, most recent first.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AggregateFeed {
    pub sightings: Vec<Sighting>,
    pub total: u32,
}

impl AggregateFeed {
    /// Flatten per-lot feeds into one list ordered by recency
    /// (`minutes_ago` ascending).
    pub fn from_lot_feeds(feeds: Vec<LotFeed>, total: u32) -> Self {
        let mut sightings: Vec<Sighting> =
            feeds.into_iter().flat_map(|f| f.sightings).collect();
        sightings.sort_by_key(|s| s.minutes_ago);
        Self { sightings, total }
    }
}

/// Coarse enforcement-risk bucket derived server-side from the
/// probability score.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl std::fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Server-computed enforcement prediction for a lot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Prediction {
    pub lot_id: String,
    pub probability: f64,
    pub risk_level: RiskLevel,
    #[serde(default)]
    pub factors: Option<Vec<String>>,
    #[serde(default)]
    pub confidence: Option<f64>,
}

/// Device record as the backend sees it (`GET /auth/me`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub id: String,
    pub device_id: String,
    pub email_verified: bool,
    pub is_push_enabled: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub last_seen_at: Option<DateTime<Utc>>,
}

/// One in-app notification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub message: String,
    #[serde(default)]
    pub lot_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Campus-wide totals (`GET /stats`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampusStats {
    pub total_registered_devices: u64,
    pub total_parked: u64,
    pub total_sightings_today: u64,
}

/// What the backend extracted from a scanned ticket image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanOutcome {
    #[serde(default)]
    pub ticket_date: Option<String>,
    #[serde(default)]
    pub ticket_time: Option<String>,
    #[serde(default)]
    pub ticket_location: Option<String>,
    #[serde(default)]
    pub mapped_lot_id: Option<String>,
    #[serde(default)]
    pub mapped_lot_name: Option<String>,
    /// Whether the ticket was issued recently enough to auto-create a
    /// sighting on the mapped lot.
    pub is_recent: bool,
    #[serde(default)]
    pub sighting_id: Option<String>,
    #[serde(default)]
    pub users_notified: u32,
}
