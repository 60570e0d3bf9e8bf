//! Typed binding to the Lotwatch REST backend
//!
//! This module defines the [`Backend`] trait — the seam between the
//! application state machine and the network — together with the wire
//! request/response shapes that are not part of the domain model proper.
//!
//! Two implementations ship with the library: [`rest::RestBackend`], the
//! production `reqwest` client, and [`mock::MockBackend`], a scriptable
//! in-memory backend used by the integration tests.
//!
//! # Examples
//!
//! ```no_run
//! use liblotwatch::api::{Backend, rest::RestBackend};
//! use liblotwatch::config::ServerConfig;
//!
//! # async fn example() -> liblotwatch::error::Result<()> {
//! let backend = RestBackend::new(&ServerConfig::default())?;
//!
//! // Unauthenticated endpoints work without a token
//! let lots = backend.lots().await?;
//! println!("{} lots known", lots.len());
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiResult;
use crate::types::{
    CampusStats, DeviceIdentity, LotFeed, LotStats, Notification, ParkingLot, ParkingSession,
    Prediction, ScanOutcome, VoteKind,
};

pub mod mock;
pub mod rest;

/// `POST /auth/register`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub device_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
}

/// Response to registration. The same endpoint serves as the idempotent
/// identity-refresh call on startup, so it also reports whether this
/// device's email has already been verified.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: u64,
    #[serde(default)]
    pub email_verified: bool,
}

/// `POST /auth/send-otp`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OtpResponse {
    pub success: bool,
    pub message: String,
}

/// `POST /auth/verify-otp` and `POST /auth/verify-email`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub success: bool,
    pub message: String,
    pub email_verified: bool,
    /// The OTP flow may rotate the token on successful verification.
    #[serde(default)]
    pub access_token: Option<String>,
}

/// `POST /auth/update-device`
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct UpdateDeviceRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push_token: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_push_enabled: Option<bool>,
}

/// `POST /sessions/checkout`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutResponse {
    pub success: bool,
    pub message: String,
    pub session_id: String,
    pub checked_out_at: chrono::DateTime<chrono::Utc>,
}

/// `POST /sightings`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SightingReceipt {
    pub id: String,
    pub lot_id: String,
    pub reported_at: chrono::DateTime<chrono::Utc>,
    pub users_notified: u32,
}

/// `POST /feed/sightings/{id}/vote` and its `DELETE` counterpart
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteResponse {
    pub success: bool,
    /// What the server did: `"created"`, `"changed"`, or `"removed"`.
    pub action: String,
    #[serde(default, with = "crate::types::vote_option")]
    pub vote_type: Option<VoteKind>,
}

/// `GET /feed`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AllFeedResponse {
    pub feeds: Vec<LotFeed>,
    pub total_sightings: u32,
}

/// `GET /notifications/unread`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnreadNotifications {
    pub notifications: Vec<Notification>,
    pub unread_count: u32,
    pub total: u32,
}

/// `POST /sightings/scan`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanResponse {
    pub success: bool,
    #[serde(flatten)]
    pub outcome: ScanOutcome,
}

/// The REST surface the state machine drives.
///
/// Implementations carry the bearer token internally: once
/// [`Backend::set_token`] has been called with `Some`, every request
/// includes `Authorization: Bearer <token>`; with `None` the header is
/// omitted entirely (never sent empty).
///
/// All methods return [`ApiResult`]; the state machine converts failures
/// into snapshot state and never lets them escape to a front end.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Replace the bearer token used for subsequent requests.
    fn set_token(&self, token: Option<String>);

    /// Register this device, or refresh its identity if it already
    /// exists. Idempotent on the server side.
    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse>;

    /// Ask the server to email a one-time code.
    async fn send_otp(&self, email: &str, device_id: &str) -> ApiResult<OtpResponse>;

    /// Verify a one-time code previously sent to `email`.
    async fn verify_otp(
        &self,
        email: &str,
        device_id: &str,
        otp_code: &str,
    ) -> ApiResult<VerifyResponse>;

    /// Direct email-domain verification (the non-OTP flow).
    async fn verify_email(&self, email: &str, device_id: &str) -> ApiResult<VerifyResponse>;

    /// Fetch the device record behind the current token.
    async fn identity(&self) -> ApiResult<DeviceIdentity>;

    /// Update push-notification registration for this device.
    async fn update_device(&self, request: &UpdateDeviceRequest) -> ApiResult<DeviceIdentity>;

    /// List all parking lots.
    async fn lots(&self) -> ApiResult<Vec<ParkingLot>>;

    /// Fetch one lot with its live stats.
    async fn lot_stats(&self, lot_id: &str) -> ApiResult<LotStats>;

    /// Open a parking session in the given lot.
    async fn check_in(&self, lot_id: &str) -> ApiResult<ParkingSession>;

    /// Close the active parking session.
    async fn check_out(&self) -> ApiResult<CheckoutResponse>;

    /// The device's active session. A 404 from the server means "not
    /// parked" and is returned as `Ok(None)`, not as an error.
    async fn current_session(&self) -> ApiResult<Option<ParkingSession>>;

    /// Report a TAPS sighting in the given lot.
    async fn report_sighting(
        &self,
        lot_id: &str,
        notes: Option<&str>,
    ) -> ApiResult<SightingReceipt>;

    /// The sighting feed for one lot.
    async fn lot_feed(&self, lot_id: &str) -> ApiResult<LotFeed>;

    /// Per-lot feeds for every lot, for the aggregate view.
    async fn all_feeds(&self) -> ApiResult<AllFeedResponse>;

    /// Cast or change this device's vote on a sighting.
    async fn cast_vote(&self, sighting_id: &str, kind: VoteKind) -> ApiResult<VoteResponse>;

    /// Remove this device's vote from a sighting.
    async fn remove_vote(&self, sighting_id: &str) -> ApiResult<VoteResponse>;

    /// The enforcement prediction for one lot.
    async fn prediction(&self, lot_id: &str) -> ApiResult<Prediction>;

    /// Unread notifications with their count.
    async fn unread_notifications(&self) -> ApiResult<UnreadNotifications>;

    /// Mark the given notifications read.
    async fn mark_notifications_read(&self, notification_ids: &[String]) -> ApiResult<()>;

    /// Campus-wide totals.
    async fn campus_stats(&self) -> ApiResult<CampusStats>;

    /// Submit a parking-ticket photo for OCR scanning.
    async fn scan_ticket(&self, image: Vec<u8>, filename: &str) -> ApiResult<ScanResponse>;
}
