//! Mock backend implementation for testing
//!
//! A configurable in-memory [`Backend`] that can seed fixture data,
//! inject per-operation failures, and count calls. It is available for
//! all builds (not just tests) so the integration tests can drive the
//! full application state machine without credentials or network access.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

use crate::error::{ApiError, ApiResult};
use crate::types::{
    CampusStats, DeviceIdentity, LotFeed, LotStats, Notification, ParkingLot, ParkingSession,
    Prediction, RiskLevel, ScanOutcome, Sighting, VoteKind,
};

use super::{
    AllFeedResponse, Backend, CheckoutResponse, OtpResponse, RegisterRequest, RegisterResponse,
    ScanResponse, SightingReceipt, UnreadNotifications, UpdateDeviceRequest, VerifyResponse,
    VoteResponse,
};

/// Scriptable mock backend.
///
/// All state is behind interior mutability so a test can hold an
/// `Arc<MockBackend>`, hand a clone of the `Arc` to the app, and keep
/// seeding data or injecting failures mid-scenario.
#[derive(Default)]
pub struct MockBackend {
    token: Mutex<Option<String>>,
    lots: Mutex<Vec<ParkingLot>>,
    stats: Mutex<HashMap<String, LotStats>>,
    feeds: Mutex<HashMap<String, LotFeed>>,
    predictions: Mutex<HashMap<String, Prediction>>,
    session: Mutex<Option<ParkingSession>>,
    notifications: Mutex<Vec<Notification>>,
    campus: Mutex<Option<CampusStats>>,
    scan_response: Mutex<Option<ScanResponse>>,
    register_verified: Mutex<bool>,
    verify_response: Mutex<Option<VerifyResponse>>,
    users_notified: Mutex<u32>,
    failures: Mutex<HashMap<String, ApiError>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl MockBackend {
    pub fn new() -> Self {
        let mock = Self::default();
        *mock.users_notified.lock().unwrap() = 7;
        mock
    }

    /// Count a call and return the scripted failure for `op`, if any.
    fn begin(&self, op: &str) -> ApiResult<()> {
        *self
            .calls
            .lock()
            .unwrap()
            .entry(op.to_string())
            .or_insert(0) += 1;

        match self.failures.lock().unwrap().get(op) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Number of times the named operation has been called.
    pub fn call_count(&self, op: &str) -> usize {
        self.calls.lock().unwrap().get(op).copied().unwrap_or(0)
    }

    /// Make every call to `op` fail with `error` until cleared.
    pub fn fail_with(&self, op: &str, error: ApiError) {
        self.failures.lock().unwrap().insert(op.to_string(), error);
    }

    /// Stop failing the named operation.
    pub fn clear_failure(&self, op: &str) {
        self.failures.lock().unwrap().remove(op);
    }

    /// The bearer token most recently handed to `set_token`.
    pub fn token(&self) -> Option<String> {
        self.token.lock().unwrap().clone()
    }

    /// Whether `register` should report the device's email as already
    /// verified.
    pub fn set_register_verified(&self, verified: bool) {
        *self.register_verified.lock().unwrap() = verified;
    }

    /// Script the response both verification endpoints return.
    pub fn set_verify_response(&self, response: VerifyResponse) {
        *self.verify_response.lock().unwrap() = Some(response);
    }

    pub fn seed_lots(&self, lots: Vec<ParkingLot>) {
        for lot in &lots {
            self.stats.lock().unwrap().insert(
                lot.id.clone(),
                LotStats {
                    lot: lot.clone(),
                    active_parkers: 0,
                    recent_sightings: 0,
                    taps_probability: 0.1,
                },
            );
            self.predictions.lock().unwrap().insert(
                lot.id.clone(),
                Prediction {
                    lot_id: lot.id.clone(),
                    probability: 0.1,
                    risk_level: RiskLevel::Low,
                    factors: None,
                    confidence: None,
                },
            );
            self.feeds.lock().unwrap().insert(
                lot.id.clone(),
                LotFeed {
                    lot: lot.clone(),
                    sightings: vec![],
                    total: 0,
                },
            );
        }
        *self.lots.lock().unwrap() = lots;
    }

    pub fn seed_feed(&self, lot_id: &str, sightings: Vec<Sighting>) {
        let mut feeds = self.feeds.lock().unwrap();
        if let Some(feed) = feeds.get_mut(lot_id) {
            feed.total = sightings.len() as u32;
            feed.sightings = sightings;
        }
    }

    pub fn seed_session(&self, session: Option<ParkingSession>) {
        *self.session.lock().unwrap() = session;
    }

    pub fn seed_notifications(&self, notifications: Vec<Notification>) {
        *self.notifications.lock().unwrap() = notifications;
    }

    pub fn seed_campus_stats(&self, stats: CampusStats) {
        *self.campus.lock().unwrap() = Some(stats);
    }

    pub fn seed_scan_response(&self, response: ScanResponse) {
        *self.scan_response.lock().unwrap() = Some(response);
    }

    /// Fixture helper: a minimal active lot.
    pub fn make_lot(id: &str, name: &str, code: &str) -> ParkingLot {
        ParkingLot {
            id: id.to_string(),
            name: name.to_string(),
            code: code.to_string(),
            latitude: None,
            longitude: None,
            is_active: true,
        }
    }

    /// Fixture helper: a clean sighting in the given lot.
    pub fn make_sighting(id: &str, lot: &ParkingLot, minutes_ago: i64) -> Sighting {
        Sighting {
            id: id.to_string(),
            lot_id: lot.id.clone(),
            lot_name: lot.name.clone(),
            lot_code: lot.code.clone(),
            reported_at: Utc::now() - Duration::minutes(minutes_ago),
            notes: None,
            upvotes: 0,
            downvotes: 0,
            net_score: 0,
            user_vote: None,
            minutes_ago,
        }
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn set_token(&self, token: Option<String>) {
        *self.token.lock().unwrap() = token;
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.begin("register")?;
        let token = format!("mock-token-{}", request.device_id);
        Ok(RegisterResponse {
            access_token: token,
            token_type: "bearer".to_string(),
            expires_in: 3600,
            email_verified: *self.register_verified.lock().unwrap(),
        })
    }

    async fn send_otp(&self, email: &str, _device_id: &str) -> ApiResult<OtpResponse> {
        self.begin("send_otp")?;
        Ok(OtpResponse {
            success: true,
            message: format!("Code sent to {}", email),
        })
    }

    async fn verify_otp(
        &self,
        _email: &str,
        _device_id: &str,
        _otp_code: &str,
    ) -> ApiResult<VerifyResponse> {
        self.begin("verify_otp")?;
        Ok(self.scripted_verify())
    }

    async fn verify_email(&self, _email: &str, _device_id: &str) -> ApiResult<VerifyResponse> {
        self.begin("verify_email")?;
        Ok(self.scripted_verify())
    }

    async fn identity(&self) -> ApiResult<DeviceIdentity> {
        self.begin("identity")?;
        Ok(DeviceIdentity {
            id: "device-row-1".to_string(),
            device_id: "mock-device".to_string(),
            email_verified: *self.register_verified.lock().unwrap(),
            is_push_enabled: false,
            created_at: Utc::now(),
            last_seen_at: Some(Utc::now()),
        })
    }

    async fn update_device(&self, request: &UpdateDeviceRequest) -> ApiResult<DeviceIdentity> {
        self.begin("update_device")?;
        Ok(DeviceIdentity {
            id: "device-row-1".to_string(),
            device_id: "mock-device".to_string(),
            email_verified: *self.register_verified.lock().unwrap(),
            is_push_enabled: request.is_push_enabled.unwrap_or(false),
            created_at: Utc::now(),
            last_seen_at: Some(Utc::now()),
        })
    }

    async fn lots(&self) -> ApiResult<Vec<ParkingLot>> {
        self.begin("lots")?;
        Ok(self.lots.lock().unwrap().clone())
    }

    async fn lot_stats(&self, lot_id: &str) -> ApiResult<LotStats> {
        self.begin("lot_stats")?;
        self.stats
            .lock()
            .unwrap()
            .get(lot_id)
            .cloned()
            .ok_or_else(|| ApiError::Server {
                status: 404,
                message: Some("Lot not found".to_string()),
            })
    }

    async fn check_in(&self, lot_id: &str) -> ApiResult<ParkingSession> {
        self.begin("check_in")?;
        let lot = self
            .lots
            .lock()
            .unwrap()
            .iter()
            .find(|l| l.id == lot_id)
            .cloned()
            .ok_or_else(|| ApiError::Server {
                status: 404,
                message: Some("Lot not found".to_string()),
            })?;

        let session = ParkingSession {
            id: format!("session-{}", lot.id),
            lot_id: lot.id.clone(),
            lot_name: lot.name.clone(),
            lot_code: lot.code.clone(),
            checked_in_at: Utc::now(),
            checked_out_at: None,
            is_active: true,
        };
        *self.session.lock().unwrap() = Some(session.clone());
        Ok(session)
    }

    async fn check_out(&self) -> ApiResult<CheckoutResponse> {
        self.begin("check_out")?;
        match self.session.lock().unwrap().take() {
            Some(session) => Ok(CheckoutResponse {
                success: true,
                message: format!("Checked out of {}", session.lot_name),
                session_id: session.id,
                checked_out_at: Utc::now(),
            }),
            None => Err(ApiError::Server {
                status: 400,
                message: Some("No active parking session".to_string()),
            }),
        }
    }

    async fn current_session(&self) -> ApiResult<Option<ParkingSession>> {
        self.begin("current_session")?;
        // None mirrors the production 404-as-empty reinterpretation
        Ok(self.session.lock().unwrap().clone())
    }

    async fn report_sighting(
        &self,
        lot_id: &str,
        _notes: Option<&str>,
    ) -> ApiResult<SightingReceipt> {
        self.begin("report_sighting")?;
        Ok(SightingReceipt {
            id: format!("sighting-{}", uuid::Uuid::new_v4()),
            lot_id: lot_id.to_string(),
            reported_at: Utc::now(),
            users_notified: *self.users_notified.lock().unwrap(),
        })
    }

    async fn lot_feed(&self, lot_id: &str) -> ApiResult<LotFeed> {
        self.begin("lot_feed")?;
        self.feeds
            .lock()
            .unwrap()
            .get(lot_id)
            .cloned()
            .ok_or_else(|| ApiError::Server {
                status: 404,
                message: Some("Lot not found".to_string()),
            })
    }

    async fn all_feeds(&self) -> ApiResult<AllFeedResponse> {
        self.begin("all_feeds")?;
        let feeds: Vec<LotFeed> = self.feeds.lock().unwrap().values().cloned().collect();
        let total = feeds.iter().map(|f| f.sightings.len() as u32).sum();
        Ok(AllFeedResponse {
            feeds,
            total_sightings: total,
        })
    }

    async fn cast_vote(&self, _sighting_id: &str, kind: VoteKind) -> ApiResult<VoteResponse> {
        self.begin("cast_vote")?;
        Ok(VoteResponse {
            success: true,
            action: "created".to_string(),
            vote_type: Some(kind),
        })
    }

    async fn remove_vote(&self, _sighting_id: &str) -> ApiResult<VoteResponse> {
        self.begin("remove_vote")?;
        Ok(VoteResponse {
            success: true,
            action: "removed".to_string(),
            vote_type: None,
        })
    }

    async fn prediction(&self, lot_id: &str) -> ApiResult<Prediction> {
        self.begin("prediction")?;
        self.predictions
            .lock()
            .unwrap()
            .get(lot_id)
            .cloned()
            .ok_or_else(|| ApiError::Server {
                status: 404,
                message: Some("No prediction for lot".to_string()),
            })
    }

    async fn unread_notifications(&self) -> ApiResult<UnreadNotifications> {
        self.begin("unread_notifications")?;
        let notifications = self.notifications.lock().unwrap().clone();
        let count = notifications.len() as u32;
        Ok(UnreadNotifications {
            notifications,
            unread_count: count,
            total: count,
        })
    }

    async fn mark_notifications_read(&self, _notification_ids: &[String]) -> ApiResult<()> {
        self.begin("mark_notifications_read")?;
        self.notifications.lock().unwrap().clear();
        Ok(())
    }

    async fn campus_stats(&self) -> ApiResult<CampusStats> {
        self.begin("campus_stats")?;
        Ok(self
            .campus
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(CampusStats {
                total_registered_devices: 0,
                total_parked: 0,
                total_sightings_today: 0,
            }))
    }

    async fn scan_ticket(&self, _image: Vec<u8>, _filename: &str) -> ApiResult<ScanResponse> {
        self.begin("scan_ticket")?;
        Ok(self
            .scan_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(ScanResponse {
                success: true,
                outcome: ScanOutcome {
                    ticket_date: None,
                    ticket_time: None,
                    ticket_location: None,
                    mapped_lot_id: None,
                    mapped_lot_name: None,
                    is_recent: false,
                    sighting_id: None,
                    users_notified: 0,
                },
            }))
    }
}

impl MockBackend {
    fn scripted_verify(&self) -> VerifyResponse {
        self.verify_response
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(VerifyResponse {
                success: true,
                message: "Email verified".to_string(),
                email_verified: true,
                access_token: None,
            })
    }
}
