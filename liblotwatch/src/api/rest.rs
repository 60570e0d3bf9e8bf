//! Production REST backend
//!
//! Binds the [`Backend`](super::Backend) trait to the real HTTP API with
//! `reqwest`. Responsibilities beyond plain request/response plumbing:
//!
//! - attach `Authorization: Bearer <token>` once a token is set, and omit
//!   the header entirely when none is (never send it empty)
//! - apply the configured client-side timeout and surface timeouts as
//!   network errors
//! - map HTTP status codes onto the error taxonomy (401/403 are auth
//!   failures; other non-2xx carry the server's message when the body
//!   has one)
//! - reinterpret a 404 from `GET /sessions/current` as "not parked"

use async_trait::async_trait;
use reqwest::{Client, Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::RwLock;
use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::{ApiError, ApiResult, ConfigError, Result};
use crate::types::{
    CampusStats, DeviceIdentity, LotFeed, LotStats, ParkingLot, ParkingSession, Prediction,
    VoteKind,
};

use super::{
    AllFeedResponse, Backend, CheckoutResponse, OtpResponse, RegisterRequest, RegisterResponse,
    ScanResponse, SightingReceipt, UnreadNotifications, UpdateDeviceRequest, VerifyResponse,
    VoteResponse,
};

/// REST client for the Lotwatch backend.
pub struct RestBackend {
    http: Client,
    base_url: String,
    token: RwLock<Option<String>>,
}

impl RestBackend {
    /// Build a client against the configured server.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the HTTP client cannot be
    /// constructed (e.g. TLS backend initialization fails).
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::InvalidValue {
                field: "server".to_string(),
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: RwLock::new(None),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let builder = self.http.request(method, url);
        match self.token.read().expect("token lock poisoned").as_ref() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, context: &str) -> ApiResult<reqwest::Response> {
        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        Err(error_from_status(status, response, context).await)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, context: &str) -> ApiResult<T> {
        let response = self.send(self.request(Method::GET, path), context).await?;
        decode_json(response, context).await
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
        context: &str,
    ) -> ApiResult<T> {
        let builder = self.request(Method::POST, path).json(body);
        let response = self.send(builder, context).await?;
        decode_json(response, context).await
    }
}

#[async_trait]
impl Backend for RestBackend {
    fn set_token(&self, token: Option<String>) {
        *self.token.write().expect("token lock poisoned") = token;
    }

    async fn register(&self, request: &RegisterRequest) -> ApiResult<RegisterResponse> {
        self.post_json("/auth/register", request, "register").await
    }

    async fn send_otp(&self, email: &str, device_id: &str) -> ApiResult<OtpResponse> {
        let body = serde_json::json!({ "email": email, "device_id": device_id });
        self.post_json("/auth/send-otp", &body, "send verification code")
            .await
    }

    async fn verify_otp(
        &self,
        email: &str,
        device_id: &str,
        otp_code: &str,
    ) -> ApiResult<VerifyResponse> {
        let body = serde_json::json!({
            "email": email,
            "device_id": device_id,
            "otp_code": otp_code,
        });
        self.post_json("/auth/verify-otp", &body, "verify code").await
    }

    async fn verify_email(&self, email: &str, device_id: &str) -> ApiResult<VerifyResponse> {
        let body = serde_json::json!({ "email": email, "device_id": device_id });
        self.post_json("/auth/verify-email", &body, "verify email")
            .await
    }

    async fn identity(&self) -> ApiResult<DeviceIdentity> {
        self.get_json("/auth/me", "fetch identity").await
    }

    async fn update_device(&self, request: &UpdateDeviceRequest) -> ApiResult<DeviceIdentity> {
        self.post_json("/auth/update-device", request, "update device")
            .await
    }

    async fn lots(&self) -> ApiResult<Vec<ParkingLot>> {
        self.get_json("/lots", "load lots").await
    }

    async fn lot_stats(&self, lot_id: &str) -> ApiResult<LotStats> {
        self.get_json(&format!("/lots/{}", lot_id), "load lot details")
            .await
    }

    async fn check_in(&self, lot_id: &str) -> ApiResult<ParkingSession> {
        let body = serde_json::json!({ "parking_lot_id": lot_id });
        self.post_json("/sessions/checkin", &body, "check in").await
    }

    async fn check_out(&self) -> ApiResult<CheckoutResponse> {
        let builder = self.request(Method::POST, "/sessions/checkout");
        let response = self.send(builder, "check out").await?;
        decode_json(response, "check out").await
    }

    async fn current_session(&self) -> ApiResult<Option<ParkingSession>> {
        let context = "load current session";
        let builder = self.request(Method::GET, "/sessions/current");
        let response = builder
            .send()
            .await
            .map_err(|e| map_transport_error(e, context))?;

        let status = response.status();
        // 404 means "not parked", by contract, and must not surface as an error
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(error_from_status(status, response, context).await);
        }
        Ok(Some(decode_json(response, context).await?))
    }

    async fn report_sighting(
        &self,
        lot_id: &str,
        notes: Option<&str>,
    ) -> ApiResult<SightingReceipt> {
        let body = serde_json::json!({ "parking_lot_id": lot_id, "notes": notes });
        self.post_json("/sightings", &body, "report sighting").await
    }

    async fn lot_feed(&self, lot_id: &str) -> ApiResult<LotFeed> {
        self.get_json(&format!("/feed/{}", lot_id), "load lot feed")
            .await
    }

    async fn all_feeds(&self) -> ApiResult<AllFeedResponse> {
        self.get_json("/feed", "load feed").await
    }

    async fn cast_vote(&self, sighting_id: &str, kind: VoteKind) -> ApiResult<VoteResponse> {
        let body = serde_json::json!({ "vote_type": kind });
        self.post_json(
            &format!("/feed/sightings/{}/vote", sighting_id),
            &body,
            "vote",
        )
        .await
    }

    async fn remove_vote(&self, sighting_id: &str) -> ApiResult<VoteResponse> {
        let builder = self.request(
            Method::DELETE,
            &format!("/feed/sightings/{}/vote", sighting_id),
        );
        let response = self.send(builder, "remove vote").await?;
        decode_json(response, "remove vote").await
    }

    async fn prediction(&self, lot_id: &str) -> ApiResult<Prediction> {
        self.get_json(&format!("/predictions/{}", lot_id), "load prediction")
            .await
    }

    async fn unread_notifications(&self) -> ApiResult<UnreadNotifications> {
        self.get_json("/notifications/unread", "load notifications")
            .await
    }

    async fn mark_notifications_read(&self, notification_ids: &[String]) -> ApiResult<()> {
        let body = serde_json::json!({ "notification_ids": notification_ids });
        let builder = self.request(Method::POST, "/notifications/read").json(&body);
        self.send(builder, "mark notifications read").await?;
        Ok(())
    }

    async fn campus_stats(&self) -> ApiResult<CampusStats> {
        self.get_json("/stats", "load campus stats").await
    }

    async fn scan_ticket(&self, image: Vec<u8>, filename: &str) -> ApiResult<ScanResponse> {
        let context = "scan ticket";
        let part = reqwest::multipart::Part::bytes(image)
            .file_name(filename.to_string())
            .mime_str(mime_for(filename))
            .map_err(|e| ApiError::Validation(format!("Unsupported image: {}", e)))?;
        let form = reqwest::multipart::Form::new().part("image", part);

        let builder = self.request(Method::POST, "/sightings/scan").multipart(form);
        let response = self.send(builder, context).await?;
        decode_json(response, context).await
    }
}

/// Body shape the backend uses for error responses. Some endpoints say
/// `message`, others `detail`; accept either.
#[derive(Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn map_transport_error(error: reqwest::Error, context: &str) -> ApiError {
    if error.is_timeout() {
        ApiError::Network(format!("{} timed out", context))
    } else if error.is_connect() {
        ApiError::Network(format!("{} failed: could not reach server", context))
    } else {
        ApiError::Network(format!("{} failed: {}", context, error))
    }
}

async fn error_from_status(
    status: StatusCode,
    response: reqwest::Response,
    context: &str,
) -> ApiError {
    let message = response
        .json::<ErrorBody>()
        .await
        .ok()
        .and_then(|body| body.message.or(body.detail));

    match status.as_u16() {
        401 | 403 => ApiError::Auth(
            message.unwrap_or_else(|| format!("{}: token missing or rejected", context)),
        ),
        code => ApiError::Server {
            status: code,
            message,
        },
    }
}

async fn decode_json<T: DeserializeOwned>(
    response: reqwest::Response,
    context: &str,
) -> ApiResult<T> {
    response
        .json::<T>()
        .await
        .map_err(|e| ApiError::Network(format!("{} returned an unparseable response: {}", context, e)))
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit('.').next().map(|ext| ext.to_lowercase()) {
        Some(ext) if ext == "jpg" || ext == "jpeg" => "image/jpeg",
        Some(ext) if ext == "png" => "image/png",
        Some(ext) if ext == "heic" => "image/heic",
        Some(ext) if ext == "webp" => "image/webp",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_common_extensions() {
        assert_eq!(mime_for("ticket.jpg"), "image/jpeg");
        assert_eq!(mime_for("ticket.JPEG"), "image/jpeg");
        assert_eq!(mime_for("ticket.png"), "image/png");
        assert_eq!(mime_for("IMG_0042.HEIC"), "image/heic");
        assert_eq!(mime_for("ticket"), "application/octet-stream");
    }

    #[test]
    fn test_base_url_trailing_slash_stripped() {
        let backend = RestBackend::new(&ServerConfig {
            base_url: "https://api.lotwatch.app/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(backend.base_url, "https://api.lotwatch.app");
    }
}
