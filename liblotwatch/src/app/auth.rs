//! Registration and email-verification transitions

use tracing::{info, warn};

use crate::api::{RegisterRequest, UpdateDeviceRequest, VerifyResponse};
use crate::types::DeviceIdentity;

use super::{App, AuthPhase};

impl App {
    /// Startup transition.
    ///
    /// With a persisted token, refreshes the device identity against the
    /// backend. A verified device goes straight to `Ready` and loads all
    /// data; an unverified one waits for email verification. When the
    /// refresh fails on connectivity and onboarding has already
    /// completed, the cached session is trusted and the load is
    /// attempted anyway, so a dead network does not lock a known-good
    /// user out. Without a persisted token the app stays fully
    /// unauthenticated.
    pub async fn initialize(&self) {
        let device_id = match self.tokens.device_id() {
            Ok(id) => id,
            Err(e) => {
                warn!("credential storage unavailable: {}", e);
                self.update(|s| {
                    s.error = Some("Credential storage is unavailable on this system".to_string())
                });
                return;
            }
        };
        self.update(|s| s.device_id = Some(device_id.clone()));

        let token = match self.tokens.auth_token() {
            Ok(token) => token,
            Err(e) => {
                warn!("could not read persisted token: {}", e);
                None
            }
        };
        let Some(token) = token else {
            return;
        };
        self.backend.set_token(Some(token));

        let request = RegisterRequest {
            device_id,
            push_token: self.tokens.push_token().ok().flatten(),
        };
        match self.backend.register(&request).await {
            Ok(response) => {
                self.adopt_token(&response.access_token);
                self.update(|s| {
                    s.authenticated = true;
                    s.email_verified = response.email_verified;
                });
                if response.email_verified {
                    if let Err(e) = self.tokens.set_onboarded(true) {
                        warn!("could not persist onboarding flag: {}", e);
                    }
                    self.update(|s| s.phase = AuthPhase::Ready);
                    self.load_all().await;
                } else {
                    self.update(|s| s.phase = AuthPhase::AwaitingVerification);
                }
            }
            Err(e) if e.is_network() => {
                if self.tokens.has_onboarded() {
                    // Fail open: transient connectivity must not punish a
                    // previously verified device
                    info!("identity refresh failed ({}); trusting cached session", e);
                    self.update(|s| {
                        s.authenticated = true;
                        s.email_verified = true;
                        s.phase = AuthPhase::Ready;
                    });
                    self.load_all().await;
                } else {
                    self.update(|s| {
                        s.authenticated = true;
                        s.phase = AuthPhase::AwaitingVerification;
                    });
                }
            }
            Err(e) => self.surface(&e, "Could not refresh device identity"),
        }
    }

    /// Register this device with the backend.
    ///
    /// On success the token is persisted and the app moves to `Ready`
    /// (already-verified device) or `AwaitingVerification`. On failure
    /// the error is surfaced and the app stays unauthenticated.
    pub async fn register(&self) {
        let device_id = match self.tokens.device_id() {
            Ok(id) => id,
            Err(e) => {
                warn!("credential storage unavailable: {}", e);
                self.update(|s| {
                    s.error = Some("Credential storage is unavailable on this system".to_string())
                });
                return;
            }
        };
        self.update(|s| s.device_id = Some(device_id.clone()));

        let request = RegisterRequest {
            device_id,
            push_token: self.tokens.push_token().ok().flatten(),
        };
        match self.backend.register(&request).await {
            Ok(response) => {
                self.adopt_token(&response.access_token);
                self.update(|s| {
                    s.authenticated = true;
                    s.email_verified = response.email_verified;
                    s.phase = if response.email_verified {
                        AuthPhase::Ready
                    } else {
                        AuthPhase::AwaitingVerification
                    };
                });
                if response.email_verified {
                    if let Err(e) = self.tokens.set_onboarded(true) {
                        warn!("could not persist onboarding flag: {}", e);
                    }
                    self.load_all().await;
                }
            }
            Err(e) => self.surface(&e, "Registration failed"),
        }
    }

    /// Direct email-domain verification flow.
    pub async fn verify_email(&self, email: &str) {
        if let Some(message) = self.invalid_email(email) {
            self.update(|s| s.error = Some(message));
            return;
        }
        let Some(device_id) = self.snapshot().device_id else {
            self.update(|s| s.error = Some("Register this device first".to_string()));
            return;
        };

        match self.backend.verify_email(email.trim(), &device_id).await {
            Ok(response) if response.success && response.email_verified => {
                self.complete_verification(response).await;
            }
            Ok(response) => self.update(|s| s.error = Some(response.message)),
            Err(e) => self.surface(&e, "Email verification failed"),
        }
    }

    /// OTP flow, step one: ask the server to email a one-time code.
    pub async fn send_code(&self, email: &str) {
        if let Some(message) = self.invalid_email(email) {
            self.update(|s| s.error = Some(message));
            return;
        }
        let Some(device_id) = self.snapshot().device_id else {
            self.update(|s| s.error = Some("Register this device first".to_string()));
            return;
        };

        match self.backend.send_otp(email.trim(), &device_id).await {
            Ok(response) if response.success => {
                self.update(|s| s.success_message = Some(response.message));
            }
            Ok(response) => self.update(|s| s.error = Some(response.message)),
            Err(e) => self.surface(&e, "Could not send the verification code"),
        }
    }

    /// OTP flow, step two: verify a received code.
    pub async fn verify_code(&self, email: &str, code: &str) {
        let Some(device_id) = self.snapshot().device_id else {
            self.update(|s| s.error = Some("Register this device first".to_string()));
            return;
        };

        match self
            .backend
            .verify_otp(email.trim(), &device_id, code.trim())
            .await
        {
            Ok(response) if response.success && response.email_verified => {
                self.complete_verification(response).await;
            }
            Ok(response) => self.update(|s| s.error = Some(response.message)),
            Err(e) => self.surface(&e, "Code verification failed"),
        }
    }

    /// Update the push-notification token for this device and persist it.
    pub async fn set_push_token(&self, push_token: &str) {
        if let Err(e) = self.tokens.set_push_token(push_token) {
            warn!("could not persist push token: {}", e);
        }
        let request = UpdateDeviceRequest {
            push_token: Some(push_token.to_string()),
            is_push_enabled: Some(true),
        };
        if let Err(e) = self.backend.update_device(&request).await {
            self.surface(&e, "Could not update push registration");
        }
    }

    /// Toggle push notifications for this device.
    pub async fn set_push_enabled(&self, enabled: bool) {
        let request = UpdateDeviceRequest {
            push_token: None,
            is_push_enabled: Some(enabled),
        };
        match self.backend.update_device(&request).await {
            Ok(_) => self.update(|s| {
                s.success_message = Some(if enabled {
                    "Push notifications enabled".to_string()
                } else {
                    "Push notifications disabled".to_string()
                });
            }),
            Err(e) => self.surface(&e, "Could not update push registration"),
        }
    }

    /// Fetch the device record behind the current token. Failures are
    /// surfaced; the record itself is returned for display rather than
    /// held in the snapshot.
    pub async fn identity(&self) -> Option<DeviceIdentity> {
        match self.backend.identity().await {
            Ok(identity) => Some(identity),
            Err(e) => {
                self.surface(&e, "Could not load device identity");
                None
            }
        }
    }

    /// Client-side institutional-domain gate. Returns the message to
    /// surface when the address is not acceptable; the server
    /// re-validates regardless.
    fn invalid_email(&self, email: &str) -> Option<String> {
        let email = email.trim().to_lowercase();
        let domain = self.config.auth.email_domain.to_lowercase();
        let valid = email.len() > domain.len()
            && email.ends_with(&domain)
            && !email[..email.len() - domain.len()].contains('@');
        if valid {
            None
        } else {
            Some(format!(
                "Email must be a {} address",
                self.config.auth.email_domain
            ))
        }
    }

    async fn complete_verification(&self, response: VerifyResponse) {
        if let Some(token) = &response.access_token {
            self.adopt_token(token);
        }
        if let Err(e) = self.tokens.set_onboarded(true) {
            warn!("could not persist onboarding flag: {}", e);
        }
        self.update(|s| {
            s.authenticated = true;
            s.email_verified = true;
            s.phase = AuthPhase::Ready;
            s.success_message = Some(response.message);
        });
        self.load_all().await;
    }

    fn adopt_token(&self, token: &str) {
        if let Err(e) = self.tokens.set_auth_token(token) {
            warn!("could not persist auth token: {}", e);
        }
        self.backend.set_token(Some(token.to_string()));
    }
}
