//! Error types for Lotwatch

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LotwatchError>;

/// Result type used by the REST binding and the mock backend.
pub type ApiResult<T> = std::result::Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum LotwatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Credential store error: {0}")]
    Store(#[from] StoreError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl LotwatchError {
    /// Returns the appropriate exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            LotwatchError::InvalidInput(_) => 3,
            LotwatchError::Api(ApiError::Auth(_)) => 2,
            LotwatchError::Api(_) => 1,
            LotwatchError::Config(_) => 1,
            LotwatchError::Store(_) => 1,
        }
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing required field: {0}")]
    MissingField(String),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("OS keyring unavailable: {0}")]
    KeyringUnavailable(String),

    #[error("Keyring operation failed: {0}")]
    Keyring(String),

    #[error("Credential file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Credential encryption failed: {0}")]
    Crypto(String),

    #[error("Credential file is corrupt: {0}")]
    Corrupt(String),
}

/// Failures from the REST backend, classified the way the state machine
/// needs to react to them.
///
/// `Auth` forces the app back to the unauthenticated state. `Validation`
/// is raised client-side before any request is sent. A 404 on the
/// current-session endpoint never reaches this type; the backend converts
/// it into an empty payload.
#[derive(Error, Debug, Clone)]
pub enum ApiError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Server error ({status}): {}", .message.as_deref().unwrap_or("no message"))]
    Server { status: u16, message: Option<String> },
}

impl ApiError {
    /// The string the state machine surfaces to the user for this failure.
    ///
    /// Server-provided messages are surfaced verbatim when present;
    /// everything else falls back to the per-operation string supplied by
    /// the call site.
    pub fn user_message(&self, fallback: &str) -> String {
        match self {
            ApiError::Server {
                message: Some(m), ..
            } => m.clone(),
            ApiError::Validation(m) => m.clone(),
            _ => fallback.to_string(),
        }
    }

    /// Whether this failure indicates a missing or rejected token.
    pub fn is_auth(&self) -> bool {
        matches!(self, ApiError::Auth(_))
    }

    /// Whether this failure is a connectivity problem rather than a
    /// server-side rejection.
    pub fn is_network(&self) -> bool {
        matches!(self, ApiError::Network(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_code_invalid_input() {
        let error = LotwatchError::InvalidInput("Empty lot code".to_string());
        assert_eq!(error.exit_code(), 3);
    }

    #[test]
    fn test_exit_code_auth_error() {
        let error = LotwatchError::Api(ApiError::Auth("Token rejected".to_string()));
        assert_eq!(error.exit_code(), 2);
    }

    #[test]
    fn test_exit_code_other_api_errors() {
        let network = LotwatchError::Api(ApiError::Network("Connection refused".to_string()));
        assert_eq!(network.exit_code(), 1);

        let server = LotwatchError::Api(ApiError::Server {
            status: 500,
            message: None,
        });
        assert_eq!(server.exit_code(), 1);

        let validation = LotwatchError::Api(ApiError::Validation("Bad email".to_string()));
        assert_eq!(validation.exit_code(), 1);
    }

    #[test]
    fn test_exit_code_config_and_store() {
        let config = LotwatchError::Config(ConfigError::MissingField("server.base_url".to_string()));
        assert_eq!(config.exit_code(), 1);

        let store = LotwatchError::Store(StoreError::Keyring("denied".to_string()));
        assert_eq!(store.exit_code(), 1);
    }

    #[test]
    fn test_error_message_formatting() {
        let error = LotwatchError::Api(ApiError::Network("Connection timed out".to_string()));
        assert_eq!(format!("{}", error), "API error: Network error: Connection timed out");

        let error = LotwatchError::InvalidInput("Unknown lot: Z9".to_string());
        assert_eq!(format!("{}", error), "Invalid input: Unknown lot: Z9");
    }

    #[test]
    fn test_server_error_formatting() {
        let with_message = ApiError::Server {
            status: 422,
            message: Some("Sighting already reported".to_string()),
        };
        assert_eq!(
            format!("{}", with_message),
            "Server error (422): Sighting already reported"
        );

        let without_message = ApiError::Server {
            status: 500,
            message: None,
        };
        assert_eq!(format!("{}", without_message), "Server error (500): no message");
    }

    #[test]
    fn test_user_message_prefers_server_message() {
        let err = ApiError::Server {
            status: 400,
            message: Some("Registration failed".to_string()),
        };
        assert_eq!(err.user_message("Could not register"), "Registration failed");
    }

    #[test]
    fn test_user_message_falls_back_without_server_message() {
        let err = ApiError::Server {
            status: 502,
            message: None,
        };
        assert_eq!(err.user_message("Could not register"), "Could not register");

        let err = ApiError::Network("dns failure".to_string());
        assert_eq!(err.user_message("Could not load feed"), "Could not load feed");
    }

    #[test]
    fn test_user_message_surfaces_validation_verbatim() {
        let err = ApiError::Validation("Email must end with @ucdavis.edu".to_string());
        assert_eq!(
            err.user_message("Verification failed"),
            "Email must end with @ucdavis.edu"
        );
    }

    #[test]
    fn test_error_conversions() {
        let config_error = ConfigError::MissingField("test".to_string());
        let err: LotwatchError = config_error.into();
        assert!(matches!(err, LotwatchError::Config(_)));

        let store_error = StoreError::Corrupt("truncated".to_string());
        let err: LotwatchError = store_error.into();
        assert!(matches!(err, LotwatchError::Store(_)));

        let api_error = ApiError::Auth("expired".to_string());
        let err: LotwatchError = api_error.into();
        assert!(matches!(err, LotwatchError::Api(_)));
    }

    #[test]
    fn test_api_error_classification() {
        assert!(ApiError::Auth("x".to_string()).is_auth());
        assert!(!ApiError::Network("x".to_string()).is_auth());
        assert!(ApiError::Network("x".to_string()).is_network());
        assert!(!ApiError::Validation("x".to_string()).is_network());
    }

    #[test]
    fn test_api_error_clone() {
        // Cloneability is required for the optimistic-rollback path
        let original = ApiError::Server {
            status: 409,
            message: Some("Vote conflict".to_string()),
        };
        let cloned = original.clone();
        assert_eq!(format!("{}", original), format!("{}", cloned));
    }
}
