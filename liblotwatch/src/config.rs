//! Configuration management for Lotwatch

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{ConfigError, Result};
use crate::store::{CredentialConfig, StorageBackend};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub credentials: Option<CredentialConfig>,
    #[serde(default)]
    pub watch: WatchConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Base URL of the Lotwatch REST backend, without a trailing slash.
    pub base_url: String,
    /// Client-side request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.lotwatch.app".to_string(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_timeout_secs() -> u64 {
    15
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Required suffix for verification emails. Submission is blocked
    /// client-side when the address does not end with this domain; the
    /// server re-validates regardless.
    pub email_domain: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            email_domain: "@ucdavis.edu".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Seconds between polls in the `lot-watch` daemon.
    pub poll_interval: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self { poll_interval: 60 }
    }
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        let config_path = resolve_config_path()?;
        if config_path.exists() {
            Self::load_from_path(&config_path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: &PathBuf) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadError)?;
        let config: Config = toml::from_str(&content).map_err(ConfigError::ParseError)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(ConfigError::MissingField("server.base_url".to_string()).into());
        }
        if !self.auth.email_domain.starts_with('@') {
            return Err(ConfigError::InvalidValue {
                field: "auth.email_domain".to_string(),
                reason: "must start with '@'".to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Credential storage settings, falling back to the keyring backend
    /// with the default credential path when the section is absent.
    pub fn credential_config(&self) -> Result<CredentialConfig> {
        if let Some(config) = &self.credentials {
            return Ok(config.clone());
        }
        Ok(CredentialConfig {
            storage: StorageBackend::Keyring,
            path: resolve_data_path()?
                .join("credentials")
                .to_string_lossy()
                .into_owned(),
            passphrase: None,
        })
    }
}

/// Resolve the configuration file path following XDG Base Directory spec
pub fn resolve_config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LOTWATCH_CONFIG") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let config_dir = dirs::config_dir()
        .ok_or_else(|| ConfigError::MissingField("config directory".to_string()))?;

    Ok(config_dir.join("lotwatch").join("config.toml"))
}

/// Resolve the data directory path following XDG Base Directory spec
pub fn resolve_data_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var("LOTWATCH_DATA_DIR") {
        return Ok(PathBuf::from(shellexpand::tilde(&path).to_string()));
    }

    let data_dir = dirs::data_dir()
        .ok_or_else(|| ConfigError::MissingField("data directory".to_string()))?;

    Ok(data_dir.join("lotwatch"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.server.base_url, "https://api.lotwatch.app");
        assert_eq!(config.server.timeout_secs, 15);
        assert_eq!(config.auth.email_domain, "@ucdavis.edu");
        assert_eq!(config.watch.poll_interval, 60);
        assert!(config.credentials.is_none());
    }

    #[test]
    fn test_parse_minimal() {
        let config: Config = toml::from_str(
            r#"
            [server]
            base_url = "https://taps.example.edu/api"
            "#,
        )
        .unwrap();
        assert_eq!(config.server.base_url, "https://taps.example.edu/api");
        // Unspecified sections fall back to defaults
        assert_eq!(config.server.timeout_secs, 15);
        assert_eq!(config.auth.email_domain, "@ucdavis.edu");
    }

    #[test]
    fn test_validate_rejects_bad_domain() {
        let config: Config = toml::from_str(
            r#"
            [auth]
            email_domain = "ucdavis.edu"
            "#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }
}
