//! Secure local persistence for Lotwatch
//!
//! Two concerns live here:
//!
//! - **Credential storage** (`CredentialStore` trait + backends): the
//!   opaque bearer token, the locally generated device id, and the push
//!   token are secrets, kept in the OS keyring when available with
//!   encrypted-file and plain-file fallbacks.
//! - **Launch state** (`TokenStore` facade): an unencrypted marker file
//!   with the has-launched / has-onboarded flag pair. OS credential
//!   stores can outlive the app's data directory, so a missing marker
//!   means a fresh install and any stale credentials are wiped before
//!   use.
//!
//! # Example
//!
//! ```no_run
//! use liblotwatch::config::Config;
//! use liblotwatch::store::TokenStore;
//!
//! # fn example() -> liblotwatch::error::Result<()> {
//! let config = Config::load()?;
//! let store = TokenStore::open(&config)?;
//!
//! // Stable for the install's lifetime, generated on first use
//! let device_id = store.device_id()?;
//!
//! if let Some(_token) = store.auth_token()? {
//!     println!("device {} already registered", device_id);
//! }
//! # Ok(())
//! # }
//! ```

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};
use zeroize::Zeroize;

use crate::config::Config;
use crate::error::{Result, StoreError};

const KEY_AUTH_TOKEN: &str = "auth_token";
const KEY_DEVICE_ID: &str = "device_id";
const KEY_PUSH_TOKEN: &str = "push_token";

/// Which credential backend to use.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    /// OS-native secure storage (Keychain, Credential Manager, Secret
    /// Service). Primary.
    Keyring,
    /// Passphrase-encrypted file (age). Fallback for headless systems.
    EncryptedFile,
    /// Plain JSON file. Last resort and test backend.
    PlainFile,
}

/// Credential storage settings (`[credentials]` in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialConfig {
    pub storage: StorageBackend,
    /// File path for the file-based backends.
    pub path: String,
    /// Passphrase for the encrypted-file backend. `LOTWATCH_PASSPHRASE`
    /// takes precedence when set.
    #[serde(default)]
    pub passphrase: Option<String>,
}

/// Common interface for credential storage backends.
///
/// Keys are flat names like `auth_token`; values are opaque strings.
/// Retrieving a missing key is `Ok(None)`, and deleting one is not an
/// error.
pub trait CredentialStore: Send + Sync {
    fn store(&self, key: &str, value: &str) -> Result<()>;
    fn retrieve(&self, key: &str) -> Result<Option<String>>;
    fn delete(&self, key: &str) -> Result<()>;
    fn backend_name(&self) -> &'static str;
}

/// OS-native keyring storage backend
///
/// - **macOS**: Keychain via Security framework
/// - **Windows**: Credential Manager via Windows API
/// - **Linux**: Secret Service (GNOME Keyring/KWallet) via D-Bus
///
/// The keyring may be unavailable on headless systems or in containers
/// without D-Bus; construction probes for that and fails with
/// `StoreError::KeyringUnavailable` so the manager can fall back.
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new() -> Result<Self> {
        // Probe availability by constructing an entry
        keyring::Entry::new("lotwatch.probe", "availability_check")
            .map_err(|e| StoreError::KeyringUnavailable(format!("OS keyring not accessible: {}", e)))?;

        Ok(Self {
            service: "lotwatch".to_string(),
        })
    }
}

impl CredentialStore for KeyringStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, key)
            .map_err(|e| StoreError::KeyringUnavailable(e.to_string()))?;
        entry
            .set_password(value)
            .map_err(|e| StoreError::Keyring(e.to_string()))?;
        Ok(())
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        let entry = keyring::Entry::new(&self.service, key)
            .map_err(|e| StoreError::KeyringUnavailable(e.to_string()))?;
        match entry.get_password() {
            Ok(value) => Ok(Some(value)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(StoreError::Keyring(e.to_string()).into()),
        }
    }

    fn delete(&self, key: &str) -> Result<()> {
        let entry = keyring::Entry::new(&self.service, key)
            .map_err(|e| StoreError::KeyringUnavailable(e.to_string()))?;
        match entry.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(StoreError::Keyring(e.to_string()).into()),
        }
    }

    fn backend_name(&self) -> &'static str {
        "keyring"
    }
}

/// Passphrase-encrypted file backend (age, scrypt-based).
///
/// The whole credential map is stored as one age ciphertext; every write
/// re-encrypts the full map. Decrypted plaintext buffers are zeroed
/// after parsing.
pub struct EncryptedFileStore {
    path: PathBuf,
    passphrase: SecretString,
    lock: Mutex<()>,
}

impl EncryptedFileStore {
    pub fn new(path: impl Into<PathBuf>, passphrase: SecretString) -> Self {
        Self {
            path: path.into(),
            passphrase,
            lock: Mutex::new(()),
        }
    }

    fn load_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let ciphertext = std::fs::read(&self.path).map_err(StoreError::Io)?;

        let decryptor = match age::Decryptor::new(&ciphertext[..])
            .map_err(|e| StoreError::Crypto(e.to_string()))?
        {
            age::Decryptor::Passphrase(d) => d,
            _ => {
                return Err(
                    StoreError::Corrupt("credential file is not passphrase-encrypted".to_string())
                        .into(),
                )
            }
        };

        let passphrase =
            age::secrecy::Secret::new(self.passphrase.expose_secret().to_owned());
        let mut reader = decryptor
            .decrypt(&passphrase, None)
            .map_err(|e| StoreError::Crypto(format!("decryption failed: {}", e)))?;

        let mut plaintext = Vec::new();
        reader.read_to_end(&mut plaintext).map_err(StoreError::Io)?;

        let map = serde_json::from_slice(&plaintext)
            .map_err(|e| StoreError::Corrupt(e.to_string()));
        plaintext.zeroize();
        Ok(map?)
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }

        let mut plaintext =
            serde_json::to_vec(map).map_err(|e| StoreError::Corrupt(e.to_string()))?;

        let passphrase =
            age::secrecy::Secret::new(self.passphrase.expose_secret().to_owned());
        let encryptor = age::Encryptor::with_user_passphrase(passphrase);

        let mut ciphertext = Vec::new();
        let mut writer = encryptor
            .wrap_output(&mut ciphertext)
            .map_err(|e| StoreError::Crypto(e.to_string()))?;
        writer.write_all(&plaintext).map_err(StoreError::Io)?;
        writer.finish().map_err(StoreError::Io)?;
        plaintext.zeroize();

        write_private(&self.path, &ciphertext)?;
        Ok(())
    }
}

impl CredentialStore for EncryptedFileStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map)
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.load_map()?.remove(key))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.load_map()?;
        if map.remove(key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "encrypted_file"
    }
}

/// Plain JSON file backend. Owner-only permissions on Unix, but no
/// encryption at rest; the manager only picks it when nothing better is
/// available, and warns.
pub struct PlainFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl PlainFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn load_map(&self) -> Result<HashMap<String, String>> {
        if !self.path.exists() {
            return Ok(HashMap::new());
        }
        let content = std::fs::read(&self.path).map_err(StoreError::Io)?;
        serde_json::from_slice(&content)
            .map_err(|e| StoreError::Corrupt(e.to_string()).into())
    }

    fn save_map(&self, map: &HashMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let content =
            serde_json::to_vec_pretty(map).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        write_private(&self.path, &content)
    }
}

impl CredentialStore for PlainFileStore {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.load_map()?;
        map.insert(key.to_string(), value.to_string());
        self.save_map(&map)
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        let _guard = self.lock.lock().unwrap();
        Ok(self.load_map()?.remove(key))
    }

    fn delete(&self, key: &str) -> Result<()> {
        let _guard = self.lock.lock().unwrap();
        let mut map = self.load_map()?;
        if map.remove(key).is_some() {
            self.save_map(&map)?;
        }
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "plain_file"
    }
}

fn write_private(path: &Path, content: &[u8]) -> Result<()> {
    std::fs::write(path, content).map_err(StoreError::Io)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .map_err(StoreError::Io)?;
    }
    Ok(())
}

/// Picks and wraps a credential backend according to configuration,
/// falling back when the preferred backend is unavailable:
/// keyring → encrypted file (if a passphrase is configured) → plain file.
pub struct CredentialManager {
    store: Box<dyn CredentialStore>,
}

impl CredentialManager {
    pub fn new(config: CredentialConfig) -> Result<Self> {
        let passphrase = passphrase_from(&config);

        let store: Box<dyn CredentialStore> = match config.storage {
            StorageBackend::Keyring => match KeyringStore::new() {
                Ok(store) => Box::new(store),
                Err(e) => {
                    if let Some(pass) = passphrase {
                        warn!("{}; falling back to encrypted file storage", e);
                        Box::new(EncryptedFileStore::new(&config.path, pass))
                    } else {
                        warn!("{}; falling back to plain file storage", e);
                        Box::new(PlainFileStore::new(&config.path))
                    }
                }
            },
            StorageBackend::EncryptedFile => {
                let pass = passphrase.ok_or_else(|| {
                    StoreError::Crypto(
                        "encrypted_file storage requires a passphrase \
                         (config or LOTWATCH_PASSPHRASE)"
                            .to_string(),
                    )
                })?;
                Box::new(EncryptedFileStore::new(&config.path, pass))
            }
            StorageBackend::PlainFile => {
                warn!("credentials stored without encryption at {}", config.path);
                Box::new(PlainFileStore::new(&config.path))
            }
        };

        debug!("credential backend: {}", store.backend_name());
        Ok(Self { store })
    }

    pub fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

impl CredentialStore for CredentialManager {
    fn store(&self, key: &str, value: &str) -> Result<()> {
        self.store.store(key, value)
    }

    fn retrieve(&self, key: &str) -> Result<Option<String>> {
        self.store.retrieve(key)
    }

    fn delete(&self, key: &str) -> Result<()> {
        self.store.delete(key)
    }

    fn backend_name(&self) -> &'static str {
        self.store.backend_name()
    }
}

fn passphrase_from(config: &CredentialConfig) -> Option<SecretString> {
    if let Ok(pass) = std::env::var("LOTWATCH_PASSPHRASE") {
        return Some(SecretString::from(pass));
    }
    config
        .passphrase
        .as_ref()
        .map(|p| SecretString::from(p.clone()))
}

/// Unencrypted launch flags, kept next to the data directory.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
struct LaunchState {
    has_launched: bool,
    has_onboarded: bool,
}

/// Facade over credential storage for the fields the app persists.
pub struct TokenStore {
    creds: CredentialManager,
    state_path: PathBuf,
    state: Mutex<LaunchState>,
}

impl TokenStore {
    /// Open the store for the configured backend, running fresh-install
    /// detection: when the launch marker is missing, any credentials left
    /// behind by a previous install are wiped before use.
    pub fn open(config: &Config) -> Result<Self> {
        let state_path = crate::config::resolve_data_path()?.join("state.json");
        Self::open_at(config.credential_config()?, state_path)
    }

    /// Open against explicit credential settings and marker path.
    pub fn open_at(cred_config: CredentialConfig, state_path: PathBuf) -> Result<Self> {
        let creds = CredentialManager::new(cred_config)?;

        let existing: Option<LaunchState> = std::fs::read(&state_path)
            .ok()
            .and_then(|bytes| serde_json::from_slice(&bytes).ok());

        let store = Self {
            creds,
            state_path,
            state: Mutex::new(existing.clone().unwrap_or_default()),
        };

        if existing.is_none() {
            debug!("no launch marker found; treating as fresh install");
            store.wipe_credentials()?;
            store.persist_state(LaunchState {
                has_launched: true,
                has_onboarded: false,
            })?;
        }

        Ok(store)
    }

    pub fn auth_token(&self) -> Result<Option<String>> {
        self.creds.retrieve(KEY_AUTH_TOKEN)
    }

    pub fn set_auth_token(&self, token: &str) -> Result<()> {
        self.creds.store(KEY_AUTH_TOKEN, token)
    }

    pub fn clear_auth_token(&self) -> Result<()> {
        self.creds.delete(KEY_AUTH_TOKEN)
    }

    /// The install-stable device identifier, generated on first use.
    pub fn device_id(&self) -> Result<String> {
        if let Some(id) = self.creds.retrieve(KEY_DEVICE_ID)? {
            return Ok(id);
        }
        let id = uuid::Uuid::new_v4().to_string();
        self.creds.store(KEY_DEVICE_ID, &id)?;
        Ok(id)
    }

    pub fn push_token(&self) -> Result<Option<String>> {
        self.creds.retrieve(KEY_PUSH_TOKEN)
    }

    pub fn set_push_token(&self, token: &str) -> Result<()> {
        self.creds.store(KEY_PUSH_TOKEN, token)
    }

    pub fn has_onboarded(&self) -> bool {
        self.state.lock().unwrap().has_onboarded
    }

    pub fn set_onboarded(&self, onboarded: bool) -> Result<()> {
        let mut state = self.state.lock().unwrap().clone();
        state.has_onboarded = onboarded;
        self.persist_state(state)
    }

    /// Remove every stored credential. Used by fresh-install detection.
    pub fn wipe_credentials(&self) -> Result<()> {
        for key in [KEY_AUTH_TOKEN, KEY_DEVICE_ID, KEY_PUSH_TOKEN] {
            self.creds.delete(key)?;
        }
        Ok(())
    }

    pub fn backend_name(&self) -> &'static str {
        self.creds.backend_name()
    }

    fn persist_state(&self, state: LaunchState) -> Result<()> {
        if let Some(parent) = self.state_path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
        }
        let bytes =
            serde_json::to_vec_pretty(&state).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        std::fs::write(&self.state_path, bytes).map_err(StoreError::Io)?;
        *self.state.lock().unwrap() = state;
        Ok(())
    }
}
