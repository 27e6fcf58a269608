use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use keyring::Entry;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::StorageError;
use crate::models::{TokenPair, User};

/// Session file name in the credential directory
const SESSION_FILE: &str = "session.json";

/// Keychain service and entry names
const SERVICE_NAME: &str = "liftbook";
const KEYRING_ENTRY: &str = "session";

/// Durable persistence of the current user and token pair.
///
/// A pure serialization boundary: no token freshness checks. `load`
/// returning `Ok(None)` means nothing is persisted, which is not an error.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    async fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError>;
    async fn load(&self) -> Result<Option<(User, TokenPair)>, StorageError>;
    async fn clear(&self) -> Result<(), StorageError>;
}

/// The persisted record: the user fields and the token pair, nothing else.
#[derive(Serialize, Deserialize)]
struct StoredSession {
    user: User,
    tokens: TokenPair,
}

fn encode(user: &User, tokens: &TokenPair) -> Result<String, StorageError> {
    let record = StoredSession {
        user: user.clone(),
        tokens: tokens.clone(),
    };
    serde_json::to_string(&record).map_err(|e| StorageError::Corrupt(e.to_string()))
}

fn decode(contents: &str) -> Result<(User, TokenPair), StorageError> {
    let record: StoredSession =
        serde_json::from_str(contents).map_err(|e| StorageError::Corrupt(e.to_string()))?;
    if record.tokens.access_token.is_empty() || record.tokens.refresh_token.is_empty() {
        return Err(StorageError::Corrupt("token pair is incomplete".to_string()));
    }
    Ok((record.user, record.tokens))
}

fn unavailable(e: impl std::fmt::Display) -> StorageError {
    StorageError::Unavailable(e.to_string())
}

// ============================================================================
// File
// ============================================================================

/// Stores the session as JSON in `<dir>/session.json`.
pub struct FileCredentialStore {
    dir: PathBuf,
}

impl FileCredentialStore {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }

    fn session_path(&self) -> PathBuf {
        self.dir.join(SESSION_FILE)
    }
}

#[async_trait]
impl CredentialStore for FileCredentialStore {
    async fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        let contents = encode(user, tokens)?;
        tokio::fs::create_dir_all(&self.dir).await.map_err(unavailable)?;

        // Write then rename so a crash never leaves a half-written record
        let tmp = self.dir.join(format!("{}.tmp", SESSION_FILE));
        tokio::fs::write(&tmp, contents).await.map_err(unavailable)?;
        tokio::fs::rename(&tmp, self.session_path()).await.map_err(unavailable)?;
        debug!(path = ?self.session_path(), "Session saved");
        Ok(())
    }

    async fn load(&self) -> Result<Option<(User, TokenPair)>, StorageError> {
        match tokio::fs::read_to_string(self.session_path()).await {
            Ok(contents) => decode(&contents).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(unavailable(e)),
        }
    }

    async fn clear(&self) -> Result<(), StorageError> {
        match tokio::fs::remove_file(self.session_path()).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(unavailable(e)),
        }
    }
}

// ============================================================================
// OS keychain
// ============================================================================

/// Stores the session record as a single OS keychain entry.
pub struct KeyringCredentialStore {
    service: String,
}

impl KeyringCredentialStore {
    pub fn new() -> Self {
        Self::with_service(SERVICE_NAME)
    }

    pub fn with_service(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Run a keychain call on the blocking pool; the OS keychain may block
    async fn with_entry<T, F>(&self, call: F) -> Result<T, StorageError>
    where
        T: Send + 'static,
        F: FnOnce(Entry) -> Result<T, StorageError> + Send + 'static,
    {
        let service = self.service.clone();
        tokio::task::spawn_blocking(move || {
            let entry = Entry::new(&service, KEYRING_ENTRY).map_err(unavailable)?;
            call(entry)
        })
        .await
        .map_err(unavailable)?
    }
}

impl Default for KeyringCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for KeyringCredentialStore {
    async fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        let contents = encode(user, tokens)?;
        self.with_entry(move |entry| entry.set_password(&contents).map_err(unavailable))
            .await
    }

    async fn load(&self) -> Result<Option<(User, TokenPair)>, StorageError> {
        let contents = self
            .with_entry(|entry| match entry.get_password() {
                Ok(contents) => Ok(Some(contents)),
                Err(keyring::Error::NoEntry) => Ok(None),
                Err(e) => Err(unavailable(e)),
            })
            .await?;
        contents.as_deref().map(decode).transpose()
    }

    async fn clear(&self) -> Result<(), StorageError> {
        self.with_entry(|entry| match entry.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(unavailable(e)),
        })
        .await
    }
}

// ============================================================================
// In-memory
// ============================================================================

#[derive(Default)]
struct MemoryState {
    record: Option<String>,
    fail_writes: bool,
    fail_reads: bool,
    fail_clear: bool,
}

/// Process-local store. Faults can be switched on to simulate an
/// unavailable medium.
#[derive(Default)]
pub struct MemoryCredentialStore {
    state: Mutex<MemoryState>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start with raw record contents, e.g. a corrupt record
    pub fn with_raw(contents: &str) -> Self {
        let store = Self::new();
        store.lock().record = Some(contents.to_string());
        store
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Serialized record exactly as stored
    pub fn raw(&self) -> Option<String> {
        self.lock().record.clone()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.lock().fail_writes = fail;
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.lock().fail_reads = fail;
    }

    pub fn set_fail_clear(&self, fail: bool) {
        self.lock().fail_clear = fail;
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn save(&self, user: &User, tokens: &TokenPair) -> Result<(), StorageError> {
        let contents = encode(user, tokens)?;
        let mut state = self.lock();
        if state.fail_writes {
            return Err(StorageError::Unavailable("write refused".to_string()));
        }
        state.record = Some(contents);
        Ok(())
    }

    async fn load(&self) -> Result<Option<(User, TokenPair)>, StorageError> {
        let state = self.lock();
        if state.fail_reads {
            return Err(StorageError::Unavailable("read refused".to_string()));
        }
        state.record.as_deref().map(decode).transpose()
    }

    async fn clear(&self) -> Result<(), StorageError> {
        let mut state = self.lock();
        if state.fail_clear {
            return Err(StorageError::Unavailable("clear refused".to_string()));
        }
        state.record = None;
        Ok(())
    }
}
