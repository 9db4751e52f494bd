//! Bearer-token holder shared by the REST and realtime clients.
//!
//! DESIGN
//! ======
//! A `Session` owns the single active token plus the `TokenStore` that
//! persists it. Mutations hold the session lock across the store write, and
//! the in-memory token only changes after the store accepted the change, so a
//! caller never observes a token that disagrees with its persisted copy.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::error::StoreError;
use crate::lock;

/// Key the token is persisted under.
pub const TOKEN_KEY: &str = "access_token";

/// Persistence backend for the session token.
pub trait TokenStore: Send + Sync {
    /// Read the persisted token, if any.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the backing storage cannot be read.
    fn load(&self) -> Result<Option<String>, StoreError>;

    /// Persist `token`, replacing any previous value.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the write fails.
    fn save(&self, token: &str) -> Result<(), StoreError>;

    /// Remove the persisted token. Removing an absent token succeeds.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the removal fails.
    fn clear(&self) -> Result<(), StoreError>;
}

// =============================================================================
// STORES
// =============================================================================

/// Process-local store; nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<String>>,
}

impl MemoryTokenStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: impl Into<String>) -> Self {
        Self { token: Mutex::new(Some(token.into())) }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(lock(&self.token).clone())
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        *lock(&self.token) = Some(token.to_owned());
        Ok(())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *lock(&self.token) = None;
        Ok(())
    }
}

/// JSON key/value file, e.g. `{"access_token": "..."}`.
///
/// Other keys in the file are preserved. Writes go to a sibling temp file
/// that is renamed over the original.
#[derive(Debug, Clone)]
pub struct FileTokenStore {
    path: PathBuf,
}

impl FileTokenStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, String>, StoreError> {
        match fs::read_to_string(&self.path) {
            Ok(raw) if raw.trim().is_empty() => Ok(HashMap::new()),
            Ok(raw) => Ok(serde_json::from_str(&raw)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_entries(&self, entries: &HashMap<String, String>) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, serde_json::to_vec_pretty(entries)?)?;
        fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Result<Option<String>, StoreError> {
        Ok(self.read_entries()?.remove(TOKEN_KEY))
    }

    fn save(&self, token: &str) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        entries.insert(TOKEN_KEY.to_owned(), token.to_owned());
        self.write_entries(&entries)
    }

    fn clear(&self) -> Result<(), StoreError> {
        let mut entries = self.read_entries()?;
        if entries.remove(TOKEN_KEY).is_none() {
            return Ok(());
        }
        self.write_entries(&entries)
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Shared handle to the active bearer token. Clones observe the same token.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    token: Mutex<Option<String>>,
    store: Box<dyn TokenStore>,
}

impl Session {
    /// Build a session, seeding the token from `store`.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] when the persisted token cannot be read.
    pub fn load(store: impl TokenStore + 'static) -> Result<Self, StoreError> {
        let token = store.load()?;
        Ok(Self { inner: Arc::new(SessionInner { token: Mutex::new(token), store: Box::new(store) }) })
    }

    /// An empty in-memory session.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            inner: Arc::new(SessionInner {
                token: Mutex::new(None),
                store: Box::new(MemoryTokenStore::new()),
            }),
        }
    }

    /// Current token, if one is held.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        lock(&self.inner.token).clone()
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        lock(&self.inner.token).is_some()
    }

    /// Replace the held token and its persisted copy.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if persisting fails; the held token is unchanged.
    pub fn set_token(&self, token: &str) -> Result<(), StoreError> {
        let mut held = lock(&self.inner.token);
        self.inner.store.save(token)?;
        *held = Some(token.to_owned());
        Ok(())
    }

    /// Drop the held token and its persisted copy.
    ///
    /// # Errors
    ///
    /// Returns a [`StoreError`] if the store removal fails; the held token is unchanged.
    pub fn clear_token(&self) -> Result<(), StoreError> {
        let mut held = lock(&self.inner.token);
        self.inner.store.clear()?;
        *held = None;
        Ok(())
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session").field("authenticated", &self.is_authenticated()).finish_non_exhaustive()
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod tests;
