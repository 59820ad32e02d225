//! Credential store: the access token and user profile of the current session
//!
//! The session is kept in memory and mirrored to a [`KeyValueStore`] under two
//! fixed keys so that it survives a restart. Token and profile are always
//! written and cleared together.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ClientError, Result};

/// Persistence key for the access token
pub const ACCESS_TOKEN_KEY: &str = "access_token";

/// Persistence key for the JSON-encoded user profile
pub const USER_KEY: &str = "user";

/// A role granted to a user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Role {
    pub id: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Profile of the authenticated user as returned by the login mutation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub roles: Vec<Role>,
}

impl UserProfile {
    /// Name to show for the user, falling back to the username
    pub fn display_name(&self) -> &str {
        self.display_name.as_deref().unwrap_or(&self.username)
    }
}

/// The current session. A token is present iff a user is present.
#[derive(Clone, Default, PartialEq)]
pub struct Session {
    access_token: Option<String>,
    user: Option<UserProfile>,
}

impl Session {
    pub fn authenticated(access_token: String, user: UserProfile) -> Self {
        Self {
            access_token: Some(access_token),
            user: Some(user),
        }
    }

    pub fn access_token(&self) -> Option<&str> {
        self.access_token.as_deref()
    }

    pub fn user(&self) -> Option<&UserProfile> {
        self.user.as_ref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some() && self.user.is_some()
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

/// String key/value persistence, the equivalent of browser local storage
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;
}

/// In-process store, used by tests and when persistence is disabled
#[derive(Debug, Default)]
pub struct MemoryKeyValueStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        entries.remove(key);
        Ok(())
    }
}

/// Store backed by a single JSON object on disk
#[derive(Debug)]
pub struct FileKeyValueStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKeyValueStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = std::fs::read_to_string(&self.path).map_err(|e| {
            ClientError::Storage(format!("Failed to read {:?}: {}", self.path, e))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&content)?)
    }

    fn write_entries(&self, entries: &BTreeMap<String, String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let content = serde_json::to_string_pretty(entries)?;
        std::fs::write(&self.path, content).map_err(|e| {
            ClientError::Storage(format!("Failed to write {:?}: {}", self.path, e))
        })
    }

    fn modify(&self, f: impl FnOnce(&mut BTreeMap<String, String>)) -> Result<()> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let mut entries = self.read_entries()?;
        f(&mut entries);
        self.write_entries(&entries)
    }
}

impl KeyValueStore for FileKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.read_entries()?.remove(key))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.modify(|entries| {
            entries.insert(key.to_string(), value.to_string());
        })
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.modify(|entries| {
            entries.remove(key);
        })
    }
}

/// Holds the current session and keeps its persisted copy in sync
pub struct CredentialStore {
    session: RwLock<Session>,
    backend: Arc<dyn KeyValueStore>,
}

impl fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CredentialStore")
            .field("session", &self.session())
            .finish()
    }
}

impl CredentialStore {
    /// Create an empty store on top of the given backend
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self {
            session: RwLock::new(Session::default()),
            backend,
        }
    }

    /// Restore the persisted session. A token without a profile (or the
    /// other way round) is discarded and both keys are removed.
    pub fn load(backend: Arc<dyn KeyValueStore>) -> Result<Self> {
        let token = backend.get(ACCESS_TOKEN_KEY)?;
        let user = match backend.get(USER_KEY)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!("Discarding unreadable persisted user profile: {}", e);
                    None
                }
            },
            None => None,
        };

        let store = Self::new(backend);
        match (token, user) {
            (Some(token), Some(user)) => {
                debug!("Restored session for '{}'", user.username);
                *store.write_session() = Session::authenticated(token, user);
            }
            (None, None) => debug!("No persisted session"),
            _ => {
                warn!("Persisted session is incomplete, clearing it");
                store.clear()?;
            }
        }
        Ok(store)
    }

    pub fn session(&self) -> Session {
        self.read_session().clone()
    }

    pub fn access_token(&self) -> Option<String> {
        self.read_session().access_token.clone()
    }

    pub fn user(&self) -> Option<UserProfile> {
        self.read_session().user.clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.read_session().is_authenticated()
    }

    /// Store a freshly issued token together with its user
    pub fn sign_in(&self, access_token: String, user: UserProfile) -> Result<()> {
        let user_json = serde_json::to_string(&user)?;
        self.backend.set(USER_KEY, &user_json)?;
        if let Err(e) = self.backend.set(ACCESS_TOKEN_KEY, &access_token) {
            let _ = self.backend.remove(USER_KEY);
            return Err(e);
        }
        debug!("Signed in as '{}'", user.username);
        *self.write_session() = Session::authenticated(access_token, user);
        Ok(())
    }

    /// Replace the token of the current session after a refresh
    pub fn update_token(&self, access_token: String) -> Result<()> {
        let mut session = self.write_session();
        if session.user.is_none() {
            return Err(ClientError::SessionTerminated);
        }
        self.backend.set(ACCESS_TOKEN_KEY, &access_token)?;
        session.access_token = Some(access_token);
        debug!("Access token updated");
        Ok(())
    }

    /// Drop token and profile together, in memory and in persistence
    pub fn clear(&self) -> Result<()> {
        *self.write_session() = Session::default();
        let token_result = self.backend.remove(ACCESS_TOKEN_KEY);
        let user_result = self.backend.remove(USER_KEY);
        debug!("Session cleared");
        token_result.and(user_result)
    }

    fn read_session(&self) -> std::sync::RwLockReadGuard<'_, Session> {
        self.session.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_session(&self) -> std::sync::RwLockWriteGuard<'_, Session> {
        self.session.write().unwrap_or_else(PoisonError::into_inner)
    }
}
