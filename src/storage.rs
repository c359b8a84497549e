//! Credential persistence across two storage scopes.
//!
//! The durable scope is a file under the user config dir and survives
//! restarts; the session scope lives in process memory and dies with it.
//! A separately-persisted `remember_me` flag selects which scope the next
//! login writes to. Invariant: at most one scope holds a live pair —
//! storing into one clears the other.

use std::path::PathBuf;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::errors::StorageError;

const TOKEN_FILE: &str = "token.json";
const IDENTITY_FILE: &str = "id.json";
const REMEMBER_FILE: &str = "remember.json";

/// Short-lived access token plus long-lived refresh token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

/// The logged-in user's id, kept alongside the tokens.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StoredIdentity {
    pub id: i64,
}

#[derive(Debug, Serialize, Deserialize)]
struct RememberFlag {
    remember_me: bool,
}

/// Which scope a credential pair lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    Durable,
    Session,
}

#[derive(Default)]
struct SessionScope {
    pair: Option<TokenPair>,
    identity: Option<StoredIdentity>,
}

/// Two-scope credential store.
pub struct CredentialStore {
    dir: PathBuf,
    session: Mutex<SessionScope>,
}

impl CredentialStore {
    /// Store rooted at the default user config location.
    pub fn open_default() -> Result<Self, StorageError> {
        let dir = dirs::config_dir()
            .ok_or(StorageError::NoConfigDir)?
            .join("shopfloor");
        Ok(Self::open(dir))
    }

    /// Store rooted at an explicit directory (used by tests).
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            session: Mutex::new(SessionScope::default()),
        }
    }

    // ── Remember-me flag ──────────────────────────────────────────────

    pub fn remember_me(&self) -> bool {
        self.read_json::<RememberFlag>(REMEMBER_FILE)
            .ok()
            .flatten()
            .map(|f| f.remember_me)
            .unwrap_or(false)
    }

    pub fn set_remember_me(&self, remember: bool) -> Result<(), StorageError> {
        self.write_json(REMEMBER_FILE, &RememberFlag { remember_me: remember })
    }

    /// The scope the next login should write to.
    pub fn login_scope(&self) -> Scope {
        if self.remember_me() {
            Scope::Durable
        } else {
            Scope::Session
        }
    }

    // ── Credential pairs ──────────────────────────────────────────────

    /// Persist a pair and identity into `scope`, clearing the other scope.
    pub fn store_pair(
        &self,
        pair: TokenPair,
        identity: StoredIdentity,
        scope: Scope,
    ) -> Result<(), StorageError> {
        match scope {
            Scope::Durable => {
                let mut session = self.session.lock().expect("session scope poisoned");
                session.pair = None;
                session.identity = None;
                drop(session);
                self.write_json(TOKEN_FILE, &pair)?;
                self.write_json(IDENTITY_FILE, &identity)?;
            }
            Scope::Session => {
                self.remove_file(TOKEN_FILE)?;
                self.remove_file(IDENTITY_FILE)?;
                let mut session = self.session.lock().expect("session scope poisoned");
                session.pair = Some(pair);
                session.identity = Some(identity);
            }
        }
        debug!(?scope, "stored credential pair");
        Ok(())
    }

    /// The scope currently holding a pair, if any.
    pub fn active_scope(&self) -> Option<Scope> {
        if self.session.lock().expect("session scope poisoned").pair.is_some() {
            return Some(Scope::Session);
        }
        if self.dir.join(TOKEN_FILE).exists() {
            return Some(Scope::Durable);
        }
        None
    }

    /// The live pair, regardless of scope.
    pub fn token_pair(&self) -> Option<TokenPair> {
        if let Some(pair) = self.session.lock().expect("session scope poisoned").pair.clone() {
            return Some(pair);
        }
        self.read_json(TOKEN_FILE).ok().flatten()
    }

    pub fn identity(&self) -> Option<StoredIdentity> {
        if let Some(id) = self.session.lock().expect("session scope poisoned").identity {
            return Some(id);
        }
        self.read_json(IDENTITY_FILE).ok().flatten()
    }

    /// Replace only the access token, keeping the refresh token and the
    /// scope the pair already lives in.
    pub fn update_access(&self, access: &str) -> Result<(), StorageError> {
        match self.active_scope() {
            Some(Scope::Session) => {
                let mut session = self.session.lock().expect("session scope poisoned");
                if let Some(pair) = session.pair.as_mut() {
                    pair.access = access.to_string();
                }
                Ok(())
            }
            Some(Scope::Durable) => {
                if let Some(mut pair) = self.read_json::<TokenPair>(TOKEN_FILE)?.take() {
                    pair.access = access.to_string();
                    self.write_json(TOKEN_FILE, &pair)?;
                }
                Ok(())
            }
            None => Ok(()),
        }
    }

    /// Wipe both scopes. Used on logout and on terminal refresh failure.
    pub fn clear_all(&self) -> Result<(), StorageError> {
        {
            let mut session = self.session.lock().expect("session scope poisoned");
            *session = SessionScope::default();
        }
        self.remove_file(TOKEN_FILE)?;
        self.remove_file(IDENTITY_FILE)?;
        Ok(())
    }

    // ── File helpers ──────────────────────────────────────────────────

    fn path(&self, file: &str) -> PathBuf {
        self.dir.join(file)
    }

    fn read_json<T: serde::de::DeserializeOwned>(
        &self,
        file: &str,
    ) -> Result<Option<T>, StorageError> {
        let path = self.path(file);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(StorageError::Io { path, source: e }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|e| StorageError::Corrupt { path, source: e })
    }

    fn write_json<T: Serialize>(&self, file: &str, value: &T) -> Result<(), StorageError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| StorageError::Io {
            path: self.dir.clone(),
            source: e,
        })?;
        let path = self.path(file);
        let raw = serde_json::to_string(value).expect("credential types serialize");
        std::fs::write(&path, raw).map_err(|e| StorageError::Io { path, source: e })
    }

    fn remove_file(&self, file: &str) -> Result<(), StorageError> {
        let path = self.path(file);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io { path, source: e }),
        }
    }
}

impl std::fmt::Debug for CredentialStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialStore")
            .field("dir", &self.dir)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn pair(access: &str) -> TokenPair {
        TokenPair {
            access: access.into(),
            refresh: "refresh-1".into(),
        }
    }

    fn store() -> (TempDir, CredentialStore) {
        let dir = TempDir::new().unwrap();
        let store = CredentialStore::open(dir.path());
        (dir, store)
    }

    #[test]
    fn session_pair_does_not_touch_disk() {
        let (dir, store) = store();
        store
            .store_pair(pair("a1"), StoredIdentity { id: 9 }, Scope::Session)
            .unwrap();
        assert_eq!(store.active_scope(), Some(Scope::Session));
        assert!(!dir.path().join(TOKEN_FILE).exists());
        assert_eq!(store.token_pair().unwrap().access, "a1");
        assert_eq!(store.identity().unwrap().id, 9);
    }

    #[test]
    fn durable_pair_survives_reopen() {
        let (dir, store) = store();
        store
            .store_pair(pair("a1"), StoredIdentity { id: 9 }, Scope::Durable)
            .unwrap();
        drop(store);
        let reopened = CredentialStore::open(dir.path());
        assert_eq!(reopened.active_scope(), Some(Scope::Durable));
        assert_eq!(reopened.token_pair().unwrap().access, "a1");
    }

    #[test]
    fn storing_into_one_scope_clears_the_other() {
        let (_dir, store) = store();
        store
            .store_pair(pair("durable"), StoredIdentity { id: 1 }, Scope::Durable)
            .unwrap();
        store
            .store_pair(pair("session"), StoredIdentity { id: 1 }, Scope::Session)
            .unwrap();
        assert_eq!(store.active_scope(), Some(Scope::Session));
        assert_eq!(store.token_pair().unwrap().access, "session");

        store
            .store_pair(pair("durable-2"), StoredIdentity { id: 1 }, Scope::Durable)
            .unwrap();
        assert_eq!(store.active_scope(), Some(Scope::Durable));
        assert_eq!(store.token_pair().unwrap().access, "durable-2");
    }

    #[test]
    fn update_access_keeps_refresh_and_scope() {
        let (_dir, store) = store();
        store
            .store_pair(pair("old"), StoredIdentity { id: 1 }, Scope::Durable)
            .unwrap();
        store.update_access("new").unwrap();
        let updated = store.token_pair().unwrap();
        assert_eq!(updated.access, "new");
        assert_eq!(updated.refresh, "refresh-1");
        assert_eq!(store.active_scope(), Some(Scope::Durable));
    }

    #[test]
    fn remember_me_selects_login_scope() {
        let (_dir, store) = store();
        assert_eq!(store.login_scope(), Scope::Session);
        store.set_remember_me(true).unwrap();
        assert_eq!(store.login_scope(), Scope::Durable);
    }

    #[test]
    fn clear_all_empties_both_scopes() {
        let (_dir, store) = store();
        store
            .store_pair(pair("a"), StoredIdentity { id: 1 }, Scope::Durable)
            .unwrap();
        store.clear_all().unwrap();
        assert_eq!(store.active_scope(), None);
        assert!(store.token_pair().is_none());
        assert!(store.identity().is_none());
    }

    #[test]
    fn corrupt_token_file_is_reported() {
        let (dir, store) = store();
        std::fs::create_dir_all(dir.path()).unwrap();
        std::fs::write(dir.path().join(TOKEN_FILE), "{not json").unwrap();
        let err = store.read_json::<TokenPair>(TOKEN_FILE).unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }
}
