//! Persisted slot for the current session token. It is read once at startup,
//! written on login/refresh and cleared on logout or refresh failure. The file
//! backend writes through a temporary sibling and a rename so a crash never
//! leaves a half-written token behind.

use super::{Error, Result, Token};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    io::{ErrorKind, Write},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Mutex,
    },
};
use tracing::debug;

/// Key-value slot holding at most one token.
pub trait TokenStorage: Send + Sync {
    /// # Errors
    /// Returns `Error::Storage` if the slot exists but cannot be read.
    fn load(&self) -> Result<Option<Token>>;

    /// # Errors
    /// Returns `Error::Storage` if the token cannot be persisted.
    fn save(&self, token: &Token) -> Result<()>;

    /// # Errors
    /// Returns `Error::Storage` if the slot cannot be removed.
    fn clear(&self) -> Result<()>;
}

#[derive(Serialize, Deserialize)]
struct StoredToken {
    token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    refresh_token: Option<String>,
    expires_at: u64,
}

impl From<&Token> for StoredToken {
    fn from(token: &Token) -> Self {
        Self {
            token: token.access().expose_secret().to_string(),
            refresh_token: token
                .refresh()
                .map(|refresh| refresh.expose_secret().to_string()),
            expires_at: token.expires_at(),
        }
    }
}

impl From<StoredToken> for Token {
    fn from(stored: StoredToken) -> Self {
        Token::new(stored.token, stored.refresh_token, stored.expires_at)
    }
}

/// Process-local storage, lost on exit.
#[derive(Default)]
pub struct MemoryStorage {
    slot: Mutex<Option<Token>>,
    loads: AtomicUsize,
}

impl MemoryStorage {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_token(token: Token) -> Self {
        Self {
            slot: Mutex::new(Some(token)),
            loads: AtomicUsize::new(0),
        }
    }

    /// Number of `load` calls so far.
    #[must_use]
    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }

    /// Current slot contents without counting as a load.
    #[must_use]
    pub fn peek(&self) -> Option<Token> {
        self.slot.lock().ok().and_then(|slot| slot.clone())
    }
}

impl TokenStorage for MemoryStorage {
    fn load(&self) -> Result<Option<Token>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        let slot = self
            .slot
            .lock()
            .map_err(|_| Error::Storage("memory slot poisoned".to_string()))?;
        Ok(slot.clone())
    }

    fn save(&self, token: &Token) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Storage("memory slot poisoned".to_string()))?;
        *slot = Some(token.clone());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| Error::Storage("memory slot poisoned".to_string()))?;
        *slot = None;
        Ok(())
    }
}

/// JSON file holding the token, readable only by the owner on unix.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(std::ffi::OsStr::to_os_string)
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

fn storage_err(path: &Path, err: &dyn std::fmt::Display) -> Error {
    Error::Storage(format!("{}: {err}", path.display()))
}

impl TokenStorage for FileStorage {
    fn load(&self) -> Result<Option<Token>> {
        let raw = match fs::read(&self.path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(storage_err(&self.path, &err)),
        };

        let stored: StoredToken =
            serde_json::from_slice(&raw).map_err(|err| storage_err(&self.path, &err))?;

        debug!(path = %self.path.display(), "loaded persisted token");

        Ok(Some(stored.into()))
    }

    fn save(&self, token: &Token) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|err| storage_err(parent, &err))?;
            }
        }

        let payload = serde_json::to_vec(&StoredToken::from(token))?;
        let tmp = self.tmp_path();

        let mut options = fs::OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(&tmp).map_err(|err| storage_err(&tmp, &err))?;
        file.write_all(&payload)
            .and_then(|()| file.sync_all())
            .map_err(|err| storage_err(&tmp, &err))?;

        fs::rename(&tmp, &self.path).map_err(|err| storage_err(&self.path, &err))?;

        debug!(path = %self.path.display(), "persisted token");

        Ok(())
    }

    fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(storage_err(&self.path, &err)),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;

    fn token() -> Token {
        Token::new("access-1".to_string(), Some("refresh-1".to_string()), 1_900_000_000)
    }

    #[test]
    fn memory_storage_round_trip_and_clear() {
        let storage = MemoryStorage::new();
        assert!(storage.load().unwrap().is_none());

        storage.save(&token()).unwrap();
        let loaded = storage.load().unwrap().unwrap();
        assert_eq!(loaded.access().expose_secret(), "access-1");
        assert_eq!(storage.loads(), 2);

        storage.clear().unwrap();
        assert!(storage.peek().is_none());
        assert_eq!(storage.loads(), 2);
    }

    #[test]
    fn file_storage_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let storage = FileStorage::new(dir.path().join("session.json"));
        assert!(storage.load().unwrap().is_none());
        storage.clear().unwrap();
    }

    #[test]
    fn file_storage_persists_token() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("session.json");
        let storage = FileStorage::new(&path);

        storage.save(&token()).unwrap();

        let reopened = FileStorage::new(&path);
        let loaded = reopened.load().unwrap().unwrap();
        assert_eq!(loaded.access().expose_secret(), "access-1");
        assert_eq!(
            loaded.refresh().map(|r| r.expose_secret().to_string()),
            Some("refresh-1".to_string())
        );
        assert_eq!(loaded.expires_at(), 1_900_000_000);
        assert!(!storage.tmp_path().exists());

        reopened.clear().unwrap();
        assert!(!path.exists());
    }

    #[cfg(unix)]
    #[test]
    fn file_storage_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        FileStorage::new(&path).save(&token()).unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn file_storage_rejects_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        fs::write(&path, b"{not json").unwrap();

        let err = FileStorage::new(&path).load().unwrap_err();
        assert!(matches!(err, Error::Storage(_)));
    }
}
