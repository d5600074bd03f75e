//! Session record backends.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use super::{SessionError, SessionPersistence, SessionResult};
use crate::models::Identity;

/// Fixed name of the persisted session record.
pub const SESSION_RECORD_NAME: &str = "login";

const APP_DIR_NAME: &str = "reel";

/// Session record stored as a JSON file (`login.json`).
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `<data dir>/reel/login.json`
    pub fn default_path() -> SessionResult<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            SessionError::Storage("Failed to resolve the user data directory".to_string())
        })?;
        Ok(data_dir
            .join(APP_DIR_NAME)
            .join(format!("{SESSION_RECORD_NAME}.json")))
    }

    pub fn at_default_location() -> SessionResult<Self> {
        Ok(Self::new(Self::default_path()?))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SessionPersistence for FileSessionStore {
    fn load_session(&self) -> SessionResult<Option<Identity>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == ErrorKind::NotFound => return Ok(None),
            Err(error) => return Err(error.into()),
        };
        parse_record(&raw)
    }

    fn save_session(&self, identity: &Identity) -> SessionResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let serialized = serde_json::to_string(identity)
            .map_err(|error| SessionError::Storage(error.to_string()))?;
        std::fs::write(&self.path, serialized)?;
        Ok(())
    }

    fn clear_session(&self) -> SessionResult<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error.into()),
        }
    }
}

/// In-process session record, holding the raw JSON like the file store does.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    raw: Arc<Mutex<Option<String>>>,
}

impl MemorySessionStore {
    /// Seed the store with a raw record, valid or not.
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self {
            raw: Arc::new(Mutex::new(Some(raw.into()))),
        }
    }

    /// The raw record currently stored.
    pub fn raw(&self) -> Option<String> {
        self.raw.lock().ok().and_then(|raw| raw.clone())
    }

    fn with_record<T>(&self, f: impl FnOnce(&mut Option<String>) -> T) -> SessionResult<T> {
        let mut guard = self
            .raw
            .lock()
            .map_err(|_| SessionError::Storage("session store lock poisoned".to_string()))?;
        Ok(f(&mut guard))
    }
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> SessionResult<Option<Identity>> {
        match self.with_record(|raw| raw.clone())? {
            Some(raw) => parse_record(&raw),
            None => Ok(None),
        }
    }

    fn save_session(&self, identity: &Identity) -> SessionResult<()> {
        let serialized = serde_json::to_string(identity)
            .map_err(|error| SessionError::Storage(error.to_string()))?;
        self.with_record(|raw| *raw = Some(serialized))
    }

    fn clear_session(&self) -> SessionResult<()> {
        self.with_record(|raw| *raw = None)
    }
}

/// Blank and `null` records mean "no session".
fn parse_record(raw: &str) -> SessionResult<Option<Identity>> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    serde_json::from_str::<Option<Identity>>(raw)
        .map_err(|error| SessionError::Malformed(error.to_string()))
}
