//! Session validity and persistence.
//!
//! `SessionManager` owns the active [`Identity`] and the single persisted
//! record behind it. Session-dependent code subscribes to changes instead of
//! reading storage directly.

mod store;

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;

use crate::models::Identity;
use crate::util::{subject_fingerprint, unix_timestamp_now};

pub use store::{FileSessionStore, MemorySessionStore, SESSION_RECORD_NAME};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session has expired")]
    Expired,
    #[error("Malformed persisted session: {0}")]
    Malformed(String),
    #[error("Session storage error: {0}")]
    Storage(String),
    #[error("Session storage IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Storage for the one persisted session record.
///
/// `load_session` returns `SessionError::Malformed` for records that exist but
/// cannot be parsed; the manager treats those as absent.
pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> SessionResult<Option<Identity>>;
    fn save_session(&self, identity: &Identity) -> SessionResult<()>;
    fn clear_session(&self) -> SessionResult<()>;
}

#[derive(Clone)]
pub struct SessionManager<P: SessionPersistence> {
    store: P,
    active: Arc<watch::Sender<Option<Identity>>>,
}

impl<P: SessionPersistence> SessionManager<P> {
    pub fn new(store: P) -> Self {
        Self {
            store,
            active: Arc::new(watch::Sender::new(None)),
        }
    }

    /// Restore the persisted session at process start.
    pub fn restore_session(&self) -> SessionResult<Option<Identity>> {
        self.restore_session_at(unix_timestamp_now())
    }

    pub fn restore_session_at(&self, now: i64) -> SessionResult<Option<Identity>> {
        let identity = match self.store.load_session() {
            Ok(Some(identity)) => identity,
            Ok(None) => return Ok(None),
            Err(SessionError::Malformed(reason)) => {
                tracing::warn!("Discarding malformed persisted session: {}", reason);
                self.store.clear_session()?;
                return Ok(None);
            }
            Err(error) => return Err(error),
        };

        if identity.is_expired_at(now) {
            tracing::info!(
                user = subject_fingerprint(&identity.subject_id),
                expires_at = identity.expires_at,
                "Persisted session has expired"
            );
            self.store.clear_session()?;
            return Ok(None);
        }

        tracing::info!(
            user = subject_fingerprint(&identity.subject_id),
            "Restored persisted session"
        );
        self.active.send_replace(Some(identity.clone()));
        Ok(Some(identity))
    }

    /// Persist `identity` and make it the active session.
    pub fn login(&self, identity: Identity) -> SessionResult<()> {
        if identity.is_expired() {
            return Err(SessionError::Expired);
        }
        self.store.save_session(&identity)?;
        tracing::info!(
            user = subject_fingerprint(&identity.subject_id),
            expires_at = identity.expires_at,
            "Signed in"
        );
        self.active.send_replace(Some(identity));
        Ok(())
    }

    /// Clear the active session and the persisted record.
    ///
    /// The active session is cleared even when the record cannot be removed.
    pub fn logout(&self) -> SessionResult<()> {
        if let Some(previous) = self.active.send_replace(None) {
            tracing::info!(
                user = subject_fingerprint(&previous.subject_id),
                "Signed out"
            );
        }
        self.store.clear_session()
    }

    #[must_use]
    pub fn current(&self) -> Option<Identity> {
        self.active.borrow().clone()
    }

    /// The active session, if it has not expired yet.
    ///
    /// An expired active session is ended here, exactly like a logout.
    pub fn current_valid(&self) -> Option<Identity> {
        self.current_valid_at(unix_timestamp_now())
    }

    pub fn current_valid_at(&self, now: i64) -> Option<Identity> {
        let identity = self.current()?;
        if !identity.is_expired_at(now) {
            return Some(identity);
        }

        tracing::info!(
            user = subject_fingerprint(&identity.subject_id),
            "Active session expired"
        );
        self.active.send_replace(None);
        if let Err(error) = self.store.clear_session() {
            tracing::warn!("Failed to clear expired session record: {}", error);
        }
        None
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Option<Identity>> {
        self.active.subscribe()
    }
}
