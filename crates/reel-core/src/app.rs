//! Application facade used by the presentation layer.
//!
//! Owns one session manager, one favorites store and the sync scheduler that
//! ties them to the remote service.

use std::sync::Arc;

use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::error::Result;
use crate::favorites::{FavoritesSnapshot, FavoritesStore, ReorderEngine};
use crate::identity::{decode_id_token, ensure_audience};
use crate::models::{Favorites, Identity, MovieId};
use crate::service::{FavoritesService, HttpFavoritesClient};
use crate::session::{FileSessionStore, SessionManager, SessionPersistence};
use crate::state::SyncState;
use crate::sync::{SyncConfig, SyncHandle, SyncScheduler};

pub struct FavoritesApp<P: SessionPersistence, S: FavoritesService> {
    google_client_id: String,
    session: SessionManager<P>,
    store: FavoritesStore,
    service: Arc<S>,
    sync_config: SyncConfig,
    sync: Option<SyncHandle>,
}

impl FavoritesApp<FileSessionStore, HttpFavoritesClient> {
    /// Build the production wiring: file-backed session, HTTP service.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        let service = HttpFavoritesClient::new(config.api_base_url.clone())?;
        Ok(Self::new(
            config.google_client_id.clone(),
            config.session_store()?,
            service,
            config.sync_config(),
        ))
    }
}

impl<P: SessionPersistence, S: FavoritesService> FavoritesApp<P, S> {
    pub fn new(
        google_client_id: impl Into<String>,
        session_store: P,
        service: S,
        sync_config: SyncConfig,
    ) -> Self {
        Self {
            google_client_id: google_client_id.into(),
            session: SessionManager::new(session_store),
            store: FavoritesStore::new(),
            service: Arc::new(service),
            sync_config,
            sync: None,
        }
    }

    /// Restore the persisted session and start syncing.
    ///
    /// Must run inside a tokio runtime. Calling it again is a no-op that
    /// returns the current session.
    pub fn start(&mut self) -> Result<Option<Identity>> {
        if self.sync.is_some() {
            return Ok(self.session.current_valid());
        }

        let restored = self.session.restore_session()?;
        let handle = SyncScheduler::new(
            self.session.clone(),
            self.store.clone(),
            Arc::clone(&self.service),
            self.sync_config,
        )
        .spawn();
        self.sync = Some(handle);
        Ok(restored)
    }

    /// Start a session from the identity widget's credential.
    pub fn login_with_credential(&self, credential: &str) -> Result<Identity> {
        let identity = decode_id_token(credential)?;
        ensure_audience(&identity, &self.google_client_id)?;
        self.session.login(identity.clone())?;
        Ok(identity)
    }

    pub fn logout(&self) -> Result<()> {
        self.session.logout()?;
        Ok(())
    }

    pub fn current_identity(&self) -> Option<Identity> {
        self.session.current_valid()
    }

    pub fn add_favorite(&self, id: MovieId) -> bool {
        self.store.add(id)
    }

    pub fn remove_favorite(&self, id: &MovieId) -> bool {
        self.store.remove(id)
    }

    /// Flip membership of `id`. Returns whether it is a favorite afterwards.
    pub fn toggle_favorite(&self, id: MovieId) -> bool {
        if self.store.contains(&id) {
            self.store.remove(&id);
            false
        } else {
            self.store.add(id);
            true
        }
    }

    pub fn is_favorite(&self, id: &MovieId) -> bool {
        self.store.contains(id)
    }

    pub fn favorites(&self) -> Favorites {
        self.store.favorites()
    }

    pub fn subscribe_favorites(&self) -> watch::Receiver<FavoritesSnapshot> {
        self.store.subscribe()
    }

    /// Engine for one drag gesture over the current favorites.
    pub fn reorder(&self) -> ReorderEngine {
        ReorderEngine::new(self.store.clone())
    }

    pub fn sync_state(&self) -> SyncState {
        self.sync.as_ref().map_or(SyncState::Offline, SyncHandle::status)
    }

    pub fn google_client_id(&self) -> &str {
        &self.google_client_id
    }

    pub async fn shutdown(mut self) {
        if let Some(handle) = self.sync.take() {
            handle.shutdown().await;
        }
    }
}
