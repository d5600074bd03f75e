//! Favorites sync scheduler.
//!
//! One task owns both reactions:
//! - pull when a session becomes valid (startup restore, login, account switch)
//! - push after local mutations settle, while a valid session exists
//!
//! Only one request is in flight at a time. A push that fails is retried with
//! exponential backoff until it succeeds, the favorites change again, or the
//! session ends. Nothing is pushed for a subject until its server list has been
//! pulled at least once.


use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use crate::favorites::FavoritesStore;
use crate::models::Identity;
use crate::service::{FavoritesDocument, FavoritesService, ServiceError};
use crate::session::{SessionManager, SessionPersistence};
use crate::state::SyncState;
use crate::util::{subject_fingerprint, unix_timestamp_millis};

const DEFAULT_PUSH_DEBOUNCE_MS: u64 = 300;
const DEFAULT_RETRY_BASE_MS: u64 = 1_000;
const DEFAULT_RETRY_MAX_MS: u64 = 60_000;
const MAX_BACKOFF_SHIFT: u32 = 16;

/// Source of the current Unix time in milliseconds.
pub type Clock = Arc<dyn Fn() -> i64 + Send + Sync>;

/// What to do with local favorites when a session starts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoginMergePolicy {
    /// The server's list replaces local favorites.
    #[default]
    Discard,
    /// Local favorites the server lacks are appended and pushed back.
    Merge,
}

impl FromStr for LoginMergePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "discard" => Ok(Self::Discard),
            "merge" => Ok(Self::Merge),
            other => Err(format!(
                "unknown login merge policy '{other}' (expected 'discard' or 'merge')"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Quiet period after the last mutation before a push
    pub push_debounce: Duration,
    /// First retry delay after a failed push
    pub retry_base: Duration,
    /// Upper bound for the retry delay
    pub retry_max: Duration,
    pub login_merge_policy: LoginMergePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            push_debounce: Duration::from_millis(DEFAULT_PUSH_DEBOUNCE_MS),
            retry_base: Duration::from_millis(DEFAULT_RETRY_BASE_MS),
            retry_max: Duration::from_millis(DEFAULT_RETRY_MAX_MS),
            login_merge_policy: LoginMergePolicy::Discard,
        }
    }
}

impl SyncConfig {
    /// Delay before retry number `attempt` (zero-based).
    #[must_use]
    pub fn retry_delay(&self, attempt: u32) -> Duration {
        let factor = 1_u32 << attempt.min(MAX_BACKOFF_SHIFT);
        self.retry_base.saturating_mul(factor).min(self.retry_max)
    }
}

pub struct SyncScheduler<P: SessionPersistence, S: FavoritesService> {
    session: SessionManager<P>,
    store: FavoritesStore,
    service: Arc<S>,
    config: SyncConfig,
    clock: Clock,
}

impl<P: SessionPersistence, S: FavoritesService> SyncScheduler<P, S> {
    pub fn new(
        session: SessionManager<P>,
        store: FavoritesStore,
        service: Arc<S>,
        config: SyncConfig,
    ) -> Self {
        Self {
            session,
            store,
            service,
            config,
            clock: Arc::new(unix_timestamp_millis),
        }
    }

    /// Replace the wall clock used for session expiry and push sequences.
    #[must_use]
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Start the scheduler task on the current tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let (status_tx, status_rx) = watch::channel(SyncState::Offline);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let worker = SyncWorker {
            session: self.session,
            store: self.store,
            service: self.service,
            config: self.config,
            clock: self.clock,
            writer: Uuid::now_v7().to_string(),
            status: status_tx,
            active: None,
            pulled: false,
            push_at: None,
            retry_attempt: 0,
            last_sequence: 0,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));
        SyncHandle {
            shutdown: shutdown_tx,
            task,
            status: status_rx,
        }
    }
}

/// Running scheduler.
pub struct SyncHandle {
    shutdown: oneshot::Sender<()>,
    task: JoinHandle<()>,
    status: watch::Receiver<SyncState>,
}

impl SyncHandle {
    #[must_use]
    pub fn status(&self) -> SyncState {
        *self.status.borrow()
    }

    #[must_use]
    pub fn subscribe_status(&self) -> watch::Receiver<SyncState> {
        self.status.clone()
    }

    /// Stop the task. In-flight requests are dropped.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(());
        if let Err(error) = self.task.await {
            tracing::warn!("Sync scheduler task ended abnormally: {}", error);
        }
    }
}

struct SyncWorker<P: SessionPersistence, S: FavoritesService> {
    session: SessionManager<P>,
    store: FavoritesStore,
    service: Arc<S>,
    config: SyncConfig,
    clock: Clock,
    /// Scope of this scheduler's push sequences on the server
    writer: String,
    status: watch::Sender<SyncState>,
    /// Session the store currently belongs to
    active: Option<Identity>,
    /// Whether a pull for the active session has succeeded
    pulled: bool,
    push_at: Option<Instant>,
    retry_attempt: u32,
    last_sequence: i64,
}

impl<P: SessionPersistence, S: FavoritesService> SyncWorker<P, S> {
    async fn run(mut self, mut shutdown: oneshot::Receiver<()>) {
        let mut session_rx = self.session.subscribe();
        let mut store_rx = self.store.subscribe();

        self.on_session_changed().await;
        self.on_store_changed();

        loop {
            let push_at = self.push_at;
            let expiry_at = self.expiry_deadline();
            tokio::select! {
                _ = &mut shutdown => break,
                changed = session_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_session_changed().await;
                }
                changed = store_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.on_store_changed();
                }
                () = wait_until(push_at) => {
                    self.push_at = None;
                    self.push().await;
                }
                () = wait_until(expiry_at) => {
                    // Ends the session when it is really past expiry; the
                    // session channel then drives the cleanup.
                    let _ = self.current_valid();
                }
            }
        }

        tracing::debug!("Sync scheduler stopped");
    }

    async fn on_session_changed(&mut self) {
        let Some(identity) = self.session.current() else {
            if let Some(previous) = self.active.take() {
                tracing::info!(
                    user = subject_fingerprint(&previous.subject_id),
                    "Session ended; discarding local favorites"
                );
                self.cancel_pending_push();
                self.store.clear();
            }
            self.pulled = false;
            self.publish(SyncState::Offline);
            return;
        };

        let switched = self
            .active
            .as_ref()
            .map_or(true, |previous| previous.subject_id != identity.subject_id);
        let had_session = self.active.is_some();
        self.active = Some(identity);

        if switched {
            self.cancel_pending_push();
            self.pulled = false;
            let mode = match self.config.login_merge_policy {
                LoginMergePolicy::Discard => PullMode::Replace,
                LoginMergePolicy::Merge => PullMode::Merge,
            };
            // Guest favorites never reach the server unless merging.
            if had_session || mode == PullMode::Replace {
                self.store.clear();
            }
            self.pulled = self.pull(mode).await;
        }
    }

    fn on_store_changed(&mut self) {
        if !self.store.is_dirty() {
            self.cancel_pending_push();
            return;
        }
        if self.active.is_none() {
            return;
        }
        self.push_at = Some(Instant::now() + self.config.push_debounce);
    }

    /// Fetch the server list for the active session. Returns whether it was
    /// applied.
    async fn pull(&mut self, mode: PullMode) -> bool {
        let Some(identity) = self.current_valid() else {
            return false;
        };
        let subject_id = identity.subject_id;
        let user = subject_fingerprint(&subject_id);

        self.publish(SyncState::Syncing);
        let result = self.service.fetch(&subject_id).await;
        if !self.is_still_active(&subject_id) {
            tracing::debug!(user, "Ignoring favorites fetched for an ended session");
            return false;
        }

        match result {
            Ok(remote) => {
                let count = remote.len();
                let dirty = match mode {
                    PullMode::Replace => {
                        self.store.replace_all(remote);
                        false
                    }
                    PullMode::Merge => self.store.merge_remote(remote),
                };
                tracing::info!(user, count, merged_local = dirty, "Pulled favorites");
                self.publish(if dirty {
                    SyncState::Syncing
                } else {
                    SyncState::Synced
                });
                true
            }
            Err(error) => {
                tracing::warn!(user, "Failed to fetch favorites: {}", error);
                self.publish(SyncState::Error);
                false
            }
        }
    }

    async fn push(&mut self) {
        let Some(identity) = self.current_valid() else {
            return;
        };
        let subject_id = identity.subject_id;
        let user = subject_fingerprint(&subject_id);

        if !self.pulled {
            // Local changes are laid over the server list before any write.
            self.pulled = self.pull(PullMode::Merge).await;
            if !self.pulled {
                if self.is_still_active(&subject_id) && self.store.is_dirty() {
                    let delay = self.schedule_retry();
                    tracing::warn!(
                        user,
                        attempt = self.retry_attempt,
                        retry_in_ms = millis(delay),
                        "Holding favorites push until the server list is pulled"
                    );
                }
                return;
            }
        }

        let snapshot = self.store.snapshot();
        if !snapshot.dirty {
            return;
        }

        let sequence = self.next_sequence();
        let count = snapshot.favorites.len();
        let document = FavoritesDocument {
            subject_id: subject_id.clone(),
            favorites: snapshot.favorites,
            writer: Some(self.writer.clone()),
            sequence: Some(sequence),
        };

        self.publish(SyncState::Syncing);
        let result = self.service.replace(&document).await;
        if !self.is_still_active(&subject_id) {
            tracing::debug!(user, sequence, "Ignoring push result for an ended session");
            return;
        }

        match result {
            Ok(()) => {
                self.retry_attempt = 0;
                if self.store.mark_synced(snapshot.revision) {
                    tracing::info!(user, sequence, count, "Pushed favorites");
                    self.publish(SyncState::Synced);
                } else {
                    tracing::debug!(user, sequence, "Favorites changed during push");
                }
            }
            Err(ServiceError::Stale) => {
                tracing::warn!(user, sequence, "Favorites push was superseded; pulling");
                self.retry_attempt = 0;
                self.pulled = self.pull(PullMode::Replace).await;
                if !self.pulled && self.is_still_active(&subject_id) && self.store.is_dirty() {
                    let delay = self.schedule_retry();
                    tracing::warn!(
                        user,
                        attempt = self.retry_attempt,
                        retry_in_ms = millis(delay),
                        "Pull after superseded push failed"
                    );
                }
            }
            Err(error) => {
                let delay = self.schedule_retry();
                tracing::warn!(
                    user,
                    attempt = self.retry_attempt,
                    retry_in_ms = millis(delay),
                    "Failed to push favorites: {}",
                    error
                );
                self.publish(SyncState::Error);
            }
        }
    }

    /// Arm the backoff timer unless a push is already due. Returns the delay.
    fn schedule_retry(&mut self) -> Duration {
        let delay = self.config.retry_delay(self.retry_attempt);
        self.retry_attempt = self.retry_attempt.saturating_add(1);
        if self.push_at.is_none() {
            self.push_at = Some(Instant::now() + delay);
        }
        delay
    }

    fn cancel_pending_push(&mut self) {
        self.push_at = None;
        self.retry_attempt = 0;
    }

    fn is_still_active(&self, subject_id: &str) -> bool {
        self.session
            .current()
            .is_some_and(|identity| identity.subject_id == subject_id)
    }

    fn current_valid(&self) -> Option<Identity> {
        let now = (self.clock)().div_euclid(1_000);
        self.session.current_valid_at(now)
    }

    fn next_sequence(&mut self) -> i64 {
        self.last_sequence = (self.clock)().max(self.last_sequence + 1);
        self.last_sequence
    }

    fn expiry_deadline(&self) -> Option<Instant> {
        let identity = self.active.as_ref()?;
        let remaining = identity
            .expires_at
            .saturating_mul(1_000)
            .saturating_sub((self.clock)());
        let remaining = u64::try_from(remaining).unwrap_or(0);
        Some(Instant::now() + Duration::from_millis(remaining))
    }

    fn publish(&self, state: SyncState) {
        self.status.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            *current = state;
            true
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PullMode {
    /// The server list replaces local favorites
    Replace,
    /// Local-only entries are kept after the server list
    Merge,
}

fn millis(delay: Duration) -> u64 {
    u64::try_from(delay.as_millis()).unwrap_or(u64::MAX)
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
