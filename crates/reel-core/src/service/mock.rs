//! Scriptable in-process favorites service for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::{FavoritesDocument, FavoritesService, ServiceError, ServiceResult};
use crate::models::{Favorites, MovieId};

#[derive(Default)]
pub struct MockFavoritesService {
    remote: Mutex<HashMap<String, Favorites>>,
    pub fetch_calls: AtomicUsize,
    pub replace_calls: AtomicUsize,
    replace_failures: AtomicUsize,
    fetch_fails: AtomicBool,
    next_replace_stale: AtomicBool,
    fetch_delay: Mutex<Option<Duration>>,
    replace_delay: Mutex<Option<Duration>>,
    last_sequence: Mutex<Option<i64>>,
    last_writer: Mutex<Option<String>>,
}

impl MockFavoritesService {
    pub fn with_remote(subject_id: &str, values: &[&str]) -> Self {
        let service = Self::default();
        service.set_remote(subject_id, values);
        service
    }

    pub fn set_remote(&self, subject_id: &str, values: &[&str]) {
        let favorites = values
            .iter()
            .map(|value| MovieId::new(*value).unwrap())
            .collect();
        self.remote
            .lock()
            .unwrap()
            .insert(subject_id.to_string(), favorites);
    }

    pub fn remote(&self, subject_id: &str) -> Vec<String> {
        self.remote
            .lock()
            .unwrap()
            .get(subject_id)
            .map(|favorites| favorites.iter().map(ToString::to_string).collect())
            .unwrap_or_default()
    }

    pub fn fail_next_replaces(&self, count: usize) {
        self.replace_failures.store(count, Ordering::SeqCst);
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.fetch_fails.store(fail, Ordering::SeqCst);
    }

    pub fn reject_next_replace_as_stale(&self) {
        self.next_replace_stale.store(true, Ordering::SeqCst);
    }

    pub fn delay_fetches(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = Some(delay);
    }

    pub fn delay_replaces(&self, delay: Duration) {
        *self.replace_delay.lock().unwrap() = Some(delay);
    }

    pub fn fetches(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn replaces(&self) -> usize {
        self.replace_calls.load(Ordering::SeqCst)
    }

    pub fn last_sequence(&self) -> Option<i64> {
        *self.last_sequence.lock().unwrap()
    }

    pub fn last_writer(&self) -> Option<String> {
        self.last_writer.lock().unwrap().clone()
    }
}

impl FavoritesService for MockFavoritesService {
    async fn fetch(&self, subject_id: &str) -> ServiceResult<Favorites> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.fetch_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fetch_fails.load(Ordering::SeqCst) {
            return Err(ServiceError::Server {
                status: 503,
                message: "unavailable".to_string(),
            });
        }
        Ok(self
            .remote
            .lock()
            .unwrap()
            .get(subject_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn replace(&self, document: &FavoritesDocument) -> ServiceResult<()> {
        self.replace_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.replace_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.next_replace_stale.swap(false, Ordering::SeqCst) {
            return Err(ServiceError::Stale);
        }
        let should_fail = self
            .replace_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                left.checked_sub(1)
            })
            .is_ok();
        if should_fail {
            return Err(ServiceError::Server {
                status: 500,
                message: "boom".to_string(),
            });
        }
        *self.last_sequence.lock().unwrap() = document.sequence;
        self.last_writer.lock().unwrap().clone_from(&document.writer);
        self.remote
            .lock()
            .unwrap()
            .insert(document.subject_id.clone(), document.favorites.clone());
        Ok(())
    }
}
