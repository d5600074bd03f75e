//! In-memory favorites store with optimistic mutations.
//!
//! Local mutations apply immediately and set the dirty flag; the sync
//! scheduler observes the store through [`FavoritesStore::subscribe`] and
//! clears the flag once the remote copy matches.

mod reorder;

use std::sync::Arc;

use tokio::sync::watch;

use crate::error::{Error, Result};
use crate::models::{Favorites, MovieId};

pub use reorder::{move_entry, DragState, ReorderEngine};

/// Point-in-time view of the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FavoritesSnapshot {
    pub favorites: Favorites,
    /// Local state not yet confirmed persisted
    pub dirty: bool,
    /// Bumped by every change, local or remote
    pub revision: u64,
}

/// Shared handle to the favorites of the current session.
#[derive(Clone)]
pub struct FavoritesStore {
    state: Arc<watch::Sender<FavoritesSnapshot>>,
}

impl Default for FavoritesStore {
    fn default() -> Self {
        Self::new()
    }
}

impl FavoritesStore {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Arc::new(watch::Sender::new(FavoritesSnapshot::default())),
        }
    }

    #[must_use]
    pub fn snapshot(&self) -> FavoritesSnapshot {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn favorites(&self) -> Favorites {
        self.state.borrow().favorites.clone()
    }

    #[must_use]
    pub fn contains(&self, id: &MovieId) -> bool {
        self.state.borrow().favorites.contains(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.state.borrow().favorites.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.state.borrow().favorites.is_empty()
    }

    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.state.borrow().dirty
    }

    #[must_use]
    pub fn revision(&self) -> u64 {
        self.state.borrow().revision
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<FavoritesSnapshot> {
        self.state.subscribe()
    }

    /// Append `id`. A movie already in favorites is left where it is.
    pub fn add(&self, id: MovieId) -> bool {
        self.state.send_if_modified(|state| {
            if !state.favorites.insert(id) {
                return false;
            }
            state.mark_local_change();
            true
        })
    }

    /// Remove `id`. Removing a movie that is not a favorite changes nothing.
    pub fn remove(&self, id: &MovieId) -> bool {
        self.state.send_if_modified(|state| {
            if !state.favorites.remove(id) {
                return false;
            }
            state.mark_local_change();
            true
        })
    }

    /// Replace the order with `new_order`, a permutation of the current entries.
    pub fn reorder(&self, new_order: Vec<MovieId>) -> Result<()> {
        let mut outcome = Ok(());
        self.state.send_if_modified(|state| {
            let reordered = Favorites::from(new_order);
            if let Err(error) = validate_permutation(&state.favorites, &reordered) {
                outcome = Err(error);
                return false;
            }
            if reordered == state.favorites {
                return false;
            }
            state.favorites = reordered;
            state.mark_local_change();
            true
        });
        outcome
    }

    /// Install the server's list verbatim. The result is clean.
    pub fn replace_all(&self, favorites: Favorites) {
        self.state.send_modify(|state| {
            state.favorites = favorites;
            state.dirty = false;
            state.revision += 1;
        });
    }

    /// Combine the server's list with local entries it does not know about.
    ///
    /// Remote order comes first, then local-only movies in local order. The
    /// store is left dirty when the result differs from the remote list.
    pub fn merge_remote(&self, remote: Favorites) -> bool {
        let mut dirty = false;
        self.state.send_modify(|state| {
            let mut merged = remote.clone();
            for id in &state.favorites {
                merged.insert(id.clone());
            }
            dirty = merged != remote;
            state.favorites = merged;
            state.dirty = dirty;
            state.revision += 1;
        });
        dirty
    }

    /// Discard everything, e.g. when the session ends.
    pub fn clear(&self) {
        self.state.send_if_modified(|state| {
            if state.favorites.is_empty() && !state.dirty {
                return false;
            }
            state.favorites = Favorites::new();
            state.dirty = false;
            state.revision += 1;
            true
        });
    }

    /// Clear the dirty flag if nothing changed since `revision` was pushed.
    pub(crate) fn mark_synced(&self, revision: u64) -> bool {
        self.state.send_if_modified(|state| {
            if state.revision != revision || !state.dirty {
                return false;
            }
            state.dirty = false;
            true
        })
    }
}

impl FavoritesSnapshot {
    fn mark_local_change(&mut self) {
        self.dirty = true;
        self.revision += 1;
    }
}

fn validate_permutation(current: &Favorites, reordered: &Favorites) -> Result<()> {
    if reordered.len() != current.len() || !reordered.same_members(current) {
        return Err(Error::InvalidReorder(format!(
            "expected a permutation of the {} current favorites",
            current.len()
        )));
    }
    Ok(())
}
