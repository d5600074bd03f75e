//! Drag-and-drop reordering of favorites.

use super::FavoritesStore;
use crate::error::{Error, Result};

/// Where a drag gesture currently stands.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DragState {
    #[default]
    Idle,
    Dragging {
        source: usize,
    },
}

/// Tracks one drag gesture over the favorites list and applies the drop.
///
/// Out-of-bounds indices are rejected, never clamped. A rejected drop ends the
/// gesture without touching the store.
pub struct ReorderEngine {
    store: FavoritesStore,
    state: DragState,
}

impl ReorderEngine {
    pub const fn new(store: FavoritesStore) -> Self {
        Self {
            store,
            state: DragState::Idle,
        }
    }

    pub const fn state(&self) -> DragState {
        self.state
    }

    /// Pick up the entry at `source`. Starting a new drag replaces the old one.
    pub fn begin_drag(&mut self, source: usize) -> Result<()> {
        let len = self.store.len();
        if source >= len {
            return Err(Error::IndexOutOfBounds { index: source, len });
        }
        self.state = DragState::Dragging { source };
        Ok(())
    }

    /// Drop the dragged entry at `target`.
    ///
    /// Returns whether the order changed.
    pub fn drop_at(&mut self, target: usize) -> Result<bool> {
        let DragState::Dragging { source } = std::mem::take(&mut self.state) else {
            return Err(Error::NotDragging);
        };

        let current = self.store.favorites();
        let reordered = move_entry(current.as_slice(), source, target)?;
        if source == target {
            return Ok(false);
        }

        tracing::debug!(source, target, "Reordering favorites");
        self.store.reorder(reordered)?;
        Ok(true)
    }

    /// Abandon the gesture, e.g. dropped outside the list.
    pub fn cancel(&mut self) -> bool {
        matches!(
            std::mem::take(&mut self.state),
            DragState::Dragging { .. }
        )
    }
}

/// Move the item at `source` to `target`, shifting the items in between.
pub fn move_entry<T: Clone>(items: &[T], source: usize, target: usize) -> Result<Vec<T>> {
    let len = items.len();
    for index in [source, target] {
        if index >= len {
            return Err(Error::IndexOutOfBounds { index, len });
        }
    }

    let mut reordered = items.to_vec();
    let moved = reordered.remove(source);
    reordered.insert(target, moved);
    Ok(reordered)
}
