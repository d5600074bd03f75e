//! Ordered favorites collection

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::MovieId;

/// Ordered set of favorite movies.
///
/// Insertion order is the display order. A movie appears at most once; the
/// first occurrence wins when building from a sequence with duplicates.
#[derive(Debug, Clone, Default)]
pub struct Favorites {
    entries: Vec<MovieId>,
    members: HashSet<MovieId>,
}

impl Favorites {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `id` to the end. Returns `false` if it was already present.
    pub fn insert(&mut self, id: MovieId) -> bool {
        if !self.members.insert(id.clone()) {
            return false;
        }
        self.entries.push(id);
        true
    }

    /// Remove `id`. Returns `false` if it was not present.
    pub fn remove(&mut self, id: &MovieId) -> bool {
        if !self.members.remove(id) {
            return false;
        }
        self.entries.retain(|entry| entry != id);
        true
    }

    #[must_use]
    pub fn contains(&self, id: &MovieId) -> bool {
        self.members.contains(id)
    }

    #[must_use]
    pub fn position(&self, id: &MovieId) -> Option<usize> {
        self.entries.iter().position(|entry| entry == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, MovieId> {
        self.entries.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[MovieId] {
        &self.entries
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<MovieId> {
        self.entries
    }

    /// Whether `other` holds exactly the same movies, ignoring order.
    #[must_use]
    pub fn same_members(&self, other: &Self) -> bool {
        self.members == other.members
    }
}

impl PartialEq for Favorites {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

impl Eq for Favorites {}

impl FromIterator<MovieId> for Favorites {
    fn from_iter<I: IntoIterator<Item = MovieId>>(iter: I) -> Self {
        let mut favorites = Self::new();
        for id in iter {
            favorites.insert(id);
        }
        favorites
    }
}

impl From<Vec<MovieId>> for Favorites {
    fn from(entries: Vec<MovieId>) -> Self {
        entries.into_iter().collect()
    }
}

impl<'a> IntoIterator for &'a Favorites {
    type Item = &'a MovieId;
    type IntoIter = std::slice::Iter<'a, MovieId>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

impl Serialize for Favorites {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.entries.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Favorites {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The original service stored `null` for users without favorites.
        let entries = Option::<Vec<MovieId>>::deserialize(deserializer)?;
        Ok(entries.unwrap_or_default().into())
    }
}
