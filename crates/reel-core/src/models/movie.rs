//! Movie identifier model

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// An opaque movie identifier from the catalog.
///
/// The catalog hands out both string and integer ids; integers are kept as
/// their decimal string so the two forms compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct MovieId(String);

impl MovieId {
    /// Create a movie id, rejecting blank values
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("movie id cannot be empty".to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MovieId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for MovieId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::new(s)
    }
}

impl From<u64> for MovieId {
    fn from(value: u64) -> Self {
        Self(value.to_string())
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawMovieId {
    Text(String),
    Integer(i64),
}

impl<'de> Deserialize<'de> for MovieId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        match RawMovieId::deserialize(deserializer)? {
            RawMovieId::Text(text) => Self::new(text).map_err(serde::de::Error::custom),
            RawMovieId::Integer(number) => Ok(Self(number.to_string())),
        }
    }
}
