//! Authenticated identity model

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::util::unix_timestamp_now;

/// The signed-in user, as asserted by the identity provider.
///
/// Persisted as `{ "subjectId", "expiresAt", ...claims }`. The provider's own
/// `sub`/`exp` names are accepted when reading.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(rename = "subjectId", alias = "sub")]
    pub subject_id: String,
    /// Expiry as Unix seconds
    #[serde(rename = "expiresAt", alias = "exp")]
    pub expires_at: i64,
    /// Remaining provider claims, kept verbatim
    #[serde(flatten)]
    pub claims: Map<String, Value>,
}

impl Identity {
    pub fn new(subject_id: impl Into<String>, expires_at: i64) -> Self {
        Self {
            subject_id: subject_id.into(),
            expires_at,
            claims: Map::new(),
        }
    }

    /// Expired once `now` reaches `expires_at`.
    #[must_use]
    pub const fn is_expired_at(&self, now: i64) -> bool {
        now >= self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_timestamp_now())
    }

    /// String claim lookup, e.g. `email` or `aud`.
    #[must_use]
    pub fn claim_str(&self, name: &str) -> Option<&str> {
        self.claims.get(name).and_then(Value::as_str)
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Identity")
            .field("subject_id", &self.subject_id)
            .field("expires_at", &self.expires_at)
            .field("claims", &self.claims.keys().collect::<Vec<_>>())
            .finish()
    }
}
