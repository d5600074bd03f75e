//! Remote favorites service boundary.

mod http;
#[cfg(test)]
pub(crate) mod mock;

use std::future::Future;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Favorites;

pub use http::HttpFavoritesClient;

/// Favorites of one subject as stored by the service.
///
/// Used both as the fetch response and as the replace request body.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FavoritesDocument {
    #[serde(rename = "_id")]
    pub subject_id: String,
    #[serde(default)]
    pub favorites: Favorites,
    /// Client that issued `sequence`; sequences only compare within one writer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub writer: Option<String>,
    /// Push sequence; the service refuses writes from the same writer that are
    /// not newer than the stored one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("Invalid favorites service configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Favorites request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Favorites service error: {message} ({status})")]
    Server { status: u16, message: String },
    #[error("Favorites write was superseded by a newer write")]
    Stale,
    #[error("Invalid favorites payload: {0}")]
    InvalidPayload(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

/// Remote store of favorites, keyed by subject id.
pub trait FavoritesService: Send + Sync + 'static {
    fn fetch(&self, subject_id: &str) -> impl Future<Output = ServiceResult<Favorites>> + Send;

    fn replace(
        &self,
        document: &FavoritesDocument,
    ) -> impl Future<Output = ServiceResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MovieId;

    #[test]
    fn document_uses_service_field_names() {
        let document = FavoritesDocument {
            subject_id: "user-1".to_string(),
            favorites: vec![MovieId::new("m1").unwrap()].into(),
            writer: Some("device-a".to_string()),
            sequence: Some(7),
        };
        let value = serde_json::to_value(&document).unwrap();
        assert_eq!(value["_id"], "user-1");
        assert_eq!(value["favorites"][0], "m1");
        assert_eq!(value["writer"], "device-a");
        assert_eq!(value["sequence"], 7);
    }

    #[test]
    fn document_without_favorites_or_sequence_parses() {
        let document: FavoritesDocument =
            serde_json::from_str(r#"{"_id":"user-1","favorites":null}"#).unwrap();
        assert!(document.favorites.is_empty());
        assert_eq!(document.writer, None);
        assert_eq!(document.sequence, None);
    }
}
