//! HTTP client for the favorites service.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::{FavoritesDocument, FavoritesService, ServiceError, ServiceResult};
use crate::models::Favorites;
use crate::util::{compact_text, is_http_url, normalize_text_option};

const HTTP_TIMEOUT_SECS: u64 = 10;

#[derive(Clone)]
pub struct HttpFavoritesClient {
    base_url: Url,
    client: reqwest::Client,
}

impl HttpFavoritesClient {
    pub fn new(base_url: impl Into<String>) -> ServiceResult<Self> {
        let base_url = normalize_base_url(base_url.into())?;
        Ok(Self {
            base_url,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
                .build()?,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> ServiceResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|()| {
                ServiceError::InvalidConfiguration("base URL cannot carry a path".to_string())
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }
}

impl FavoritesService for HttpFavoritesClient {
    async fn fetch(&self, subject_id: &str) -> ServiceResult<Favorites> {
        let url = self.endpoint(&["v1", "favorites", subject_id])?;
        let response = self
            .client
            .get(url)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Favorites::new());
        }
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ServiceError::Server {
                status: status.as_u16(),
                message: parse_api_error(&body),
            });
        }

        let document = response.json::<FavoritesDocument>().await?;
        if document.subject_id != subject_id {
            return Err(ServiceError::InvalidPayload(
                "response belongs to a different subject".to_string(),
            ));
        }
        Ok(document.favorites)
    }

    async fn replace(&self, document: &FavoritesDocument) -> ServiceResult<()> {
        let url = self.endpoint(&["v1", "favorites"])?;
        let response = self.client.put(url).json(document).send().await?;

        match response.status() {
            status if status.is_success() => Ok(()),
            StatusCode::CONFLICT => Err(ServiceError::Stale),
            status => {
                let body = response.text().await.unwrap_or_default();
                Err(ServiceError::Server {
                    status: status.as_u16(),
                    message: parse_api_error(&body),
                })
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<String>,
    message: Option<String>,
}

fn parse_api_error(body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ApiErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return compact_text(&message);
        }
    }

    let trimmed = compact_text(body);
    if trimmed.is_empty() {
        "empty response body".to_string()
    } else {
        trimmed
    }
}

fn normalize_base_url(raw: String) -> ServiceResult<Url> {
    let base_url = normalize_text_option(Some(raw)).ok_or_else(|| {
        ServiceError::InvalidConfiguration("base URL must not be empty".to_string())
    })?;
    if !is_http_url(&base_url) {
        return Err(ServiceError::InvalidConfiguration(
            "base URL must include http:// or https://".to_string(),
        ));
    }
    Url::parse(base_url.trim_end_matches('/'))
        .map_err(|error| ServiceError::InvalidConfiguration(error.to_string()))
}
