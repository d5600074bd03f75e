use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::{get, put};
use axum::{Json, Router};
use chrono::Utc;
use reel_core::service::FavoritesDocument;
use reel_core::util::subject_fingerprint;
use serde::Serialize;
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::db::{Database, DbResult, FavoritesRepository, SqliteFavoritesRepository, WriteOutcome};
use crate::error::AppError;
use crate::rate_limit::{EndpointRateLimiter, ProtectedEndpoint, RateLimitMetricsSnapshot};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    db: Arc<Mutex<Database>>,
    endpoint_rate_limiter: Arc<EndpointRateLimiter>,
}

impl AppState {
    pub fn from_config(config: Arc<AppConfig>) -> DbResult<Self> {
        let db = Database::open(&config.database_path)?;
        Ok(Self::with_database(config, db))
    }

    pub fn with_database(config: Arc<AppConfig>, db: Database) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            endpoint_rate_limiter: Arc::new(EndpointRateLimiter::from_config(config.as_ref())),
            config,
        }
    }
}

pub fn app_router(state: AppState) -> Router {
    let favorites_routes = Router::new()
        .route("/favorites", put(replace_favorites))
        .route("/favorites/{subject_id}", get(get_favorites));

    Router::new()
        .route("/healthz", get(healthz))
        .nest("/v1", favorites_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_headers(Any)
                .allow_methods(Any),
        )
        .with_state(state)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp: i64,
    rate_limit: RateLimitMetricsSnapshot,
}

async fn healthz(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        timestamp: Utc::now().timestamp(),
        rate_limit: state.endpoint_rate_limiter.metrics_snapshot(),
    })
}

async fn get_favorites(
    State(state): State<AppState>,
    Path(subject_id): Path<String>,
) -> Result<Json<FavoritesDocument>, AppError> {
    let subject_id = validate_subject_id(&subject_id)?;
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::FavoritesRead, &subject_id)
        .await?;

    let stored = {
        let db = state.db.lock().await;
        SqliteFavoritesRepository::new(db.connection()).get(&subject_id)?
    };

    let user_hash = subject_fingerprint(&subject_id);
    let document = match stored {
        Some(stored) => {
            tracing::info!(
                endpoint = "favorites_read",
                user = user_hash,
                count = stored.favorites.len(),
                sequence = stored.sequence,
                "Served favorites"
            );
            FavoritesDocument {
                subject_id,
                favorites: stored.favorites,
                writer: stored.writer,
                sequence: stored.sequence,
            }
        }
        None => {
            tracing::info!(
                endpoint = "favorites_read",
                user = user_hash,
                "No favorites stored yet"
            );
            FavoritesDocument {
                subject_id,
                favorites: reel_core::Favorites::new(),
                writer: None,
                sequence: None,
            }
        }
    };
    Ok(Json(document))
}

#[derive(Debug, Serialize)]
struct ReplaceResponse {
    #[serde(rename = "_id")]
    subject_id: String,
    sequence: Option<i64>,
}

async fn replace_favorites(
    State(state): State<AppState>,
    payload: Result<Json<FavoritesDocument>, JsonRejection>,
) -> Result<Json<ReplaceResponse>, AppError> {
    let Json(document) = payload.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let subject_id = validate_subject_id(&document.subject_id)?;
    state
        .endpoint_rate_limiter
        .check(ProtectedEndpoint::FavoritesWrite, &subject_id)
        .await?;

    let max_entries = state.config.favorites_max_entries;
    if document.favorites.len() > max_entries {
        return Err(AppError::bad_request(format!(
            "favorites must contain at most {max_entries} entries"
        )));
    }

    let writer = document
        .writer
        .as_deref()
        .map(str::trim)
        .filter(|writer| !writer.is_empty());
    let outcome = {
        let db = state.db.lock().await;
        SqliteFavoritesRepository::new(db.connection()).replace(
            &subject_id,
            &document.favorites,
            writer,
            document.sequence,
        )?
    };

    let user_hash = subject_fingerprint(&subject_id);
    match outcome {
        WriteOutcome::Applied { sequence } => {
            tracing::info!(
                endpoint = "favorites_write",
                user = user_hash,
                count = document.favorites.len(),
                sequence,
                "Stored favorites"
            );
            Ok(Json(ReplaceResponse {
                subject_id,
                sequence,
            }))
        }
        WriteOutcome::Stale { stored } => {
            tracing::warn!(
                endpoint = "favorites_write",
                user = user_hash,
                incoming = document.sequence,
                stored,
                "Refused stale favorites write"
            );
            Err(AppError::conflict(format!(
                "sequence is not newer than the stored sequence {stored}"
            )))
        }
    }
}

fn validate_subject_id(raw: &str) -> Result<String, AppError> {
    let subject_id = raw.trim();
    if subject_id.is_empty() {
        return Err(AppError::bad_request("_id must not be empty"));
    }
    Ok(subject_id.to_string())
}
