use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use reel_api::db::Database;
use reel_api::{app_router, AppConfig, AppState};
use reel_core::service::{FavoritesDocument, FavoritesService, HttpFavoritesClient, ServiceError};
use reel_core::session::MemorySessionStore;
use reel_core::sync::SyncHandle;
use reel_core::util::{unix_timestamp_millis, unix_timestamp_now};
use reel_core::{FavoritesStore, Identity, MovieId, SessionManager, SyncConfig, SyncScheduler};
use serde_json::{json, Value};

fn config(overrides: &[(&str, &str)]) -> AppConfig {
    let map: HashMap<&str, &str> = overrides.iter().copied().collect();
    AppConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string())).unwrap()
}

async fn spawn_server(config: AppConfig) -> String {
    let state = AppState::with_database(Arc::new(config), Database::open_in_memory().unwrap());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app_router(state)).await.unwrap();
    });
    format!("http://{addr}")
}

fn ids(values: &[&str]) -> Vec<MovieId> {
    values.iter().map(|value| MovieId::new(*value).unwrap()).collect()
}

fn document(subject_id: &str, values: &[&str], sequence: Option<i64>) -> FavoritesDocument {
    FavoritesDocument {
        subject_id: subject_id.to_string(),
        favorites: ids(values).into(),
        writer: None,
        sequence,
    }
}

fn spawn_scheduler(
    base_url: String,
) -> (SessionManager<MemorySessionStore>, FavoritesStore, SyncHandle) {
    let session = SessionManager::new(MemorySessionStore::default());
    let store = FavoritesStore::new();
    let handle = SyncScheduler::new(
        session.clone(),
        store.clone(),
        Arc::new(HttpFavoritesClient::new(base_url).unwrap()),
        SyncConfig {
            push_debounce: Duration::from_millis(20),
            ..SyncConfig::default()
        },
    )
    .spawn();
    (session, store, handle)
}

#[tokio::test]
async fn unknown_subject_has_no_favorites() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url).unwrap();

    let favorites = client.fetch("nobody").await.unwrap();
    assert!(favorites.is_empty());
}

#[tokio::test]
async fn replace_then_fetch_round_trips_order() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url.clone()).unwrap();

    client
        .replace(&document("user-1", &["m3", "m1", "m2"], Some(1)))
        .await
        .unwrap();

    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["m3", "m1", "m2"]));

    let raw: Value = reqwest::get(format!("{base_url}/v1/favorites/user-1"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(raw["_id"], "user-1");
    assert_eq!(raw["sequence"], 1);
}

#[tokio::test]
async fn duplicate_and_numeric_ids_are_normalized() {
    let base_url = spawn_server(config(&[])).await;
    let http = reqwest::Client::new();

    let response = http
        .put(format!("{base_url}/v1/favorites"))
        .json(&json!({ "_id": "user-1", "favorites": [550, "m1", "550", "m1"] }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let client = HttpFavoritesClient::new(base_url).unwrap();
    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["550", "m1"]));
}

#[tokio::test]
async fn stale_sequence_is_refused() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url).unwrap();

    client
        .replace(&document("user-1", &["newer"], Some(200)))
        .await
        .unwrap();
    let err = client
        .replace(&document("user-1", &["older"], Some(100)))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Stale));

    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["newer"]));
}

#[tokio::test]
async fn invalid_bodies_are_rejected_with_json_errors() {
    let base_url = spawn_server(config(&[("FAVORITES_MAX_ENTRIES", "2")])).await;
    let http = reqwest::Client::new();
    let url = format!("{base_url}/v1/favorites");

    for body in [
        json!({ "favorites": ["m1"] }),
        json!({ "_id": "  ", "favorites": ["m1"] }),
        json!({ "_id": "user-1", "favorites": [""] }),
        json!({ "_id": "user-1", "favorites": ["a", "b", "c"] }),
    ] {
        let response = http.put(&url).json(&body).send().await.unwrap();
        assert_eq!(response.status(), 400, "body {body}");
        let error: Value = response.json().await.unwrap();
        assert!(error["error"].is_string(), "body {body}");
    }
}

#[tokio::test]
async fn writes_are_rate_limited_per_subject() {
    let base_url = spawn_server(config(&[("FAVORITES_WRITE_RATE_LIMIT_PER_WINDOW", "2")])).await;
    let client = HttpFavoritesClient::new(base_url.clone()).unwrap();

    client.replace(&document("user-1", &["a"], None)).await.unwrap();
    client.replace(&document("user-1", &["b"], None)).await.unwrap();
    let err = client
        .replace(&document("user-1", &["c"], None))
        .await
        .unwrap_err();
    assert!(matches!(err, ServiceError::Server { status: 429, .. }));

    client.replace(&document("user-2", &["a"], None)).await.unwrap();

    let health: Value = reqwest::get(format!("{base_url}/healthz"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["rate_limit"]["write_allowed"], 3);
    assert_eq!(health["rate_limit"]["write_limited"], 1);
}

#[tokio::test]
async fn sync_scheduler_pushes_to_the_server() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url.clone()).unwrap();
    client
        .replace(&document("user-1", &["remote"], None))
        .await
        .unwrap();

    let (session, store, handle) = spawn_scheduler(base_url);

    session
        .login(Identity::new("user-1", unix_timestamp_now() + 3_600))
        .unwrap();
    wait_for(|| store.contains(&MovieId::new("remote").unwrap())).await;

    store.add(MovieId::new("local").unwrap());
    wait_for(|| !store.is_dirty()).await;

    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["remote", "local"]));
    handle.shutdown().await;
}

#[tokio::test]
async fn device_with_fast_clock_does_not_block_later_writes() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url.clone()).unwrap();
    let mut ahead = document("user-1", &["a"], Some(unix_timestamp_millis() + 600_000));
    ahead.writer = Some("other-device".to_string());
    client.replace(&ahead).await.unwrap();

    let (session, store, handle) = spawn_scheduler(base_url);
    session
        .login(Identity::new("user-1", unix_timestamp_now() + 3_600))
        .unwrap();
    wait_for(|| store.contains(&MovieId::new("a").unwrap())).await;

    store.add(MovieId::new("b").unwrap());
    wait_for(|| !store.is_dirty()).await;

    assert_eq!(store.favorites().into_vec(), ids(&["a", "b"]));
    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["a", "b"]));
    handle.shutdown().await;
}

#[tokio::test]
async fn stale_sequence_from_another_writer_is_applied() {
    let base_url = spawn_server(config(&[])).await;
    let client = HttpFavoritesClient::new(base_url).unwrap();

    let mut first = document("user-1", &["first"], Some(200));
    first.writer = Some("device-a".to_string());
    client.replace(&first).await.unwrap();

    let mut second = document("user-1", &["second"], Some(100));
    second.writer = Some("device-b".to_string());
    client.replace(&second).await.unwrap();

    second.sequence = Some(50);
    let err = client.replace(&second).await.unwrap_err();
    assert!(matches!(err, ServiceError::Stale));

    let favorites = client.fetch("user-1").await.unwrap();
    assert_eq!(favorites.into_vec(), ids(&["second"]));
}

async fn wait_for(condition: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}
