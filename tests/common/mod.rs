#![allow(dead_code)]

use axum::http::StatusCode;
use pricedrop::api;
use pricedrop::config::Config;
use pricedrop::db::init_db;
use pricedrop::{Decimal, ListingStore, ManualClock, Repository, TimeMs};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt;

pub const T0: i64 = 1_700_000_000_000;
pub use pricedrop::domain::HOUR_MS;

pub struct TestApp {
    pub app: axum::Router,
    pub state: api::AppState,
    pub repo: Arc<Repository>,
    pub clock: Arc<ManualClock>,
    _temp: TempDir,
}

pub async fn setup_test_app() -> TestApp {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir
        .path()
        .join("test.db")
        .to_string_lossy()
        .to_string();
    let pool = init_db(&db_path).await.expect("init_db failed");
    let repo = Arc::new(Repository::new(pool));
    let clock = Arc::new(ManualClock::new(TimeMs::new(T0)));

    let config = Config {
        port: 0,
        database_path: db_path,
        default_decay_rate_per_hour: Decimal::one(),
        purchase_lock_timeout: Duration::from_secs(10),
    };

    let store: Arc<dyn ListingStore> = repo.clone();
    let state = api::AppState::new(store, clock.clone(), &config);
    let app = api::create_router(state.clone());

    TestApp {
        app,
        state,
        repo,
        clock,
        _temp: temp_dir,
    }
}

pub async fn request(
    app: axum::Router,
    method: &str,
    uri: &str,
    body: Option<serde_json::Value>,
) -> (StatusCode, serde_json::Value) {
    let builder = axum::http::Request::builder().method(method).uri(uri);
    let req = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(axum::body::Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(axum::body::Body::empty()).unwrap(),
    };

    let resp = app.oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        serde_json::Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

pub fn listing_body(seller: &str, title: &str, start: &str, min: &str) -> serde_json::Value {
    serde_json::json!({
        "sellerId": seller,
        "title": title,
        "description": "Gently used, works perfectly",
        "category": "electronics",
        "startPrice": start,
        "minPrice": min,
    })
}

/// Create a listing over HTTP and return its id.
pub async fn create_listing(app: &TestApp, seller: &str, start: &str, min: &str) -> i64 {
    let (status, json) = request(
        app.app.clone(),
        "POST",
        "/v1/listings",
        Some(listing_body(seller, "Headphones", start, min)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "create failed: {}", json);
    json["id"].as_i64().unwrap()
}
