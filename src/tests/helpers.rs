use std::{sync::Once, time::Duration};

use axum::{
    Router,
    body::Body,
    http::{HeaderMap, HeaderValue, Request, StatusCode, header::AUTHORIZATION},
};
use serde_json::{Value, json};
use tower::ServiceExt;
use tracing::{Level, info};
use tracing_subscriber::fmt::format::FmtSpan;

use crate::{
    AppState,
    config::{Config, StoreBackend},
    create_router,
    db::Stores,
};

static INIT: Once = Once::new();

/// Initialize logging exactly once
pub fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_test_writer()
            .with_target(false)
            .with_thread_ids(true)
            .with_level(true)
            .with_file(true)
            .with_line_number(true)
            .with_max_level(Level::ERROR)
            .with_span_events(FmtSpan::NONE)
            .init();
    });
}

pub fn test_config() -> Config {
    Config {
        database_url: "sqlite::memory:".to_string(),
        bind_addr: ([127, 0, 0, 1], 0).into(),
        access_token_secret: "test-access-secret".to_string(),
        refresh_token_secret: "test-refresh-secret".to_string(),
        store_backend: StoreBackend::Memory,
        store_timeout: Duration::from_secs(10),
        bcrypt_cost: 4,
    }
}

pub fn create_test_state() -> AppState {
    init_tracing();
    AppState::new(test_config(), Stores::in_memory()).expect("Failed to build test state")
}

pub fn create_test_app(state: AppState) -> Router {
    info!("Creating test application");
    create_router(state)
}

pub fn bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        AUTHORIZATION,
        HeaderValue::from_str(&format!("Bearer {}", token)).unwrap(),
    );
    headers
}

pub async fn test_request(
    app: Router,
    method: &str,
    uri: &str,
    body: Option<Value>,
    headers: Option<HeaderMap>,
) -> (StatusCode, String, HeaderMap) {
    info!(method = %method, uri = %uri, "Making test request");

    let body = if let Some(json) = body {
        Body::from(serde_json::to_string(&json).unwrap())
    } else {
        Body::empty()
    };

    let mut request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json");

    if let Some(custom_headers) = headers {
        for (key, value) in custom_headers.iter() {
            request = request.header(key, value);
        }
    }

    let request = request.body(body).unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let headers = response.headers().clone();
    let body = String::from_utf8(
        axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap()
            .to_vec(),
    )
    .unwrap();

    info!(status = %status, body = %body, "Test response received");
    (status, body, headers)
}

/// A registered user as seen by a client.
pub struct TestUser {
    pub id: String,
    pub access_token: String,
    pub refresh_token: String,
}

pub async fn register_user(app: &Router, username: &str) -> TestUser {
    let (status, body, _) = test_request(
        app.clone(),
        "POST",
        "/api/register",
        Some(json!({ "username": username, "password": "password123" })),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);

    let response: Value = serde_json::from_str(&body).unwrap();
    TestUser {
        id: response["user"]["id"].as_str().unwrap().to_string(),
        access_token: response["token"]["accessToken"].as_str().unwrap().to_string(),
        refresh_token: response["token"]["refreshToken"].as_str().unwrap().to_string(),
    }
}
