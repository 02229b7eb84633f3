//! Shared utilities for integration testing.

#![allow(dead_code)]

use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::net::TcpListener;

use resilient_client::ClientConfig;

/// Knobs and counters of a running mock backend.
pub struct MockState {
    pub healthy: AtomicBool,
    pub access_token: Mutex<String>,
    pub refresh_token: Mutex<String>,
    pub health_calls: AtomicUsize,
    pub refresh_calls: AtomicUsize,
    /// Delay before `/auth/refresh` answers.
    pub refresh_delay_ms: AtomicU64,
    /// `Authorization` header of every `/profile` call, in order.
    pub seen_auth: Mutex<Vec<Option<String>>>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            healthy: AtomicBool::new(true),
            access_token: Mutex::new("access-1".to_string()),
            refresh_token: Mutex::new("refresh-1".to_string()),
            health_calls: AtomicUsize::new(0),
            refresh_calls: AtomicUsize::new(0),
            refresh_delay_ms: AtomicU64::new(0),
            seen_auth: Mutex::new(Vec::new()),
        }
    }
}

pub struct MockBackend {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn base_url(&self) -> String {
        format!("http://{}/api", self.addr)
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn health_calls(&self) -> usize {
        self.state.health_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.state.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn set_refresh_delay(&self, delay: Duration) {
        self.state
            .refresh_delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn seen_auth(&self) -> Vec<Option<String>> {
        self.state.seen_auth.lock().unwrap().clone()
    }
}

/// Start a mock API on an ephemeral loopback port.
///
/// Routes (all under `/api`):
/// - `GET /health`: `{"status":"ok"}` or 503 when unhealthy
/// - `POST /auth/refresh`: rotates tokens when the refresh token matches,
///   after an optional delay
/// - `GET /profile`: 200 only for the current access token
/// - `GET /always-401`: rejects every token
/// - `GET /courses/missing`: 404 with a server message
/// - `GET /echo`: reflects query, `Authorization` and `x-request-id`
/// - `GET /slow`: answers after three seconds
pub async fn start_mock_backend() -> MockBackend {
    let state = Arc::new(MockState::default());

    let app = Router::new()
        .route("/api/health", get(health))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/profile", get(profile))
        .route("/api/always-401", get(always_unauthorized))
        .route("/api/courses/missing", get(missing))
        .route("/api/echo", get(echo))
        .route("/api/slow", get(slow))
        .with_state(state.clone());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    MockBackend { addr, state }
}

/// A loopback base URL nothing is listening on.
pub fn dead_url() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    format!("http://127.0.0.1:{}/api", port)
}

/// Config that scans only `127.0.0.1` on the given ports.
pub fn loopback_config(ports: Vec<u16>, fallback_url: String) -> ClientConfig {
    let mut config = ClientConfig::default();
    config.discovery.network_prefix = Some("127.0.0".to_string());
    config.discovery.host_suffixes = vec![1];
    config.discovery.ports = ports;
    config.discovery.batch_pause_ms = 0;
    config.discovery.fallback_url = fallback_url;
    config.probe.timeout_ms = 500;
    config.observability.metrics_enabled = false;
    config
}

/// Poll `condition` until it holds or `limit` elapses.
pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    condition()
}

async fn health(State(state): State<Arc<MockState>>) -> (StatusCode, Json<Value>) {
    state.health_calls.fetch_add(1, Ordering::SeqCst);
    if state.healthy.load(Ordering::SeqCst) {
        (StatusCode::OK, Json(json!({ "status": "ok" })))
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, Json(json!({ "status": "down" })))
    }
}

async fn refresh(
    State(state): State<Arc<MockState>>,
    Json(body): Json<Value>,
) -> (StatusCode, Json<Value>) {
    let calls = state.refresh_calls.fetch_add(1, Ordering::SeqCst) + 1;
    let delay = state.refresh_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
        tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    let presented = body
        .get("refreshToken")
        .and_then(Value::as_str)
        .unwrap_or_default();

    let mut refresh = state.refresh_token.lock().unwrap();
    if presented != *refresh {
        return (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Invalid refresh token" })),
        );
    }

    let access = format!("access-{}", calls + 1);
    *refresh = format!("refresh-{}", calls + 1);
    *state.access_token.lock().unwrap() = access.clone();

    (
        StatusCode::OK,
        Json(json!({
            "success": true,
            "data": { "accessToken": access, "refreshToken": refresh.clone() }
        })),
    )
}

async fn profile(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
) -> (StatusCode, Json<Value>) {
    let auth = authorization(&headers);
    state.seen_auth.lock().unwrap().push(auth.clone());

    let expected = format!("Bearer {}", state.access_token.lock().unwrap());
    if auth.as_deref() == Some(expected.as_str()) {
        (StatusCode::OK, Json(json!({ "name": "Ada" })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "message": "Token expired" })),
        )
    }
}

async fn always_unauthorized() -> (StatusCode, Json<Value>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(json!({ "message": "Token expired" })),
    )
}

async fn missing() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "message": "Course not found" })),
    )
}

async fn echo(
    Query(query): Query<HashMap<String, String>>,
    headers: HeaderMap,
) -> Json<Value> {
    let request_id = headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    Json(json!({
        "query": query,
        "authorization": authorization(&headers),
        "requestId": request_id,
    }))
}

async fn slow() -> Json<Value> {
    tokio::time::sleep(Duration::from_secs(3)).await;
    Json(json!({ "late": true }))
}

fn authorization(headers: &HeaderMap) -> Option<String> {
    headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}
