//! End-to-end request pipeline tests against a mock backend.

mod common;

use common::{dead_url, eventually, loopback_config, start_mock_backend};
use reqwest::Method;
use std::sync::Arc;
use std::time::Duration;

use resilient_client::session::SessionEvent;
use resilient_client::store::{keys, MemoryStore, TokenStore};
use resilient_client::{ClientConfig, ErrorKind, RequestPipeline, RequestSpec};

async fn pipeline(config: &ClientConfig, store: &Arc<MemoryStore>) -> RequestPipeline {
    RequestPipeline::from_config(config, store.clone()).await
}

#[tokio::test]
async fn test_authenticated_request_succeeds() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([(keys::ACCESS_TOKEN, "access-1")]));
    let pipeline = pipeline(&config, &store).await;

    let body = pipeline.get("/profile").await.unwrap();

    assert_eq!(body["name"], "Ada");
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(backend.seen_auth(), vec![Some("Bearer access-1".to_string())]);
    assert_eq!(
        pipeline.discovery().current_base_url(),
        Some(backend.base_url())
    );
    assert_eq!(pipeline.discovery().cached_urls(), vec![backend.base_url()]);
}

#[tokio::test]
async fn test_expired_token_refreshed_transparently() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "stale"),
        (keys::REFRESH_TOKEN, "refresh-1"),
    ]));
    let pipeline = pipeline(&config, &store).await;
    let mut events = pipeline.sessions().subscribe();

    let body = pipeline.get("/profile").await.unwrap();

    assert_eq!(body["name"], "Ada");
    assert_eq!(backend.refresh_calls(), 1);
    assert_eq!(
        backend.seen_auth(),
        vec![
            Some("Bearer stale".to_string()),
            Some("Bearer access-2".to_string()),
        ]
    );
    assert_eq!(
        store.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(),
        Some("access-2")
    );
    assert_eq!(
        store.get(keys::REFRESH_TOKEN).await.unwrap().as_deref(),
        Some("refresh-2")
    );
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
}

#[tokio::test]
async fn test_second_401_expires_session_without_second_refresh() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "stale"),
        (keys::REFRESH_TOKEN, "refresh-1"),
    ]));
    let pipeline = pipeline(&config, &store).await;
    let mut events = pipeline.sessions().subscribe();

    let err = pipeline.get("/always-401").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthSessionExpired);
    assert_eq!(err.code(), "AUTH_SESSION_EXPIRED");
    assert_eq!(backend.refresh_calls(), 1);
    assert!(store.get(keys::ACCESS_TOKEN).await.unwrap().is_none());
    assert!(store.get(keys::REFRESH_TOKEN).await.unwrap().is_none());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Refreshed);
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn test_rejected_refresh_expires_session() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "stale"),
        (keys::REFRESH_TOKEN, "revoked"),
        (keys::LOGIN_METHOD, "email"),
    ]));
    let pipeline = pipeline(&config, &store).await;

    let err = pipeline.get("/profile").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthSessionExpired);
    assert_eq!(backend.refresh_calls(), 1);
    // Only the original request reached /profile.
    assert_eq!(backend.seen_auth().len(), 1);
    for key in keys::SESSION {
        assert!(store.get(key).await.unwrap().is_none(), "{} not cleared", key);
    }
}

#[tokio::test]
async fn test_refresh_without_response_expires_session() {
    let backend = start_mock_backend().await;
    backend.set_refresh_delay(Duration::from_secs(3));
    let mut config = loopback_config(vec![backend.port()], dead_url());
    config.requests.timeout_secs = 1;
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "stale"),
        (keys::REFRESH_TOKEN, "refresh-1"),
    ]));
    let pipeline = pipeline(&config, &store).await;
    let mut events = pipeline.sessions().subscribe();

    let err = pipeline.get("/always-401").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthSessionExpired);
    assert_eq!(backend.refresh_calls(), 1);
    assert!(store.get(keys::ACCESS_TOKEN).await.unwrap().is_none());
    assert!(store.get(keys::REFRESH_TOKEN).await.unwrap().is_none());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);

    // One probe found the backend; re-detection probes it again.
    assert!(eventually(Duration::from_secs(2), || backend.health_calls() >= 2).await);
}

#[tokio::test]
async fn test_401_with_empty_session_expires() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&config, &store).await;
    let mut events = pipeline.sessions().subscribe();

    let err = pipeline.get("/always-401").await.unwrap_err();

    assert_eq!(err.code(), "AUTH_SESSION_EXPIRED");
    assert_eq!(backend.refresh_calls(), 0);
    assert!(!pipeline.sessions().load().await.unwrap().is_authenticated());
    for key in keys::SESSION {
        assert!(store.get(key).await.unwrap().is_none(), "{} not cleared", key);
    }
    assert_eq!(events.try_recv().unwrap(), SessionEvent::Expired);
}

#[tokio::test]
async fn test_repeated_get_is_idempotent() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "access-1"),
        (keys::REFRESH_TOKEN, "refresh-1"),
        (keys::LOGIN_METHOD, "email"),
    ]));
    let pipeline = pipeline(&config, &store).await;
    let before = pipeline.sessions().load().await.unwrap();

    let first = pipeline.get("/profile").await.unwrap();
    let second = pipeline.get("/profile").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(backend.refresh_calls(), 0);
    assert_eq!(pipeline.sessions().load().await.unwrap(), before);
    assert_eq!(pipeline.discovery().cached_urls(), vec![backend.base_url()]);
}

#[tokio::test]
async fn test_401_without_refresh_token_keeps_url_cache() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([(keys::ACCESS_TOKEN, "stale")]));
    let pipeline = pipeline(&config, &store).await;

    let err = pipeline.get("/profile").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::AuthSessionExpired);
    assert_eq!(backend.refresh_calls(), 0);
    assert!(store.get(keys::ACCESS_TOKEN).await.unwrap().is_none());
    assert!(store.get(keys::WORKING_URLS).await.unwrap().is_some());
}

#[tokio::test]
async fn test_http_error_carries_server_message() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([(keys::ACCESS_TOKEN, "access-1")]));
    let pipeline = pipeline(&config, &store).await;

    let err = pipeline.get("/courses/missing").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Http(404));
    assert_eq!(err.code(), "HTTP_404");
    assert_eq!(err.status, Some(404));
    assert_eq!(err.message, "Course not found");
    assert!(!err.is_retryable());
    // Non-auth failures leave the session alone.
    assert_eq!(
        store.get(keys::ACCESS_TOKEN).await.unwrap().as_deref(),
        Some("access-1")
    );
}

#[tokio::test]
async fn test_params_and_request_id_sent() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&config, &store).await;

    let body = pipeline
        .send(Method::GET, "/echo", None, Some(&[("page", "2")]))
        .await
        .unwrap();

    assert_eq!(body["query"]["page"], "2");
    assert!(body["authorization"].is_null());
    let request_id = body["requestId"].as_str().unwrap();
    assert_eq!(request_id.len(), 36);
}

#[tokio::test]
async fn test_placeholder_token_only_for_oauth_sessions() {
    let backend = start_mock_backend().await;
    let mut config = loopback_config(vec![backend.port()], dead_url());
    config.auth.oauth_placeholder_token = Some("oauth-pending".to_string());

    let oauth = Arc::new(MemoryStore::with_entries([(keys::LOGIN_METHOD, "google")]));
    let body = pipeline(&config, &oauth).await.get("/echo").await.unwrap();
    assert_eq!(body["authorization"], "Bearer oauth-pending");

    let email = Arc::new(MemoryStore::with_entries([(keys::LOGIN_METHOD, "email")]));
    let body = pipeline(&config, &email).await.get("/echo").await.unwrap();
    assert!(body["authorization"].is_null());
}

#[tokio::test]
async fn test_concurrent_requests_share_one_discovery() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&config, &store).await;

    let results = futures_util::future::join_all((0..5).map(|_| pipeline.get("/echo"))).await;

    assert!(results.iter().all(Result::is_ok));
    assert_eq!(backend.health_calls(), 1);
}

#[tokio::test]
async fn test_unreachable_server_is_network_error() {
    let dead = dead_url();
    let config = loopback_config(vec![], dead.clone());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "access-1"),
        (keys::REFRESH_TOKEN, "refresh-1"),
    ]));
    let pipeline = pipeline(&config, &store).await;

    let err = pipeline.get("/profile").await.unwrap_err();

    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.code(), "NETWORK_ERROR");
    assert_eq!(err.status, None);
    assert!(err.is_retryable());
    assert_eq!(pipeline.discovery().fallback_url(), dead);
    assert!(pipeline.discovery().cached_urls().is_empty());
    // No response means no verdict on the session.
    assert_eq!(
        store.get(keys::REFRESH_TOKEN).await.unwrap().as_deref(),
        Some("refresh-1")
    );
}

#[tokio::test]
async fn test_timeout_triggers_background_redetect() {
    let backend = start_mock_backend().await;
    let mut config = loopback_config(vec![backend.port()], dead_url());
    config.requests.timeout_secs = 1;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&config, &store).await;

    let err = pipeline.get("/slow").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Network);
    assert_eq!(err.message, "The server took too long to respond.");

    // Re-detection probes the backend again and republishes it.
    let discovery = pipeline.discovery().clone();
    assert!(
        eventually(Duration::from_secs(2), || {
            backend.health_calls() >= 2
                && discovery.current_base_url() == Some(backend.base_url())
        })
        .await
    );
}

#[tokio::test]
async fn test_logout_clears_session() {
    let backend = start_mock_backend().await;
    let config = loopback_config(vec![backend.port()], dead_url());
    let store = Arc::new(MemoryStore::with_entries([
        (keys::ACCESS_TOKEN, "access-1"),
        (keys::REFRESH_TOKEN, "refresh-1"),
        (keys::LOGIN_METHOD, "google"),
    ]));
    let pipeline = pipeline(&config, &store).await;
    let mut events = pipeline.sessions().subscribe();

    pipeline.logout().await;

    assert!(!pipeline.sessions().load().await.unwrap().is_authenticated());
    assert_eq!(events.try_recv().unwrap(), SessionEvent::LoggedOut);
    assert_eq!(backend.health_calls(), 0);
}

#[tokio::test]
async fn test_upload_uses_longer_timeout() {
    let backend = start_mock_backend().await;
    let mut config = loopback_config(vec![backend.port()], dead_url());
    config.requests.timeout_secs = 1;
    config.requests.upload_timeout_secs = 10;
    let store = Arc::new(MemoryStore::new());
    let pipeline = pipeline(&config, &store).await;

    // Three seconds is past the regular timeout but within the upload one.
    let body = pipeline
        .execute(RequestSpec::get("/slow").upload())
        .await
        .unwrap();
    assert_eq!(body["late"], true);
}
