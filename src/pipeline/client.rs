//! Resilient request pipeline.
//!
//! # Responsibilities
//! - Resolve the base URL through discovery before every request
//! - Attach the bearer token from the session store
//! - Run the refresh-and-retry-once protocol on 401
//! - Trigger background re-discovery when no response arrives
//! - Classify every failure into an `ApiError`
//!
//! # Design Decisions
//! - Retry state lives in a per-request `PendingRequestContext`, never on shared config
//! - Token reads are point-in-time; a concurrent refresh can race a stale read,
//!   which the 401 branch of that request resolves
//! - The failing request is not replayed against the re-discovered server
//! - Any failed refresh expires the session; one that got no response also re-discovers

use reqwest::{Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::{AuthConfig, ClientConfig, RequestConfig};
use crate::discovery::ServerDiscoveryService;
use crate::health::HttpProbe;
use crate::observability::metrics;
use crate::pipeline::context::{PendingRequestContext, RequestKind, RequestSpec};
use crate::pipeline::error::ApiError;
use crate::session::SessionManager;
use crate::store::TokenStore;

/// Body returned by the refresh endpoint.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    #[serde(default, alias = "access_token", alias = "token")]
    access_token: Option<String>,
    #[serde(default, alias = "refresh_token")]
    refresh_token: Option<String>,
    #[serde(default)]
    data: Option<Box<RefreshResponse>>,
}

impl RefreshResponse {
    /// New access token and optional refresh token, top-level or under `data`.
    fn into_tokens(self) -> Option<(String, Option<String>)> {
        match self.access_token.filter(|t| !t.is_empty()) {
            Some(access) => Some((access, self.refresh_token)),
            None => self.data.and_then(|data| data.into_tokens()),
        }
    }
}

enum RefreshOutcome {
    Renewed(String),
    NoRefreshToken,
    Rejected,
    Unreachable(reqwest::Error),
}

/// Sends logical requests against the discovered backend.
#[derive(Debug, Clone)]
pub struct RequestPipeline {
    http: reqwest::Client,
    discovery: Arc<ServerDiscoveryService>,
    sessions: SessionManager,
    config: RequestConfig,
    auth: AuthConfig,
}

impl RequestPipeline {
    pub fn new(
        config: RequestConfig,
        auth: AuthConfig,
        discovery: Arc<ServerDiscoveryService>,
        sessions: SessionManager,
    ) -> Self {
        let http = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });

        Self {
            http,
            discovery,
            sessions,
            config,
            auth,
        }
    }

    /// Wire discovery, probe and session management from one configuration.
    ///
    /// Loads the persisted working-URL cache before returning.
    pub async fn from_config(config: &ClientConfig, store: Arc<dyn TokenStore>) -> Self {
        metrics::set_enabled(config.observability.metrics_enabled);

        let probe = Arc::new(HttpProbe::new(config.probe.clone()));
        let discovery = Arc::new(ServerDiscoveryService::new(
            config.discovery.clone(),
            probe,
            store.clone(),
        ));
        discovery.load_cache().await;

        Self::new(
            config.requests.clone(),
            config.auth.clone(),
            discovery,
            SessionManager::new(store),
        )
    }

    pub fn discovery(&self) -> &Arc<ServerDiscoveryService> {
        &self.discovery
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Send a request and return the response body.
    pub async fn send(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
        params: Option<&[(&str, &str)]>,
    ) -> Result<Value, ApiError> {
        let mut spec = RequestSpec::new(method, path);
        spec.body = body;
        if let Some(params) = params {
            spec = spec.with_params(params.iter().copied());
        }
        self.execute(spec).await
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(RequestSpec::get(path)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.execute(RequestSpec::post(path).with_body(body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value, ApiError> {
        self.execute(RequestSpec::put(path).with_body(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value, ApiError> {
        self.execute(RequestSpec::delete(path)).await
    }

    /// Clear the session at the user's request.
    pub async fn logout(&self) {
        self.sessions.logout().await;
    }

    /// Run a request through the full pipeline.
    pub async fn execute(&self, spec: RequestSpec) -> Result<Value, ApiError> {
        let start = Instant::now();
        let method = spec.method.to_string();

        let result = self.run(spec).await;

        let outcome = match &result {
            Ok(_) => "success".to_string(),
            Err(e) => e.code(),
        };
        metrics::record_request(&method, &outcome, start);
        result
    }

    async fn run(&self, spec: RequestSpec) -> Result<Value, ApiError> {
        // 1. Base URL (never fails)
        let base_url = self.discovery.discover().await;

        // 2. Token
        let mut ctx = PendingRequestContext::new(spec);
        let mut token = self.resolve_access_token().await;

        loop {
            // 3. Send
            let response = match self.dispatch(&base_url, &ctx, token.as_deref()).await {
                Ok(response) => response,
                Err(e) => return Err(self.network_failure(&ctx, &base_url, e)),
            };
            let status = response.status();

            // 4. Success
            if status.is_success() {
                return read_payload(response)
                    .await
                    .map_err(|e| self.network_failure(&ctx, &base_url, e));
            }

            // 5/6. Refresh protocol
            if status == StatusCode::UNAUTHORIZED {
                if ctx.begin_retry() {
                    match self.refresh(&base_url, &ctx).await {
                        RefreshOutcome::Renewed(new_token) => {
                            tracing::debug!(request_id = %ctx.id(), "Retrying with refreshed token");
                            token = Some(new_token);
                            continue;
                        }
                        RefreshOutcome::Unreachable(e) => {
                            tracing::warn!(
                                request_id = %ctx.id(),
                                base_url = %base_url,
                                error = %e,
                                "Refresh got no response"
                            );
                            self.schedule_redetect();
                        }
                        RefreshOutcome::NoRefreshToken | RefreshOutcome::Rejected => {}
                    }
                } else {
                    tracing::warn!(request_id = %ctx.id(), "Unauthorized again after refresh");
                }

                self.sessions.expire().await;
                return Err(ApiError::session_expired());
            }

            // 8. Other status
            let body = response.text().await.unwrap_or_default();
            let error = ApiError::from_status(status.as_u16(), &body);
            tracing::debug!(
                request_id = %ctx.id(),
                status = status.as_u16(),
                message = %error.message,
                "Request failed"
            );
            return Err(error);
        }
    }

    async fn dispatch(
        &self,
        base_url: &str,
        ctx: &PendingRequestContext,
        token: Option<&str>,
    ) -> Result<Response, reqwest::Error> {
        let request = ctx.request();
        let url = join_url(base_url, &request.path);

        let mut builder = self
            .http
            .request(request.method.clone(), &url)
            .timeout(self.timeout_for(request.kind))
            .header("x-request-id", ctx.id().to_string());
        if !request.params.is_empty() {
            builder = builder.query(&request.params);
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
        if let Some(token) = token {
            builder = builder.bearer_auth(token);
        }

        tracing::debug!(
            request_id = %ctx.id(),
            method = %request.method,
            url = %url,
            retried = ctx.is_retried(),
            authenticated = token.is_some(),
            "Sending request"
        );
        builder.send().await
    }

    fn timeout_for(&self, kind: RequestKind) -> Duration {
        match kind {
            RequestKind::Standard => self.config.timeout(),
            RequestKind::Upload => self.config.upload_timeout(),
        }
    }

    async fn resolve_access_token(&self) -> Option<String> {
        if let Some(token) = self.sessions.access_token().await {
            return Some(token);
        }

        let placeholder = self.auth.oauth_placeholder_token.as_ref()?;
        if self.sessions.login_method().await.is_oauth() {
            tracing::debug!("No access token for OAuth session, sending placeholder");
            return Some(placeholder.clone());
        }
        None
    }

    async fn refresh(&self, base_url: &str, ctx: &PendingRequestContext) -> RefreshOutcome {
        let Some(refresh_token) = self.sessions.refresh_token().await else {
            tracing::info!(request_id = %ctx.id(), "Unauthorized and no refresh token stored");
            return RefreshOutcome::NoRefreshToken;
        };

        let url = join_url(base_url, &self.config.refresh_path);
        let result = self
            .http
            .post(&url)
            .timeout(self.config.timeout())
            .header("x-request-id", ctx.id().to_string())
            .json(&json!({ "refreshToken": refresh_token }))
            .send()
            .await;

        let outcome = match result {
            Ok(response) if response.status().is_success() => {
                match response.json::<RefreshResponse>().await.map(RefreshResponse::into_tokens) {
                    Ok(Some((access, refresh))) => {
                        if let Err(e) = self.sessions.update_tokens(&access, refresh.as_deref()).await {
                            tracing::warn!(error = %e, "Failed to persist refreshed tokens");
                        }
                        tracing::info!(request_id = %ctx.id(), "Access token refreshed");
                        RefreshOutcome::Renewed(access)
                    }
                    Ok(None) => {
                        tracing::warn!(request_id = %ctx.id(), "Refresh response carried no access token");
                        RefreshOutcome::Rejected
                    }
                    Err(e) if e.is_decode() => {
                        tracing::warn!(request_id = %ctx.id(), error = %e, "Malformed refresh response");
                        RefreshOutcome::Rejected
                    }
                    Err(e) => RefreshOutcome::Unreachable(e),
                }
            }
            Ok(response) => {
                tracing::warn!(
                    request_id = %ctx.id(),
                    status = response.status().as_u16(),
                    "Refresh token rejected"
                );
                RefreshOutcome::Rejected
            }
            Err(e) => RefreshOutcome::Unreachable(e),
        };

        metrics::record_token_refresh(matches!(outcome, RefreshOutcome::Renewed(_)));
        outcome
    }

    /// Classify a missing response and schedule re-discovery in the background.
    fn network_failure(
        &self,
        ctx: &PendingRequestContext,
        base_url: &str,
        error: reqwest::Error,
    ) -> ApiError {
        tracing::warn!(
            request_id = %ctx.id(),
            base_url = %base_url,
            error = %error,
            "No response from server"
        );

        if error.is_builder() {
            return ApiError::network(format!("Invalid request: {}", error));
        }

        self.schedule_redetect();

        if error.is_timeout() {
            ApiError::network("The server took too long to respond.")
        } else {
            ApiError::network("Unable to reach the server. Check your connection.")
        }
    }

    /// Re-discover the server without blocking the caller.
    fn schedule_redetect(&self) {
        let discovery = Arc::clone(&self.discovery);
        tokio::spawn(async move {
            discovery.force_redetect().await;
        });
    }
}

/// Join a base URL and a relative path with exactly one slash.
fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_string()
    } else {
        format!("{}/{}", base, path)
    }
}

/// Response body only: JSON if it parses, text otherwise, `null` when empty.
async fn read_payload(response: Response) -> Result<Value, reqwest::Error> {
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_slice(&bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned())))
}
