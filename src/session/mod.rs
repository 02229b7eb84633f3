//! Authentication session lifecycle.
//!
//! # State Transitions
//! ```text
//! (none) → Established: login / registration / OAuth exchange
//! Established → Established: token refresh (tokens replaced in place)
//! Established → (none): logout or irrecoverable refresh failure
//! ```
//!
//! # Design Decisions
//! - The store is the source of truth; nothing is cached in memory
//! - Clearing removes every session key in one `remove_many`
//! - Lifecycle changes are broadcast so the UI layer can route to login

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::store::{keys, StoreError, TokenStore};

/// How the current session was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LoginMethod {
    Email,
    Google,
    #[default]
    Unknown,
}

impl LoginMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoginMethod::Email => "email",
            LoginMethod::Google => "google",
            LoginMethod::Unknown => "unknown",
        }
    }

    /// True for sessions established through the OAuth flow.
    pub fn is_oauth(&self) -> bool {
        matches!(self, LoginMethod::Google)
    }
}

impl FromStr for LoginMethod {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "email" => LoginMethod::Email,
            "google" => LoginMethod::Google,
            _ => LoginMethod::Unknown,
        })
    }
}

impl fmt::Display for LoginMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of the persisted session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AuthSession {
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub user: Option<Value>,
    pub login_method: LoginMethod,
}

impl AuthSession {
    pub fn is_authenticated(&self) -> bool {
        self.access_token.is_some()
    }

    /// Role field of the user payload, if any.
    pub fn role(&self) -> Option<&str> {
        self.user.as_ref()?.get("role")?.as_str()
    }
}

/// Tokens and user payload returned by a login, registration or OAuth exchange.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TokenBundle {
    #[serde(alias = "access_token", alias = "token")]
    pub access_token: String,
    #[serde(default, alias = "refresh_token")]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub user: Option<Value>,
}

/// Result handed back by the external OAuth consent flow.
#[derive(Debug, Clone)]
pub enum OAuthOutcome {
    Completed(TokenBundle),
    Cancelled,
    Failed(String),
}

/// Session lifecycle notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    Established(LoginMethod),
    Refreshed,
    /// Tokens could not be renewed; the user must sign in again.
    Expired,
    LoggedOut,
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("sign-in was cancelled")]
    Cancelled,

    #[error("OAuth exchange failed: {0}")]
    OAuth(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Reads and mutates the session held in a `TokenStore`.
#[derive(Clone)]
pub struct SessionManager {
    store: Arc<dyn TokenStore>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionManager {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self { store, events }
    }

    /// Subscribe to session lifecycle events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Read the full session from the store.
    pub async fn load(&self) -> Result<AuthSession, SessionError> {
        let user = match self.store.get(keys::USER).await? {
            Some(raw) => serde_json::from_str(&raw).ok(),
            None => None,
        };

        Ok(AuthSession {
            access_token: self.store.get(keys::ACCESS_TOKEN).await?,
            refresh_token: self.store.get(keys::REFRESH_TOKEN).await?,
            user,
            login_method: self.read_login_method().await?,
        })
    }

    pub async fn access_token(&self) -> Option<String> {
        self.read_or_none(keys::ACCESS_TOKEN).await
    }

    pub async fn refresh_token(&self) -> Option<String> {
        self.read_or_none(keys::REFRESH_TOKEN).await
    }

    pub async fn login_method(&self) -> LoginMethod {
        match self.read_login_method().await {
            Ok(method) => method,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to read login method");
                LoginMethod::Unknown
            }
        }
    }

    /// Persist a new session from a login, registration or OAuth exchange.
    pub async fn establish(
        &self,
        bundle: TokenBundle,
        method: LoginMethod,
    ) -> Result<AuthSession, SessionError> {
        let mut entries = vec![
            (keys::ACCESS_TOKEN, bundle.access_token.clone()),
            (keys::LOGIN_METHOD, method.as_str().to_string()),
        ];
        if let Some(refresh) = &bundle.refresh_token {
            entries.push((keys::REFRESH_TOKEN, refresh.clone()));
        }
        if let Some(user) = &bundle.user {
            entries.push((keys::USER, user.to_string()));
            if let Some(role) = user.get("role").and_then(Value::as_str) {
                entries.push((keys::USER_ROLE, role.to_string()));
            }
        }

        // Drop leftovers from a previous session before writing the new one.
        self.store.remove_many(&keys::SESSION).await?;
        self.store.set_many(&entries).await?;

        tracing::info!(login_method = %method, "Session established");
        let _ = self.events.send(SessionEvent::Established(method));

        Ok(AuthSession {
            access_token: Some(bundle.access_token),
            refresh_token: bundle.refresh_token,
            user: bundle.user,
            login_method: method,
        })
    }

    /// Turn the outcome of the OAuth consent flow into a session.
    pub async fn complete_oauth(&self, outcome: OAuthOutcome) -> Result<AuthSession, SessionError> {
        match outcome {
            OAuthOutcome::Completed(bundle) => self.establish(bundle, LoginMethod::Google).await,
            OAuthOutcome::Cancelled => {
                tracing::info!("OAuth sign-in cancelled");
                Err(SessionError::Cancelled)
            }
            OAuthOutcome::Failed(message) => {
                tracing::warn!(error = %message, "OAuth sign-in failed");
                Err(SessionError::OAuth(message))
            }
        }
    }

    /// Replace tokens after a successful refresh.
    pub async fn update_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> Result<(), SessionError> {
        let mut entries = vec![(keys::ACCESS_TOKEN, access_token.to_string())];
        if let Some(refresh) = refresh_token {
            entries.push((keys::REFRESH_TOKEN, refresh.to_string()));
        }
        self.store.set_many(&entries).await?;
        let _ = self.events.send(SessionEvent::Refreshed);
        Ok(())
    }

    /// Remove the session because it can no longer be renewed.
    pub async fn expire(&self) {
        self.clear(SessionEvent::Expired).await;
    }

    /// Remove the session at the user's request.
    pub async fn logout(&self) {
        self.clear(SessionEvent::LoggedOut).await;
    }

    async fn clear(&self, event: SessionEvent) {
        if let Err(e) = self.store.remove_many(&keys::SESSION).await {
            tracing::error!(error = %e, "Failed to clear session");
        }
        tracing::info!(event = ?event, "Session cleared");
        let _ = self.events.send(event);
    }

    async fn read_login_method(&self) -> Result<LoginMethod, StoreError> {
        Ok(self
            .store
            .get(keys::LOGIN_METHOD)
            .await?
            .map(|m| m.parse().unwrap_or_default())
            .unwrap_or_default())
    }

    async fn read_or_none(&self, key: &str) -> Option<String> {
        match self.store.get(key).await {
            Ok(value) => value.filter(|v| !v.is_empty()),
            Err(e) => {
                tracing::warn!(key, error = %e, "Store read failed");
                None
            }
        }
    }
}

impl fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionManager")
            .field("subscribers", &self.events.receiver_count())
            .finish()
    }
}
