//! Request descriptions and per-request retry state.

use reqwest::Method;
use serde_json::Value;
use uuid::Uuid;

/// Timeout class of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestKind {
    #[default]
    Standard,
    /// Large bodies; uses the longer upload timeout.
    Upload,
}

/// A logical request, independent of the base URL it is sent to.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestSpec {
    pub method: Method,
    /// Path relative to the base URL, e.g. `/announcements`.
    pub path: String,
    pub body: Option<Value>,
    pub params: Vec<(String, String)>,
    pub kind: RequestKind,
}

impl RequestSpec {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
            params: Vec::new(),
            kind: RequestKind::Standard,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.push((key.into(), value.into()));
        self
    }

    pub fn with_params<I, K, V>(mut self, params: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.params
            .extend(params.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn upload(mut self) -> Self {
        self.kind = RequestKind::Upload;
        self
    }
}

/// Transient state carried through one request's retry path.
///
/// `retried` goes false → true at most once; a retried request never
/// re-enters the refresh branch.
#[derive(Debug)]
pub struct PendingRequestContext {
    id: Uuid,
    request: RequestSpec,
    retried: bool,
}

impl PendingRequestContext {
    pub fn new(request: RequestSpec) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            retried: false,
        }
    }

    /// Correlation id sent as `x-request-id` on every attempt.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &RequestSpec {
        &self.request
    }

    pub fn is_retried(&self) -> bool {
        self.retried
    }

    /// Claim the single retry. Returns false if it was already used.
    pub fn begin_retry(&mut self) -> bool {
        if self.retried {
            return false;
        }
        self.retried = true;
        true
    }
}
