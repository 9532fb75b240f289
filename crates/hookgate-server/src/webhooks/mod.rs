//! Webhook registry interfaces.
//!
//! The server never knows which workflow a webhook belongs to. It builds a
//! [`WebhookRequest`] from the raw HTTP request and hands it to the registry
//! for the matching [`Lifecycle`]; the registry picks a [`WebhookHandler`].

pub mod memory;

pub use memory::{InMemoryRegistry, InMemoryTestRegistry};

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Bytes,
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::error::ErrorResponse;

/// Which registry a request is routed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Production webhooks of activated workflows.
    Active,
    /// One-shot webhooks registered while a workflow is being built.
    Test,
    /// Resumes an execution paused on a wait step.
    Waiting,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Active => "active",
            Lifecycle::Test => "test",
            Lifecycle::Waiting => "waiting",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies a route within a lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RouteKey {
    pub lifecycle: Lifecycle,
    pub path: String,
    pub suffix: Option<String>,
}

impl RouteKey {
    pub fn new(lifecycle: Lifecycle, path: impl Into<String>) -> Self {
        Self {
            lifecycle,
            path: path.into(),
            suffix: None,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    /// Path and suffix joined with `/`.
    pub fn full_path(&self) -> String {
        match &self.suffix {
            Some(suffix) => format!("{}/{}", self.path, suffix),
            None => self.path.clone(),
        }
    }
}

/// An inbound webhook call. The body is passed through untouched.
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub lifecycle: Lifecycle,
    pub method: Method,
    /// Path after the lifecycle prefix, without leading or trailing `/`.
    pub path: String,
    /// Waiting lifecycle only.
    pub suffix: Option<String>,
    /// Raw query string.
    pub query: Option<String>,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookRequest {
    pub fn new(lifecycle: Lifecycle, method: Method, path: impl Into<String>) -> Self {
        Self {
            lifecycle,
            method,
            path: normalize_path(&path.into()),
            suffix: None,
            query: None,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = Some(suffix.into());
        self
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query;
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn route_key(&self) -> RouteKey {
        RouteKey {
            lifecycle: self.lifecycle,
            path: self.path.clone(),
            suffix: self.suffix.clone(),
        }
    }
}

/// Strip leading and trailing slashes.
pub(crate) fn normalize_path(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// What a handler sends back.
#[derive(Debug, Clone)]
pub struct WebhookResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl WebhookResponse {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    pub fn ok() -> Self {
        Self::new(StatusCode::OK)
    }

    pub fn json(status: StatusCode, value: &serde_json::Value) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("application/json"),
            )
            .with_body(value.to_string())
    }

    pub fn text(status: StatusCode, text: impl Into<String>) -> Self {
        Self::new(status)
            .with_header(
                header::CONTENT_TYPE,
                HeaderValue::from_static("text/plain; charset=utf-8"),
            )
            .with_body(text.into())
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }
}

impl IntoResponse for WebhookResponse {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

/// A handler's reply: ready now, or produced later by the execution.
#[derive(Debug)]
pub enum WebhookReply {
    Immediate(WebhookResponse),
    /// Awaited without a timeout. A dropped sender becomes a 500.
    Deferred(oneshot::Receiver<WebhookResponse>),
}

impl WebhookReply {
    /// A deferred reply and the responder that completes it.
    pub fn deferred() -> (DeferredResponder, Self) {
        let (tx, rx) = oneshot::channel();
        (DeferredResponder(tx), WebhookReply::Deferred(rx))
    }
}

impl From<WebhookResponse> for WebhookReply {
    fn from(response: WebhookResponse) -> Self {
        WebhookReply::Immediate(response)
    }
}

/// Completes a [`WebhookReply::Deferred`].
#[derive(Debug)]
pub struct DeferredResponder(oneshot::Sender<WebhookResponse>);

impl DeferredResponder {
    /// Returns `false` if the caller has gone away.
    pub fn respond(self, response: WebhookResponse) -> bool {
        self.0.send(response).is_ok()
    }
}

/// Registry lookup and handler failures.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("webhook \"{method} {path}\" is not registered")]
    NotFound { method: Method, path: String },

    #[error("webhook \"{path}\" does not accept {method}")]
    MethodNotAllowed {
        method: Method,
        path: String,
        allowed: Vec<Method>,
    },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Internal(String),
}

impl WebhookError {
    pub fn status(&self) -> StatusCode {
        match self {
            WebhookError::NotFound { .. } => StatusCode::NOT_FOUND,
            WebhookError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            WebhookError::Conflict(_) => StatusCode::CONFLICT,
            WebhookError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebhookError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            WebhookError::NotFound { .. } => "not_found",
            WebhookError::MethodNotAllowed { .. } => "method_not_allowed",
            WebhookError::Conflict(_) => "conflict",
            WebhookError::BadRequest(_) => "bad_request",
            WebhookError::Internal(_) => "internal_error",
        }
    }
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let allow = match &self {
            WebhookError::MethodNotAllowed { allowed, .. } => {
                let list = allowed
                    .iter()
                    .map(Method::as_str)
                    .collect::<Vec<_>>()
                    .join(", ");
                HeaderValue::from_str(&list).ok()
            }
            _ => None,
        };

        let mut response = ErrorResponse::respond(self.status(), self.code(), self.to_string());
        if let Some(allow) = allow {
            response.headers_mut().insert(header::ALLOW, allow);
        }
        response
    }
}

/// A single webhook's behavior.
#[async_trait]
pub trait WebhookHandler: Send + Sync {
    async fn handle(&self, request: WebhookRequest) -> Result<WebhookReply, WebhookError>;
}

/// Lifecycle-scoped handler lookup.
#[async_trait]
pub trait WebhookRegistry: Send + Sync {
    async fn handle(&self, request: WebhookRequest) -> Result<WebhookReply, WebhookError>;
}

/// Test registry, whose pending registrations can be cancelled.
#[async_trait]
pub trait TestWebhookRegistry: WebhookRegistry {
    /// Returns `false` if nothing was pending under `id`.
    async fn cancel(&self, id: &str) -> bool;
}

struct HandlerFn<F>(F);

#[async_trait]
impl<F, Fut> WebhookHandler for HandlerFn<F>
where
    F: Fn(WebhookRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WebhookReply, WebhookError>> + Send + 'static,
{
    async fn handle(&self, request: WebhookRequest) -> Result<WebhookReply, WebhookError> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a [`WebhookHandler`].
pub fn handler_fn<F, Fut>(f: F) -> Arc<dyn WebhookHandler>
where
    F: Fn(WebhookRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<WebhookReply, WebhookError>> + Send + 'static,
{
    Arc::new(HandlerFn(f))
}
