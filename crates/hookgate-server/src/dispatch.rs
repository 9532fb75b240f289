//! Lifecycle routing.
//!
//! Every webhook route extracts the body as raw [`Bytes`]; nothing in front
//! of these handlers parses it.

use std::sync::Arc;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{DefaultBodyLimit, Path, RawQuery, State},
    http::{HeaderMap, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, delete},
};
use serde_json::json;
use tracing::{debug, warn};

use hookgate_config::EndpointsConfig;

use crate::config::ServerConfig;
use crate::webhooks::{
    InMemoryRegistry, InMemoryTestRegistry, Lifecycle, TestWebhookRegistry, WebhookError,
    WebhookRegistry, WebhookReply, WebhookRequest,
};

/// The registries the dispatcher routes into.
#[derive(Clone)]
pub struct Registries {
    pub active: Arc<dyn WebhookRegistry>,
    pub waiting: Arc<dyn WebhookRegistry>,
    pub test: Option<Arc<dyn TestWebhookRegistry>>,
}

impl Registries {
    pub fn new(active: Arc<dyn WebhookRegistry>, waiting: Arc<dyn WebhookRegistry>) -> Self {
        Self {
            active,
            waiting,
            test: None,
        }
    }

    pub fn with_test(mut self, test: Arc<dyn TestWebhookRegistry>) -> Self {
        self.test = Some(test);
        self
    }

    /// Empty in-memory registries for all three lifecycles.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryRegistry::new(Lifecycle::Active)),
            Arc::new(InMemoryRegistry::new(Lifecycle::Waiting)),
        )
        .with_test(Arc::new(InMemoryTestRegistry::new()))
    }

    fn get(&self, lifecycle: Lifecycle) -> Option<&dyn WebhookRegistry> {
        match lifecycle {
            Lifecycle::Active => Some(self.active.as_ref()),
            Lifecycle::Waiting => Some(self.waiting.as_ref()),
            Lifecycle::Test => self
                .test
                .as_deref()
                .map(|test| test as &dyn WebhookRegistry),
        }
    }
}

/// Routes inbound webhook calls to the registry for their lifecycle.
#[derive(Clone)]
pub struct WebhookDispatcher {
    endpoints: EndpointsConfig,
    registries: Registries,
    webhooks_enabled: bool,
    test_webhooks_enabled: bool,
    max_payload_size: usize,
}

impl WebhookDispatcher {
    pub fn new(config: &ServerConfig, registries: Registries) -> Self {
        Self {
            endpoints: config.endpoints.clone(),
            registries,
            webhooks_enabled: config.webhooks_enabled,
            test_webhooks_enabled: config.test_webhooks_enabled,
            max_payload_size: config.max_payload_size,
        }
    }

    /// Test routes are served only when enabled and a test registry exists.
    pub fn serves_test_webhooks(&self) -> bool {
        self.test_webhooks_enabled && self.registries.test.is_some()
    }

    /// Build the webhook routes. Fixed once built.
    pub fn routes(&self) -> Router {
        let state = Arc::new(self.clone());
        let mut router = Router::new();

        if self.webhooks_enabled {
            router = router
                .route(
                    &format!("/{}/{{*path}}", self.endpoints.webhook),
                    any(active_handler),
                )
                .route(
                    &format!("/{}/{{path}}", self.endpoints.webhook_waiting),
                    any(waiting_handler),
                )
                .route(
                    &format!("/{}/{{path}}/{{suffix}}", self.endpoints.webhook_waiting),
                    any(waiting_suffix_handler),
                );
        }

        if self.serves_test_webhooks() {
            router = router
                .route(
                    &format!("/{}/{{*path}}", self.endpoints.webhook_test),
                    any(test_handler),
                )
                .route(
                    &format!("/{}/test-webhook/{{id}}", self.endpoints.rest),
                    delete(cancel_test_handler),
                );
        } else if self.test_webhooks_enabled {
            debug!("test webhooks enabled but no test registry supplied, routes not added");
        }

        router
            .layer(DefaultBodyLimit::max(self.max_payload_size))
            .with_state(state)
    }

    /// Hand a request to its registry and turn the outcome into a response.
    pub async fn dispatch(&self, request: WebhookRequest) -> Response {
        let lifecycle = request.lifecycle;
        let Some(registry) = self.registries.get(lifecycle) else {
            return StatusCode::NOT_FOUND.into_response();
        };

        debug!(
            lifecycle = %lifecycle,
            method = %request.method,
            path = %request.path,
            body_bytes = request.body.len(),
            "dispatching webhook"
        );

        match registry.handle(request).await {
            Ok(WebhookReply::Immediate(response)) => response.into_response(),
            Ok(WebhookReply::Deferred(rx)) => match rx.await {
                Ok(response) => response.into_response(),
                Err(_) => {
                    warn!(lifecycle = %lifecycle, "webhook handler dropped its deferred reply");
                    WebhookError::Internal("webhook handler did not produce a response".to_string())
                        .into_response()
                }
            },
            Err(err) => err.into_response(),
        }
    }
}

async fn active_handler(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest::new(Lifecycle::Active, method, path)
        .with_query(query)
        .with_headers(headers)
        .with_body(body);
    dispatcher.dispatch(request).await
}

async fn waiting_handler(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest::new(Lifecycle::Waiting, method, path)
        .with_query(query)
        .with_headers(headers)
        .with_body(body);
    dispatcher.dispatch(request).await
}

async fn waiting_suffix_handler(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    method: Method,
    Path((path, suffix)): Path<(String, String)>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest::new(Lifecycle::Waiting, method, path)
        .with_suffix(suffix)
        .with_query(query)
        .with_headers(headers)
        .with_body(body);
    dispatcher.dispatch(request).await
}

async fn test_handler(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    method: Method,
    Path(path): Path<String>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let request = WebhookRequest::new(Lifecycle::Test, method, path)
        .with_query(query)
        .with_headers(headers)
        .with_body(body);
    dispatcher.dispatch(request).await
}

async fn cancel_test_handler(
    State(dispatcher): State<Arc<WebhookDispatcher>>,
    Path(id): Path<String>,
) -> Response {
    let Some(test) = &dispatcher.registries.test else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let cancelled = test.cancel(&id).await;
    debug!(id = %id, cancelled, "test webhook cancel requested");
    Json(json!({ "data": cancelled })).into_response()
}
