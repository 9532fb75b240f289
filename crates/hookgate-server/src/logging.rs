//! Request logging middleware.

use std::fmt;
use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::Request,
    middleware::Next,
    response::Response,
};
use hookgate_config::EndpointsConfig;

use crate::config::ServerConfig;
use crate::webhooks::Lifecycle;

/// What part of the HTTP surface a request hit, judged by its first segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    Health,
    Webhook(Lifecycle),
    Rest,
    Other,
}

impl fmt::Display for RouteClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteClass::Health => f.write_str("health"),
            RouteClass::Webhook(lifecycle) => write!(f, "webhook-{}", lifecycle),
            RouteClass::Rest => f.write_str("rest"),
            RouteClass::Other => f.write_str("other"),
        }
    }
}

/// State for [`request_logging_middleware`].
#[derive(Debug, Clone)]
pub struct RequestLog {
    enabled: bool,
    endpoints: Arc<EndpointsConfig>,
}

impl RequestLog {
    pub fn new(config: &ServerConfig) -> Self {
        Self {
            enabled: config.request_logging,
            endpoints: Arc::new(config.endpoints.clone()),
        }
    }

    pub fn classify(&self, path: &str) -> RouteClass {
        let first = path.trim_start_matches('/').split('/').next().unwrap_or("");
        let endpoints = &self.endpoints;
        if first == "healthz" {
            RouteClass::Health
        } else if first == endpoints.webhook {
            RouteClass::Webhook(Lifecycle::Active)
        } else if first == endpoints.webhook_test {
            RouteClass::Webhook(Lifecycle::Test)
        } else if first == endpoints.webhook_waiting {
            RouteClass::Webhook(Lifecycle::Waiting)
        } else if first == endpoints.rest {
            RouteClass::Rest
        } else {
            RouteClass::Other
        }
    }
}

/// Log every request once it completes, tagged with the lifecycle it was
/// routed to. Failures log by status class; successful health checks only at
/// debug.
pub async fn request_logging_middleware(
    State(log): State<RequestLog>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if !log.enabled {
        return next.run(request).await;
    }

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let route = log.classify(&path);

    let start = std::time::Instant::now();
    let response = next.run(request).await;
    let duration_ms = start.elapsed().as_millis() as u64;
    let status = response.status().as_u16();

    if response.status().is_server_error() {
        tracing::error!(%method, %path, %route, status, duration_ms, "webhook request failed");
    } else if response.status().is_client_error() {
        tracing::warn!(%method, %path, %route, status, duration_ms, "webhook request rejected");
    } else if route == RouteClass::Health {
        tracing::debug!(%method, %path, status, duration_ms, "health check");
    } else {
        tracing::info!(%method, %path, %route, status, duration_ms, "request completed");
    }

    response
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, http::StatusCode, middleware, routing::get};
    use tower::ServiceExt;

    fn log(config: &ServerConfig) -> RequestLog {
        RequestLog::new(config)
    }

    #[test]
    fn test_classify_uses_configured_endpoints() {
        let mut config = ServerConfig::new();
        config.endpoints.webhook = "hooks".to_string();
        let log = log(&config);

        assert_eq!(log.classify("/healthz/readiness"), RouteClass::Health);
        assert_eq!(log.classify("/hooks/a/b"), RouteClass::Webhook(Lifecycle::Active));
        assert_eq!(log.classify("/webhook"), RouteClass::Other);
        assert_eq!(
            log.classify("/webhook-waiting/1/x"),
            RouteClass::Webhook(Lifecycle::Waiting)
        );
        assert_eq!(log.classify("/webhook-test/p"), RouteClass::Webhook(Lifecycle::Test));
        assert_eq!(log.classify("/rest/test-webhook/1"), RouteClass::Rest);
        assert_eq!(RouteClass::Webhook(Lifecycle::Waiting).to_string(), "webhook-waiting");
    }

    #[tokio::test]
    async fn test_logging_passes_response_through() {
        for enabled in [true, false] {
            let config = ServerConfig::new().with_request_logging(enabled);
            let app = Router::new()
                .route("/webhook/ok", get(|| async { "ok" }))
                .route("/webhook/fail", get(|| async { StatusCode::BAD_GATEWAY }))
                .layer(middleware::from_fn_with_state(
                    log(&config),
                    request_logging_middleware,
                ));

            let response = app
                .clone()
                .oneshot(Request::builder().uri("/webhook/ok").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);

            let response = app
                .oneshot(Request::builder().uri("/webhook/fail").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
        }
    }
}
