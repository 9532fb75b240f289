//! Health check endpoints. Never gated on readiness.

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};

use crate::readiness::ReadinessGate;

/// Health check response.
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// `ok` or `error`.
    pub status: String,
    /// Present when not ready.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl HealthResponse {
    fn ok() -> Self {
        Self {
            status: "ok".to_string(),
            reason: None,
        }
    }
}

/// Liveness. Checks nothing.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}

/// Storage and queue readiness.
pub async fn readiness(State(gate): State<ReadinessGate>) -> Response {
    let readiness = gate.check();
    if readiness.is_ready() {
        return Json(HealthResponse::ok()).into_response();
    }

    let body = HealthResponse {
        status: "error".to_string(),
        reason: Some(readiness.reason().to_string()),
    };
    (StatusCode::SERVICE_UNAVAILABLE, Json(body)).into_response()
}

/// Create health check routes.
pub fn health_routes(gate: ReadinessGate) -> Router {
    Router::new()
        .route("/healthz", get(health))
        .route("/healthz/readiness", get(readiness))
        .with_state(gate)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::readiness::StorageState;
    use axum::{body::Body, http::Request};
    use hookgate_queue::QueueReadiness;
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn get_json(app: Router, uri: &str) -> (StatusCode, HealthResponse) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_health_ok_while_storage_disconnected() {
        let app = health_routes(ReadinessGate::new(Arc::new(StorageState::new())));
        let (status, health) = get_json(app, "/healthz").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
        assert!(health.reason.is_none());
    }

    #[tokio::test]
    async fn test_readiness_reports_reason() {
        let app = health_routes(ReadinessGate::new(Arc::new(StorageState::new())));
        let (status, health) = get_json(app, "/healthz/readiness").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.status, "error");
        assert_eq!(health.reason.as_deref(), Some("Database is not ready!"));
    }

    #[tokio::test]
    async fn test_readiness_includes_queue_in_queue_mode() {
        let gate =
            ReadinessGate::new(Arc::new(StorageState::ready())).with_queue(QueueReadiness::new());
        let (status, health) = get_json(health_routes(gate), "/healthz/readiness").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(health.reason.as_deref(), Some("Queue backend is not ready"));

        let gate = ReadinessGate::new(Arc::new(StorageState::ready()));
        let (status, health) = get_json(health_routes(gate), "/healthz/readiness").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(health.status, "ok");
    }
}
