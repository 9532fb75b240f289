//! Storage and queue readiness.
//!
//! [`ReadinessGate`] is built once at bootstrap and handed to whatever needs
//! it. Every check is a handful of atomic loads.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::{
    body::Body,
    extract::State,
    http::{Request, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use hookgate_queue::QueueReadiness;

use crate::error::ServerError;

/// Storage connection status, written by the storage collaborator.
pub trait StorageStatus: Send + Sync + 'static {
    fn connected(&self) -> bool;

    /// Schema migrations have finished.
    fn migrated(&self) -> bool;
}

/// Atomic [`StorageStatus`] for collaborators that only need to flip flags.
#[derive(Debug, Default)]
pub struct StorageState {
    connected: AtomicBool,
    migrated: AtomicBool,
}

impl StorageState {
    /// Disconnected and not migrated.
    pub fn new() -> Self {
        Self::default()
    }

    /// Connected and migrated.
    pub fn ready() -> Self {
        Self {
            connected: AtomicBool::new(true),
            migrated: AtomicBool::new(true),
        }
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    pub fn set_migrated(&self, migrated: bool) {
        self.migrated.store(migrated, Ordering::Release);
    }
}

impl StorageStatus for StorageState {
    fn connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    fn migrated(&self) -> bool {
        self.migrated.load(Ordering::Acquire)
    }
}

/// Result of a readiness check, most severe condition first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readiness {
    Ready,
    StorageDisconnected,
    /// Storage is connected but migrations are still running.
    Migrating,
    /// Queue mode only.
    QueueUnavailable,
}

impl Readiness {
    pub fn is_ready(self) -> bool {
        self == Readiness::Ready
    }

    pub fn reason(self) -> &'static str {
        match self {
            Readiness::Ready => "ready",
            Readiness::StorageDisconnected => "Database is not ready!",
            Readiness::Migrating => "hookgate is starting up. Please wait",
            Readiness::QueueUnavailable => "Queue backend is not ready",
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Combines storage and (in queue mode) queue readiness.
#[derive(Clone)]
pub struct ReadinessGate {
    storage: Arc<dyn StorageStatus>,
    queue: Option<QueueReadiness>,
}

impl ReadinessGate {
    pub fn new(storage: Arc<dyn StorageStatus>) -> Self {
        Self {
            storage,
            queue: None,
        }
    }

    /// Also require the queue backend to be connected.
    pub fn with_queue(mut self, queue: QueueReadiness) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn queue_mode(&self) -> bool {
        self.queue.is_some()
    }

    pub fn check(&self) -> Readiness {
        if !self.storage.connected() {
            return Readiness::StorageDisconnected;
        }
        if !self.storage.migrated() {
            return Readiness::Migrating;
        }
        match &self.queue {
            Some(queue) if !queue.is_ready() => Readiness::QueueUnavailable,
            _ => Readiness::Ready,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.check().is_ready()
    }
}

impl fmt::Debug for ReadinessGate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadinessGate")
            .field("readiness", &self.check())
            .field("queue_mode", &self.queue_mode())
            .finish()
    }
}

/// Gate non-health routes on storage readiness.
///
/// A queue outage does not block routing; it only shows up on the
/// readiness endpoint.
pub async fn readiness_middleware(
    State(gate): State<ReadinessGate>,
    request: Request<Body>,
    next: Next,
) -> Response {
    match gate.check() {
        Readiness::StorageDisconnected => {
            ServerError::ServiceUnavailable(Readiness::StorageDisconnected.reason().to_string())
                .into_response()
        }
        Readiness::Migrating => (StatusCode::OK, Readiness::Migrating.reason()).into_response(),
        Readiness::Ready | Readiness::QueueUnavailable => next.run(request).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{Router, middleware, routing::get};
    use tower::ServiceExt;

    fn gated_app(gate: ReadinessGate) -> Router {
        Router::new()
            .route("/webhook/x", get(|| async { "handled" }))
            .layer(middleware::from_fn_with_state(gate, readiness_middleware))
    }

    async fn call(app: Router) -> (StatusCode, String) {
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/webhook/x")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let body = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[test]
    fn test_check_order() {
        let storage = Arc::new(StorageState::new());
        let queue = QueueReadiness::new();
        let gate = ReadinessGate::new(storage.clone()).with_queue(queue);

        assert_eq!(gate.check(), Readiness::StorageDisconnected);

        storage.set_connected(true);
        assert_eq!(gate.check(), Readiness::Migrating);

        storage.set_migrated(true);
        assert_eq!(gate.check(), Readiness::QueueUnavailable);
        assert!(!gate.is_ready());
    }

    #[test]
    fn test_direct_mode_ignores_queue() {
        let gate = ReadinessGate::new(Arc::new(StorageState::ready()));
        assert_eq!(gate.check(), Readiness::Ready);
        assert!(gate.is_ready());
        assert!(!gate.queue_mode());
    }

    #[test]
    fn test_reasons_are_distinct() {
        let reasons = [
            Readiness::Ready,
            Readiness::StorageDisconnected,
            Readiness::Migrating,
            Readiness::QueueUnavailable,
        ]
        .map(Readiness::reason);
        for (i, a) in reasons.iter().enumerate() {
            for b in &reasons[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }

    #[tokio::test]
    async fn test_disconnected_storage_is_503() {
        let gate = ReadinessGate::new(Arc::new(StorageState::new()));
        let (status, body) = call(gated_app(gate)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.contains("Database is not ready!"));
    }

    #[tokio::test]
    async fn test_migrating_storage_is_informational() {
        let storage = StorageState::new();
        storage.set_connected(true);
        let gate = ReadinessGate::new(Arc::new(storage));
        let (status, body) = call(gated_app(gate)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "hookgate is starting up. Please wait");
    }

    #[tokio::test]
    async fn test_queue_outage_does_not_block_routing() {
        let gate =
            ReadinessGate::new(Arc::new(StorageState::ready())).with_queue(QueueReadiness::new());
        let (status, body) = call(gated_app(gate)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "handled");
    }
}
