//! Webhook dispatch HTTP server for hookgate.
//!
//! This crate owns the listener and everything between it and the webhook
//! registries supplied by collaborators.
//!
//! # Features
//!
//! - Active, waiting and test webhook lifecycles, each routed to its own registry
//! - Raw request bodies passed through to handlers untouched
//! - Readiness gating on storage state, with a separate readiness endpoint
//! - Plain or TLS listener
//! - Queue backend supervision in queue mode
//! - Graceful shutdown bounded by a grace period
//! - Request logging
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use hookgate_server::{Registries, ServerBootstrap, ServerConfig, StorageState};
//!
//! let config = ServerConfig::new().with_listen("127.0.0.1", 5678);
//! let server = ServerBootstrap::new(config, Arc::new(StorageState::ready()), Registries::in_memory())
//!     .start()
//!     .await?;
//! server.run_until(async { tokio::signal::ctrl_c().await.ok(); }).await?;
//! ```

pub mod bootstrap;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod install;
pub mod logging;
pub mod readiness;
pub mod routes;
pub mod tls;
pub mod webhooks;

pub use bootstrap::{QUEUE_FATAL_GRACE, RunningServer, ServerBootstrap, ServerPhase};
pub use config::{ListenerConfig, ListenerProtocol, QueueSettings, ServerConfig};
pub use dispatch::{Registries, WebhookDispatcher};
pub use error::{ErrorResponse, Result, ServerError};
pub use install::{Configurable, Noop, PushServerInstaller, RouteRegistrar};
pub use logging::{RequestLog, RouteClass, request_logging_middleware};
pub use readiness::{Readiness, ReadinessGate, StorageState, StorageStatus, readiness_middleware};
pub use routes::HealthResponse;
pub use tls::{TlsListener, load_tls_config};
pub use webhooks::{
    DeferredResponder, InMemoryRegistry, InMemoryTestRegistry, Lifecycle, RouteKey,
    TestWebhookRegistry, WebhookError, WebhookHandler, WebhookRegistry, WebhookReply,
    WebhookRequest, WebhookResponse, handler_fn,
};
