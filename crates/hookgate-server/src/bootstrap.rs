//! Server startup and shutdown sequencing.
//!
//! [`ServerBootstrap::start`] runs a fixed order: load TLS material, run
//! configure hooks, register routes, start queue supervision, bind. Only
//! after the bind succeeds does the server report [`ServerPhase::Listening`].

use std::fmt::Debug;
use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::{Router, http::Uri, middleware, serve::Listener};
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use hookgate_queue::{MonitorHandle, QueueConnectionMonitor, QueueTransport, RespTransport};

use crate::config::{ListenerProtocol, ServerConfig};
use crate::dispatch::{Registries, WebhookDispatcher};
use crate::error::{Result, ServerError};
use crate::install::{Configurable, Noop, PushServerInstaller, RouteRegistrar};
use crate::logging::{RequestLog, request_logging_middleware};
use crate::readiness::{ReadinessGate, StorageStatus, readiness_middleware};
use crate::routes::health_routes;
use crate::tls::{TlsListener, load_tls_config};

/// Drain limit after a fatal queue outage; the configured grace still caps it.
pub const QUEUE_FATAL_GRACE: Duration = Duration::from_secs(1);

/// Where the server is in its lifecycle. Only ever moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerPhase {
    Unconfigured,
    ListenerBuilt,
    RoutesRegistered,
    Listening,
    ShuttingDown,
    Stopped,
}

/// Builds and starts the server.
pub struct ServerBootstrap {
    config: ServerConfig,
    storage: Arc<dyn StorageStatus>,
    registries: Registries,
    configurables: Vec<Arc<dyn Configurable>>,
    route_registrars: Vec<Arc<dyn RouteRegistrar>>,
    push_installer: Arc<dyn PushServerInstaller>,
    queue_transport: Option<Box<dyn QueueTransport>>,
    phase: watch::Sender<ServerPhase>,
}

impl ServerBootstrap {
    pub fn new(
        config: ServerConfig,
        storage: Arc<dyn StorageStatus>,
        registries: Registries,
    ) -> Self {
        let (phase, _) = watch::channel(ServerPhase::Unconfigured);
        Self {
            config,
            storage,
            registries,
            configurables: Vec::new(),
            route_registrars: Vec::new(),
            push_installer: Arc::new(Noop),
            queue_transport: None,
            phase,
        }
    }

    /// Run `hook` before any route is registered. Hooks run in the order added.
    pub fn with_configurable(mut self, hook: Arc<dyn Configurable>) -> Self {
        self.configurables.push(hook);
        self
    }

    pub fn with_route_registrar(mut self, registrar: Arc<dyn RouteRegistrar>) -> Self {
        self.route_registrars.push(registrar);
        self
    }

    pub fn with_push_installer(mut self, installer: Arc<dyn PushServerInstaller>) -> Self {
        self.push_installer = installer;
        self
    }

    /// Override the queue transport. Defaults to RESP over TCP using the
    /// configured Redis settings. Ignored outside queue mode.
    pub fn with_queue_transport(mut self, transport: Box<dyn QueueTransport>) -> Self {
        self.queue_transport = Some(transport);
        self
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Watch phase transitions.
    pub fn phase(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    /// Build the full router: health routes ungated, everything else behind
    /// the readiness gate.
    pub fn router(&self, gate: &ReadinessGate) -> Router {
        let mut gated = WebhookDispatcher::new(&self.config, self.registries.clone()).routes();
        for registrar in &self.route_registrars {
            gated = gated.merge(registrar.routes(&self.config));
        }
        let gated = self
            .push_installer
            .install(gated)
            .fallback(not_found)
            .layer(middleware::from_fn_with_state(
                gate.clone(),
                readiness_middleware,
            ));

        Router::new()
            .merge(health_routes(gate.clone()))
            .merge(gated)
            .layer(CatchPanicLayer::new())
            .layer(middleware::from_fn_with_state(
                RequestLog::new(&self.config),
                request_logging_middleware,
            ))
            .layer(TraceLayer::new_for_http())
    }

    fn set_phase(&self, phase: ServerPhase) {
        self.phase.send_replace(phase);
        debug!(phase = ?phase, "server phase");
    }

    /// Start serving. Returns once the listener is bound and accepting.
    pub async fn start(mut self) -> Result<RunningServer> {
        let tls = match &self.config.listener.protocol {
            ListenerProtocol::Tls { key, cert } => Some(load_tls_config(cert, key).await?),
            ListenerProtocol::Plain => None,
        };
        self.set_phase(ServerPhase::ListenerBuilt);

        for hook in &self.configurables {
            hook.configure(&self.config).await?;
        }

        let monitor = self
            .config
            .queue
            .as_ref()
            .map(|queue| QueueConnectionMonitor::new(queue.policy));
        let mut gate = ReadinessGate::new(self.storage.clone());
        if let Some(monitor) = &monitor {
            gate = gate.with_queue(monitor.readiness());
        }
        let router = self.router(&gate);
        self.set_phase(ServerPhase::RoutesRegistered);

        let monitor = match (monitor, &self.config.queue) {
            (Some(monitor), Some(queue)) => {
                let transport = self
                    .queue_transport
                    .take()
                    .unwrap_or_else(|| {
                        Box::new(RespTransport::new(queue.redis.clone())) as Box<dyn QueueTransport>
                    });
                Some(monitor.start(transport))
            }
            _ => {
                if self.queue_transport.is_some() {
                    debug!("queue transport supplied outside queue mode, ignoring");
                }
                None
            }
        };

        let tcp = match self.bind().await {
            Ok(tcp) => tcp,
            Err(e) => {
                if let Some(monitor) = monitor {
                    monitor.shutdown().await;
                }
                return Err(e);
            }
        };
        let local_addr = match tcp.local_addr() {
            Ok(addr) => addr,
            Err(source) => {
                if let Some(monitor) = monitor {
                    monitor.shutdown().await;
                }
                return Err(ServerError::Bind {
                    addr: self.config.listener.display_addr(),
                    source,
                });
            }
        };

        let cancel = CancellationToken::new();
        let serve_task = match tls {
            Some(tls) => match TlsListener::new(tcp, tls) {
                Ok(listener) => tokio::spawn(serve(listener, router, cancel.clone())),
                Err(source) => {
                    if let Some(monitor) = monitor {
                        monitor.shutdown().await;
                    }
                    return Err(ServerError::Bind {
                        addr: local_addr.to_string(),
                        source,
                    });
                }
            },
            None => tokio::spawn(serve(tcp, router, cancel.clone())),
        };

        self.set_phase(ServerPhase::Listening);
        info!(
            address = %local_addr,
            tls = self.config.tls_enabled(),
            queue_mode = self.config.queue_mode(),
            "bootstrap complete"
        );

        Ok(RunningServer {
            local_addr,
            tls: self.config.tls_enabled(),
            shutdown_grace: self.config.shutdown_grace,
            gate,
            monitor,
            cancel,
            serve_task,
            phase: self.phase,
        })
    }

    async fn bind(&self) -> Result<TcpListener> {
        let listener = &self.config.listener;
        TcpListener::bind((listener.address.as_str(), listener.port))
            .await
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AddrInUse {
                    ServerError::AddressInUse {
                        addr: listener.display_addr(),
                        port: listener.port,
                    }
                } else {
                    ServerError::Bind {
                        addr: listener.display_addr(),
                        source,
                    }
                }
            })
    }
}

async fn not_found(uri: Uri) -> ServerError {
    ServerError::NotFound(uri.path().to_string())
}

async fn serve<L>(listener: L, router: Router, cancel: CancellationToken) -> io::Result<()>
where
    L: Listener,
    L::Addr: Debug,
{
    axum::serve(listener, router)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
}

/// A bound, accepting server.
pub struct RunningServer {
    local_addr: SocketAddr,
    tls: bool,
    shutdown_grace: Duration,
    gate: ReadinessGate,
    monitor: Option<MonitorHandle>,
    cancel: CancellationToken,
    serve_task: JoinHandle<io::Result<()>>,
    phase: watch::Sender<ServerPhase>,
}

impl RunningServer {
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_tls(&self) -> bool {
        self.tls
    }

    pub fn phase(&self) -> watch::Receiver<ServerPhase> {
        self.phase.subscribe()
    }

    pub fn readiness(&self) -> &ReadinessGate {
        &self.gate
    }

    /// Present in queue mode.
    pub fn monitor(&self) -> Option<&MonitorHandle> {
        self.monitor.as_ref()
    }

    /// Serve until `shutdown` completes or the queue monitor gives up.
    ///
    /// A requested shutdown gives in-flight requests the configured grace
    /// period. A queue outage only waits [`QUEUE_FATAL_GRACE`] and is returned
    /// as [`ServerError::QueueUnavailable`].
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let RunningServer {
            shutdown_grace,
            monitor,
            cancel,
            mut serve_task,
            phase,
            ..
        } = self;

        let queue_fatal = async {
            match &monitor {
                Some(monitor) => monitor.fatal().await,
                None => std::future::pending().await,
            }
        };

        let (outcome, grace) = tokio::select! {
            _ = shutdown => {
                info!("shutdown requested");
                (Ok(()), shutdown_grace)
            }
            _ = queue_fatal => {
                error!("queue backend unavailable, shutting down");
                (
                    Err(ServerError::QueueUnavailable),
                    shutdown_grace.min(QUEUE_FATAL_GRACE),
                )
            }
        };

        phase.send_replace(ServerPhase::ShuttingDown);
        cancel.cancel();

        match tokio::time::timeout(grace, &mut serve_task).await {
            Ok(Ok(Ok(()))) => debug!("listener drained"),
            Ok(Ok(Err(e))) => warn!(error = %e, "server error during shutdown"),
            Ok(Err(e)) => warn!(error = %e, "server task failed"),
            Err(_) => {
                warn!(
                    grace_secs = grace.as_secs_f64(),
                    "in-flight requests still running after the grace period, dropping them"
                );
                serve_task.abort();
            }
        }

        if let Some(monitor) = monitor {
            monitor.shutdown().await;
        }
        phase.send_replace(ServerPhase::Stopped);
        info!("server stopped");

        outcome
    }
}
