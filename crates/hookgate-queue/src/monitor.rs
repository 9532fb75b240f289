//! Queue connection supervision.
//!
//! The monitor never retries on its own. It plugs a [`ReconnectHook`] into
//! the transport's [`Reconnector`]; every failed attempt or dropped session
//! asks the hook for a delay, and the hook asks the [`RetryPolicy`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TransportError;
use crate::retry::{RetryPolicy, RetryWindow};
use crate::transport::{QueueTransport, ReconnectHook, Reconnector};

/// Connection lifecycle as seen by the rest of the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Not started, or stopped.
    Disconnected,
    /// Started, no session established yet.
    Connecting,
    Connected,
    /// Lost an established session; the transport is reconnecting.
    Degraded,
    /// Downtime exceeded the threshold. Terminal.
    Fatal,
}

/// Queue readiness flag. Written only by the monitor, read by anyone.
#[derive(Debug, Clone, Default)]
pub struct QueueReadiness(Arc<AtomicBool>);

impl QueueReadiness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_ready(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    fn set(&self, ready: bool) {
        self.0.store(ready, Ordering::Release);
    }
}

/// Supervises the queue backend connection.
pub struct QueueConnectionMonitor {
    policy: RetryPolicy,
    readiness: QueueReadiness,
    state: watch::Sender<MonitorState>,
}

impl QueueConnectionMonitor {
    pub fn new(policy: RetryPolicy) -> Self {
        let (state, _) = watch::channel(MonitorState::Disconnected);
        Self {
            policy,
            readiness: QueueReadiness::new(),
            state,
        }
    }

    /// Readiness flag to hand to the readiness gate before starting.
    pub fn readiness(&self) -> QueueReadiness {
        self.readiness.clone()
    }

    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    /// Begin connecting in the background.
    pub fn start<T: QueueTransport>(self, transport: T) -> MonitorHandle {
        let cancel = CancellationToken::new();
        let target = transport.describe();
        info!(backend = %target, "connecting to queue backend");

        self.state.send_replace(MonitorState::Connecting);
        let state_rx = self.state.subscribe();

        let state = Arc::new(self.state);
        let mut hook = MonitorHook {
            policy: self.policy,
            window: RetryWindow::default(),
            readiness: self.readiness.clone(),
            state: state.clone(),
            ever_connected: false,
        };
        let reconnector = Reconnector::new(transport, cancel.clone());
        let supervised = tokio::spawn(async move {
            reconnector.run(&mut hook).await;
        });

        let readiness = self.readiness.clone();
        let task = tokio::spawn(async move {
            match supervised.await {
                Ok(()) => {
                    if *state.borrow() != MonitorState::Fatal {
                        readiness.set(false);
                        state.send_replace(MonitorState::Disconnected);
                        debug!("queue monitor stopped");
                    }
                }
                Err(e) => {
                    // Nothing is reconnecting any more; treat it like an
                    // exhausted downtime budget.
                    readiness.set(false);
                    state.send_replace(MonitorState::Fatal);
                    error!(error = %e, "queue supervision task died, giving up");
                }
            }
        });

        MonitorHandle {
            state: state_rx,
            readiness: self.readiness,
            cancel,
            task,
        }
    }
}

/// Handle to a running monitor.
pub struct MonitorHandle {
    state: watch::Receiver<MonitorState>,
    readiness: QueueReadiness,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl MonitorHandle {
    pub fn state(&self) -> MonitorState {
        *self.state.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.readiness.is_ready()
    }

    pub fn readiness(&self) -> QueueReadiness {
        self.readiness.clone()
    }

    /// Watch state transitions.
    pub fn subscribe(&self) -> watch::Receiver<MonitorState> {
        self.state.clone()
    }

    /// Resolves once the monitor reaches [`MonitorState::Fatal`], including
    /// when the supervision task itself dies. Never resolves after a
    /// deliberate shutdown.
    pub async fn fatal(&self) {
        let mut rx = self.state.clone();
        if rx.wait_for(|s| *s == MonitorState::Fatal).await.is_err() {
            std::future::pending::<()>().await;
        }
    }

    /// Stop reconnecting and wait for the supervision task to exit.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            warn!(error = %e, "queue monitor task failed");
        }
    }
}

struct MonitorHook {
    policy: RetryPolicy,
    window: RetryWindow,
    readiness: QueueReadiness,
    state: Arc<watch::Sender<MonitorState>>,
    ever_connected: bool,
}

impl MonitorHook {
    fn transition(&self, next: MonitorState) {
        self.state.send_if_modified(|current| {
            if *current == next {
                return false;
            }
            *current = next;
            true
        });
    }
}

impl ReconnectHook for MonitorHook {
    fn on_connected(&mut self, node: &str) {
        self.ever_connected = true;
        self.readiness.set(true);
        self.transition(MonitorState::Connected);
        info!(node = %node, "queue backend connected");
    }

    fn on_disconnected(&mut self, error: &TransportError) {
        self.readiness.set(false);
        self.transition(MonitorState::Degraded);
        warn!(node = %error.node, error = %error, "lost connection to queue backend, reconnecting");
    }

    fn on_connect_error(&mut self, error: &TransportError) {
        self.readiness.set(false);
        if self.ever_connected {
            self.transition(MonitorState::Degraded);
        }
        if error.is_connection_refused() {
            debug!(node = %error.node, "queue backend refused connection");
        } else {
            warn!(node = %error.node, error = %error, "error connecting to queue backend");
        }
    }

    fn retry_delay(&mut self, _error: &TransportError) -> Option<Duration> {
        let decision = self.policy.next_delay(Instant::now(), &mut self.window);
        if decision.fatal {
            self.readiness.set(false);
            self.transition(MonitorState::Fatal);
            error!(
                downtime_ms = self.window.cumulative_downtime.as_millis() as u64,
                threshold_ms = self.policy.fatal_threshold.as_millis() as u64,
                "unable to reach queue backend within the downtime threshold, giving up"
            );
            return None;
        }

        debug!(
            delay_ms = decision.delay.as_millis() as u64,
            downtime_ms = self.window.cumulative_downtime.as_millis() as u64,
            "scheduling queue reconnect"
        );
        Some(decision.delay)
    }
}
