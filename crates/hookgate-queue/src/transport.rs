//! Transport abstraction and the reconnect loop.
//!
//! A [`QueueTransport`] knows how to open one session. The [`Reconnector`]
//! owns the retry loop and defers every "how long until the next attempt"
//! decision to a [`ReconnectHook`].

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{TransportError, TransportErrorKind};

/// Something that can open a connection to the queue backend.
#[async_trait]
pub trait QueueTransport: Send + Sync + 'static {
    /// Human-readable target, e.g. `redis://localhost:6379` or `cluster(3 nodes)`.
    fn describe(&self) -> String;

    /// Open a session. Returns once the backend has answered the handshake.
    async fn connect(&self) -> Result<QueueSession, TransportError>;
}

#[async_trait]
impl QueueTransport for Box<dyn QueueTransport> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    async fn connect(&self) -> Result<QueueSession, TransportError> {
        (**self).connect().await
    }
}

/// An established connection.
///
/// [`closed`](QueueSession::closed) resolves with the error that ended the
/// session. Dropping the session tears down its background task.
#[derive(Debug)]
pub struct QueueSession {
    node: String,
    closed: oneshot::Receiver<TransportError>,
    task: Option<JoinHandle<()>>,
}

impl QueueSession {
    pub fn new(node: impl Into<String>, closed: oneshot::Receiver<TransportError>) -> Self {
        Self {
            node: node.into(),
            closed,
            task: None,
        }
    }

    /// Attach the task that keeps the session alive.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    /// The node this session is connected to.
    pub fn node(&self) -> &str {
        &self.node
    }

    /// Wait until the session ends.
    pub async fn closed(&mut self) -> TransportError {
        match (&mut self.closed).await {
            Ok(err) => err,
            Err(_) => TransportError::new(
                TransportErrorKind::Closed,
                self.node.clone(),
                "session task ended",
            ),
        }
    }
}

impl Drop for QueueSession {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Callbacks the reconnect loop invokes.
pub trait ReconnectHook: Send {
    fn on_connected(&mut self, node: &str);

    fn on_disconnected(&mut self, error: &TransportError);

    fn on_connect_error(&mut self, error: &TransportError);

    /// Delay before the next attempt, or `None` to stop retrying.
    fn retry_delay(&mut self, error: &TransportError) -> Option<Duration>;
}

/// Drives a transport through connect/disconnect cycles.
pub struct Reconnector<T> {
    transport: T,
    cancel: CancellationToken,
}

impl<T: QueueTransport> Reconnector<T> {
    pub fn new(transport: T, cancel: CancellationToken) -> Self {
        Self { transport, cancel }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Run until cancelled or until the hook declines to retry.
    pub async fn run<H: ReconnectHook>(&self, hook: &mut H) {
        loop {
            let attempt = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                attempt = self.transport.connect() => attempt,
            };

            let error = match attempt {
                Ok(mut session) => {
                    hook.on_connected(session.node());
                    let error = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => return,
                        error = session.closed() => error,
                    };
                    hook.on_disconnected(&error);
                    error
                }
                Err(error) => {
                    hook.on_connect_error(&error);
                    error
                }
            };

            let Some(delay) = hook.retry_delay(&error) else {
                return;
            };

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
