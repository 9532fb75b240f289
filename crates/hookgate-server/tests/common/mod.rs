//! Common test utilities for integration tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use reqwest::Client;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use hookgate_server::{
    InMemoryRegistry, InMemoryTestRegistry, Lifecycle, Registries, ServerBootstrap, ServerConfig,
    ServerPhase, StorageState, WebhookError, WebhookHandler, WebhookReply, WebhookRequest,
    WebhookResponse, handler_fn,
};

/// A server running in the background on an ephemeral port.
pub struct TestServer {
    /// The server's address.
    pub addr: SocketAddr,
    /// HTTP client configured for this server.
    pub client: Client,
    pub storage: Arc<StorageState>,
    pub active: Arc<InMemoryRegistry>,
    pub waiting: Arc<InMemoryRegistry>,
    pub test: Arc<InMemoryTestRegistry>,
    pub phase: watch::Receiver<ServerPhase>,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<hookgate_server::Result<()>>,
}

/// Loopback, ephemeral port, no request logging.
pub fn local_config() -> ServerConfig {
    ServerConfig::new()
        .with_listen("127.0.0.1", 0)
        .with_request_logging(false)
}

impl TestServer {
    /// Start with default configuration and ready storage.
    pub async fn start() -> Result<Self> {
        Self::start_with(local_config(), StorageState::ready()).await
    }

    pub async fn start_with(config: ServerConfig, storage: StorageState) -> Result<Self> {
        Self::start_customized(config, storage, |bootstrap| bootstrap).await
    }

    /// Start after letting the caller adjust the bootstrap.
    pub async fn start_customized<F>(
        config: ServerConfig,
        storage: StorageState,
        customize: F,
    ) -> Result<Self>
    where
        F: FnOnce(ServerBootstrap) -> ServerBootstrap,
    {
        let storage = Arc::new(storage);
        let active = Arc::new(InMemoryRegistry::new(Lifecycle::Active));
        let waiting = Arc::new(InMemoryRegistry::new(Lifecycle::Waiting));
        let test = Arc::new(InMemoryTestRegistry::new());
        let registries =
            Registries::new(active.clone(), waiting.clone()).with_test(test.clone());

        let bootstrap = customize(ServerBootstrap::new(config, storage.clone(), registries));
        let phase = bootstrap.phase();
        let server = bootstrap.start().await?;
        let addr = server.local_addr();

        let (tx, rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.run_until(async move {
            let _ = rx.await;
        }));

        let client = Client::new();
        wait_for_server(&client, addr).await?;

        Ok(Self {
            addr,
            client,
            storage,
            active,
            waiting,
            test,
            phase,
            shutdown: Some(tx),
            handle,
        })
    }

    /// Get the base URL for the server.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url(), path)
    }

    /// Signal shutdown without waiting for it.
    pub fn trigger_shutdown(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }

    /// Shut down and return what `run_until` returned.
    pub async fn stop(mut self) -> Result<hookgate_server::Result<()>> {
        self.trigger_shutdown();
        Ok(self.handle.await?)
    }

    /// Wait for the server to stop on its own.
    pub async fn wait(self, limit: Duration) -> Result<hookgate_server::Result<()>> {
        Ok(timeout(limit, self.handle).await??)
    }
}

/// Answers every call with `label` and the matched path.
pub fn tag(label: &'static str) -> Arc<dyn WebhookHandler> {
    handler_fn(move |request: WebhookRequest| async move {
        Ok::<_, WebhookError>(WebhookReply::Immediate(WebhookResponse::text(
            reqwest::StatusCode::OK,
            format!("{} {}", label, request.route_key().full_path()),
        )))
    })
}

/// Echoes the request body back unchanged.
pub fn echo() -> Arc<dyn WebhookHandler> {
    handler_fn(|request: WebhookRequest| async move {
        Ok::<_, WebhookError>(WebhookReply::Immediate(
            WebhookResponse::ok().with_body(request.body),
        ))
    })
}

/// Sleeps before answering.
pub fn slow(delay: Duration) -> Arc<dyn WebhookHandler> {
    handler_fn(move |_request: WebhookRequest| async move {
        tokio::time::sleep(delay).await;
        Ok::<_, WebhookError>(WebhookReply::Immediate(WebhookResponse::text(
            reqwest::StatusCode::OK,
            "finished",
        )))
    })
}

/// A port nothing is listening on.
pub async fn unused_port() -> Result<u16> {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    Ok(listener.local_addr()?.port())
}

/// Wait for the server to become ready.
async fn wait_for_server(client: &Client, addr: SocketAddr) -> Result<()> {
    let url = format!("http://{}/healthz", addr);

    let result = timeout(Duration::from_secs(5), async {
        loop {
            match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => return,
                _ => tokio::time::sleep(Duration::from_millis(50)).await,
            }
        }
    })
    .await;

    match result {
        Ok(()) => Ok(()),
        Err(_) => anyhow::bail!("Timeout waiting for server to start"),
    }
}
