//! Server configuration.
//!
//! [`ServerConfig`] is the resolved, immutable form of the file/env config:
//! optional subsystems (TLS, queue supervision, test webhooks) are decided
//! once here and never re-evaluated while the listener is live.

use std::path::PathBuf;
use std::time::Duration;

use hookgate_config::{EndpointsConfig, ExecutionMode, HookgateConfig, Protocol};
use hookgate_queue::{RedisSettings, RetryPolicy};

/// Default time in-flight requests get after shutdown starts (30 seconds).
pub const DEFAULT_SHUTDOWN_GRACE: Duration = Duration::from_secs(30);

/// Default max webhook payload size (16 MB).
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 16 * 1024 * 1024;

/// Plain TCP or TLS.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenerProtocol {
    Plain,
    Tls { key: PathBuf, cert: PathBuf },
}

/// Where and how to listen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListenerConfig {
    pub protocol: ListenerProtocol,
    pub address: String,
    pub port: u16,
}

impl ListenerConfig {
    /// `address:port`, bracketing IPv6 literals.
    pub fn display_addr(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            protocol: ListenerProtocol::Plain,
            address: hookgate_config::defaults::LISTEN_ADDRESS.to_string(),
            port: hookgate_config::defaults::PORT,
        }
    }
}

/// Queue backend supervision settings, present only in queue mode.
#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub redis: RedisSettings,
    pub policy: RetryPolicy,
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listener: ListenerConfig,

    /// URL prefixes for the REST API and each webhook lifecycle.
    pub endpoints: EndpointsConfig,

    /// Serve active and waiting webhooks.
    pub webhooks_enabled: bool,

    /// Serve test webhooks and the test-webhook cancel endpoint.
    pub test_webhooks_enabled: bool,

    /// `Some` in queue mode.
    pub queue: Option<QueueSettings>,

    /// How long in-flight requests may run after shutdown starts.
    pub shutdown_grace: Duration,

    /// Maximum request body size in bytes.
    pub max_payload_size: usize,

    /// Enable request logging.
    pub request_logging: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listener: ListenerConfig::default(),
            endpoints: EndpointsConfig::default(),
            webhooks_enabled: true,
            test_webhooks_enabled: true,
            queue: None,
            shutdown_grace: DEFAULT_SHUTDOWN_GRACE,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            request_logging: true,
        }
    }
}

impl ServerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a loaded config into its runtime form.
    pub fn from_config(config: &HookgateConfig) -> hookgate_config::Result<Self> {
        config.validate()?;

        let server = config.server();
        let protocol = match (server.protocol, server.ssl_key, server.ssl_cert) {
            (Protocol::Https, Some(key), Some(cert)) => ListenerProtocol::Tls { key, cert },
            _ => ListenerProtocol::Plain,
        };

        let queue = match config.executions().mode {
            ExecutionMode::Direct => None,
            ExecutionMode::Queue => {
                let redis = config.queue().redis;
                let nodes = redis.parsed_cluster_nodes()?;
                let settings = if nodes.is_empty() {
                    RedisSettings::single(redis.host.clone(), redis.port).with_db(redis.db)
                } else {
                    RedisSettings::cluster(nodes)
                };
                Some(QueueSettings {
                    redis: settings
                        .with_credentials(redis.username, redis.password)
                        .with_connect_timeout(Duration::from_millis(redis.connect_timeout_ms))
                        .with_keepalive_interval(Duration::from_secs(redis.keepalive_secs.max(1))),
                    policy: RetryPolicy::with_threshold(Duration::from_millis(
                        redis.timeout_threshold_ms,
                    )),
                })
            }
        };

        let webhooks = config.webhooks();
        Ok(Self {
            listener: ListenerConfig {
                protocol,
                address: server.listen_address,
                port: server.port,
            },
            endpoints: config.endpoints(),
            webhooks_enabled: webhooks.enabled,
            test_webhooks_enabled: webhooks.test_enabled,
            queue,
            shutdown_grace: Duration::from_secs(server.shutdown_grace_secs),
            max_payload_size: (server.max_payload_mb as usize).saturating_mul(1024 * 1024),
            request_logging: true,
        })
    }

    /// Set the bind address and port.
    pub fn with_listen(mut self, address: impl Into<String>, port: u16) -> Self {
        self.listener.address = address.into();
        self.listener.port = port;
        self
    }

    /// Serve over TLS with the given PEM files.
    pub fn with_tls(mut self, key: impl Into<PathBuf>, cert: impl Into<PathBuf>) -> Self {
        self.listener.protocol = ListenerProtocol::Tls {
            key: key.into(),
            cert: cert.into(),
        };
        self
    }

    pub fn with_endpoints(mut self, endpoints: EndpointsConfig) -> Self {
        self.endpoints = endpoints;
        self
    }

    pub fn with_webhooks(mut self, enabled: bool) -> Self {
        self.webhooks_enabled = enabled;
        self
    }

    pub fn with_test_webhooks(mut self, enabled: bool) -> Self {
        self.test_webhooks_enabled = enabled;
        self
    }

    /// Enable queue mode.
    pub fn with_queue(mut self, redis: RedisSettings, policy: RetryPolicy) -> Self {
        self.queue = Some(QueueSettings { redis, policy });
        self
    }

    pub fn with_shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    pub fn with_max_payload_size(mut self, size: usize) -> Self {
        self.max_payload_size = size;
        self
    }

    pub fn with_request_logging(mut self, enabled: bool) -> Self {
        self.request_logging = enabled;
        self
    }

    pub fn queue_mode(&self) -> bool {
        self.queue.is_some()
    }

    pub fn tls_enabled(&self) -> bool {
        matches!(self.listener.protocol, ListenerProtocol::Tls { .. })
    }
}
