//! Configuration types mapping to the TOML schema.
//!
//! Top-level config:
//! ```toml
//! [server]          # listener: protocol, address, port, TLS material
//! [endpoints]       # URL prefixes for REST and webhook lifecycles
//! [webhooks]        # which webhook lifecycles are served
//! [executions]      # direct or queue mode
//! [queue.redis]     # queue backend connection
//! [logging]         # log level and JSON file output
//! ```

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, Result};

/// Built-in default values.
pub mod defaults {
    pub const PORT: u16 = 5678;
    pub const LISTEN_ADDRESS: &str = "0.0.0.0";
    pub const SHUTDOWN_GRACE_SECS: u64 = 30;
    pub const MAX_PAYLOAD_MB: u64 = 16;

    pub const ENDPOINT_REST: &str = "rest";
    pub const ENDPOINT_WEBHOOK: &str = "webhook";
    pub const ENDPOINT_WEBHOOK_TEST: &str = "webhook-test";
    pub const ENDPOINT_WEBHOOK_WAITING: &str = "webhook-waiting";

    pub const REDIS_HOST: &str = "localhost";
    pub const REDIS_PORT: u16 = 6379;
    pub const REDIS_TIMEOUT_THRESHOLD_MS: u64 = 10_000;
    pub const REDIS_KEEPALIVE_SECS: u64 = 5;
    pub const REDIS_CONNECT_TIMEOUT_MS: u64 = 5_000;

    pub const LOG_LEVEL: &str = "info";
}

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g. project-local
/// overrides) can be loaded and merged. Use the accessor methods to read a
/// section with defaults filled in.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HookgateConfig {
    pub server: Option<ServerSection>,
    pub endpoints: Option<EndpointsConfig>,
    pub webhooks: Option<WebhooksConfig>,
    pub executions: Option<ExecutionsConfig>,
    pub queue: Option<QueueConfig>,
    pub logging: Option<LoggingConfig>,
}

impl HookgateConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced wholesale, not merged field by field.
    pub fn merge(&mut self, other: HookgateConfig) {
        if other.server.is_some() {
            self.server = other.server;
        }
        if other.endpoints.is_some() {
            self.endpoints = other.endpoints;
        }
        if other.webhooks.is_some() {
            self.webhooks = other.webhooks;
        }
        if other.executions.is_some() {
            self.executions = other.executions;
        }
        if other.queue.is_some() {
            self.queue = other.queue;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    pub fn server(&self) -> ServerSection {
        self.server.clone().unwrap_or_default()
    }

    pub fn endpoints(&self) -> EndpointsConfig {
        self.endpoints.clone().unwrap_or_default()
    }

    pub fn webhooks(&self) -> WebhooksConfig {
        self.webhooks.clone().unwrap_or_default()
    }

    pub fn executions(&self) -> ExecutionsConfig {
        self.executions.clone().unwrap_or_default()
    }

    pub fn queue(&self) -> QueueConfig {
        self.queue.clone().unwrap_or_default()
    }

    pub fn logging(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// Mutable access to the `[server]` section, creating it with defaults.
    pub fn server_mut(&mut self) -> &mut ServerSection {
        self.server.get_or_insert_with(ServerSection::default)
    }

    pub fn endpoints_mut(&mut self) -> &mut EndpointsConfig {
        self.endpoints.get_or_insert_with(EndpointsConfig::default)
    }

    pub fn webhooks_mut(&mut self) -> &mut WebhooksConfig {
        self.webhooks.get_or_insert_with(WebhooksConfig::default)
    }

    pub fn executions_mut(&mut self) -> &mut ExecutionsConfig {
        self.executions.get_or_insert_with(ExecutionsConfig::default)
    }

    pub fn redis_mut(&mut self) -> &mut RedisConfig {
        &mut self.queue.get_or_insert_with(QueueConfig::default).redis
    }

    /// Check cross-field constraints that serde cannot express.
    pub fn validate(&self) -> Result<()> {
        self.endpoints().validate()?;

        let server = self.server();
        if server.protocol == Protocol::Https
            && (server.ssl_key.is_none() || server.ssl_cert.is_none())
        {
            return Err(ConfigError::MissingTlsMaterial);
        }

        self.queue().redis.parsed_cluster_nodes()?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Listener protocol.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    #[default]
    Http,
    Https,
}

impl std::str::FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            other => Err(format!("unknown protocol '{}', expected http or https", other)),
        }
    }
}

/// The `[server]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub protocol: Protocol,
    /// Address to bind to.
    pub listen_address: String,
    /// Port to listen on.
    pub port: u16,
    /// PEM private key, required for https.
    pub ssl_key: Option<PathBuf>,
    /// PEM certificate chain, required for https.
    pub ssl_cert: Option<PathBuf>,
    /// Seconds in-flight requests get to finish after shutdown starts.
    pub shutdown_grace_secs: u64,
    /// Maximum request body size in megabytes.
    pub max_payload_mb: u64,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            protocol: Protocol::Http,
            listen_address: defaults::LISTEN_ADDRESS.to_string(),
            port: defaults::PORT,
            ssl_key: None,
            ssl_cert: None,
            shutdown_grace_secs: defaults::SHUTDOWN_GRACE_SECS,
            max_payload_mb: defaults::MAX_PAYLOAD_MB,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Endpoints
// ─────────────────────────────────────────────────────────────────────────────

/// URL prefixes (single path segment, no slashes).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointsConfig {
    pub rest: String,
    pub webhook: String,
    pub webhook_test: String,
    pub webhook_waiting: String,
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            rest: defaults::ENDPOINT_REST.to_string(),
            webhook: defaults::ENDPOINT_WEBHOOK.to_string(),
            webhook_test: defaults::ENDPOINT_WEBHOOK_TEST.to_string(),
            webhook_waiting: defaults::ENDPOINT_WEBHOOK_WAITING.to_string(),
        }
    }
}

impl EndpointsConfig {
    fn named(&self) -> [(&'static str, &str); 4] {
        [
            ("rest", &self.rest),
            ("webhook", &self.webhook),
            ("webhook_test", &self.webhook_test),
            ("webhook_waiting", &self.webhook_waiting),
        ]
    }

    /// Every prefix must be a non-empty single segment and distinct from the others.
    pub fn validate(&self) -> Result<()> {
        let named = self.named();
        for (i, (name, value)) in named.iter().enumerate() {
            if value.is_empty() {
                return Err(ConfigError::InvalidEndpoint {
                    name: name.to_string(),
                    reason: "must not be empty".to_string(),
                });
            }
            if value.contains('/') || value.contains('{') || value.contains('}') {
                return Err(ConfigError::InvalidEndpoint {
                    name: name.to_string(),
                    reason: format!("'{}' must be a single path segment", value),
                });
            }
            if let Some((other, _)) = named[..i].iter().find(|(_, v)| v == value) {
                return Err(ConfigError::InvalidEndpoint {
                    name: name.to_string(),
                    reason: format!("'{}' is already used by {}", value, other),
                });
            }
        }
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Webhooks / executions
// ─────────────────────────────────────────────────────────────────────────────

/// The `[webhooks]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhooksConfig {
    /// Serve active and waiting webhooks.
    pub enabled: bool,
    /// Serve test webhooks (disable in production-like deployments).
    pub test_enabled: bool,
}

impl Default for WebhooksConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            test_enabled: true,
        }
    }
}

/// How workflow executions are dispatched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// In-process execution.
    #[default]
    #[serde(alias = "regular")]
    Direct,
    /// Distributed execution through the queue backend.
    Queue,
}

impl std::str::FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" | "regular" => Ok(ExecutionMode::Direct),
            "queue" => Ok(ExecutionMode::Queue),
            other => Err(format!("unknown execution mode '{}', expected direct or queue", other)),
        }
    }
}

/// The `[executions]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionsConfig {
    pub mode: ExecutionMode,
}

// ─────────────────────────────────────────────────────────────────────────────
// Queue
// ─────────────────────────────────────────────────────────────────────────────

/// The `[queue]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub redis: RedisConfig,
}

/// The `[queue.redis]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: u32,
    pub username: Option<String>,
    pub password: Option<String>,
    /// `host:port` entries; non-empty selects cluster topology.
    pub cluster_nodes: Vec<String>,
    /// Cumulative downtime after which the process gives up.
    pub timeout_threshold_ms: u64,
    /// Interval between keepalive pings on an established connection.
    pub keepalive_secs: u64,
    pub connect_timeout_ms: u64,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: defaults::REDIS_HOST.to_string(),
            port: defaults::REDIS_PORT,
            db: 0,
            username: None,
            password: None,
            cluster_nodes: Vec::new(),
            timeout_threshold_ms: defaults::REDIS_TIMEOUT_THRESHOLD_MS,
            keepalive_secs: defaults::REDIS_KEEPALIVE_SECS,
            connect_timeout_ms: defaults::REDIS_CONNECT_TIMEOUT_MS,
        }
    }
}

impl RedisConfig {
    /// Split `cluster_nodes` into `(host, port)` pairs.
    pub fn parsed_cluster_nodes(&self) -> Result<Vec<(String, u16)>> {
        self.cluster_nodes
            .iter()
            .map(|node| {
                let (host, port) = node
                    .trim()
                    .rsplit_once(':')
                    .ok_or_else(|| ConfigError::InvalidClusterNode(node.clone()))?;
                let port = port
                    .parse::<u16>()
                    .map_err(|_| ConfigError::InvalidClusterNode(node.clone()))?;
                if host.is_empty() {
                    return Err(ConfigError::InvalidClusterNode(node.clone()));
                }
                Ok((host.to_string(), port))
            })
            .collect()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// The `[logging]` section.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Console filter level (overridden by `RUST_LOG`).
    pub level: String,
    /// Write a rotating JSON log file.
    pub json_file: bool,
    /// Directory for JSON log files (default: `<config dir>/logs`).
    pub dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_file: true,
            dir: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_config_uses_defaults() {
        let config = HookgateConfig::from_toml("").unwrap();
        assert_eq!(config.server().port, 5678);
        assert_eq!(config.endpoints().webhook, "webhook");
        assert_eq!(config.endpoints().webhook_waiting, "webhook-waiting");
        assert_eq!(config.executions().mode, ExecutionMode::Direct);
        assert_eq!(config.queue().redis.timeout_threshold_ms, 10_000);
        assert!(config.webhooks().test_enabled);
        config.validate().unwrap();
    }

    #[test]
    fn test_parse_full_config() {
        let config = HookgateConfig::from_toml(
            r#"
[server]
protocol = "https"
port = 8443
ssl_key = "/etc/hookgate/key.pem"
ssl_cert = "/etc/hookgate/cert.pem"

[endpoints]
webhook = "hooks"

[webhooks]
test_enabled = false

[executions]
mode = "queue"

[queue.redis]
host = "redis.internal"
cluster_nodes = ["a:7000", "b:7001"]
timeout_threshold_ms = 2500
"#,
        )
        .unwrap();

        let server = config.server();
        assert_eq!(server.protocol, Protocol::Https);
        assert_eq!(server.port, 8443);
        assert_eq!(config.endpoints().webhook, "hooks");
        assert_eq!(config.endpoints().rest, "rest");
        assert!(!config.webhooks().test_enabled);
        assert_eq!(config.executions().mode, ExecutionMode::Queue);

        let redis = config.queue().redis;
        assert_eq!(redis.host, "redis.internal");
        assert_eq!(redis.timeout_threshold_ms, 2500);
        assert_eq!(
            redis.parsed_cluster_nodes().unwrap(),
            vec![("a".to_string(), 7000), ("b".to_string(), 7001)]
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_regular_mode_alias() {
        let config = HookgateConfig::from_toml("[executions]\nmode = \"regular\"\n").unwrap();
        assert_eq!(config.executions().mode, ExecutionMode::Direct);
    }

    #[test]
    fn test_merge_replaces_sections() {
        let mut base = HookgateConfig::from_toml("[server]\nport = 1000\n").unwrap();
        let overlay = HookgateConfig::from_toml("[executions]\nmode = \"queue\"\n").unwrap();
        base.merge(overlay);
        assert_eq!(base.server().port, 1000);
        assert_eq!(base.executions().mode, ExecutionMode::Queue);

        let overlay = HookgateConfig::from_toml("[server]\nport = 2000\n").unwrap();
        base.merge(overlay);
        assert_eq!(base.server().port, 2000);
    }

    #[test]
    fn test_validate_rejects_duplicate_endpoints() {
        let config =
            HookgateConfig::from_toml("[endpoints]\nwebhook = \"hooks\"\nwebhook_test = \"hooks\"\n")
                .unwrap();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEndpoint { ref name, .. } if name == "webhook_test"));
    }

    #[test]
    fn test_validate_rejects_nested_endpoint() {
        let config = HookgateConfig::from_toml("[endpoints]\nrest = \"api/v1\"\n").unwrap();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidEndpoint { .. })
        ));
    }

    #[test]
    fn test_validate_https_requires_material() {
        let config = HookgateConfig::from_toml(
            "[server]\nprotocol = \"https\"\nssl_cert = \"/tmp/cert.pem\"\n",
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::MissingTlsMaterial)));
    }

    #[test]
    fn test_invalid_cluster_node() {
        let redis = RedisConfig {
            cluster_nodes: vec!["no-port".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            redis.parsed_cluster_nodes(),
            Err(ConfigError::InvalidClusterNode(_))
        ));
    }

    #[test]
    fn test_roundtrip_toml() {
        let mut config = HookgateConfig::new();
        config.server_mut().port = 9000;
        config.redis_mut().cluster_nodes = vec!["n1:7000".to_string()];
        let parsed = HookgateConfig::from_toml(&config.to_toml().unwrap()).unwrap();
        assert_eq!(parsed, config);
    }
}
