//! Configuration error types.

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur during configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Failed to serialize config.
    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    /// An environment variable held a value that could not be parsed.
    #[error("invalid value '{value}' for environment variable {var}: {reason}")]
    InvalidEnv {
        var: String,
        value: String,
        reason: String,
    },

    /// An endpoint prefix is empty, contains a slash, or collides with another one.
    #[error("invalid endpoint '{name}': {reason}")]
    InvalidEndpoint { name: String, reason: String },

    /// HTTPS was requested but key or certificate is missing.
    #[error("protocol https requires both server.ssl_key and server.ssl_cert")]
    MissingTlsMaterial,

    /// A queue cluster node is not in `host:port` form.
    #[error("invalid cluster node '{0}', expected host:port")]
    InvalidClusterNode(String),
}
