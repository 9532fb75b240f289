//! Configuration system for the hookgate webhook server.
//!
//! Provides TOML-based configuration with:
//! - Listener settings (`[server]`): protocol, bind address, TLS material
//! - URL prefixes for every webhook lifecycle (`[endpoints]`)
//! - Execution mode and queue backend settings (`[executions]`, `[queue.redis]`)
//! - Config file layering (user config dir + project-local overrides)
//! - `HOOKGATE_*` environment overrides applied on top of the files

pub mod discovery;
pub mod env;
pub mod error;
pub mod types;

pub use discovery::{
    ConfigSource, LoadedConfig, config_dir, load_config, load_config_file,
    load_config_with_options, user_config_path,
};
pub use env::{apply_env_overrides, apply_process_env};
pub use error::{ConfigError, Result};
pub use types::*;
