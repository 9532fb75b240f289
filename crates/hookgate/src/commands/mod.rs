//! CLI command handlers.

use hookgate_config::LoadedConfig;

pub mod config;
pub mod start;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Configuration resolved from files and `HOOKGATE_*` variables.
    pub loaded: LoadedConfig,
    /// Verbose output enabled.
    pub verbose: bool,
}
