//! hookgate - webhook dispatch server
//!
//! Main entry point for the hookgate CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_appender::non_blocking::WorkerGuard;

use hookgate_config::{LoadedConfig, LoggingConfig};

mod commands;

use commands::{config, start};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// hookgate - webhook dispatch server
#[derive(Parser)]
#[command(name = "hookgate")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Use this config file instead of discovering one
    #[arg(short, long, global = true, env = "HOOKGATE_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the webhook server
    Start(start::StartArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut loaded = match &cli.config {
        Some(path) => LoadedConfig::from_file(path)?,
        None => hookgate_config::load_config(None)?,
    };
    for warning in &loaded.warnings {
        eprintln!("warning: {}", warning);
    }
    hookgate_config::apply_process_env(&mut loaded.config)?;

    let _guard = init_tracing(cli.verbose, &loaded.config.logging());

    let ctx = commands::Context {
        loaded,
        verbose: cli.verbose,
    };

    match cli.command {
        Commands::Start(args) => start::run(args, &ctx).await,
        Commands::Config(args) => config::run(args, &ctx).await,
    }
}

/// Console (human-readable) plus an optional daily-rotated JSON file.
///
/// The returned guard flushes the file writer when dropped.
fn init_tracing(verbose: bool, logging: &LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::EnvFilter;
    use tracing_subscriber::prelude::*;

    let filter = if verbose {
        "hookgate=debug,hookgate_server=debug,hookgate_queue=debug,hookgate_config=debug,info"
            .to_string()
    } else {
        let level = &logging.level;
        format!(
            "hookgate={level},hookgate_server={level},hookgate_queue={level},hookgate_config={level},warn"
        )
    };
    let console_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&filter));

    let (file_layer, guard) = if logging.json_file {
        let log_dir = logging
            .dir
            .clone()
            .or_else(|| hookgate_config::config_dir().map(|d| d.join("logs")))
            .unwrap_or_else(|| PathBuf::from("logs"));
        let file_appender = tracing_appender::rolling::daily(&log_dir, "hookgate.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_writer(non_blocking)
            .with_filter(EnvFilter::new(
                "hookgate=trace,hookgate_server=trace,hookgate_queue=trace,hookgate_config=trace,info",
            ));
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .with(file_layer)
        .init();

    guard
}
