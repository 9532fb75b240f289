//! Start command - launches the webhook server.

use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use tracing::{error, info};

use hookgate_server::{Registries, ServerBootstrap, ServerConfig, StorageState};

use super::Context;

/// Arguments for the start command.
///
/// CLI arguments override config file values and `HOOKGATE_*` variables.
#[derive(Args, Debug)]
pub struct StartArgs {
    /// Port to listen on (overrides config)
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Address to bind to (overrides config)
    #[arg(short, long)]
    pub listen: Option<String>,

    /// Disable the per-request access log
    #[arg(long)]
    pub no_request_log: bool,
}

/// Run the start command.
pub async fn run(args: StartArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.clone();
    if let Some(port) = args.port {
        config.server_mut().port = port;
    }
    if let Some(listen) = args.listen {
        config.server_mut().listen_address = listen;
    }

    let server_config =
        ServerConfig::from_config(&config)?.with_request_logging(!args.no_request_log);

    if ctx.verbose {
        for source in ctx.loaded.loaded_from() {
            info!(path = %source.display(), "config file loaded");
        }
    }
    info!(
        listen = %server_config.listener.display_addr(),
        tls = server_config.tls_enabled(),
        queue_mode = server_config.queue_mode(),
        "starting hookgate"
    );

    // Storage and workflow registries belong to collaborators that are not
    // wired in yet; the server runs with ready storage and empty registries.
    let bootstrap = ServerBootstrap::new(
        server_config,
        Arc::new(StorageState::ready()),
        Registries::in_memory(),
    );

    let server = match bootstrap.start().await {
        Ok(server) => server,
        Err(e) => {
            error!(error = %e, "server failed to start");
            return Err(e.into());
        }
    };

    let scheme = if server.is_tls() { "https" } else { "http" };
    println!("hookgate listening on {}://{}", scheme, server.local_addr());

    if let Err(e) = server.run_until(shutdown_signal()).await {
        error!(error = %e, "server stopped");
        return Err(e.into());
    }

    info!("hookgate stopped");
    Ok(())
}

/// Resolves on Ctrl-C, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received ctrl-c, shutting down"),
        _ = terminate => info!("received SIGTERM, shutting down"),
    }
}
