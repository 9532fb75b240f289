//! Config command - configuration inspection.

use anyhow::Result;
use clap::{Args, Subcommand};

use hookgate_config::HookgateConfig;

use super::Context;

const REDACTED: &str = "********";

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration, defaults included
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Show the user configuration file path
    Path,
}

/// Run the config command.
pub async fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx).await,
        ConfigCommand::Which => cmd_which(ctx).await,
        ConfigCommand::Path => cmd_path().await,
    }
}

async fn cmd_show(ctx: &Context) -> Result<()> {
    let loaded = &ctx.loaded;
    loaded.config.validate()?;

    println!("# hookgate configuration");

    let sources = loaded.loaded_from();
    if sources.is_empty() {
        println!("# No config files loaded (using defaults)");
    } else {
        for source in &sources {
            println!("# loaded: {}", source.display());
        }
    }
    println!();

    print!("{}", resolved(&loaded.config).to_toml()?);
    Ok(())
}

/// Every section present, secrets masked.
fn resolved(config: &HookgateConfig) -> HookgateConfig {
    let mut queue = config.queue();
    if queue.redis.password.is_some() {
        queue.redis.password = Some(REDACTED.to_string());
    }
    HookgateConfig {
        server: Some(config.server()),
        endpoints: Some(config.endpoints()),
        webhooks: Some(config.webhooks()),
        executions: Some(config.executions()),
        queue: Some(queue),
        logging: Some(config.logging()),
    }
}

async fn cmd_which(ctx: &Context) -> Result<()> {
    println!("Config file search order (later overrides earlier):\n");

    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            "✓ loaded"
        } else {
            "· not found"
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Using built-in defaults.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }

    Ok(())
}

async fn cmd_path() -> Result<()> {
    if let Some(path) = hookgate_config::user_config_path() {
        println!("{}", path.display());
    } else {
        eprintln!("Could not determine config directory");
    }
    Ok(())
}
