//! hearth-bot: connect to one IRC channel and answer the built-in commands.
//!
//!   !<nick> plugins            List loaded plugins
//!   !<nick> version [plugin]   Version of the bot or a plugin
//!   !<nick> source [plugin]    Where the code lives
//!   !<nick> about [plugin]     One-line description
//!   !<nick> help [command]     Command help
//!
//! Ctrl+C parts the channel and disconnects cleanly.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use hearth_bot::settings::{DEFAULT_SETTINGS_FILE, Settings};

#[derive(Parser)]
#[command(name = "hearth-bot", version, about = "Event-driven IRC bot")]
struct Args {
    /// Settings file. Relative paths resolve against --root.
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Root directory for settings and plugin data
    #[arg(long, env = "HEARTH_ROOT", default_value = ".")]
    root: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let json_logs = std::env::var("HEARTH_LOG_JSON").unwrap_or_default() == "1";
    let filter = EnvFilter::from_default_env()
        .add_directive("hearth_core=info".parse()?)
        .add_directive("hearth_bot=info".parse()?);
    if json_logs {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .init();
    }

    let args = Args::parse();
    let config_path = args.root.join(&args.config);
    tracing::info!(config = %config_path.display(), "Loading settings");
    let settings = Settings::load(&config_path)?;

    let bot = hearth_bot::assemble(settings, &args.root, Vec::new())?;
    tracing::info!("Bot running. Ctrl+C to stop.");
    bot.run_until(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Can't listen for Ctrl+C, shutting down");
        }
    })
    .await?;
    Ok(())
}
