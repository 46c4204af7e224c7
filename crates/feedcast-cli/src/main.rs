use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use feedcast_core::AppConfig;

mod commands;

#[derive(Parser)]
#[command(name = "feedcast")]
#[command(author, version, about = "Watches a content feed and fans new items out to Telegram and VK")]
struct Cli {
    /// Path to the config file (defaults to ~/.config/feedcast/config.toml)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller, dispatcher, listeners and scheduler until Ctrl+C
    Run,
    /// Run a single poll cycle and print the new items
    Poll {
        /// Also publish the new items to every channel
        #[arg(long)]
        dispatch: bool,
    },
    /// Validate the config and show what would run
    CheckConfig,
    /// Publish the configured custom post to VK right now
    PostCustom,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(cli.config.as_deref())?;

    // RUST_LOG wins over the configured level
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.general.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match cli.command {
        Some(Commands::Run) | None => commands::run::run(config).await,
        Some(Commands::Poll { dispatch }) => commands::poll::run(&config, dispatch).await,
        Some(Commands::CheckConfig) => commands::check_config::run(&config),
        Some(Commands::PostCustom) => commands::post_custom::run(&config).await,
    }
}
