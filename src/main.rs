mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use diarybot::config::DiaryConfig;

#[derive(Parser)]
#[command(name = "diarybot", version, about = "Diary bots that log, notify and nag")]
struct Cli {
    /// Config file (defaults to ~/.diarybot/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Start the HTTP server and every bot's nag timer
    Serve,
    /// Print a bot's status line
    Status {
        /// Bot name
        bot: String,
    },
    /// Dump every entry of a bot (deleted ones and history included) as JSON
    Export {
        /// Bot name
        bot: String,
    },
    /// Check the database and the bot configuration
    Doctor,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => DiaryConfig::load_from(path)?,
        None => DiaryConfig::load()?,
    };

    // Log to stderr so stdout stays clean for export/status output.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Serve => diarybot::server::serve(config).await?,
        Command::Status { bot } => cli::status::status(&config, &bot)?,
        Command::Export { bot } => cli::export::export(&config, &bot)?,
        Command::Doctor => cli::doctor::doctor(&config)?,
    }

    Ok(())
}
