//! CLI module for Parley
//!
//! Provides commands:
//! - `serve`: run the bot
//! - `check`: print the resolved configuration and open the record store

use crate::server::AppConfig;
use clap::{Parser, Subcommand};

pub mod check;

/// Parley chat bot
#[derive(Parser, Debug)]
#[command(name = "parley")]
#[command(about = "Session and state engine for chat bots")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the bot (long polling)
    Serve,
    /// Validate configuration and store access
    Check,
}

/// Run the CLI command
pub async fn run(cli: Cli, config: AppConfig) -> anyhow::Result<()> {
    match cli.command {
        Some(Commands::Serve) => crate::server::run(config).await,
        Some(Commands::Check) => check::run(&config).await,
        None => {
            let mut cmd = <Cli as clap::CommandFactory>::command();
            cmd.print_help()?;
            println!();
            Ok(())
        }
    }
}
