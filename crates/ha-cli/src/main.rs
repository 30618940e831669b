mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let runtime = commands::build_runtime(&cli.config, cli.store, &cli.store_path, &cli.server_id)?;

    match cli.command {
        Command::Run => commands::run(runtime).await,
        Command::Schedule { command } => commands::schedule(&runtime, command).await,
        Command::Investigate { host } => commands::investigate(&runtime, host).await,
        Command::Status => commands::status(&runtime).await,
        Command::Cleanup => commands::cleanup(&runtime).await,
    }
}
