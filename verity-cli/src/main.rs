use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod commands;
mod config;

use cli::{Args, Command};

fn initialize_tracing() {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,verity_engine=debug".into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let args = Args::parse();

    initialize_tracing();

    match args.command {
        Command::Apply { plan, wait_secs } => commands::apply::run(plan, wait_secs).await,
        Command::Show { kind, ip_version } => commands::show::run(kind, ip_version).await,
        Command::Kinds => commands::kinds::run(),
    }
}
