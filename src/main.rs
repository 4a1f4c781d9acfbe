use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

mod apply;
mod cli;
mod config;
mod db;
mod error;
mod jobs;
mod model;
mod notify;
mod oracle;
mod reconcile;
mod store;
mod worker;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG wins over --verbose
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("goalplan=debug")
        } else {
            EnvFilter::new("goalplan=info")
        }
    });

    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Worker(args) => cli::worker::execute(args, &cli.config).await,
        Commands::Enqueue(args) => cli::enqueue::execute(args, &cli.config).await,
        Commands::Jobs(args) => cli::jobs::execute(args, &cli.config).await,
        Commands::Revive(args) => cli::jobs::revive(args, &cli.config).await,
        Commands::Import(args) => cli::import::execute(args, &cli.config).await,
        Commands::Schema => cli::schema::execute(),
    }
}
