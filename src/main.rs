//! `ivanti-export` binary entry point.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ivanti_export::commands::{self, Cli, Commands};

fn main() -> Result<ExitCode> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.load_config()?;

    // Pages are fetched one at a time; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let outcome = runtime.block_on(async {
        match cli.command {
            Commands::Run(args) => commands::run::execute(args, config).await,
            Commands::Entities => Ok(commands::entities::execute(&config)),
        }
    })?;

    Ok(ExitCode::from(outcome.exit_code()))
}
