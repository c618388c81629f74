use std::io;

use anyhow::{Context, Result};
use chrono::Local;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use mbs_cli::commands::{once, run, stats};
use mbs_cli::{Cli, Commands, Config};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let Some(command) = cli.command else {
        // No subcommand, show help
        use clap::CommandFactory;
        Cli::command().print_help()?;
        println!();
        return Ok(());
    };

    let config = Config::load_from(cli.config.as_deref()).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    match command {
        Commands::Run => run::run(&config).await?,
        Commands::Once => once::run(&mut io::stdout().lock(), &config).await?,
        Commands::Stats { date } => {
            let date = date.unwrap_or_else(|| Local::now().date_naive());
            stats::run(&mut io::stdout().lock(), &config, date)?;
        }
    }

    Ok(())
}
