//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};

/// Betting terminal sync agent.
///
/// Reports terminal liveness and daily figures to the backend, uploads recent
/// tickets and race results, and applies remote configuration to the kiosk's
/// INI file.
#[derive(Debug, Parser)]
#[command(name = "mbsync", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Run the sync loop until interrupted.
    Run,

    /// Run every cycle once and exit.
    Once,

    /// Print the daily figures the heartbeat would report.
    Stats {
        /// Day to summarize (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}
