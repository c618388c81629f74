//! CLI subcommand implementations.

pub mod once;
pub mod run;
pub mod stats;
