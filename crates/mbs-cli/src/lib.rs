//! Terminal sync agent CLI library.
//!
//! Wires configuration, the kiosk database, the INI file and the backend
//! client into the scheduler from `mbs-core`.

mod cli;
mod clock;
mod collector;
pub mod commands;
mod config;

pub use cli::{Cli, Commands};
pub use clock::TokioClock;
pub use collector::Collector;
pub use config::Config;
