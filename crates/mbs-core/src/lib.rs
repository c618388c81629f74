//! Core domain logic for the terminal sync agent.
//!
//! This crate contains:
//! - Time normalization: locale time strings to 24-hour `HH:MM:SS`
//! - Record mapping: heterogeneous kiosk rows to canonical tickets and races
//! - Config reconciliation: remote INI trees applied to a local store
//! - Scheduling: the heartbeat, config and detailed-data cadences

pub mod mapper;
pub mod reconcile;
pub mod record;
pub mod row;
pub mod scheduler;
pub mod schema;
pub mod time;

pub use mapper::{RecordMapper, SourceRows};
pub use reconcile::{ConfigStore, ConfigTree, ConfigTreeError, ReconcileReport, reconcile};
pub use record::{DailyStats, RaceRecord, TicketKind, TicketRecord};
pub use row::Row;
pub use scheduler::{
    Clock, CycleOutcome, ScheduleConfig, ScheduleError, Scheduler, SyncCycles, TickReport,
    VirtualClock,
};
pub use schema::SchemaMap;
pub use time::normalize_time;
