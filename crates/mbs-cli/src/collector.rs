//! The three sync cycles run by the scheduler.

use std::path::Path;

use anyhow::Result;
use chrono::{Local, NaiveDate, Utc};
use mbs_api::{ApiError, Client, HeartbeatPayload};
use mbs_core::{
    ConfigTree, CycleOutcome, RaceRecord, RecordMapper, ReconcileReport, Row, SourceRows,
    SyncCycles, TicketRecord, reconcile,
};
use mbs_db::{IniFile, LocalStore, StoreError, collect_daily_stats};

use crate::Config;

/// Reads the kiosk's files and talks to the backend on the scheduler's behalf.
#[derive(Debug)]
pub struct Collector<'a> {
    config: &'a Config,
    client: Client,
}

impl<'a> Collector<'a> {
    pub fn new(config: &'a Config) -> Result<Self> {
        let client = Client::new(&config.api.url, config.api.key.clone(), config.timeouts())?;
        Ok(Self { config, client })
    }

    /// Reads and maps today's tickets and the latest race results.
    ///
    /// Only a missing database fails the read; an unreadable table contributes
    /// no rows.
    fn read_batches(
        &self,
        today: NaiveDate,
    ) -> Result<(Vec<TicketRecord>, Vec<RaceRecord>), StoreError> {
        let store = LocalStore::open(&self.config.local.sqlite_path)?;
        let schema = &self.config.schema;
        let limits = &self.config.sync;

        let sold = read_table(&schema.sold_table, || {
            store.rows_for_date(&schema.sold_table, &schema.tickets.date, today, limits.ticket_limit)
        });
        let paid = read_table(&schema.paid_table, || {
            store.rows_for_date(&schema.paid_table, &schema.tickets.date, today, limits.ticket_limit)
        });
        let races: Vec<_> = schema
            .race_tables
            .iter()
            .map(|table| read_table(table, || store.latest_rows(table, limits.race_limit)))
            .collect();

        let mapper = RecordMapper::new(&self.config.terminal.id, schema);
        Ok((mapper.map_tickets(sold, paid), mapper.map_races(races)))
    }
}

impl SyncCycles for Collector<'_> {
    async fn heartbeat(&mut self) -> CycleOutcome {
        let Some(stats) =
            collect_daily_stats(&self.config.local.sqlite_path, &self.config.schema, today())
        else {
            return CycleOutcome::skipped("no local data");
        };

        let payload = HeartbeatPayload::new(&stats, Utc::now());
        let terminal = &self.config.terminal;
        match self
            .client
            .send_heartbeat(&terminal.id, &terminal.token, &payload)
            .await
        {
            Ok(()) => {
                tracing::debug!(
                    sales = stats.sales,
                    payouts = stats.payouts,
                    race = %stats.current_race,
                    ticket = %stats.current_ticket,
                    "heartbeat sent"
                );
                CycleOutcome::Completed
            }
            Err(ApiError::InvalidCredentials) => {
                tracing::warn!(
                    terminal_id = %terminal.id,
                    "backend has no terminal with this id and token; check terminal.id and terminal.token"
                );
                CycleOutcome::failed(ApiError::InvalidCredentials)
            }
            Err(err) => CycleOutcome::failed(err),
        }
    }

    async fn sync_config(&mut self) -> CycleOutcome {
        let remote = match self.client.fetch_config(&self.config.terminal.id).await {
            Ok(remote) => remote,
            Err(err) => return CycleOutcome::failed(err),
        };
        if remote.is_empty() {
            return CycleOutcome::skipped("no remote configuration");
        }

        match apply_config(&remote, &self.config.local.ini_path) {
            Ok(_) => CycleOutcome::Completed,
            Err(err) => CycleOutcome::failed(err),
        }
    }

    async fn sync_data(&mut self) -> CycleOutcome {
        // The connection is closed before any request is awaited.
        let (tickets, races) = match self.read_batches(today()) {
            Ok(batches) => batches,
            Err(StoreError::Missing(path)) => {
                return CycleOutcome::skipped(format!(
                    "local database not found at {}",
                    path.display()
                ));
            }
            Err(err) => return CycleOutcome::failed(err),
        };
        if tickets.is_empty() && races.is_empty() {
            return CycleOutcome::skipped("nothing to sync");
        }

        let mut failures = Vec::new();
        if !tickets.is_empty() {
            match self.client.push_tickets(&tickets).await {
                Ok(()) => tracing::info!(count = tickets.len(), "tickets synced"),
                Err(err) => {
                    tracing::warn!(count = tickets.len(), error = %err, "ticket batch not accepted");
                    failures.push(format!("tickets: {err}"));
                }
            }
        }
        if !races.is_empty() {
            match self.client.push_races(&races).await {
                Ok(()) => tracing::info!(count = races.len(), "races synced"),
                Err(err) => {
                    tracing::warn!(count = races.len(), error = %err, "race batch not accepted");
                    failures.push(format!("races: {err}"));
                }
            }
        }

        if failures.is_empty() {
            CycleOutcome::Completed
        } else {
            CycleOutcome::failed(failures.join("; "))
        }
    }
}

fn today() -> NaiveDate {
    Local::now().date_naive()
}

fn read_table(table: &str, read: impl FnOnce() -> Result<Vec<Row>, StoreError>) -> SourceRows {
    let rows = read().unwrap_or_else(|err| {
        tracing::warn!(table, error = %err, "skipping unreadable table");
        Vec::new()
    });
    SourceRows::new(table, rows)
}

/// Applies the remote tree to the INI file, rewriting it only when a value changed.
fn apply_config(remote: &ConfigTree, path: &Path) -> Result<ReconcileReport, StoreError> {
    let mut file = IniFile::load(path)?;
    let report = reconcile(remote, &mut file);
    if report.has_changes() {
        file.save()?;
        tracing::info!(
            path = %path.display(),
            changed = report.changed.len(),
            "local configuration updated"
        );
    }
    Ok(report)
}
