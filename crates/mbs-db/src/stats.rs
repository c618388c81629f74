//! Daily sales summary and current race/ticket pointers.

use std::path::Path;

use chrono::NaiveDate;
use mbs_core::schema::{PointerSource, SchemaMap};
use mbs_core::DailyStats;
use rusqlite::params;

use crate::{LocalStore, StoreError, format_date, quote_ident};

/// Computes today's [`DailyStats`] from the database at `path`.
///
/// Returns `None` when the database is missing or any part of the aggregation
/// fails; callers skip the heartbeat rather than report zeroed figures.
pub fn collect_daily_stats(path: &Path, schema: &SchemaMap, date: NaiveDate) -> Option<DailyStats> {
    let result = LocalStore::open(path).and_then(|store| store.daily_stats(schema, date));
    match result {
        Ok(stats) => Some(stats),
        Err(StoreError::Missing(path)) => {
            tracing::debug!(path = %path.display(), "local database missing, no stats");
            None
        }
        Err(err) => {
            tracing::warn!(error = %err, "failed to compute daily stats");
            None
        }
    }
}

impl LocalStore {
    /// Aggregates today's totals and the current race and ticket numbers.
    pub fn daily_stats(&self, schema: &SchemaMap, date: NaiveDate) -> Result<DailyStats, StoreError> {
        let (sales, payouts) = self.daily_totals(schema, date)?;
        let current_race = self.current_race(schema)?;
        let current_ticket = self.current_ticket(&schema.ticket_pointers);
        Ok(DailyStats {
            sales,
            payouts,
            current_race,
            current_ticket,
        })
    }

    /// Sums of the sales and payout columns for one date, zero when no rows match.
    pub fn daily_totals(&self, schema: &SchemaMap, date: NaiveDate) -> Result<(f64, f64), StoreError> {
        let columns = &schema.stats;
        let sql = format!(
            "SELECT COALESCE(SUM(CAST({sales} AS REAL)), 0), COALESCE(SUM(CAST({payouts} AS REAL)), 0) \
             FROM {table} WHERE {date} = ?1",
            sales = quote_ident(&columns.sales),
            payouts = quote_ident(&columns.payouts),
            table = quote_ident(&columns.table),
            date = quote_ident(&columns.date),
        );
        let totals = self
            .conn
            .query_row(&sql, params![format_date(date)], |row| {
                Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?))
            })?;
        Ok(totals)
    }

    /// Race number of the most recently inserted race row.
    ///
    /// Empty when the table is empty or no race-number column is usable.
    fn current_race(&self, schema: &SchemaMap) -> Result<String, StoreError> {
        let row = self.latest_row(&schema.stats.race_table)?;
        Ok(row
            .and_then(|row| row.first_text(&schema.races.number))
            .unwrap_or_default())
    }

    /// Most recent ticket number from the first pointer table that yields one.
    ///
    /// Missing tables and columns fall through to the next candidate.
    fn current_ticket(&self, sources: &[PointerSource]) -> String {
        for source in sources {
            match self.latest_row(&source.table) {
                Ok(Some(row)) => {
                    if let Some(ticket) = row.first_text(&source.columns) {
                        return ticket;
                    }
                }
                Ok(None) => {}
                Err(err) => {
                    tracing::debug!(table = %source.table, error = %err, "ticket pointer table unavailable");
                }
            }
        }
        tracing::debug!("no ticket pointer table yielded a ticket number");
        String::new()
    }
}
