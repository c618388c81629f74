//! Storage layer for the terminal sync agent.
//!
//! Provides read-only access to the kiosk's `SQLite` database using `rusqlite`,
//! and the file-backed INI store the kiosk software reads its settings from.
//!
//! # Connection Lifetime
//!
//! A [`LocalStore`] is opened, queried and dropped within a single sync cycle.
//! No connection is held between cycles: the kiosk software owns the file and
//! writes to it continuously.
//!
//! # Schema
//!
//! The kiosk schema is not ours and varies between installs. Tables are named
//! by configuration ([`mbs_core::SchemaMap`]) and read with `SELECT *`, so rows
//! come back as generic [`Row`] values and every column lookup goes through a
//! fallback chain. Missing tables and columns surface as [`StoreError::Sqlite`]
//! for the caller to absorb per query.

mod ini_file;
mod stats;

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveDate;
use mbs_core::Row;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, Params, params};
use serde_json::Value;
use thiserror::Error;

pub use ini_file::IniFile;
pub use stats::collect_daily_stats;

/// How long a read waits for the kiosk software to release a write lock.
const BUSY_TIMEOUT: Duration = Duration::from_secs(2);

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file does not exist.
    #[error("local database not found at {}", .0.display())]
    Missing(PathBuf),
    /// An error from the underlying database, including missing tables or columns.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Reading or writing the INI file failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The INI file could not be parsed.
    #[error("invalid INI file {}: {message}", path.display())]
    IniParse { path: PathBuf, message: String },
}

/// Read-only connection to the kiosk database.
pub struct LocalStore {
    conn: Connection,
}

impl LocalStore {
    /// Opens the database read-only.
    ///
    /// Fails with [`StoreError::Missing`] when the file does not exist rather
    /// than creating an empty database.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.exists() {
            return Err(StoreError::Missing(path.to_path_buf()));
        }
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(Self { conn })
    }

    /// Rows of `table` whose `date_column` equals `date`, newest first.
    pub fn rows_for_date(
        &self,
        table: &str,
        date_column: &str,
        date: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Row>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} WHERE {} = ?1 ORDER BY rowid DESC LIMIT ?2",
            quote_ident(table),
            quote_ident(date_column)
        );
        self.query_rows(&sql, params![format_date(date), sql_limit(limit)])
    }

    /// The most recently inserted rows of `table`, newest first.
    pub fn latest_rows(&self, table: &str, limit: usize) -> Result<Vec<Row>, StoreError> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid DESC LIMIT ?1",
            quote_ident(table)
        );
        self.query_rows(&sql, params![sql_limit(limit)])
    }

    /// The most recently inserted row of `table`, if any.
    pub fn latest_row(&self, table: &str) -> Result<Option<Row>, StoreError> {
        Ok(self.latest_rows(table, 1)?.into_iter().next())
    }

    fn query_rows<P: Params>(&self, sql: &str, params: P) -> Result<Vec<Row>, StoreError> {
        let mut stmt = self.conn.prepare(sql)?;
        let columns: Vec<String> = stmt
            .column_names()
            .into_iter()
            .map(ToString::to_string)
            .collect();

        let mut rows = stmt.query(params)?;
        let mut records = Vec::new();
        while let Some(row) = rows.next()? {
            let mut record = Row::new();
            for (index, column) in columns.iter().enumerate() {
                record.insert(column.clone(), json_value(row.get_ref(index)?));
            }
            records.push(record);
        }
        Ok(records)
    }
}

/// Quotes an identifier taken from configuration.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn sql_limit(limit: usize) -> i64 {
    i64::try_from(limit).unwrap_or(i64::MAX)
}

fn json_value(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
            Value::String(String::from_utf8_lossy(bytes).into_owned())
        }
    }
}
