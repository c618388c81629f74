//! Reconciliation of heterogeneous kiosk rows into canonical records.
//!
//! Sold and paid tickets live in different tables with different columns, and
//! each race pool has its own results table. The mapper tags every row with its
//! origin, fills schema gaps (a paid ticket's prize stands in for its amount),
//! resolves each attribute through its fallback chain and drops rows that have
//! no usable identifier.

use crate::record::{RaceRecord, TicketKind, TicketRecord};
use crate::row::Row;
use crate::schema::SchemaMap;
use crate::time::normalize_time;

/// Column added to every ticket row naming the table it came from.
pub const SOURCE_TABLE_TAG: &str = "_source_table";
/// Column added to every ticket row holding `BET` or `PAYOUT`.
pub const TICKET_TYPE_TAG: &str = "_ticket_type";

/// Rows read from one source table.
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRows {
    pub table: String,
    pub rows: Vec<Row>,
}

impl SourceRows {
    pub fn new(table: impl Into<String>, rows: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            rows,
        }
    }
}

/// Maps local rows to canonical records for one terminal.
#[derive(Debug, Clone, Copy)]
pub struct RecordMapper<'a> {
    terminal_id: &'a str,
    schema: &'a SchemaMap,
}

impl<'a> RecordMapper<'a> {
    pub const fn new(terminal_id: &'a str, schema: &'a SchemaMap) -> Self {
        Self {
            terminal_id,
            schema,
        }
    }

    /// Maps the union of sold and paid ticket rows.
    pub fn map_tickets(&self, sold: SourceRows, paid: SourceRows) -> Vec<TicketRecord> {
        let tagged = tag_rows(sold, TicketKind::Bet)
            .chain(tag_rows(paid, TicketKind::Payout))
            .map(|(row, kind)| self.prepare_ticket(row, kind));

        tagged
            .filter_map(|(row, kind)| self.map_ticket(&row, kind))
            .collect()
    }

    /// Maps one tagged ticket row. Returns `None` when no identifier resolves.
    pub fn map_ticket(&self, row: &Row, kind: TicketKind) -> Option<TicketRecord> {
        let columns = &self.schema.tickets;
        let Some(ticket_number) = row.first_text(&columns.identifier) else {
            tracing::debug!(
                candidates = ?columns.identifier,
                "discarding ticket row without identifier"
            );
            return None;
        };

        Some(TicketRecord {
            terminal_id: self.terminal_id.to_string(),
            ticket_number,
            ticket_type: kind,
            amount: row.number(&columns.amount).unwrap_or(0.0),
            odds: row.number(&columns.odds).unwrap_or(0.0),
            race_number: row.first_text(&columns.race).unwrap_or_default(),
            numbers: row.first_text(&columns.numbers).unwrap_or_default(),
            play_type: row.text(&columns.play_type).unwrap_or_default(),
            local_date: row.text(&columns.date),
            local_time: normalize_time(row.text(&columns.time).as_deref()),
            raw_data: row.to_json(),
        })
    }

    /// Maps the union of rows from every race table.
    pub fn map_races(&self, sources: impl IntoIterator<Item = SourceRows>) -> Vec<RaceRecord> {
        sources
            .into_iter()
            .flat_map(|source| source.rows)
            .filter_map(|row| self.map_race(&row))
            .collect()
    }

    /// Maps one race row. Returns `None` when no race number resolves.
    pub fn map_race(&self, row: &Row) -> Option<RaceRecord> {
        let columns = &self.schema.races;
        let Some(race_number) = row.first_text(&columns.number) else {
            tracing::debug!(
                candidates = ?columns.number,
                "discarding race row without race number"
            );
            return None;
        };

        Some(RaceRecord {
            terminal_id: self.terminal_id.to_string(),
            race_number,
            winner_numbers: row.first_text(&columns.winners).unwrap_or_default(),
            local_date: row.text(&columns.date),
            local_time: normalize_time(row.text(&columns.time).as_deref()),
        })
    }

    /// Fills the amount slot of a paid ticket from its prize column.
    fn prepare_ticket(&self, mut row: Row, kind: TicketKind) -> (Row, TicketKind) {
        let columns = &self.schema.tickets;
        if kind == TicketKind::Payout && row.usable(&columns.amount).is_none() {
            if let Some(prize) = row.usable(&columns.prize).cloned() {
                row.insert(columns.amount.clone(), prize);
            }
        }
        (row, kind)
    }
}

fn tag_rows(source: SourceRows, kind: TicketKind) -> impl Iterator<Item = (Row, TicketKind)> {
    let SourceRows { table, rows } = source;
    rows.into_iter().map(move |mut row| {
        row.insert(SOURCE_TABLE_TAG, table.clone());
        row.insert(TICKET_TYPE_TAG, kind.as_str());
        (row, kind)
    })
}
