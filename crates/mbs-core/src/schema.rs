//! Declarative description of the local kiosk database layout.
//!
//! Table names and fallback column orders differ between deployments, so they
//! are configuration data rather than code. The defaults match the layout of
//! the current kiosk software.

use serde::{Deserialize, Serialize};

/// Where every logical attribute lives in the local database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaMap {
    /// Table of sold tickets.
    pub sold_table: String,
    /// Table of paid tickets.
    pub paid_table: String,
    /// Race result tables, one per race pool.
    pub race_tables: Vec<String>,
    pub tickets: TicketColumns,
    pub races: RaceColumns,
    pub stats: StatsColumns,
    /// Tables consulted in order for the most recent ticket number.
    pub ticket_pointers: Vec<PointerSource>,
}

impl Default for SchemaMap {
    fn default() -> Self {
        Self {
            sold_table: "TIKETS_VENDIDOS_P".to_string(),
            paid_table: "TIKETS_PAGADOS_P".to_string(),
            race_tables: strings(&["RACE_P", "RACE_DOG_P", "RACE_HORSE_P"]),
            tickets: TicketColumns::default(),
            races: RaceColumns::default(),
            stats: StatsColumns::default(),
            ticket_pointers: vec![
                PointerSource {
                    table: "TIKETS_P".to_string(),
                    columns: strings(&["NUMERO_TIKET", "TIKET", "TICKET", "ID"]),
                },
                PointerSource {
                    table: "TIKETS_VENDIDOS_P".to_string(),
                    columns: strings(&["TIKET", "TICKET", "ID"]),
                },
            ],
        }
    }
}

/// Candidate columns for ticket attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketColumns {
    pub identifier: Vec<String>,
    pub numbers: Vec<String>,
    pub race: Vec<String>,
    pub play_type: String,
    pub amount: String,
    /// Prize column of the paid table, used when `amount` is absent.
    pub prize: String,
    pub odds: String,
    pub date: String,
    pub time: String,
}

impl Default for TicketColumns {
    fn default() -> Self {
        Self {
            identifier: strings(&["TIKET", "TICKET", "ID"]),
            numbers: strings(&["NUMEROS", "NUMERO"]),
            race: strings(&["RACE", "CARRERA", "NUM_CARRERA"]),
            play_type: "JUGADA".to_string(),
            amount: "MONTO".to_string(),
            prize: "PREMIO".to_string(),
            odds: "VALOR".to_string(),
            date: "FECHA".to_string(),
            time: "HORA".to_string(),
        }
    }
}

/// Candidate columns for race result attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RaceColumns {
    pub number: Vec<String>,
    pub winners: Vec<String>,
    pub date: String,
    pub time: String,
}

impl Default for RaceColumns {
    fn default() -> Self {
        Self {
            number: strings(&["CARRERA", "RACE", "NUMERO_CARRERA"]),
            winners: strings(&["NUMEROS", "GANADORES", "RESULTADO"]),
            date: "FECHA".to_string(),
            time: "HORA".to_string(),
        }
    }
}

/// Columns for the daily sales summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsColumns {
    pub table: String,
    pub sales: String,
    pub payouts: String,
    pub date: String,
    /// Race table holding the current race.
    pub race_table: String,
}

impl Default for StatsColumns {
    fn default() -> Self {
        Self {
            table: "VENTAS_P".to_string(),
            sales: "VENTAS".to_string(),
            payouts: "PAGOS".to_string(),
            date: "FECHA".to_string(),
            race_table: "RACE_P".to_string(),
        }
    }
}

/// A table and the columns that may hold a ticket number, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointerSource {
    pub table: String,
    pub columns: Vec<String>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}
