//! Canonical records sent to the backend.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Whether a ticket was sold or paid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketKind {
    /// A sold ticket.
    Bet,
    /// A paid (winning) ticket.
    Payout,
}

impl TicketKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Bet => "BET",
            Self::Payout => "PAYOUT",
        }
    }
}

impl fmt::Display for TicketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A ticket in the backend's `sync_tickets` shape.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TicketRecord {
    pub terminal_id: String,
    pub ticket_number: String,
    pub ticket_type: TicketKind,
    pub amount: f64,
    pub odds: f64,
    pub race_number: String,
    pub numbers: String,
    pub play_type: String,
    pub local_date: Option<String>,
    pub local_time: Option<String>,
    /// The tagged source row as JSON text.
    pub raw_data: String,
}

/// A race result in the backend's `sync_races` shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RaceRecord {
    pub terminal_id: String,
    pub race_number: String,
    pub winner_numbers: String,
    pub local_date: Option<String>,
    pub local_time: Option<String>,
}

/// Today's totals and the most recent race/ticket pointers.
///
/// Recomputed on every heartbeat; never persisted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyStats {
    pub sales: f64,
    pub payouts: f64,
    /// Empty when no race row carries a number.
    pub current_race: String,
    /// Empty when every pointer table failed.
    pub current_ticket: String,
}
