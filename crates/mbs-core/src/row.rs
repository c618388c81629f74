//! Generic source rows and first-present-wins column lookup.
//!
//! Kiosk databases disagree on column names between installs and between
//! tables. Every logical attribute is therefore resolved from an ordered list
//! of candidate columns; a missing candidate is not an error, only the absence
//! of all of them is.

use serde::Serialize;
use serde_json::{Map, Value};

/// A row read from the local store, keyed by column name in column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row(Map<String, Value>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a column value, replacing any previous value.
    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    /// Returns the value of a column if it is present and usable.
    ///
    /// Null values and blank strings count as absent.
    pub fn usable(&self, column: &str) -> Option<&Value> {
        self.0.get(column).filter(|value| is_usable(value))
    }

    /// Returns the first usable value among the candidate columns.
    pub fn first_usable<S: AsRef<str>>(&self, candidates: &[S]) -> Option<&Value> {
        candidates
            .iter()
            .find_map(|column| self.usable(column.as_ref()))
    }

    /// Text rendering of a usable column value.
    pub fn text(&self, column: &str) -> Option<String> {
        self.usable(column).and_then(value_text)
    }

    /// Text rendering of the first usable candidate column.
    pub fn first_text<S: AsRef<str>>(&self, candidates: &[S]) -> Option<String> {
        self.first_usable(candidates).and_then(value_text)
    }

    /// Numeric value of a column, accepting numbers and numeric text.
    pub fn number(&self, column: &str) -> Option<f64> {
        self.usable(column).and_then(value_number)
    }

    /// Serializes the whole row as compact JSON.
    pub fn to_json(&self) -> String {
        Value::Object(self.0.clone()).to_string()
    }
}

impl From<Map<String, Value>> for Row {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

fn is_usable(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    }
}

/// Renders a scalar as text. Null renders as `None`.
pub fn value_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn value_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
