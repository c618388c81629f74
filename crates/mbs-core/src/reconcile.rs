//! Remote-to-local configuration reconciliation.
//!
//! The backend stores each terminal's INI settings as a JSON object of
//! sections. Reconciling copies every remote value that differs textually from
//! the local one and reports what changed, so the caller rewrites the local file
//! only when something actually changed.

use serde_json::Value;
use thiserror::Error;

use crate::row::value_text;

/// Errors raised while reading a remote configuration tree.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigTreeError {
    /// The top-level value was not a JSON object.
    #[error("configuration must be an object of sections, got {kind}")]
    NotAnObject { kind: &'static str },
    /// A section value was not a JSON object.
    #[error("section {section} must be an object of keys, got {kind}")]
    SectionNotObject { section: String, kind: &'static str },
    /// A section, key or value spans more than one line.
    ///
    /// INI entries are single lines, so such a value cannot be stored.
    #[error("{section}.{key} contains a line break")]
    LineBreak { section: String, key: String },
}

/// Section → key → text value, in remote order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConfigTree {
    sections: Vec<(String, Vec<(String, String)>)>,
}

impl ConfigTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a tree from the backend's `ini_content` value.
    ///
    /// Null reads as an empty tree. Scalars render as text: strings verbatim,
    /// numbers and booleans as JSON, null as an empty string. Entries spanning
    /// several lines are rejected.
    pub fn from_json(value: &Value) -> Result<Self, ConfigTreeError> {
        let sections = match value {
            Value::Null => return Ok(Self::default()),
            Value::Object(sections) => sections,
            other => {
                return Err(ConfigTreeError::NotAnObject {
                    kind: json_kind(other),
                });
            }
        };

        let mut tree = Self::default();
        for (section, keys) in sections {
            let Value::Object(keys) = keys else {
                return Err(ConfigTreeError::SectionNotObject {
                    section: section.clone(),
                    kind: json_kind(keys),
                });
            };
            for (key, value) in keys {
                let value = value_text(value).unwrap_or_default();
                if [section, key, &value].iter().any(|text| has_line_break(text)) {
                    return Err(ConfigTreeError::LineBreak {
                        section: section.clone(),
                        key: key.clone(),
                    });
                }
                tree.insert(section, key, value);
            }
        }
        Ok(tree)
    }

    /// Sets a value, creating the section if needed.
    pub fn insert(&mut self, section: &str, key: &str, value: impl Into<String>) {
        let value = value.into();
        let index = match self.sections.iter().position(|(name, _)| name == section) {
            Some(index) => index,
            None => {
                self.sections.push((section.to_string(), Vec::new()));
                self.sections.len() - 1
            }
        };
        let keys = &mut self.sections[index].1;
        match keys.iter_mut().find(|(existing, _)| existing == key) {
            Some(entry) => entry.1 = value,
            None => keys.push((key.to_string(), value)),
        }
    }

    /// Returns true when the tree holds no keys.
    pub fn is_empty(&self) -> bool {
        self.sections.iter().all(|(_, keys)| keys.is_empty())
    }

    /// Iterates `(section, key, value)` triples in order.
    pub fn entries(&self) -> impl Iterator<Item = (&str, &str, &str)> {
        self.sections.iter().flat_map(|(section, keys)| {
            keys.iter()
                .map(move |(key, value)| (section.as_str(), key.as_str(), value.as_str()))
        })
    }
}

/// A local section/key/value store that can be reconciled.
pub trait ConfigStore {
    fn get(&self, section: &str, key: &str) -> Option<&str>;
    fn set(&mut self, section: &str, key: &str, value: &str);
}

/// One key overwritten by reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedKey {
    pub section: String,
    pub key: String,
    pub previous: Option<String>,
    pub value: String,
}

/// Outcome of a reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub changed: Vec<ChangedKey>,
}

impl ReconcileReport {
    /// True when at least one local value was overwritten.
    pub fn has_changes(&self) -> bool {
        !self.changed.is_empty()
    }
}

/// Applies every remote value that differs from the local store.
///
/// A missing local key counts as different. Unchanged keys are not written.
pub fn reconcile<S: ConfigStore + ?Sized>(remote: &ConfigTree, local: &mut S) -> ReconcileReport {
    let mut report = ReconcileReport::default();
    for (section, key, value) in remote.entries() {
        let previous = local.get(section, key);
        if previous == Some(value) {
            continue;
        }
        let previous = previous.map(ToString::to_string);
        tracing::debug!(section, key, ?previous, value, "config value changed");
        local.set(section, key, value);
        report.changed.push(ChangedKey {
            section: section.to_string(),
            key: key.to_string(),
            previous,
            value: value.to_string(),
        });
    }
    report
}

fn has_line_break(text: &str) -> bool {
    text.contains(['\n', '\r'])
}

const fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
