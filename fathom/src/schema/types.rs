//! Type definitions for database schema objects

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::db::row::Value;
use crate::error::Error;

/// Columns of a table or view, keyed by name in declaration order.
pub type Columns = IndexMap<String, Column>;

/// Indices keyed by name.
pub type Indices = IndexMap<String, Index>;

/// Represents a database column
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    /// Normalized type name, e.g. `varchar(800)`.
    #[serde(rename = "type")]
    pub data_type: String,
    pub not_null: bool,
    /// Raw default as reported by the backend.
    pub default: Option<Value>,
}

impl Column {
    /// Create a new nullable column without default
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
            not_null: false,
            default: None,
        }
    }

    /// Set whether the column rejects NULL
    pub fn not_null(mut self, not_null: bool) -> Self {
        self.not_null = not_null;
        self
    }

    /// Set a default value for the column
    pub fn default(mut self, default: impl Into<Value>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Represents an index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub name: String,
    /// Covered columns; order matters for composite indices.
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// Table the index belongs to, when the catalog reports it.
    pub table: Option<String>,
}

impl Index {
    pub fn new(name: &str, columns: &[&str], is_unique: bool) -> Self {
        Self {
            name: name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            is_unique,
            table: None,
        }
    }

    pub fn on_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }
}

/// Represents a foreign key constraint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    pub columns: Vec<String>,
    pub referenced_table: String,
    /// Positionally matches `columns`.
    pub referenced_columns: Vec<String>,
}

impl ForeignKey {
    pub fn new(columns: &[&str], referenced_table: &str, referenced_columns: &[&str]) -> Self {
        Self {
            columns: columns.iter().map(|c| c.to_string()).collect(),
            referenced_table: referenced_table.to_string(),
            referenced_columns: referenced_columns.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// A stored procedure argument
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Argument {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
}

impl Argument {
    pub fn new(name: &str, data_type: &str) -> Self {
        Self {
            name: name.to_string(),
            data_type: data_type.to_string(),
        }
    }
}

/// When a trigger fires relative to its event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerTiming {
    Before,
    After,
    Instead,
}

/// The data modification a trigger fires on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TriggerEvent {
    Insert,
    Update,
    Delete,
}

impl FromStr for TriggerTiming {
    type Err = Error;

    /// Accepts catalog spellings such as `BEFORE EACH ROW` or `INSTEAD OF`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.split_whitespace().next() {
            Some("BEFORE") => Ok(TriggerTiming::Before),
            Some("AFTER") => Ok(TriggerTiming::After),
            Some("INSTEAD") => Ok(TriggerTiming::Instead),
            _ => Err(Error::SchemaAnalysisError(format!(
                "unknown trigger timing: {s}"
            ))),
        }
    }
}

impl FromStr for TriggerEvent {
    type Err = Error;

    /// Takes the first event of a list such as `INSERT OR UPDATE`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        match upper.split_whitespace().next() {
            Some("INSERT") => Ok(TriggerEvent::Insert),
            Some("UPDATE") => Ok(TriggerEvent::Update),
            Some("DELETE") => Ok(TriggerEvent::Delete),
            _ => Err(Error::SchemaAnalysisError(format!(
                "unknown trigger event: {s}"
            ))),
        }
    }
}

impl fmt::Display for TriggerTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerTiming::Before => "BEFORE",
            TriggerTiming::After => "AFTER",
            TriggerTiming::Instead => "INSTEAD OF",
        })
    }
}

impl fmt::Display for TriggerEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TriggerEvent::Insert => "INSERT",
            TriggerEvent::Update => "UPDATE",
            TriggerEvent::Delete => "DELETE",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_enums_parse_catalog_text() {
        assert_eq!(
            "before each row".parse::<TriggerTiming>().unwrap(),
            TriggerTiming::Before
        );
        assert_eq!(
            "INSTEAD OF".parse::<TriggerTiming>().unwrap(),
            TriggerTiming::Instead
        );
        assert_eq!(
            "INSERT OR UPDATE".parse::<TriggerEvent>().unwrap(),
            TriggerEvent::Insert
        );
        assert!("TRUNCATE".parse::<TriggerEvent>().is_err());
    }

    #[test]
    fn column_builder() {
        let column = Column::new("id", "integer").not_null(true).default(0i64);
        assert!(column.not_null);
        assert_eq!(column.default, Some(Value::Integer(0)));
    }
}
