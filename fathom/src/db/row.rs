//! Backend-neutral catalog rows.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// One value read from a catalog query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Real(f64),
    Text(String),
    Bytes(Vec<u8>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text rendering used for name-like columns; integers and booleans are
    /// accepted because some drivers report catalog flags as numbers.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) => Some(r.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Real(r) if r.fract() == 0.0 => Some(*r as i64),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("NULL"),
            Value::Text(s) => write!(f, "'{}'", s.replace('\'', "''")),
            other => f.write_str(&other.as_text().unwrap_or_default()),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A fully materialised result row.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Row(pub Vec<Value>);

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self(values)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<&Value> {
        self.0.get(index).ok_or_else(|| {
            Error::SchemaAnalysisError(format!(
                "catalog row has {} columns, wanted column {}",
                self.0.len(),
                index
            ))
        })
    }

    /// Non-null text value at `index`.
    pub fn text(&self, index: usize) -> Result<String> {
        self.opt_text(index)?.ok_or_else(|| {
            Error::SchemaAnalysisError(format!("unexpected NULL in catalog column {index}"))
        })
    }

    pub fn opt_text(&self, index: usize) -> Result<Option<String>> {
        Ok(self.get(index)?.as_text())
    }

    pub fn opt_i64(&self, index: usize) -> Result<Option<i64>> {
        let value = self.get(index)?;
        if value.is_null() {
            return Ok(None);
        }
        value.as_i64().map(Some).ok_or_else(|| {
            Error::SchemaAnalysisError(format!("catalog column {index} is not numeric: {value:?}"))
        })
    }

    /// Truthiness of catalog flags: booleans, 0/1, and `YES`/`Y`/`TRUE`.
    pub fn flag(&self, index: usize) -> Result<bool> {
        Ok(match self.get(index)? {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Integer(i) => *i != 0,
            Value::Real(r) => *r != 0.0,
            Value::Text(s) => matches!(
                s.trim().to_ascii_uppercase().as_str(),
                "YES" | "Y" | "TRUE" | "T" | "1" | "UNIQUE"
            ),
            Value::Bytes(b) => !b.is_empty() && b != b"0",
        })
    }

    /// The raw value at `index`, `None` when NULL.
    pub fn value(&self, index: usize) -> Result<Option<Value>> {
        let value = self.get(index)?;
        Ok(if value.is_null() {
            None
        } else {
            Some(value.clone())
        })
    }
}

impl From<Vec<Value>> for Row {
    fn from(values: Vec<Value>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_accept_catalog_spellings() {
        let row = Row::new(vec![
            Value::from("YES"),
            Value::from("NO"),
            Value::Integer(1),
            Value::Bool(false),
            Value::Null,
        ]);
        assert!(row.flag(0).unwrap());
        assert!(!row.flag(1).unwrap());
        assert!(row.flag(2).unwrap());
        assert!(!row.flag(3).unwrap());
        assert!(!row.flag(4).unwrap());
    }

    #[test]
    fn text_rejects_null_and_missing_columns() {
        let row = Row::new(vec![Value::Null]);
        assert!(row.text(0).is_err());
        assert!(row.opt_text(1).is_err());
        assert_eq!(row.opt_text(0).unwrap(), None);
    }

    #[test]
    fn numeric_text_converts() {
        let row = Row::new(vec![Value::from(" 800 ")]);
        assert_eq!(row.opt_i64(0).unwrap(), Some(800));
    }
}
