//! Backend inspectors
//!
//! An [`Inspector`] answers catalog questions for one database backend. The
//! schema graph calls it whenever a lazy collection is read for the first
//! time; the inspector runs the backend's catalog queries through a
//! [`Driver`](crate::db::Driver) and returns normalised values, which the
//! owning entity caches.

pub mod mysql;
pub mod oracle;
pub mod postgres;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod scripted;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::error::Result;
use crate::schema::objects::{Procedure, Table, View};
use crate::schema::types::{Argument, Columns, ForeignKey, Indices, TriggerEvent, TriggerTiming};

pub use mysql::MySqlInspector;
pub use oracle::OracleInspector;
pub use postgres::PostgresInspector;
pub use sqlite::SqliteInspector;

/// The database systems fathom can inspect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Sqlite,
    Postgres,
    #[serde(rename = "mysql")]
    MySql,
    Oracle,
}

impl Backend {
    /// How the backend treats the case of identifiers.
    pub fn case_sensitivity(self) -> CaseSensitivity {
        match self {
            Backend::Sqlite => CaseSensitivity::Insensitive,
            Backend::Postgres | Backend::Oracle => CaseSensitivity::SensitiveQuoted,
            Backend::MySql => CaseSensitivity::Sensitive,
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Backend::Sqlite => "SQLite",
            Backend::Postgres => "PostgreSQL",
            Backend::MySql => "MySQL",
            Backend::Oracle => "Oracle",
        })
    }
}

/// Identifier case rules of a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CaseSensitivity {
    /// Names are compared exactly.
    Sensitive,
    /// Names are compared ignoring case; fathom reports them lower-cased.
    Insensitive,
    /// Quoted names are exact, unquoted names are folded by the backend.
    SensitiveQuoted,
}

/// The object whose columns are requested.
#[derive(Clone, Copy)]
pub enum ColumnOwner<'a> {
    Table(&'a Table),
    View(&'a View),
}

impl ColumnOwner<'_> {
    pub fn name(&self) -> &str {
        match self {
            ColumnOwner::Table(table) => table.name(),
            ColumnOwner::View(view) => view.name(),
        }
    }

    pub fn is_view(&self) -> bool {
        matches!(self, ColumnOwner::View(_))
    }
}

/// A procedure as returned by the listing query, before its details are
/// resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcedureStub {
    /// Identity in the database-level map, e.g. `fib(int4)`.
    pub name: String,
    /// Name without the argument list.
    pub base_name: String,
    /// Backend-specific overload key, such as PostgreSQL's argument type oids.
    pub signature: Option<String>,
}

impl ProcedureStub {
    /// A procedure identified by its bare name.
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            base_name: name.to_string(),
            signature: None,
        }
    }
}

/// Resolved details of one stored procedure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcedureDetails {
    pub arguments: IndexMap<String, Argument>,
    /// Return type, `None` for procedures without a result.
    pub returns: Option<String>,
    /// Body source with language wrappers removed.
    pub sql: String,
}

/// One trigger as reported by the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerInfo {
    pub name: String,
    pub when: TriggerTiming,
    pub event: TriggerEvent,
    pub table: String,
}

/// Catalog access for one backend.
pub trait Inspector {
    fn backend(&self) -> Backend;

    /// Name of the inspected database, as far as the connection knows it.
    fn database_name(&self) -> String;

    fn list_tables(&self) -> Result<BTreeSet<String>>;

    fn list_views(&self) -> Result<BTreeSet<String>>;

    /// Every index of the database with columns and uniqueness filled in.
    fn list_indices(&self) -> Result<Indices>;

    fn list_procedures(&self) -> Result<Vec<ProcedureStub>>;

    fn list_triggers(&self) -> Result<Vec<TriggerInfo>>;

    fn fill_columns(&self, owner: ColumnOwner<'_>) -> Result<Columns>;

    fn fill_indices(&self, table: &Table) -> Result<Indices>;

    fn fill_foreign_keys(&self, table: &Table) -> Result<Vec<ForeignKey>>;

    fn fill_procedure(&self, procedure: &Procedure) -> Result<ProcedureDetails>;

    fn supports_stored_procedures(&self) -> bool {
        true
    }

    fn case_sensitivity(&self) -> CaseSensitivity {
        self.backend().case_sensitivity()
    }

    /// Whether index names reported by the catalog are stable enough to
    /// compare across databases.
    fn usable_index_names(&self) -> bool {
        true
    }
}

/// Groups `(index, table, column, unique)` rows into indices, keeping the
/// row order for both indices and their columns.
pub(crate) fn group_index_rows<I>(rows: I, key: impl Fn(&str, &str) -> String) -> Indices
where
    I: IntoIterator<Item = (String, String, String, bool)>,
{
    let mut indices = Indices::new();
    for (name, table, column, unique) in rows {
        indices
            .entry(key(&name, &table))
            .or_insert_with(|| crate::schema::types::Index {
                name: name.clone(),
                columns: Vec::new(),
                is_unique: unique,
                table: Some(table.clone()),
            })
            .columns
            .push(column);
    }
    indices
}

/// Groups `(constraint, column, referenced table, referenced column)` rows
/// into foreign keys.
pub(crate) fn group_foreign_key_rows<I>(rows: I) -> Vec<ForeignKey>
where
    I: IntoIterator<Item = (String, String, String, String)>,
{
    let mut keys: IndexMap<String, ForeignKey> = IndexMap::new();
    for (constraint, column, referenced_table, referenced_column) in rows {
        let key = keys.entry(constraint).or_insert_with(|| ForeignKey {
            columns: Vec::new(),
            referenced_table,
            referenced_columns: Vec::new(),
        });
        key.columns.push(column);
        key.referenced_columns.push(referenced_column);
    }
    keys.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn backend_names() {
        assert_eq!(Backend::Postgres.to_string(), "PostgreSQL");
        assert_eq!(
            serde_json::to_string(&Backend::MySql).unwrap(),
            "\"mysql\""
        );
        assert_eq!(
            Backend::Oracle.case_sensitivity(),
            CaseSensitivity::SensitiveQuoted
        );
    }

    #[test]
    fn index_rows_are_grouped_in_order() {
        let rows = vec![
            ("ix_b".to_string(), "t".to_string(), "b2".to_string(), false),
            ("ix_a".to_string(), "t".to_string(), "a1".to_string(), true),
            ("ix_b".to_string(), "t".to_string(), "b1".to_string(), false),
        ];
        let indices = group_index_rows(rows, |name, table| format!("{table}.{name}"));
        let keys: Vec<&String> = indices.keys().collect();
        assert_eq!(keys, vec!["t.ix_b", "t.ix_a"]);
        assert_eq!(indices["t.ix_b"].columns, vec!["b2", "b1"]);
        assert!(indices["t.ix_a"].is_unique);
        assert_eq!(indices["t.ix_a"].table.as_deref(), Some("t"));
    }

    #[test]
    fn foreign_key_rows_pair_columns_positionally() {
        let rows = vec![
            ("fk".into(), "a".into(), "parent".into(), "x".into()),
            ("fk".into(), "b".into(), "parent".into(), "y".into()),
            ("fk2".into(), "c".into(), "other".into(), "id".into()),
        ];
        let keys = group_foreign_key_rows(rows);
        assert_eq!(
            keys,
            vec![
                ForeignKey::new(&["a", "b"], "parent", &["x", "y"]),
                ForeignKey::new(&["c"], "other", &["id"]),
            ]
        );
    }
}
