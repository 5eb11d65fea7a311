//! Schema difference calculator
//!
//! Compares two schema graphs by name: tables first, then the columns of
//! every table present on both sides. Nothing is computed until a result is
//! read, and each result is computed once.
//!
//! Reading a diff reads `tables` and `columns` of both databases, so
//! inspector-backed graphs run their catalog queries as a side effect.

use indexmap::IndexMap;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

use crate::error::Result;
use crate::schema::objects::{Database, Table};
use crate::schema::types::{Column, Columns};

/// How an entity differs from source to destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DiffState {
    Unchanged,
    Created,
    Altered,
    Dropped,
}

impl fmt::Display for DiffState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DiffState::Unchanged => "UNCHANGED",
            DiffState::Created => "CREATED",
            DiffState::Altered => "ALTERED",
            DiffState::Dropped => "DROPPED",
        })
    }
}

/// State of an entity found on `source`, `dest` or both sides.
fn presence<T>(source: Option<&T>, dest: Option<&T>) -> Option<DiffState> {
    match (source, dest) {
        (None, Some(_)) => Some(DiffState::Created),
        (Some(_), None) => Some(DiffState::Dropped),
        _ => None,
    }
}

/// Pair up two name-keyed maps: every source entry in source order, then
/// the entries only the destination has.
fn match_by_name<'a, V>(
    source: &'a IndexMap<String, V>,
    dest: &'a IndexMap<String, V>,
) -> impl Iterator<Item = (&'a String, Option<&'a V>, Option<&'a V>)> {
    source
        .iter()
        .map(move |(name, s)| (name, Some(s), dest.get(name)))
        .chain(
            dest.iter()
                .filter(move |(name, _)| !source.contains_key(*name))
                .map(|(name, d)| (name, None, Some(d))),
        )
}

/// One column compared across both sides.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDiff {
    pub name: String,
    pub source: Option<Column>,
    pub dest: Option<Column>,
    pub state: DiffState,
}

impl ColumnDiff {
    /// A column on both sides is altered when its type, nullability or
    /// default changed.
    pub fn new(name: &str, source: Option<Column>, dest: Option<Column>) -> Self {
        let state = match (&source, &dest) {
            (Some(s), Some(d))
                if s.data_type != d.data_type || s.not_null != d.not_null || s.default != d.default =>
            {
                DiffState::Altered
            }
            (s, d) => presence(s.as_ref(), d.as_ref()).unwrap_or(DiffState::Unchanged),
        };
        Self {
            name: name.to_string(),
            source,
            dest,
            state,
        }
    }
}

/// One table compared across both sides.
pub struct TableDiff {
    name: String,
    source: Option<Rc<Table>>,
    dest: Option<Rc<Table>>,
    columns: OnceCell<IndexMap<String, ColumnDiff>>,
}

impl TableDiff {
    pub fn new(name: &str, source: Option<Rc<Table>>, dest: Option<Rc<Table>>) -> Self {
        Self {
            name: name.to_string(),
            source,
            dest,
            columns: OnceCell::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> Option<&Rc<Table>> {
        self.source.as_ref()
    }

    pub fn dest(&self) -> Option<&Rc<Table>> {
        self.dest.as_ref()
    }

    /// Created or dropped when only one side has the table, otherwise
    /// altered when any column is not unchanged.
    pub fn state(&self) -> Result<DiffState> {
        if let Some(state) = presence(self.source.as_ref(), self.dest.as_ref()) {
            return Ok(state);
        }
        let altered = self
            .columns()?
            .values()
            .any(|column| column.state != DiffState::Unchanged);
        Ok(if altered {
            DiffState::Altered
        } else {
            DiffState::Unchanged
        })
    }

    /// Column correspondence. A table present on one side only reports all
    /// of its columns as created or dropped.
    pub fn columns(&self) -> Result<&IndexMap<String, ColumnDiff>> {
        self.columns.get_or_try_init(|| {
            let empty: Rc<Columns> = Rc::default();
            let source = match &self.source {
                Some(table) => table.columns()?,
                None => Rc::clone(&empty),
            };
            let dest = match &self.dest {
                Some(table) => table.columns()?,
                None => empty,
            };
            debug!(table = %self.name, "comparing columns");
            Ok(match_by_name(&source, &dest)
                .map(|(name, s, d)| (name.clone(), ColumnDiff::new(name, s.cloned(), d.cloned())))
                .collect())
        })
    }
}

impl fmt::Debug for TableDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDiff")
            .field("name", &self.name)
            .field("source", &self.source.is_some())
            .field("dest", &self.dest.is_some())
            .finish_non_exhaustive()
    }
}

/// Difference between two databases. Both sides are required.
pub struct DatabaseDiff<'a> {
    source: &'a Database,
    dest: &'a Database,
    tables: OnceCell<IndexMap<String, TableDiff>>,
}

impl<'a> DatabaseDiff<'a> {
    pub fn new(source: &'a Database, dest: &'a Database) -> Self {
        Self {
            source,
            dest,
            tables: OnceCell::new(),
        }
    }

    pub fn source(&self) -> &Database {
        self.source
    }

    pub fn dest(&self) -> &Database {
        self.dest
    }

    /// Table correspondence by exact name.
    pub fn tables(&self) -> Result<&IndexMap<String, TableDiff>> {
        self.tables.get_or_try_init(|| {
            let source = self.source.tables()?;
            let dest = self.dest.tables()?;
            debug!(
                source = %self.source.name(),
                dest = %self.dest.name(),
                "comparing tables"
            );
            Ok(match_by_name(&source, &dest)
                .map(|(name, s, d)| (name.clone(), TableDiff::new(name, s.cloned(), d.cloned())))
                .collect())
        })
    }

    /// True when every table is unchanged.
    pub fn is_empty(&self) -> Result<bool> {
        for table in self.tables()?.values() {
            if table.state()? != DiffState::Unchanged {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl fmt::Debug for DatabaseDiff<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseDiff")
            .field("source", &self.source.name())
            .field("dest", &self.dest.name())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn table(name: &str, columns: &[(&str, &str)]) -> Table {
        Table::with_columns(name, columns.iter().map(|(n, t)| Column::new(n, t)))
    }

    fn database(name: &str, tables: Vec<Table>) -> Rc<Database> {
        let db = Database::new(name);
        db.set_tables(tables).unwrap();
        db
    }

    #[test]
    fn new_and_dropped_tables() {
        let source = database("s", vec![table("a", &[("id", "integer")])]);
        let dest = database(
            "d",
            vec![table("a", &[("id", "integer")]), table("b", &[("id", "integer")])],
        );

        let diff = DatabaseDiff::new(&source, &dest);
        let tables = diff.tables().unwrap();
        assert_eq!(tables["a"].state().unwrap(), DiffState::Unchanged);
        assert_eq!(tables["b"].state().unwrap(), DiffState::Created);

        let reverse = DatabaseDiff::new(&dest, &source);
        assert_eq!(reverse.tables().unwrap()["b"].state().unwrap(), DiffState::Dropped);
    }

    #[test]
    fn extra_column_alters_the_table() {
        let source = database("s", vec![table("a", &[("id", "integer")])]);
        let dest = database("d", vec![table("a", &[("id", "integer"), ("name", "text")])]);

        let diff = DatabaseDiff::new(&source, &dest);
        let a = &diff.tables().unwrap()["a"];
        assert_eq!(a.state().unwrap(), DiffState::Altered);
        let columns = a.columns().unwrap();
        assert_eq!(columns["id"].state, DiffState::Unchanged);
        assert_eq!(columns["name"].state, DiffState::Created);
        assert_eq!(columns["name"].source, None);
        assert!(!diff.is_empty().unwrap());
    }

    #[test]
    fn changed_attributes_alter_the_column() {
        let source = database(
            "s",
            vec![Table::with_columns(
                "a",
                [
                    Column::new("id", "integer"),
                    Column::new("name", "text"),
                    Column::new("flag", "integer").default(0i64),
                ],
            )],
        );
        let dest = database(
            "d",
            vec![Table::with_columns(
                "a",
                [
                    Column::new("id", "bigint"),
                    Column::new("name", "text").not_null(true),
                    Column::new("flag", "integer").default(1i64),
                ],
            )],
        );

        let diff = DatabaseDiff::new(&source, &dest);
        let columns = diff.tables().unwrap()["a"].columns().unwrap();
        assert!(columns.values().all(|c| c.state == DiffState::Altered));
    }

    #[test]
    fn a_database_equals_itself() {
        let db = database(
            "s",
            vec![
                table("a", &[("id", "integer")]),
                table("b", &[("id", "integer"), ("a_id", "integer")]),
            ],
        );
        let diff = DatabaseDiff::new(&db, &db);
        for table in diff.tables().unwrap().values() {
            assert_eq!(table.state().unwrap(), DiffState::Unchanged);
        }
        assert!(diff.is_empty().unwrap());
    }

    #[test]
    fn one_sided_tables_list_their_columns() {
        let source = database("s", vec![table("gone", &[("id", "integer"), ("x", "text")])]);
        let dest = database("d", vec![]);
        let diff = DatabaseDiff::new(&source, &dest);
        let gone = &diff.tables().unwrap()["gone"];
        assert!(gone.dest().is_none());
        let states: Vec<DiffState> = gone.columns().unwrap().values().map(|c| c.state).collect();
        assert_eq!(states, vec![DiffState::Dropped, DiffState::Dropped]);
    }

    #[test]
    fn ordering_follows_source_then_dest() {
        let source = database("s", vec![table("b", &[]), table("a", &[])]);
        let dest = database("d", vec![table("c", &[]), table("a", &[])]);
        let diff = DatabaseDiff::new(&source, &dest);
        let names: Vec<&String> = diff.tables().unwrap().keys().collect();
        assert_eq!(names, vec!["b", "a", "c"]);
    }
}
