//! Serializable copies of a schema graph
//!
//! A [`Snapshot`] walks a [`Database`] once, reading every collection, and
//! holds the result as plain data. It can be written to JSON and turned
//! back into a graph without inspector, so a live database can be diffed
//! against one that was saved earlier.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::rc::Rc;
use tracing::info;

use crate::error::Result;
use crate::inspector::{Backend, ProcedureDetails};
use crate::schema::objects::{Database, Procedure, Table, Trigger, View};
use crate::schema::types::{Columns, ForeignKey, Indices};

/// A table with all of its details.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TableSnapshot {
    pub columns: Columns,
    pub indices: Indices,
    pub foreign_keys: Vec<ForeignKey>,
}

/// Everything known about a database at one point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub name: String,
    /// Backend the snapshot was taken from, when it came from an inspector.
    pub backend: Option<Backend>,
    pub tables: IndexMap<String, TableSnapshot>,
    #[serde(default)]
    pub views: IndexMap<String, Columns>,
    #[serde(default)]
    pub indices: Indices,
    #[serde(default)]
    pub procedures: IndexMap<String, ProcedureDetails>,
    #[serde(default)]
    pub triggers: Vec<Trigger>,
}

impl Snapshot {
    /// Read the whole graph, fetching whatever has not been fetched yet.
    pub fn of(database: &Database) -> Result<Self> {
        let mut tables = IndexMap::new();
        for (name, table) in database.tables()?.iter() {
            let snapshot = TableSnapshot {
                columns: (*table.columns()?).clone(),
                indices: (*table.indices()?).clone(),
                foreign_keys: (*table.foreign_keys()?).clone(),
            };
            tables.insert(name.clone(), snapshot);
        }

        let mut views = IndexMap::new();
        for (name, view) in database.views()?.iter() {
            views.insert(name.clone(), (*view.columns()?).clone());
        }

        let mut procedures = IndexMap::new();
        for (name, procedure) in database.procedures()?.iter() {
            procedures.insert(name.clone(), (*procedure.details()?).clone());
        }

        let snapshot = Snapshot {
            name: database.name().to_string(),
            backend: database.backend(),
            tables,
            views,
            indices: (*database.indices()?).clone(),
            procedures,
            triggers: database
                .triggers()?
                .values()
                .map(|trigger| (**trigger).clone())
                .collect(),
        };
        info!(
            database = %snapshot.name,
            tables = snapshot.tables.len(),
            views = snapshot.views.len(),
            "took schema snapshot"
        );
        Ok(snapshot)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Build a graph without inspector holding exactly this data.
    pub fn into_database(self) -> Result<Rc<Database>> {
        let database = Database::new(&self.name);

        let mut tables = Vec::with_capacity(self.tables.len());
        for (name, snapshot) in self.tables {
            let table = Table::with_columns(&name, snapshot.columns.into_values());
            table.set_indices(snapshot.indices.into_values())?;
            table.set_foreign_keys(snapshot.foreign_keys)?;
            tables.push(table);
        }
        database.set_tables(tables)?;
        database.set_views(
            self.views
                .into_iter()
                .map(|(name, columns)| View::with_columns(&name, columns.into_values())),
        )?;
        database.set_procedures(
            self.procedures
                .into_iter()
                .map(|(name, details)| Procedure::with_details(&name, details)),
        )?;
        database.set_triggers(self.triggers)?;
        database.set_indices_by_key(self.indices)?;
        Ok(database)
    }
}

impl Database {
    /// Shorthand for [`Snapshot::of`].
    pub fn snapshot(&self) -> Result<Snapshot> {
        Snapshot::of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::diff::{DatabaseDiff, DiffState};
    use crate::schema::types::{Column, Index, TriggerEvent, TriggerTiming};
    use pretty_assertions::assert_eq;

    fn library() -> Rc<Database> {
        let db = Database::new("library");
        let books = Table::with_columns(
            "books",
            [
                Column::new("id", "integer").not_null(true),
                Column::new("title", "varchar(800)").default("untitled"),
                Column::new("author_id", "integer"),
            ],
        );
        books
            .set_indices([Index::new("ix_title", &["title"], false).on_table("books")])
            .unwrap();
        books
            .set_foreign_keys(vec![ForeignKey::new(&["author_id"], "authors", &["id"])])
            .unwrap();
        db.set_tables([books, Table::with_columns("authors", [Column::new("id", "integer")])])
            .unwrap();
        db.set_views([View::with_columns("titles", [Column::new("title", "varchar(800)")])])
            .unwrap();
        db.set_triggers([Trigger::new("audit", TriggerTiming::After, TriggerEvent::Insert, "books")])
            .unwrap();
        db
    }

    #[test]
    fn snapshot_survives_json() {
        let snapshot = library().snapshot().unwrap();
        assert_eq!(snapshot.backend, None);
        assert_eq!(snapshot.tables["books"].columns["title"].default, Some("untitled".into()));

        let json = snapshot.to_json().unwrap();
        assert!(json.contains("\"type\": \"varchar(800)\""));
        assert_eq!(Snapshot::from_json(&json).unwrap(), snapshot);
    }

    #[test]
    fn restored_graph_diffs_clean_against_the_original() {
        let original = library();
        let restored = original.snapshot().unwrap().into_database().unwrap();

        let books = restored.table("books").unwrap().unwrap();
        assert_eq!(books.foreign_keys().unwrap().len(), 1);
        assert!(books.database().is_some());
        assert_eq!(restored.triggers().unwrap().len(), 1);
        assert_eq!(restored.views().unwrap()["titles"].columns().unwrap().len(), 1);

        let diff = DatabaseDiff::new(&original, &restored);
        assert!(diff.is_empty().unwrap());
    }

    #[test]
    fn restored_graph_shows_later_changes() {
        let saved = library().snapshot().unwrap().into_database().unwrap();
        let current = library();
        current.drop_table("authors").unwrap();

        let diff = DatabaseDiff::new(&saved, &current);
        assert_eq!(diff.tables().unwrap()["authors"].state().unwrap(), DiffState::Dropped);
    }

    #[test]
    fn malformed_json_is_a_serialization_error() {
        assert!(matches!(
            Snapshot::from_json("{\"name\": 1}"),
            Err(crate::error::Error::SerializationError(_))
        ));
    }
}
