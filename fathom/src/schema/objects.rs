//! The schema object graph
//!
//! A [`Database`] bound to an [`Inspector`] discovers its contents on
//! demand: every collection is fetched on first read and cached afterwards.
//! Graphs can also be put together by hand, without an inspector, by
//! assigning the collections directly.
//!
//! The graph is single-threaded (`Rc`, `RefCell`). Use one `Database` per
//! thread.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::fmt;
use std::rc::{Rc, Weak};
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::inspector::{Backend, CaseSensitivity, ColumnOwner, Inspector, ProcedureDetails, ProcedureStub};
use crate::schema::lazy::Lazy;
use crate::schema::types::{Argument, Column, Columns, ForeignKey, Index, Indices, TriggerEvent, TriggerTiming};
use crate::utils::naming::normalize_identifier;

pub type Tables = IndexMap<String, Rc<Table>>;
pub type Views = IndexMap<String, Rc<View>>;
pub type Procedures = IndexMap<String, Rc<Procedure>>;
pub type Triggers = IndexMap<String, Rc<Trigger>>;

/// Read a lazy collection, asking the inspector only when there is one.
fn load<T: Default>(
    lazy: &Lazy<T>,
    inspector: Option<&Rc<dyn Inspector>>,
    fetch: impl FnOnce(&dyn Inspector) -> Result<T>,
) -> Result<Rc<T>> {
    lazy.get_or_fetch(|| match inspector {
        Some(inspector) => fetch(&**inspector),
        None => Ok(T::default()),
    })
}

fn columns_by_name(columns: impl IntoIterator<Item = Column>) -> Columns {
    columns.into_iter().map(|c| (c.name.clone(), c)).collect()
}

/// Root of the graph.
pub struct Database {
    name: String,
    inspector: Option<Rc<dyn Inspector>>,
    this: Weak<Database>,
    /// Tables removed with `drop_table`; catalog fetches skip them.
    dropped: RefCell<BTreeSet<String>>,
    tables: Lazy<Tables>,
    views: Lazy<Views>,
    procedures: Lazy<Procedures>,
    triggers: Lazy<Triggers>,
    indices: Lazy<Indices>,
}

impl Database {
    /// A database without inspector; collections are empty until assigned.
    pub fn new(name: &str) -> Rc<Self> {
        Self::build(name.to_string(), None)
    }

    /// A database whose collections are discovered through `inspector`.
    pub fn with_inspector(inspector: Rc<dyn Inspector>) -> Rc<Self> {
        let name = inspector.database_name();
        info!(backend = %inspector.backend(), database = %name, "binding database");
        Self::build(name, Some(inspector))
    }

    fn build(name: String, inspector: Option<Rc<dyn Inspector>>) -> Rc<Self> {
        Rc::new_cyclic(|this| Database {
            name,
            inspector,
            this: this.clone(),
            dropped: RefCell::new(BTreeSet::new()),
            tables: Lazy::new("tables"),
            views: Lazy::new("views"),
            procedures: Lazy::new("procedures"),
            triggers: Lazy::new("triggers"),
            indices: Lazy::new("indices"),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inspector(&self) -> Option<&Rc<dyn Inspector>> {
        self.inspector.as_ref()
    }

    pub fn backend(&self) -> Option<Backend> {
        self.inspector.as_ref().map(|i| i.backend())
    }

    fn is_live(&self) -> bool {
        self.inspector.is_some()
    }

    fn was_dropped(&self, table: &str) -> bool {
        self.dropped.borrow().contains(table)
    }

    pub fn supports_stored_procedures(&self) -> bool {
        self.inspector
            .as_ref()
            .map_or(true, |i| i.supports_stored_procedures())
    }

    /// Case rules of the backend; exact matching without inspector.
    pub fn case_sensitivity(&self) -> CaseSensitivity {
        self.inspector
            .as_ref()
            .map_or(CaseSensitivity::Sensitive, |i| i.case_sensitivity())
    }

    pub fn usable_index_names(&self) -> bool {
        self.inspector.as_ref().map_or(true, |i| i.usable_index_names())
    }

    pub fn tables(&self) -> Result<Rc<Tables>> {
        load(&self.tables, self.inspector.as_ref(), |inspector| {
            let names = inspector.list_tables()?;
            debug!(count = names.len(), "fetched tables");
            Ok(names
                .into_iter()
                .filter(|name| !self.was_dropped(name))
                .map(|name| {
                    let table = Table::inspected(&name, self.inspector.clone(), self.this.clone());
                    (name, Rc::new(table))
                })
                .collect())
        })
    }

    /// Replace the tables by hand. Each table is attached to this database.
    pub fn set_tables(&self, tables: impl IntoIterator<Item = Table>) -> Result<()> {
        let tables: Tables = tables
            .into_iter()
            .map(|table| {
                *table.database.borrow_mut() = self.this.clone();
                (table.name.clone(), Rc::new(table))
            })
            .collect();
        let names: Vec<String> = tables.keys().cloned().collect();
        self.tables.assign(tables, self.is_live())?;
        self.dropped.borrow_mut().retain(|name| !names.contains(name));
        Ok(())
    }

    pub fn views(&self) -> Result<Rc<Views>> {
        load(&self.views, self.inspector.as_ref(), |inspector| {
            Ok(inspector
                .list_views()?
                .into_iter()
                .map(|name| {
                    let view = View::inspected(&name, self.inspector.clone());
                    (name, Rc::new(view))
                })
                .collect())
        })
    }

    pub fn set_views(&self, views: impl IntoIterator<Item = View>) -> Result<()> {
        let views = views
            .into_iter()
            .map(|view| (view.name.clone(), Rc::new(view)))
            .collect();
        self.views.assign(views, self.is_live())
    }

    /// Stored procedures; empty on backends without them.
    pub fn procedures(&self) -> Result<Rc<Procedures>> {
        load(&self.procedures, self.inspector.as_ref(), |inspector| {
            if !inspector.supports_stored_procedures() {
                return Ok(Procedures::new());
            }
            Ok(inspector
                .list_procedures()?
                .into_iter()
                .map(|stub| {
                    let name = stub.name.clone();
                    (name, Rc::new(Procedure::inspected(stub, self.inspector.clone())))
                })
                .collect())
        })
    }

    pub fn set_procedures(&self, procedures: impl IntoIterator<Item = Procedure>) -> Result<()> {
        let procedures = procedures
            .into_iter()
            .map(|p| (p.name.clone(), Rc::new(p)))
            .collect();
        self.procedures.assign(procedures, self.is_live())
    }

    /// Triggers keyed `name@table`.
    pub fn triggers(&self) -> Result<Rc<Triggers>> {
        load(&self.triggers, self.inspector.as_ref(), |inspector| {
            let mut triggers = Triggers::new();
            for info in inspector.list_triggers()? {
                if self.was_dropped(&info.table) {
                    continue;
                }
                let trigger = Trigger::new(&info.name, info.when, info.event, &info.table);
                // multi-event triggers come back once per event
                triggers.entry(trigger.key()).or_insert_with(|| Rc::new(trigger));
            }
            Ok(triggers)
        })
    }

    pub fn set_triggers(&self, triggers: impl IntoIterator<Item = Trigger>) -> Result<()> {
        let triggers = triggers
            .into_iter()
            .map(|t| (t.key(), Rc::new(t)))
            .collect();
        self.triggers.assign(triggers, self.is_live())
    }

    /// Every index of the database. Keys are index names, or `table.index`
    /// on backends where index names are only unique per table.
    pub fn indices(&self) -> Result<Rc<Indices>> {
        load(&self.indices, self.inspector.as_ref(), |inspector| {
            let mut indices = inspector.list_indices()?;
            indices.retain(|_, index| match index.table.as_deref() {
                Some(table) => !self.was_dropped(table),
                None => true,
            });
            Ok(indices)
        })
    }

    /// Replace the indices by hand, keyed by index name.
    pub fn set_indices(&self, indices: impl IntoIterator<Item = Index>) -> Result<()> {
        self.set_indices_by_key(
            indices
                .into_iter()
                .map(|index| (index.name.clone(), index))
                .collect(),
        )
    }

    /// Replace the indices by hand, keeping the given keys.
    pub fn set_indices_by_key(&self, indices: Indices) -> Result<()> {
        self.indices.assign(indices, self.is_live())
    }

    /// Look a table up the way the backend resolves an identifier written
    /// as `name`: exact match first, then with unquoted-identifier folding.
    pub fn table(&self, name: &str) -> Result<Option<Rc<Table>>> {
        let tables = self.tables()?;
        if let Some(table) = tables.get(name) {
            return Ok(Some(Rc::clone(table)));
        }
        Ok(self
            .backend()
            .and_then(|backend| tables.get(&normalize_identifier(name, backend)))
            .cloned())
    }

    pub fn view(&self, name: &str) -> Result<Option<Rc<View>>> {
        let views = self.views()?;
        if let Some(view) = views.get(name) {
            return Ok(Some(Rc::clone(view)));
        }
        Ok(self
            .backend()
            .and_then(|backend| views.get(&normalize_identifier(name, backend)))
            .cloned())
    }

    /// Remove a table from the graph. The removed instance refuses further
    /// detail access, and its indices and triggers disappear from the
    /// database-level collections, including ones fetched later. Nothing is
    /// executed against the database.
    pub fn drop_table(&self, name: &str) -> Result<Option<Rc<Table>>> {
        let Some(table) = self.table(name)? else {
            return Ok(None);
        };
        let key = table.name().to_string();
        self.dropped.borrow_mut().insert(key.clone());
        self.tables.update(|tables| tables.shift_remove(&key));
        self.indices
            .update(|indices| indices.retain(|_, index| index.table.as_deref() != Some(key.as_str())));
        self.triggers
            .update(|triggers| triggers.retain(|_, trigger| trigger.table != key));
        table.dropped.set(true);
        info!(table = %key, "dropped table from schema graph");
        Ok(Some(table))
    }

    pub fn invalidate_tables(&self) {
        self.tables.invalidate();
    }

    pub fn invalidate_views(&self) {
        self.views.invalidate();
    }

    pub fn invalidate_procedures(&self) {
        self.procedures.invalidate();
    }

    pub fn invalidate_triggers(&self) {
        self.triggers.invalidate();
    }

    pub fn invalidate_indices(&self) {
        self.indices.invalidate();
    }

    /// Forget everything fetched so far.
    pub fn invalidate(&self) {
        self.invalidate_tables();
        self.invalidate_views();
        self.invalidate_procedures();
        self.invalidate_triggers();
        self.invalidate_indices();
    }
}

impl fmt::Debug for Database {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Database")
            .field("name", &self.name)
            .field("backend", &self.backend())
            .finish_non_exhaustive()
    }
}

/// A table with lazily discovered columns, indices and foreign keys.
pub struct Table {
    name: String,
    database: RefCell<Weak<Database>>,
    inspector: Option<Rc<dyn Inspector>>,
    dropped: Cell<bool>,
    columns: Lazy<Columns>,
    indices: Lazy<Indices>,
    foreign_keys: Lazy<Vec<ForeignKey>>,
}

impl Table {
    /// A detached table without inspector.
    pub fn new(name: &str) -> Self {
        Self::inspected(name, None, Weak::new())
    }

    /// A detached table with the given columns.
    pub fn with_columns(name: &str, columns: impl IntoIterator<Item = Column>) -> Self {
        let table = Self::new(name);
        table.columns.assign(columns_by_name(columns), false).ok();
        table
    }

    fn inspected(name: &str, inspector: Option<Rc<dyn Inspector>>, database: Weak<Database>) -> Self {
        Self {
            name: name.to_string(),
            database: RefCell::new(database),
            inspector,
            dropped: Cell::new(false),
            columns: Lazy::new("columns"),
            indices: Lazy::new("indices"),
            foreign_keys: Lazy::new("foreign_keys"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The owning database, while it is alive.
    pub fn database(&self) -> Option<Rc<Database>> {
        self.database.borrow().upgrade()
    }

    pub fn is_dropped(&self) -> bool {
        self.dropped.get()
    }

    fn ensure_present(&self) -> Result<()> {
        if self.dropped.get() {
            return Err(Error::DroppedTable(self.name.clone()));
        }
        Ok(())
    }

    fn is_live(&self) -> bool {
        self.inspector.is_some()
    }

    pub fn columns(&self) -> Result<Rc<Columns>> {
        self.ensure_present()?;
        load(&self.columns, self.inspector.as_ref(), |inspector| {
            debug!(table = %self.name, "fetching columns");
            inspector.fill_columns(ColumnOwner::Table(self))
        })
    }

    pub fn set_columns(&self, columns: impl IntoIterator<Item = Column>) -> Result<()> {
        self.ensure_present()?;
        self.columns.assign(columns_by_name(columns), self.is_live())
    }

    pub fn indices(&self) -> Result<Rc<Indices>> {
        self.ensure_present()?;
        load(&self.indices, self.inspector.as_ref(), |inspector| {
            debug!(table = %self.name, "fetching indices");
            inspector.fill_indices(self)
        })
    }

    pub fn set_indices(&self, indices: impl IntoIterator<Item = Index>) -> Result<()> {
        self.ensure_present()?;
        let indices = indices
            .into_iter()
            .map(|index| (index.name.clone(), index))
            .collect();
        self.indices.assign(indices, self.is_live())
    }

    pub fn foreign_keys(&self) -> Result<Rc<Vec<ForeignKey>>> {
        self.ensure_present()?;
        load(&self.foreign_keys, self.inspector.as_ref(), |inspector| {
            debug!(table = %self.name, "fetching foreign keys");
            inspector.fill_foreign_keys(self)
        })
    }

    pub fn set_foreign_keys(&self, foreign_keys: Vec<ForeignKey>) -> Result<()> {
        self.ensure_present()?;
        self.foreign_keys.assign(foreign_keys, self.is_live())
    }

    /// Forget fetched details; the next read asks the inspector again.
    pub fn invalidate(&self) {
        self.columns.invalidate();
        self.indices.invalidate();
        self.foreign_keys.invalidate();
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("dropped", &self.dropped.get())
            .finish_non_exhaustive()
    }
}

/// A view; only its columns are modelled.
pub struct View {
    name: String,
    inspector: Option<Rc<dyn Inspector>>,
    columns: Lazy<Columns>,
}

impl View {
    pub fn new(name: &str) -> Self {
        Self::inspected(name, None)
    }

    pub fn with_columns(name: &str, columns: impl IntoIterator<Item = Column>) -> Self {
        let view = Self::new(name);
        view.columns.assign(columns_by_name(columns), false).ok();
        view
    }

    fn inspected(name: &str, inspector: Option<Rc<dyn Inspector>>) -> Self {
        Self {
            name: name.to_string(),
            inspector,
            columns: Lazy::new("columns"),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> Result<Rc<Columns>> {
        load(&self.columns, self.inspector.as_ref(), |inspector| {
            debug!(view = %self.name, "fetching columns");
            inspector.fill_columns(ColumnOwner::View(self))
        })
    }

    pub fn set_columns(&self, columns: impl IntoIterator<Item = Column>) -> Result<()> {
        self.columns
            .assign(columns_by_name(columns), self.inspector.is_some())
    }

    pub fn invalidate(&self) {
        self.columns.invalidate();
    }
}

impl fmt::Debug for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("View").field("name", &self.name).finish_non_exhaustive()
    }
}

/// A stored procedure or function.
pub struct Procedure {
    name: String,
    base_name: String,
    signature: Option<String>,
    inspector: Option<Rc<dyn Inspector>>,
    details: Lazy<ProcedureDetails>,
}

impl Procedure {
    /// A procedure without inspector and without details.
    pub fn new(name: &str) -> Self {
        Self::inspected(ProcedureStub::named(name), None)
    }

    /// A procedure with known details.
    pub fn with_details(name: &str, details: ProcedureDetails) -> Self {
        let procedure = Self::new(name);
        procedure.details.assign(details, false).ok();
        procedure
    }

    fn inspected(stub: ProcedureStub, inspector: Option<Rc<dyn Inspector>>) -> Self {
        Self {
            name: stub.name,
            base_name: stub.base_name,
            signature: stub.signature,
            inspector,
            details: Lazy::new("procedure details"),
        }
    }

    /// Identity within the database, e.g. `fib(int4)` on PostgreSQL.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Name as declared, without argument types.
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    /// Backend-specific overload key.
    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn details(&self) -> Result<Rc<ProcedureDetails>> {
        load(&self.details, self.inspector.as_ref(), |inspector| {
            debug!(procedure = %self.name, "fetching procedure details");
            inspector.fill_procedure(self)
        })
    }

    pub fn arguments(&self) -> Result<IndexMap<String, Argument>> {
        Ok(self.details()?.arguments.clone())
    }

    pub fn returns(&self) -> Result<Option<String>> {
        Ok(self.details()?.returns.clone())
    }

    pub fn sql(&self) -> Result<String> {
        Ok(self.details()?.sql.clone())
    }

    pub fn set_details(&self, details: ProcedureDetails) -> Result<()> {
        self.details.assign(details, self.inspector.is_some())
    }

    pub fn invalidate(&self) {
        self.details.invalidate();
    }
}

impl fmt::Debug for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Procedure")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// A trigger. Identity within the database is `name@table`, since some
/// backends only scope trigger names per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    pub name: String,
    pub when: TriggerTiming,
    pub event: TriggerEvent,
    pub table: String,
}

impl Trigger {
    pub fn new(name: &str, when: TriggerTiming, event: TriggerEvent, table: &str) -> Self {
        Self {
            name: name.to_string(),
            when,
            event,
            table: table.to_string(),
        }
    }

    pub fn key(&self) -> String {
        format!("{}@{}", self.name, self.table)
    }
}
