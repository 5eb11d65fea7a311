//! Schema module for fathom
//!
//! The lazily populated object graph, the values it holds, snapshots of it,
//! and the comparison of two graphs.

pub mod diff;
pub(crate) mod lazy;
pub mod objects;
pub mod snapshot;
pub mod types;

// Re-export key types
pub use diff::{ColumnDiff, DatabaseDiff, DiffState, TableDiff};
pub use objects::{Database, Procedure, Procedures, Table, Tables, Trigger, Triggers, View, Views};
pub use snapshot::{Snapshot, TableSnapshot};
pub use types::{
    Argument, Column, Columns, ForeignKey, Index, Indices, TriggerEvent, TriggerTiming,
};
