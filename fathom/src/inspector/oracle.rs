//! Oracle inspector
//!
//! Reads the `user_*` data dictionary views of the connected schema.
//! Unquoted identifiers are stored upper case.

use indexmap::IndexMap;
use std::collections::BTreeSet;
use tracing::debug;

use crate::db::connection::{DatabaseConnection, Driver};
use crate::error::{Error, Result};
use crate::inspector::{
    group_foreign_key_rows, group_index_rows, Backend, ColumnOwner, Inspector, ProcedureDetails,
    ProcedureStub, TriggerInfo,
};
use crate::schema::objects::{Procedure, Table};
use crate::schema::types::{Argument, Column, Columns, ForeignKey, Indices};

const TABLE_NAMES_SQL: &str = "
SELECT table_name
FROM user_tables
ORDER BY 1";

const VIEW_NAMES_SQL: &str = "
SELECT view_name
FROM user_views
ORDER BY 1";

const COLUMNS_SQL: &str = "
SELECT column_name, data_type, char_length, nullable, data_default
FROM user_tab_columns
WHERE table_name = :1
ORDER BY column_id";

const INDICES_SQL: &str = "
SELECT i.index_name, i.table_name, c.column_name, i.uniqueness
FROM user_indexes i
JOIN user_ind_columns c ON c.index_name = i.index_name
ORDER BY i.index_name, c.column_position";

const TABLE_INDICES_SQL: &str = "
SELECT i.index_name, i.table_name, c.column_name, i.uniqueness
FROM user_indexes i
JOIN user_ind_columns c ON c.index_name = i.index_name
WHERE i.table_name = :1
ORDER BY i.index_name, c.column_position";

const FOREIGN_KEYS_SQL: &str = "
SELECT c.constraint_name, cc.column_name, r.table_name, rc.column_name
FROM user_constraints c
JOIN user_cons_columns cc ON cc.constraint_name = c.constraint_name
JOIN user_constraints r ON r.constraint_name = c.r_constraint_name
JOIN user_cons_columns rc
    ON rc.constraint_name = r.constraint_name AND rc.position = cc.position
WHERE c.constraint_type = 'R' AND c.table_name = :1
ORDER BY c.constraint_name, cc.position";

const PROCEDURES_SQL: &str = "
SELECT o.object_name, a.data_type
FROM user_objects o
LEFT JOIN user_arguments a
    ON a.object_name = o.object_name AND a.package_name IS NULL AND a.argument_name IS NOT NULL
WHERE o.object_type IN ('PROCEDURE', 'FUNCTION')
ORDER BY o.object_name, a.position";

const ARGUMENTS_SQL: &str = "
SELECT argument_name, data_type, position
FROM user_arguments
WHERE object_name = :1 AND package_name IS NULL AND data_level = 0
ORDER BY position";

const SOURCE_SQL: &str = "
SELECT text
FROM user_source
WHERE name = :1 AND type IN ('PROCEDURE', 'FUNCTION')
ORDER BY line";

const TRIGGERS_SQL: &str = "
SELECT trigger_name, trigger_type, triggering_event, table_name
FROM user_triggers
WHERE base_object_type = 'TABLE'
ORDER BY 1";

/// Lower-cased type name; character types carry their length.
pub fn normalize_type(data_type: &str, char_length: Option<i64>) -> String {
    let data_type = data_type.to_lowercase();
    match char_length {
        Some(length)
            if length > 0 && matches!(data_type.as_str(), "char" | "nchar" | "varchar2" | "nvarchar2") =>
        {
            format!("{data_type}({length})")
        }
        _ => data_type,
    }
}

/// `user_triggers.trigger_type` reads like `BEFORE EACH ROW`; only the
/// timing word matters.
fn trigger_timing(trigger_type: &str) -> &str {
    trigger_type.split_whitespace().next().unwrap_or_default()
}

/// Inspector for the schema of the connected Oracle user.
pub struct OracleInspector<D = DatabaseConnection> {
    driver: D,
}

impl<D: Driver> OracleInspector<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    fn names(&self, sql: &str) -> Result<BTreeSet<String>> {
        self.driver
            .select(sql, &[])?
            .iter()
            .map(|row| row.text(0))
            .collect()
    }

    fn index_rows(&self, sql: &str, params: &[&str]) -> Result<Vec<(String, String, String, bool)>> {
        self.driver
            .select(sql, params)?
            .iter()
            .map(|row| Ok((row.text(0)?, row.text(1)?, row.text(2)?, row.flag(3)?)))
            .collect()
    }
}

impl<D: Driver> Inspector for OracleInspector<D> {
    fn backend(&self) -> Backend {
        Backend::Oracle
    }

    /// The schema owner, since everything is read from the `user_*` views.
    fn database_name(&self) -> String {
        self.driver.database_name().unwrap_or_default()
    }

    fn list_tables(&self) -> Result<BTreeSet<String>> {
        self.names(TABLE_NAMES_SQL)
    }

    fn list_views(&self) -> Result<BTreeSet<String>> {
        self.names(VIEW_NAMES_SQL)
    }

    fn list_indices(&self) -> Result<Indices> {
        let rows = self.index_rows(INDICES_SQL, &[])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    /// One row per argument; procedures are named `NAME(TYPE, ...)`.
    fn list_procedures(&self) -> Result<Vec<ProcedureStub>> {
        let mut signatures: IndexMap<String, Vec<String>> = IndexMap::new();
        for row in self.driver.select(PROCEDURES_SQL, &[])? {
            let types = signatures.entry(row.text(0)?).or_default();
            if let Some(data_type) = row.opt_text(1)? {
                types.push(data_type);
            }
        }
        Ok(signatures
            .into_iter()
            .map(|(base_name, types)| ProcedureStub {
                name: format!("{}({})", base_name, types.join(", ")),
                base_name,
                signature: None,
            })
            .collect())
    }

    fn list_triggers(&self) -> Result<Vec<TriggerInfo>> {
        self.driver
            .select(TRIGGERS_SQL, &[])?
            .iter()
            .map(|row| {
                let event = row.text(2)?;
                // `INSERT OR UPDATE` keeps its first event
                let event = event.split_whitespace().next().unwrap_or_default();
                Ok(TriggerInfo {
                    name: row.text(0)?,
                    when: trigger_timing(&row.text(1)?).parse()?,
                    event: event.parse()?,
                    table: row.text(3)?,
                })
            })
            .collect()
    }

    fn fill_columns(&self, owner: ColumnOwner<'_>) -> Result<Columns> {
        self.driver
            .select(COLUMNS_SQL, &[owner.name()])?
            .iter()
            .map(|row| {
                let default = row
                    .opt_text(4)?
                    .map(|d| d.trim().to_string())
                    .filter(|d| !d.is_empty() && !d.eq_ignore_ascii_case("null"));
                let column = Column {
                    name: row.text(0)?,
                    data_type: normalize_type(&row.text(1)?, row.opt_i64(2)?),
                    not_null: row.text(3)? == "N",
                    default: default.map(Into::into),
                };
                Ok((column.name.clone(), column))
            })
            .collect()
    }

    fn fill_indices(&self, table: &Table) -> Result<Indices> {
        let rows = self.index_rows(TABLE_INDICES_SQL, &[table.name()])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    fn fill_foreign_keys(&self, table: &Table) -> Result<Vec<ForeignKey>> {
        let rows = self
            .driver
            .select(FOREIGN_KEYS_SQL, &[table.name()])?
            .iter()
            .map(|row| Ok((row.text(0)?, row.text(1)?, row.text(2)?, row.text(3)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(group_foreign_key_rows(rows))
    }

    fn fill_procedure(&self, procedure: &Procedure) -> Result<ProcedureDetails> {
        let name = procedure.base_name();
        let source = self.driver.select(SOURCE_SQL, &[name])?;
        if source.is_empty() {
            return Err(Error::NotFound(format!("procedure {}", procedure.name())));
        }
        let sql = source
            .iter()
            .map(|row| Ok(row.opt_text(0)?.unwrap_or_default()))
            .collect::<Result<Vec<_>>>()?
            .concat();

        let mut details = ProcedureDetails {
            sql: sql.trim().to_string(),
            ..ProcedureDetails::default()
        };
        for row in self.driver.select(ARGUMENTS_SQL, &[name])? {
            // a function's result is the unnamed argument at position 0
            match row.opt_text(0)? {
                None => details.returns = row.opt_text(1)?,
                Some(argument) => {
                    let argument = Argument {
                        name: argument,
                        data_type: row.opt_text(1)?.unwrap_or_default(),
                    };
                    details.arguments.insert(argument.name.clone(), argument);
                }
            }
        }
        debug!(procedure = procedure.name(), "resolved procedure");
        Ok(details)
    }

    /// System-generated index names (`SYS_C00123`) differ between otherwise
    /// identical schemas.
    fn usable_index_names(&self) -> bool {
        false
    }
}
