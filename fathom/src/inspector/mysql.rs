//! MySQL inspector
//!
//! Everything comes from `information_schema`, restricted to the current
//! database (`DATABASE()`). Catalog columns are cast to `CHAR` since some
//! server versions report them as binary strings.

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
SELECT CAST(table_name AS CHAR)
FROM information_schema.tables
WHERE table_schema = DATABASE() AND table_type = 'BASE TABLE'
ORDER BY 1";

const VIEW_NAMES_SQL: &str = "
SELECT CAST(table_name AS CHAR)
FROM information_schema.views
WHERE table_schema = DATABASE()
ORDER BY 1";

const COLUMNS_SQL: &str = "
SELECT CAST(column_name AS CHAR),
       CAST(data_type AS CHAR),
       character_maximum_length,
       CAST(is_nullable AS CHAR),
       CAST(column_default AS CHAR),
       CAST(column_type AS CHAR)
FROM information_schema.columns
WHERE table_schema = DATABASE() AND table_name = ?
ORDER BY ordinal_position";

const INDICES_SQL: &str = "
SELECT CAST(index_name AS CHAR),
       CAST(table_name AS CHAR),
       CAST(column_name AS CHAR),
       non_unique
FROM information_schema.statistics
WHERE table_schema = DATABASE()
ORDER BY table_name, index_name, seq_in_index";

const TABLE_INDICES_SQL: &str = "
SELECT CAST(index_name AS CHAR),
       CAST(table_name AS CHAR),
       CAST(column_name AS CHAR),
       non_unique
FROM information_schema.statistics
WHERE table_schema = DATABASE() AND table_name = ?
ORDER BY index_name, seq_in_index";

const FOREIGN_KEYS_SQL: &str = "
SELECT CAST(constraint_name AS CHAR),
       CAST(column_name AS CHAR),
       CAST(referenced_table_name AS CHAR),
       CAST(referenced_column_name AS CHAR)
FROM information_schema.key_column_usage
WHERE table_schema = DATABASE()
    AND table_name = ?
    AND referenced_table_name IS NOT NULL
ORDER BY constraint_name, ordinal_position";

const PROCEDURE_NAMES_SQL: &str = "
SELECT CAST(routine_name AS CHAR)
FROM information_schema.routines
WHERE routine_schema = DATABASE()
ORDER BY 1";

const ROUTINE_SQL: &str = "
SELECT CAST(routine_definition AS CHAR)
FROM information_schema.routines
WHERE routine_schema = DATABASE() AND routine_name = ?";

const PARAMETERS_SQL: &str = "
SELECT CAST(parameter_name AS CHAR),
       CAST(dtd_identifier AS CHAR),
       ordinal_position
FROM information_schema.parameters
WHERE specific_schema = DATABASE() AND specific_name = ?
ORDER BY ordinal_position";

const TRIGGERS_SQL: &str = "
SELECT CAST(trigger_name AS CHAR),
       CAST(action_timing AS CHAR),
       CAST(event_manipulation AS CHAR),
       CAST(event_object_table AS CHAR)
FROM information_schema.triggers
WHERE trigger_schema = DATABASE()
ORDER BY 1";

/// Build the DDL spelling of a column type from `information_schema`.
///
/// `column_type` is only consulted for the `unsigned` attribute; its display
/// width (`int(11)`) is deliberately not carried over.
pub fn normalize_type(data_type: &str, max_length: Option<i64>, column_type: &str) -> String {
    let mut normalized = match (data_type, max_length) {
        ("varchar" | "char", Some(length)) => format!("{data_type}({length})"),
        (other, _) => other.to_string(),
    };
    if column_type.to_ascii_lowercase().contains("unsigned") {
        normalized.push_str(" unsigned");
    }
    normalized
}

/// Inspector for the current database of a MySQL connection.
pub struct MySqlInspector<D = DatabaseConnection> {
    driver: D,
}

impl<D: Driver> MySqlInspector<D> {
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
        let mut rows = Vec::new();
        for row in self.driver.select(sql, params)? {
            // functional key parts have no column
            let Some(column) = row.opt_text(2)? else {
                continue;
            };
            rows.push((row.text(0)?, row.text(1)?, column, !row.flag(3)?));
        }
        Ok(rows)
    }
}

impl<D: Driver> Inspector for MySqlInspector<D> {
    fn backend(&self) -> Backend {
        Backend::MySql
    }

    /// The database named in the connection parameters.
    fn database_name(&self) -> String {
        self.driver.database_name().unwrap_or_default()
    }

    fn list_tables(&self) -> Result<BTreeSet<String>> {
        self.names(TABLE_NAMES_SQL)
    }

    fn list_views(&self) -> Result<BTreeSet<String>> {
        self.names(VIEW_NAMES_SQL)
    }

    /// Index names are only unique per table, so the database-level map is
    /// keyed `table.index`.
    fn list_indices(&self) -> Result<Indices> {
        let rows = self.index_rows(INDICES_SQL, &[])?;
        Ok(group_index_rows(rows, |name, table| format!("{table}.{name}")))
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureStub>> {
        self.driver
            .select(PROCEDURE_NAMES_SQL, &[])?
            .iter()
            .map(|row| Ok(ProcedureStub::named(&row.text(0)?)))
            .collect()
    }

    fn list_triggers(&self) -> Result<Vec<TriggerInfo>> {
        self.driver
            .select(TRIGGERS_SQL, &[])?
            .iter()
            .map(|row| {
                Ok(TriggerInfo {
                    name: row.text(0)?,
                    when: row.text(1)?.parse()?,
                    event: row.text(2)?.parse()?,
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
                let column_type = row.opt_text(5)?.unwrap_or_default();
                let column = Column {
                    name: row.text(0)?,
                    data_type: normalize_type(&row.text(1)?, row.opt_i64(2)?, &column_type),
                    not_null: row.text(3)? == "NO",
                    default: row.value(4)?,
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

    /// Parameter at ordinal 0 is a function's return value.
    fn fill_procedure(&self, procedure: &Procedure) -> Result<ProcedureDetails> {
        let name = procedure.base_name();
        let routine = self.driver.select(ROUTINE_SQL, &[name])?;
        let row = routine
            .first()
            .ok_or_else(|| Error::NotFound(format!("routine {name}")))?;
        let sql = row.opt_text(0)?.unwrap_or_default().trim().to_string();

        let mut details = ProcedureDetails {
            sql,
            ..ProcedureDetails::default()
        };
        for row in self.driver.select(PARAMETERS_SQL, &[name])? {
            let data_type = row.text(1)?;
            if row.opt_i64(2)? == Some(0) {
                details.returns = Some(data_type);
                continue;
            }
            let argument = Argument {
                name: row.text(0)?,
                data_type,
            };
            details.arguments.insert(argument.name.clone(), argument);
        }
        debug!(routine = name, arguments = details.arguments.len(), "resolved routine");
        Ok(details)
    }
}
