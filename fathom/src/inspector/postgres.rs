//! PostgreSQL inspector
//!
//! Reads `information_schema` and `pg_catalog`. Identifiers are compared as
//! stored: PostgreSQL already folded unquoted names to lower case when the
//! objects were created, so nothing is folded again here.
//!
//! Catalog columns of domain types (`sql_identifier`, `yes_or_no`, ...) and
//! `name` are cast to `text` so every driver decodes them the same way.

use indexmap::IndexMap;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashMap};
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
SELECT table_name::text
FROM information_schema.tables
WHERE table_schema::text = $1 AND table_type::text = 'BASE TABLE'
ORDER BY 1";

const VIEW_NAMES_SQL: &str = "
SELECT viewname::text
FROM pg_views
WHERE schemaname::text = $1
ORDER BY 1";

const COLUMNS_SQL: &str = "
SELECT column_name::text,
       data_type::text,
       character_maximum_length::int8,
       is_nullable::text,
       column_default::text
FROM information_schema.columns
WHERE table_schema::text = $1 AND table_name::text = $2
ORDER BY ordinal_position";

const INDICES_SQL: &str = "
SELECT i.relname::text, t.relname::text, a.attname::text, ix.indisunique
FROM pg_index ix
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
WHERE n.nspname::text = $1
ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)";

const TABLE_INDICES_SQL: &str = "
SELECT i.relname::text, t.relname::text, a.attname::text, ix.indisunique
FROM pg_index ix
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_class t ON t.oid = ix.indrelid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
WHERE n.nspname::text = $1 AND t.relname::text = $2
ORDER BY i.relname, array_position(ix.indkey::int2[], a.attnum)";

const FOREIGN_KEYS_SQL: &str = "
SELECT kcu.constraint_name::text,
       kcu.column_name::text,
       ref.table_name::text,
       ref.column_name::text
FROM information_schema.key_column_usage kcu
JOIN information_schema.referential_constraints rc
    ON rc.constraint_schema = kcu.constraint_schema
    AND rc.constraint_name = kcu.constraint_name
JOIN information_schema.key_column_usage ref
    ON ref.constraint_schema = rc.unique_constraint_schema
    AND ref.constraint_name = rc.unique_constraint_name
    AND ref.ordinal_position = kcu.position_in_unique_constraint
WHERE kcu.table_schema::text = $1 AND kcu.table_name::text = $2
ORDER BY kcu.constraint_name, kcu.ordinal_position";

const PROCEDURES_SQL: &str = "
SELECT p.proname::text, p.proargtypes::text
FROM pg_proc p
JOIN pg_language l ON p.prolang = l.oid
JOIN pg_namespace n ON n.oid = p.pronamespace
WHERE l.lanname = 'plpgsql' AND n.nspname::text = $1
ORDER BY 1, 2";

const PROCEDURE_SQL: &str = "
SELECT coalesce(array_to_string(p.proargnames, ',', ''), ''),
       p.prorettype::text,
       p.prosrc,
       coalesce(array_to_string(p.proallargtypes, ' '), ''),
       coalesce(array_to_string(p.proargmodes, ','), '')
FROM pg_proc p
JOIN pg_language l ON p.prolang = l.oid
JOIN pg_namespace n ON n.oid = p.pronamespace
WHERE l.lanname = 'plpgsql'
    AND n.nspname::text = $1
    AND p.proname::text = $2
    AND p.proargtypes::text = $3";

const TYPE_SQL: &str = "
SELECT typname::text
FROM pg_type
WHERE oid = $1::oid";

const TRIGGERS_SQL: &str = "
SELECT trigger_name::text,
       action_timing::text,
       event_manipulation::text,
       event_object_table::text
FROM information_schema.triggers
WHERE trigger_schema::text = $1
ORDER BY 1, 4";

/// Rewrite `information_schema` type names to the spelling used in DDL.
pub fn normalize_type(data_type: &str, max_length: Option<i64>) -> String {
    match (data_type, max_length) {
        ("character varying", Some(length)) => format!("varchar({length})"),
        ("character varying", None) => "varchar".to_string(),
        ("character", Some(length)) => format!("char({length})"),
        ("character", None) => "char".to_string(),
        (other, _) => other.to_string(),
    }
}

/// Inspector for one schema of a PostgreSQL database.
pub struct PostgresInspector<D = DatabaseConnection> {
    driver: D,
    schema: String,
    /// `pg_type` names by oid, shared across procedure lookups.
    type_names: RefCell<HashMap<String, String>>,
}

impl<D: Driver> PostgresInspector<D> {
    /// Inspect the `public` schema.
    pub fn new(driver: D) -> Self {
        Self::with_schema(driver, "public")
    }

    pub fn with_schema(driver: D, schema: &str) -> Self {
        Self {
            driver,
            schema: schema.to_string(),
            type_names: RefCell::new(HashMap::new()),
        }
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    fn names(&self, sql: &str) -> Result<BTreeSet<String>> {
        self.driver
            .select(sql, &[&self.schema])?
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

    /// Resolve a type oid to its `pg_type` name, one query per unseen oid.
    fn type_name(&self, oid: &str) -> Result<String> {
        if let Some(name) = self.type_names.borrow().get(oid) {
            return Ok(name.clone());
        }
        let rows = self.driver.select(TYPE_SQL, &[oid])?;
        let name = rows
            .first()
            .ok_or_else(|| Error::NotFound(format!("type with oid {oid}")))?
            .text(0)?;
        self.type_names
            .borrow_mut()
            .insert(oid.to_string(), name.clone());
        Ok(name)
    }

    fn type_names_of(&self, oids: &str) -> Result<Vec<String>> {
        oids.split_whitespace().map(|oid| self.type_name(oid)).collect()
    }
}

impl<D: Driver> Inspector for PostgresInspector<D> {
    fn backend(&self) -> Backend {
        Backend::Postgres
    }

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
        let rows = self.index_rows(INDICES_SQL, &[&self.schema])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    /// Procedures are named `name(type, ...)`; argument types are resolved
    /// from their oids since overloads share a name.
    fn list_procedures(&self) -> Result<Vec<ProcedureStub>> {
        let mut procedures = Vec::new();
        for row in self.driver.select(PROCEDURES_SQL, &[&self.schema])? {
            let base_name = row.text(0)?;
            let oids = row.opt_text(1)?.unwrap_or_default();
            let types = self.type_names_of(&oids)?;
            procedures.push(ProcedureStub {
                name: format!("{}({})", base_name, types.join(", ")),
                base_name,
                signature: Some(oids),
            });
        }
        Ok(procedures)
    }

    fn list_triggers(&self) -> Result<Vec<TriggerInfo>> {
        self.driver
            .select(TRIGGERS_SQL, &[&self.schema])?
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
            .select(COLUMNS_SQL, &[&self.schema, owner.name()])?
            .iter()
            .map(|row| {
                let data_type = normalize_type(&row.text(1)?, row.opt_i64(2)?);
                let column = Column {
                    name: row.text(0)?,
                    data_type,
                    not_null: row.text(3)? == "NO",
                    default: row.value(4)?,
                };
                Ok((column.name.clone(), column))
            })
            .collect()
    }

    fn fill_indices(&self, table: &Table) -> Result<Indices> {
        let rows = self.index_rows(TABLE_INDICES_SQL, &[&self.schema, table.name()])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    fn fill_foreign_keys(&self, table: &Table) -> Result<Vec<ForeignKey>> {
        let rows = self
            .driver
            .select(FOREIGN_KEYS_SQL, &[&self.schema, table.name()])?
            .iter()
            .map(|row| Ok((row.text(0)?, row.text(1)?, row.text(2)?, row.text(3)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(group_foreign_key_rows(rows))
    }

    fn fill_procedure(&self, procedure: &Procedure) -> Result<ProcedureDetails> {
        let signature = procedure.signature().unwrap_or_default();
        let rows = self.driver.select(
            PROCEDURE_SQL,
            &[&self.schema, procedure.base_name(), signature],
        )?;
        let row = rows
            .first()
            .ok_or_else(|| Error::NotFound(format!("procedure {}", procedure.name())))?;

        let names = row.opt_text(0)?.unwrap_or_default();
        let names: Vec<&str> = names.split(',').collect();
        // with OUT arguments, names and modes line up with every argument
        // type instead of the input signature
        let all_types = row.opt_text(3)?.unwrap_or_default();
        let modes = row.opt_text(4)?.unwrap_or_default();
        let (oids, modes): (&str, Vec<&str>) = if all_types.is_empty() {
            (signature, Vec::new())
        } else {
            (all_types.as_str(), modes.split(',').collect())
        };
        let types = self.type_names_of(oids)?;

        let mut arguments = IndexMap::new();
        let mut position = 0;
        for (i, data_type) in types.into_iter().enumerate() {
            if matches!(modes.get(i), Some(&"o") | Some(&"t")) {
                continue;
            }
            position += 1;
            // unnamed arguments are addressed positionally
            let name = match names.get(i) {
                Some(name) if !name.is_empty() => name.to_string(),
                _ => format!("${position}"),
            };
            arguments.insert(name.clone(), Argument { name, data_type });
        }
        debug!(procedure = procedure.name(), arguments = arguments.len(), "resolved procedure");

        let returns = match self.type_name(&row.text(1)?)? {
            void if void == "void" => None,
            other => Some(other),
        };

        Ok(ProcedureDetails {
            arguments,
            returns,
            sql: row.text(2)?.trim().to_string(),
        })
    }
}
