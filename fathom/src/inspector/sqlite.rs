//! SQLite inspector
//!
//! SQLite has no structured column catalog for tables; the verbatim
//! `CREATE TABLE` text in `sqlite_master` is run through the DDL parser
//! instead. Views, indices and index columns come from the `pragma_*`
//! table-valued functions.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::{debug, warn};

use crate::db::connection::{DatabaseConnection, Driver};
use crate::db::row::Value;
use crate::error::{Error, Result};
use crate::inspector::{
    group_index_rows, Backend, ColumnOwner, Inspector, ProcedureDetails, ProcedureStub,
    TriggerInfo,
};
use crate::parser::{parse_create_table, ColumnDef, DefaultValue};
use crate::schema::objects::{Procedure, Table};
use crate::schema::types::{Column, Columns, ForeignKey, Indices, TriggerEvent, TriggerTiming};

const TABLE_NAMES_SQL: &str = "
SELECT name
FROM sqlite_master
WHERE type = 'table' AND name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
ORDER BY name";

const VIEW_NAMES_SQL: &str = "
SELECT name
FROM sqlite_master
WHERE type = 'view'
ORDER BY name";

const TABLE_SQL: &str = "
SELECT sql
FROM sqlite_master
WHERE type = 'table' AND name = ?1 COLLATE NOCASE";

const VIEW_COLUMNS_SQL: &str = "
SELECT name, type, \"notnull\", dflt_value
FROM pragma_table_info(?1)
ORDER BY cid";

const INDICES_SQL: &str = "
SELECT il.name, m.name, ii.name, il.\"unique\"
FROM sqlite_master AS m,
     pragma_index_list(m.name) AS il,
     pragma_index_info(il.name) AS ii
WHERE m.type = 'table' AND m.name NOT LIKE 'sqlite\\_%' ESCAPE '\\'
ORDER BY il.name, ii.seqno";

const TABLE_INDICES_SQL: &str = "
SELECT il.name, ?1, ii.name, il.\"unique\"
FROM pragma_index_list(?1) AS il,
     pragma_index_info(il.name) AS ii
ORDER BY il.name, ii.seqno";

const TRIGGERS_SQL: &str = "
SELECT name, tbl_name, sql
FROM sqlite_master
WHERE type = 'trigger'
ORDER BY name";

/// Timing and event of a `CREATE TRIGGER` statement.
static TRIGGER_DDL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"(?is)^\s*CREATE\s+(?:TEMP(?:ORARY)?\s+)?TRIGGER\s+(?:IF\s+NOT\s+EXISTS\s+)?(?:"[^"]*"|`[^`]*`|\[[^\]]*\]|[^\s(]+)\s+(BEFORE|AFTER|INSTEAD\s+OF)?\s*(INSERT|UPDATE|DELETE)\b"#,
    )
    .expect("trigger pattern is valid")
});

/// Inspector for SQLite database files.
pub struct SqliteInspector<D = DatabaseConnection> {
    driver: D,
}

impl<D: Driver> SqliteInspector<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    fn names(&self, sql: &str) -> Result<BTreeSet<String>> {
        self.driver
            .select(sql, &[])?
            .iter()
            .map(|row| Ok(row.text(0)?.to_lowercase()))
            .collect()
    }

    fn create_table_sql(&self, table: &str) -> Result<String> {
        let rows = self.driver.select(TABLE_SQL, &[table])?;
        let row = rows
            .first()
            .ok_or_else(|| Error::NotFound(format!("table {table}")))?;
        row.text(0)
    }

    fn index_rows(&self, sql: &str, params: &[&str]) -> Result<Vec<(String, String, String, bool)>> {
        let mut rows = Vec::new();
        for row in self.driver.select(sql, params)? {
            // expression indices have no column name
            let Some(column) = row.opt_text(2)? else {
                continue;
            };
            rows.push((row.text(0)?, row.text(1)?.to_lowercase(), column, row.flag(3)?));
        }
        Ok(rows)
    }
}

fn default_to_value(default: &DefaultValue) -> Option<Value> {
    match default {
        DefaultValue::Integer(i) => Some(Value::Integer(*i)),
        DefaultValue::Real(r) => Some(Value::Real(*r)),
        DefaultValue::Text(s) => Some(Value::Text(s.clone())),
        DefaultValue::Keyword(k) | DefaultValue::Expression(k) => Some(Value::Text(k.clone())),
        DefaultValue::Null => None,
    }
}

fn column_from_def(def: &ColumnDef) -> Column {
    Column {
        name: def.name.clone(),
        data_type: def.type_name.clone().unwrap_or_default(),
        not_null: def.is_not_null(),
        default: def.default_value().and_then(default_to_value),
    }
}

/// Parse a trigger's DDL. SQLite defaults to `BEFORE` when no timing is
/// written.
fn parse_trigger(name: &str, table: &str, sql: &str) -> Result<TriggerInfo> {
    let captures = TRIGGER_DDL.captures(sql).ok_or_else(|| {
        Error::SchemaAnalysisError(format!("cannot read timing and event of trigger {name}"))
    })?;
    let when = match captures.get(1) {
        Some(timing) => timing.as_str().parse()?,
        None => TriggerTiming::Before,
    };
    let event: TriggerEvent = captures
        .get(2)
        .map(|m| m.as_str())
        .unwrap_or_default()
        .parse()?;
    Ok(TriggerInfo {
        name: name.to_string(),
        when,
        event,
        table: table.to_lowercase(),
    })
}

impl<D: Driver> Inspector for SqliteInspector<D> {
    fn backend(&self) -> Backend {
        Backend::Sqlite
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
        let rows = self.index_rows(INDICES_SQL, &[])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    fn list_procedures(&self) -> Result<Vec<ProcedureStub>> {
        Ok(Vec::new())
    }

    /// Triggers whose DDL cannot be read are left out.
    fn list_triggers(&self) -> Result<Vec<TriggerInfo>> {
        let mut triggers = Vec::new();
        for row in self.driver.select(TRIGGERS_SQL, &[])? {
            let name = row.text(0)?;
            match parse_trigger(&name, &row.text(1)?, &row.text(2)?) {
                Ok(info) => triggers.push(info),
                Err(error) => warn!(trigger = %name, %error, "skipping unreadable trigger"),
            }
        }
        Ok(triggers)
    }

    fn fill_columns(&self, owner: ColumnOwner<'_>) -> Result<Columns> {
        let name = owner.name();
        if owner.is_view() {
            return self
                .driver
                .select(VIEW_COLUMNS_SQL, &[name])?
                .iter()
                .map(|row| {
                    let column = Column {
                        name: row.text(0)?,
                        data_type: row.opt_text(1)?.unwrap_or_default(),
                        not_null: row.flag(2)?,
                        default: row.value(3)?,
                    };
                    Ok((column.name.clone(), column))
                })
                .collect();
        }

        let sql = self.create_table_sql(name)?;
        let statement = parse_create_table(&sql).map_err(|source| Error::Parse {
            table: name.to_string(),
            source,
        })?;
        debug!(table = name, columns = statement.columns.len(), "parsed table definition");
        Ok(statement
            .columns
            .iter()
            .map(|def| (def.name.clone(), column_from_def(def)))
            .collect())
    }

    fn fill_indices(&self, table: &Table) -> Result<Indices> {
        let rows = self.index_rows(TABLE_INDICES_SQL, &[table.name()])?;
        Ok(group_index_rows(rows, |name, _| name.to_string()))
    }

    /// Inline `REFERENCES` clauses of the table definition.
    fn fill_foreign_keys(&self, table: &Table) -> Result<Vec<ForeignKey>> {
        let sql = self.create_table_sql(table.name())?;
        let statement = parse_create_table(&sql).map_err(|source| Error::Parse {
            table: table.name().to_string(),
            source,
        })?;
        Ok(statement
            .columns
            .iter()
            .filter_map(|def| {
                def.references().map(|(referenced, columns)| ForeignKey {
                    columns: vec![def.name.clone()],
                    referenced_table: referenced.to_string(),
                    referenced_columns: columns.to_vec(),
                })
            })
            .collect())
    }

    fn fill_procedure(&self, procedure: &Procedure) -> Result<ProcedureDetails> {
        Err(Error::NotFound(format!(
            "procedure {} (SQLite has no stored procedures)",
            procedure.name()
        )))
    }

    fn supports_stored_procedures(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inspector::scripted::{t, ScriptedDriver};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::rc::Rc;

    #[rstest]
    #[case("CREATE TRIGGER t1 AFTER INSERT ON books BEGIN SELECT 1; END", TriggerTiming::After, TriggerEvent::Insert)]
    #[case("create trigger \"t 2\" instead of delete on v begin select 1; end", TriggerTiming::Instead, TriggerEvent::Delete)]
    #[case("CREATE TRIGGER IF NOT EXISTS t3 UPDATE OF title ON books BEGIN SELECT 1; END", TriggerTiming::Before, TriggerEvent::Update)]
    fn trigger_ddl(#[case] sql: &str, #[case] when: TriggerTiming, #[case] event: TriggerEvent) {
        let info = parse_trigger("t", "Books", sql).unwrap();
        assert_eq!((info.when, info.event), (when, event));
        assert_eq!(info.table, "books");
    }

    #[test]
    fn unreadable_trigger_is_an_error() {
        assert!(parse_trigger("t", "x", "CREATE VIEW v AS SELECT 1").is_err());
    }

    #[test]
    fn unreadable_triggers_are_skipped() {
        let driver = Rc::new(ScriptedDriver::new(Backend::Sqlite).answer(
            "type = 'trigger'",
            vec![
                vec![t("odd"), t("books"), t("CREATE TRIGGER odd")],
                vec![t("stamp"), t("Books"), t("CREATE TRIGGER stamp AFTER UPDATE ON Books BEGIN SELECT 1; END")],
            ],
        ));
        let inspector = SqliteInspector::new(driver.clone());
        let triggers = inspector.list_triggers().unwrap();
        let names: Vec<&str> = triggers.iter().map(|info| info.name.as_str()).collect();
        assert_eq!(names, vec!["stamp"]);
        assert_eq!(triggers[0].table, "books");
        assert_eq!(driver.count("sqlite_master"), 1);
    }

    #[test]
    fn column_defaults_become_values() {
        let statement =
            parse_create_table("CREATE TABLE t (a integer DEFAULT 5, b text DEFAULT NULL, c text DEFAULT CURRENT_TIMESTAMP)")
                .unwrap();
        let columns: Vec<Column> = statement.columns.iter().map(column_from_def).collect();
        assert_eq!(columns[0].default, Some(Value::Integer(5)));
        assert_eq!(columns[1].default, None);
        assert_eq!(columns[2].default, Some(Value::from("CURRENT_TIMESTAMP")));
    }
}
