//! End-to-end inspection of SQLite database files.

mod common;

use pretty_assertions::assert_eq;
use rstest::{fixture, rstest};
use std::rc::Rc;

use common::{sqlite_profile, Profile, SqliteFixture};
use fathom::schema::{ForeignKey, Index, TriggerEvent, TriggerTiming};
use fathom::{get_sqlite3_database, CaseSensitivity, Database, Error};

struct Inspected {
    profile: Profile,
    // keeps the database file alive
    _fixture: SqliteFixture,
    db: Rc<Database>,
}

#[fixture]
fn inspected() -> Inspected {
    let profile = sqlite_profile();
    let fixture = SqliteFixture::with_profile(&profile);
    let db = get_sqlite3_database(&fixture.path).unwrap();
    Inspected {
        profile,
        _fixture: fixture,
        db,
    }
}

#[rstest]
fn table_and_view_names(inspected: Inspected) {
    let tables: Vec<String> = inspected.db.tables().unwrap().keys().cloned().collect();
    assert_eq!(tables, inspected.profile.table_names());
    let views: Vec<String> = inspected.db.views().unwrap().keys().cloned().collect();
    assert_eq!(views, inspected.profile.view_names());
}

#[rstest]
fn column_names_and_types(inspected: Inspected) {
    for fixture in &inspected.profile.tables {
        let table = inspected.db.table(fixture.name).unwrap().unwrap();
        let columns: Vec<(String, String)> = table
            .columns()
            .unwrap()
            .values()
            .map(|c| (c.name.clone(), c.data_type.clone()))
            .collect();
        let expected: Vec<(String, String)> = fixture
            .columns
            .iter()
            .map(|(n, t)| (n.to_string(), t.to_string()))
            .collect();
        assert_eq!(columns, expected, "columns of {}", fixture.name);
    }
}

#[rstest]
fn quoted_column_name_and_type(inspected: Inspected) {
    let table = inspected.db.table("one_column").unwrap().unwrap();
    let columns = table.columns().unwrap();
    assert_eq!(columns.len(), 1);
    assert_eq!(columns["column"].data_type, "varchar(800)");
    assert!(!columns["column"].not_null);
}

#[rstest]
fn composite_unique_constraint_is_one_index(inspected: Inspected) {
    let table = inspected.db.table("two_columns_unique").unwrap().unwrap();
    let indices = table.indices().unwrap();
    assert_eq!(indices.len(), 1);
    let index = indices.values().next().unwrap();
    assert_eq!(index.columns, vec!["col1", "col2"]);
    assert!(index.is_unique);
    assert_eq!(index.table.as_deref(), Some("two_columns_unique"));

    let permission = inspected.db.table("auth_permission").unwrap().unwrap();
    let index = permission.indices().unwrap().values().next().cloned().unwrap();
    assert_eq!(index.columns, vec!["content_type_id", "codename"]);
}

#[rstest]
fn database_indices_cover_every_table(inspected: Inspected) {
    let indices = inspected.db.indices().unwrap();
    let tables: Vec<&str> = indices
        .values()
        .filter_map(|index| index.table.as_deref())
        .collect();
    assert!(tables.contains(&"one_unique_column"));
    assert!(tables.contains(&"two_columns_unique"));
    assert!(tables.contains(&"auth_permission"));
    assert!(inspected.db.usable_index_names());
}

#[rstest]
fn foreign_keys_from_references(inspected: Inspected) {
    let table = inspected
        .db
        .table("reference_one_unique_column")
        .unwrap()
        .unwrap();
    assert_eq!(
        *table.foreign_keys().unwrap(),
        vec![ForeignKey::new(&["ref_one_column"], "one_unique_column", &["col"])]
    );

    let log = inspected.db.table("django_admin_log").unwrap().unwrap();
    assert_eq!(
        *log.foreign_keys().unwrap(),
        vec![
            ForeignKey::new(&["user_id"], "auth_user", &["id"]),
            ForeignKey::new(&["content_type_id"], "django_content_type", &["id"]),
        ]
    );
    let columns = log.columns().unwrap();
    assert!(columns["user_id"].not_null);
    assert!(!columns["content_type_id"].not_null);
}

#[rstest]
fn view_columns(inspected: Inspected) {
    let view = inspected.db.view("one_column_view").unwrap().unwrap();
    let columns = view.columns().unwrap();
    let names: Vec<&String> = columns.keys().collect();
    assert_eq!(names, vec!["column"]);
    assert_eq!(columns["column"].data_type, "varchar(800)");
}

#[rstest]
fn no_stored_procedures(inspected: Inspected) {
    assert!(!inspected.db.supports_stored_procedures());
    assert!(inspected.db.procedures().unwrap().is_empty());
}

#[rstest]
fn names_are_case_insensitive(inspected: Inspected) {
    assert_eq!(inspected.db.case_sensitivity(), CaseSensitivity::Insensitive);
    let upper = inspected.db.table("DJANGO_ADMIN_LOG").unwrap().unwrap();
    let quoted = inspected.db.table("\"Django_Admin_Log\"").unwrap().unwrap();
    assert!(Rc::ptr_eq(&upper, &quoted));
}

#[test]
fn mixed_case_tables_are_reported_lower_case() {
    let fixture = SqliteFixture::new();
    fixture
        .executor()
        .execute("CREATE TABLE MixedCase (Id integer)")
        .unwrap();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    let names: Vec<String> = db.tables().unwrap().keys().cloned().collect();
    assert_eq!(names, vec!["mixedcase"]);
    let columns = db.table("MixedCase").unwrap().unwrap().columns().unwrap();
    assert!(columns.contains_key("Id"));
}

#[test]
fn triggers_are_read_from_their_ddl() {
    let fixture = SqliteFixture::with_profile(&common::base_profile());
    fixture
        .executor()
        .execute_batch(&[
            r#"CREATE TRIGGER log_insert AFTER INSERT ON one_column BEGIN SELECT 1; END"#,
            r#"CREATE TRIGGER guard BEFORE DELETE ON two_columns_unique BEGIN SELECT 1; END"#,
        ])
        .unwrap();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    let triggers = db.triggers().unwrap();
    let keys: Vec<&String> = triggers.keys().collect();
    assert_eq!(keys, vec!["guard@two_columns_unique", "log_insert@one_column"]);
    let log = &triggers["log_insert@one_column"];
    assert_eq!((log.when, log.event), (TriggerTiming::After, TriggerEvent::Insert));
}

#[test]
fn columns_are_cached_until_invalidated() {
    let fixture = SqliteFixture::with_profile(&common::base_profile());
    let db = get_sqlite3_database(&fixture.path).unwrap();
    let table = db.table("one_column").unwrap().unwrap();
    let first = table.columns().unwrap();
    let second = table.columns().unwrap();
    assert!(Rc::ptr_eq(&first, &second));

    fixture
        .executor()
        .execute("ALTER TABLE one_column ADD COLUMN added integer")
        .unwrap();
    assert_eq!(table.columns().unwrap().len(), 1);
    table.invalidate();
    assert_eq!(table.columns().unwrap().len(), 2);
}

#[test]
fn fetched_tables_cannot_be_reassigned() {
    let fixture = SqliteFixture::with_profile(&common::base_profile());
    let db = get_sqlite3_database(&fixture.path).unwrap();
    db.tables().unwrap();
    let err = db.set_tables([fathom::Table::new("other")]).unwrap_err();
    assert!(matches!(err, Error::AlreadyPopulated(_)));
}

#[test]
fn dropped_tables_refuse_detail_access() {
    let fixture = SqliteFixture::with_profile(&common::base_profile());
    let db = get_sqlite3_database(&fixture.path).unwrap();
    assert!(db
        .indices()
        .unwrap()
        .values()
        .any(|index| index.table.as_deref() == Some("two_columns_unique")));
    let dropped = db.drop_table("two_columns_unique").unwrap().unwrap();
    assert!(dropped.is_dropped());
    assert!(matches!(dropped.columns(), Err(Error::DroppedTable(_))));
    assert!(db.table("two_columns_unique").unwrap().is_none());
    assert!(db
        .indices()
        .unwrap()
        .values()
        .all(|index: &Index| index.table.as_deref() != Some("two_columns_unique")));
}

#[test]
fn assigned_tables_are_fixed_on_a_live_database() {
    let fixture = SqliteFixture::new();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    db.set_tables([fathom::Table::new("a")]).unwrap();
    let err = db.set_tables([fathom::Table::new("b")]).unwrap_err();
    assert!(matches!(err, Error::AlreadyPopulated(_)));
    let names: Vec<String> = db.tables().unwrap().keys().cloned().collect();
    assert_eq!(names, vec!["a"]);
}

#[test]
fn tables_dropped_before_any_read_leave_no_indices_or_triggers() {
    let fixture = SqliteFixture::new();
    fixture
        .executor()
        .execute_batch(&[
            "CREATE TABLE t (a integer, b integer, UNIQUE (a, b))",
            "CREATE TABLE kept (c integer UNIQUE)",
            "CREATE TRIGGER t_insert AFTER INSERT ON t BEGIN SELECT 1; END",
            "CREATE TRIGGER kept_insert AFTER INSERT ON kept BEGIN SELECT 1; END",
        ])
        .unwrap();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    assert!(db.drop_table("t").unwrap().is_some());

    let tables: Vec<String> = db.tables().unwrap().keys().cloned().collect();
    assert_eq!(tables, vec!["kept"]);
    let indexed: Vec<Option<String>> = db
        .indices()
        .unwrap()
        .values()
        .map(|index| index.table.clone())
        .collect();
    assert_eq!(indexed, vec![Some("kept".to_string())]);
    let triggers: Vec<String> = db.triggers().unwrap().keys().cloned().collect();
    assert_eq!(triggers, vec!["kept_insert@kept"]);
}

#[test]
fn only_the_sqlite_underscore_prefix_is_internal() {
    let fixture = SqliteFixture::new();
    fixture
        .executor()
        .execute_batch(&[
            "CREATE TABLE sqliteXdata (id integer PRIMARY KEY, code text UNIQUE)",
            "CREATE TABLE plain (id integer)",
        ])
        .unwrap();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    let names: Vec<String> = db.tables().unwrap().keys().cloned().collect();
    assert_eq!(names, vec!["plain", "sqlitexdata"]);
    assert!(db
        .indices()
        .unwrap()
        .values()
        .any(|index| index.table.as_deref() == Some("sqlitexdata")));
}

#[test]
fn unsupported_ddl_is_a_parse_error() {
    let fixture = SqliteFixture::new();
    fixture
        .executor()
        .execute("CREATE TABLE checked (a integer CHECK (a > 0))")
        .unwrap();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    let table = db.table("checked").unwrap().unwrap();
    match table.columns() {
        Err(Error::Parse { table: name, .. }) => assert_eq!(name, "checked"),
        other => panic!("expected a parse error, got {other:?}"),
    }
    // a failed fetch is retried, and fails the same way
    assert!(table.columns().is_err());
}

#[test]
fn snapshot_of_a_live_database_diffs_clean() {
    let fixture = SqliteFixture::with_profile(&sqlite_profile());
    let live = get_sqlite3_database(&fixture.path).unwrap();
    let json = live.snapshot().unwrap().to_json().unwrap();

    let restored = fathom::Snapshot::from_json(&json)
        .unwrap()
        .into_database()
        .unwrap();
    assert_eq!(restored.backend(), None);
    assert_eq!(
        restored.table("two_columns_unique").unwrap().unwrap().indices().unwrap(),
        live.table("two_columns_unique").unwrap().unwrap().indices().unwrap()
    );
    assert!(fathom::DatabaseDiff::new(&live, &restored).is_empty().unwrap());
}

#[test]
fn missing_file_is_created_empty() {
    let fixture = SqliteFixture::new();
    let db = get_sqlite3_database(&fixture.path).unwrap();
    assert!(db.tables().unwrap().is_empty());
    assert!(fixture.path.exists());
}
