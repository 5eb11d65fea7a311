//! Shared fixtures for the integration tests.
//!
//! Each backend gets a [`Profile`]: the tables and views created before a
//! test and what inspection is expected to report for them. Profiles are
//! built by composing the shared fixtures with backend-specific ones.

#![allow(dead_code)]

use std::path::PathBuf;
use std::rc::Rc;

use fathom::{ConnectionParams, DatabaseConnection, SqlExecutor, SqliteParams};

/// A table fixture and the columns it should come back with.
#[derive(Debug, Clone)]
pub struct TableFixture {
    pub name: &'static str,
    pub sql: &'static str,
    /// `(name, type)` in declaration order.
    pub columns: &'static [(&'static str, &'static str)],
}

#[derive(Debug, Clone)]
pub struct ViewFixture {
    pub name: &'static str,
    pub sql: &'static str,
    pub columns: &'static [&'static str],
}

#[derive(Debug, Clone, Default)]
pub struct Profile {
    pub tables: Vec<TableFixture>,
    pub views: Vec<ViewFixture>,
}

impl Profile {
    pub fn with_tables(mut self, tables: impl IntoIterator<Item = TableFixture>) -> Self {
        self.tables.extend(tables);
        self
    }

    pub fn with_views(mut self, views: impl IntoIterator<Item = ViewFixture>) -> Self {
        self.views.extend(views);
        self
    }

    pub fn table(&self, name: &str) -> &TableFixture {
        self.tables
            .iter()
            .find(|t| t.name == name)
            .unwrap_or_else(|| panic!("no fixture table {name}"))
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.iter().map(|t| t.name.to_string()).collect();
        names.sort();
        names
    }

    pub fn view_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.views.iter().map(|v| v.name.to_string()).collect();
        names.sort();
        names
    }

    pub fn create_statements(&self) -> Vec<&'static str> {
        self.tables
            .iter()
            .map(|t| t.sql)
            .chain(self.views.iter().map(|v| v.sql))
            .collect()
    }

    /// Views first, then tables in reverse creation order.
    pub fn drop_statements(&self) -> Vec<String> {
        self.views
            .iter()
            .map(|v| format!("DROP VIEW {}", v.name))
            .chain(self.tables.iter().rev().map(|t| format!("DROP TABLE {}", t.name)))
            .collect()
    }
}

pub fn one_column() -> TableFixture {
    TableFixture {
        name: "one_column",
        sql: r#"CREATE TABLE one_column ("column" varchar(800))"#,
        columns: &[("column", "varchar(800)")],
    }
}

pub fn one_unique_column() -> TableFixture {
    TableFixture {
        name: "one_unique_column",
        sql: r#"CREATE TABLE one_unique_column ("column" integer UNIQUE)"#,
        columns: &[("column", "integer")],
    }
}

pub fn two_columns_unique() -> TableFixture {
    TableFixture {
        name: "two_columns_unique",
        sql: "CREATE TABLE two_columns_unique (col1 integer, col2 varchar(80), UNIQUE(col1, col2))",
        columns: &[("col1", "integer"), ("col2", "varchar(80)")],
    }
}

pub fn one_column_view() -> ViewFixture {
    ViewFixture {
        name: "one_column_view",
        sql: r#"CREATE VIEW one_column_view AS SELECT "column" FROM one_column"#,
        columns: &["column"],
    }
}

/// Fixtures every backend can create.
pub fn base_profile() -> Profile {
    Profile::default()
        .with_tables([one_column(), one_unique_column(), two_columns_unique()])
        .with_views([one_column_view()])
}

pub fn sqlite_profile() -> Profile {
    base_profile().with_tables([
        TableFixture {
            name: "reference_one_unique_column",
            sql: "CREATE TABLE reference_one_unique_column \
                  (ref_one_column integer REFERENCES one_unique_column(col))",
            columns: &[("ref_one_column", "integer")],
        },
        TableFixture {
            name: "django_admin_log",
            sql: r#"
CREATE TABLE "django_admin_log" (
    "id" integer NOT NULL PRIMARY KEY,
    "action_time" datetime NOT NULL,
    "user_id" integer NOT NULL REFERENCES "auth_user" ("id"),
    "content_type_id" integer REFERENCES "django_content_type" ("id"),
    "object_id" text,
    "object_repr" varchar(200) NOT NULL,
    "action_flag" smallint unsigned NOT NULL,
    "change_message" text NOT NULL
)"#,
            columns: &[
                ("id", "integer"),
                ("action_time", "datetime"),
                ("user_id", "integer"),
                ("content_type_id", "integer"),
                ("object_id", "text"),
                ("object_repr", "varchar(200)"),
                ("action_flag", "smallint unsigned"),
                ("change_message", "text"),
            ],
        },
        TableFixture {
            name: "auth_permission",
            sql: r#"
CREATE TABLE "auth_permission" (
    "id" integer NOT NULL PRIMARY KEY,
    "name" varchar(50) NOT NULL,
    "content_type_id" integer NOT NULL,
    "codename" varchar(100) NOT NULL,
    UNIQUE ("content_type_id", "codename")
)"#,
            columns: &[
                ("id", "integer"),
                ("name", "varchar(50)"),
                ("content_type_id", "integer"),
                ("codename", "varchar(100)"),
            ],
        },
    ])
}

pub fn postgres_profile() -> Profile {
    base_profile().with_tables([
        TableFixture {
            name: "empty",
            sql: "CREATE TABLE empty()",
            columns: &[],
        },
        TableFixture {
            name: "reference_one_unique_column",
            sql: r#"CREATE TABLE reference_one_unique_column
                    (ref_one_column integer REFERENCES one_unique_column("column"))"#,
            columns: &[("ref_one_column", "integer")],
        },
    ])
}

/// MySQL ignores inline `REFERENCES`, so the shared fixtures suffice.
pub fn mysql_profile() -> Profile {
    base_profile()
}

/// A SQLite database file in a temporary directory, removed on drop.
pub struct SqliteFixture {
    _dir: tempfile::TempDir,
    pub path: PathBuf,
}

impl SqliteFixture {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().expect("temporary directory");
        let path = dir.path().join("fathom.db3");
        Self { _dir: dir, path }
    }

    pub fn with_profile(profile: &Profile) -> Self {
        let fixture = Self::new();
        fixture
            .executor()
            .execute_batch(&profile.create_statements())
            .expect("fixture DDL runs");
        fixture
    }

    pub fn executor(&self) -> SqlExecutor {
        let params = ConnectionParams::Sqlite(SqliteParams::new(&self.path));
        SqlExecutor::new(Rc::new(
            DatabaseConnection::new(&params).expect("sqlite parameters are valid"),
        ))
    }
}

/// Executor for a database server.
pub fn server_executor(params: &ConnectionParams) -> SqlExecutor {
    SqlExecutor::new(Rc::new(
        DatabaseConnection::new(params).expect("server parameters are valid"),
    ))
}
