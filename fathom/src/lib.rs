//! fathom: schema introspection and diffing for SQLite, PostgreSQL, MySQL
//! and Oracle
//!
//! A [`Database`] is bound to a backend inspector and discovers its tables,
//! views, columns, indices, foreign keys, procedures and triggers on first
//! access. Two graphs, live or built by hand, can be compared with
//! [`DatabaseDiff`].
//!
//! ```no_run
//! use fathom::{get_sqlite3_database, DatabaseDiff};
//!
//! let before = get_sqlite3_database("before.db")?;
//! let after = get_sqlite3_database("after.db")?;
//! for (name, table) in DatabaseDiff::new(&before, &after).tables()? {
//!     println!("{name}: {}", table.state()?);
//! }
//! # Ok::<(), fathom::Error>(())
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod inspector;
pub mod parser;
pub mod schema;
pub mod utils;

use std::path::{Path, PathBuf};
use std::rc::Rc;
use tracing::{info, warn};

// Re-export main types for easier access
pub use config::Config;
pub use db::connection::{
    ConnectionParams, DatabaseConnection, Driver, MySqlParams, OracleParams, PostgresParams,
    SqliteParams,
};
pub use db::executor::SqlExecutor;
pub use error::{Error, Result};
pub use inspector::{Backend, CaseSensitivity, Inspector};
pub use schema::diff::{ColumnDiff, DatabaseDiff, DiffState, TableDiff};
pub use schema::objects::{Database, Procedure, Table, Trigger, View};
pub use schema::snapshot::Snapshot;

use inspector::{MySqlInspector, OracleInspector, PostgresInspector, SqliteInspector};

/// Bind a connection to the inspector of its backend.
fn bind(params: &ConnectionParams, connection: DatabaseConnection) -> Rc<Database> {
    let inspector: Rc<dyn Inspector> = match params {
        ConnectionParams::Sqlite(_) => Rc::new(SqliteInspector::new(connection)),
        ConnectionParams::Postgres(postgres) => {
            Rc::new(PostgresInspector::with_schema(connection, postgres.schema()))
        }
        ConnectionParams::MySql(_) => Rc::new(MySqlInspector::new(connection)),
        ConnectionParams::Oracle(_) => Rc::new(OracleInspector::new(connection)),
    };
    Database::with_inspector(inspector)
}

/// Database for the given parameters. Nothing is contacted until a
/// collection is first read.
pub fn connect(params: &ConnectionParams) -> Result<Rc<Database>> {
    let connection = DatabaseConnection::new(params)?;
    Ok(bind(params, connection))
}

/// SQLite database stored at `path`.
pub fn get_sqlite3_database(path: impl AsRef<Path>) -> Result<Rc<Database>> {
    connect(&ConnectionParams::Sqlite(SqliteParams::new(path.as_ref())))
}

/// PostgreSQL database from a URL or a libpq `key=value` connection string.
pub fn get_postgresql_database(connection_string: &str) -> Result<Rc<Database>> {
    connect(&ConnectionParams::Postgres(PostgresParams::from_connection_string(
        connection_string,
    )))
}

pub fn get_mysql_database(params: MySqlParams) -> Result<Rc<Database>> {
    connect(&ConnectionParams::MySql(params))
}

#[cfg(feature = "oracle")]
pub fn get_oracle_database(params: OracleParams) -> Result<Rc<Database>> {
    connect(&ConnectionParams::Oracle(params))
}

/// Whatever the caller knows about a database whose backend is unknown.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectArgs {
    pub path: Option<PathBuf>,
    pub connection_string: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
    pub dsn: Option<String>,
}

impl DetectArgs {
    /// Parameters worth trying, in detection order.
    fn candidates(&self) -> Vec<ConnectionParams> {
        let mut candidates = Vec::new();

        if let Some(path) = self.path.as_ref().filter(|p| p.is_file()) {
            candidates.push(ConnectionParams::Sqlite(SqliteParams {
                path: path.clone(),
                create_if_missing: false,
            }));
        }

        if self.connection_string.is_some() || self.host.is_some() || self.database.is_some() {
            candidates.push(ConnectionParams::Postgres(PostgresParams {
                connection_string: self.connection_string.clone(),
                host: self.host.clone(),
                port: self.port,
                dbname: self.database.clone(),
                user: self.user.clone(),
                password: self.password.clone(),
                schema: None,
            }));
        }

        if let (Some(user), Some(database)) = (&self.user, &self.database) {
            let mut mysql = MySqlParams::new(user, database);
            if let Some(host) = &self.host {
                mysql.host = host.clone();
            }
            if let Some(port) = self.port {
                mysql.port = port;
            }
            mysql.password = self.password.clone();
            candidates.push(ConnectionParams::MySql(mysql));
        }

        if let (Some(user), Some(password), Some(dsn)) = (&self.user, &self.password, &self.dsn) {
            candidates.push(ConnectionParams::Oracle(OracleParams {
                user: user.clone(),
                password: password.clone(),
                dsn: dsn.clone(),
            }));
        }

        candidates
    }
}

/// Find the backend `args` point at by connecting to SQLite (existing
/// files only), PostgreSQL, MySQL and Oracle in turn.
///
/// Fails with [`Error::UnsupportedDatabase`] listing every attempt when no
/// backend answers.
pub fn detect_database(args: &DetectArgs) -> Result<Rc<Database>> {
    let mut attempts = Vec::new();
    for params in args.candidates() {
        let backend = params.backend();
        let probed = DatabaseConnection::new(&params).and_then(|connection| {
            connection.probe()?;
            Ok(connection)
        });
        match probed {
            Ok(connection) => {
                info!(%backend, "detected database backend");
                return Ok(bind(&params, connection));
            }
            Err(e) => {
                warn!(%backend, error = %e, "backend did not answer");
                attempts.push(format!("{backend}: {e}"));
            }
        }
    }

    if attempts.is_empty() {
        return Err(Error::UnsupportedDatabase(
            "nothing, no usable connection arguments".to_string(),
        ));
    }
    Err(Error::UnsupportedDatabase(attempts.join("; ")))
}

/// Load the configuration file, set up logging and bind its database.
pub fn init(config_path: impl AsRef<Path>) -> Result<Rc<Database>> {
    let config = config::load_from_file(config_path)?;
    utils::logging::init_logging(&config.logging)?;
    info!(backend = %config.database.backend(), "initialising fathom");
    connect(&config.database)
}
