//! Database connection handling
//!
//! Every catalog query opens its own connection, runs, collects all rows and
//! closes the connection again. There is no pool: inspection is interactive
//! or batch work, and a fresh connection per query keeps the graph free of
//! connection state.

use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection};
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{Connection, Executor, Row as _, ValueRef};
use std::path::PathBuf;
use std::str::FromStr;
use tracing::{debug, info};

use crate::db::row::{Row, Value};
use crate::error::{Error, Result};
use crate::inspector::Backend;

/// Runs SQL against one database. Inspectors only talk to the database
/// through this trait.
pub trait Driver {
    fn backend(&self) -> Backend;

    /// Run a catalog query with positional text parameters and return every
    /// row.
    fn select(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>>;

    /// Run one or more statements that return no rows.
    fn execute(&self, sql: &str) -> Result<()>;

    /// Database name the connection points at, when known up front.
    fn database_name(&self) -> Option<String> {
        None
    }
}

impl<D: Driver + ?Sized> Driver for std::rc::Rc<D> {
    fn backend(&self) -> Backend {
        (**self).backend()
    }

    fn select(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        (**self).select(sql, params)
    }

    fn execute(&self, sql: &str) -> Result<()> {
        (**self).execute(sql)
    }

    fn database_name(&self) -> Option<String> {
        (**self).database_name()
    }
}

/// Connection parameters, tagged by backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum ConnectionParams {
    Sqlite(SqliteParams),
    Postgres(PostgresParams),
    #[serde(rename = "mysql")]
    MySql(MySqlParams),
    Oracle(OracleParams),
}

impl ConnectionParams {
    pub fn backend(&self) -> Backend {
        match self {
            ConnectionParams::Sqlite(_) => Backend::Sqlite,
            ConnectionParams::Postgres(_) => Backend::Postgres,
            ConnectionParams::MySql(_) => Backend::MySql,
            ConnectionParams::Oracle(_) => Backend::Oracle,
        }
    }
}

/// SQLite database file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SqliteParams {
    pub path: PathBuf,
    /// Create the file when it does not exist yet.
    #[serde(default = "default_true")]
    pub create_if_missing: bool,
}

impl SqliteParams {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            create_if_missing: true,
        }
    }
}

/// PostgreSQL connection, either as a connection string (URL or libpq
/// `key=value` form) or as separate keywords. Keywords override the string.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PostgresParams {
    pub connection_string: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub dbname: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Schema to inspect, `public` when unset.
    pub schema: Option<String>,
}

/// Keywords of a libpq connection string that are understood here.
const POSTGRES_KEYWORDS: &[&str] = &[
    "host",
    "hostaddr",
    "port",
    "dbname",
    "user",
    "password",
    "sslmode",
    "application_name",
];

impl PostgresParams {
    pub fn from_connection_string(connection_string: &str) -> Self {
        Self {
            connection_string: Some(connection_string.to_string()),
            ..Self::default()
        }
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }

    /// Render the keyword fields as a libpq `key=value` string.
    pub fn keyword_string(&self) -> String {
        let mut pairs = Vec::new();
        let fields = [
            ("host", self.host.clone()),
            ("port", self.port.map(|p| p.to_string())),
            ("dbname", self.dbname.clone()),
            ("user", self.user.clone()),
            ("password", self.password.clone()),
        ];
        for (key, value) in fields {
            if let Some(value) = value {
                pairs.push(format!("{key}={value}"));
            }
        }
        pairs.join(" ")
    }

    pub fn connect_options(&self) -> Result<PgConnectOptions> {
        let mut options = match self.connection_string.as_deref().map(str::trim) {
            Some(url) if url.starts_with("postgres://") || url.starts_with("postgresql://") => {
                PgConnectOptions::from_str(url).map_err(|e| {
                    Error::ConfigError(format!("invalid PostgreSQL connection URL: {e}"))
                })?
            }
            Some(keywords) => parse_keyword_string(keywords)?,
            None => PgConnectOptions::new(),
        };
        if let Some(host) = &self.host {
            options = options.host(host);
        }
        if let Some(port) = self.port {
            options = options.port(port);
        }
        if let Some(dbname) = &self.dbname {
            options = options.database(dbname);
        }
        if let Some(user) = &self.user {
            options = options.username(user);
        }
        if let Some(password) = &self.password {
            options = options.password(password);
        }
        Ok(options)
    }
}

fn parse_keyword_string(keywords: &str) -> Result<PgConnectOptions> {
    let mut options = PgConnectOptions::new();
    for pair in keywords.split_whitespace() {
        let (key, value) = pair.split_once('=').ok_or_else(|| {
            Error::ConfigError(format!("expected key=value in connection string, found `{pair}`"))
        })?;
        let value = value.trim_matches('\'');
        if !POSTGRES_KEYWORDS.contains(&key) {
            debug!(keyword = key, "ignoring unsupported PostgreSQL connection keyword");
            continue;
        }
        options = match key {
            "host" | "hostaddr" => options.host(value),
            "port" => options.port(value.parse().map_err(|_| {
                Error::ConfigError(format!("invalid PostgreSQL port `{value}`"))
            })?),
            "dbname" => options.database(value),
            "user" => options.username(value),
            "password" => options.password(value),
            "sslmode" => options.ssl_mode(value.parse().map_err(|e| {
                Error::ConfigError(format!("invalid sslmode `{value}`: {e}"))
            })?),
            "application_name" => options.application_name(value),
            _ => options,
        };
    }
    Ok(options)
}

/// MySQL connection keywords.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MySqlParams {
    #[serde(default = "default_mysql_host")]
    pub host: String,
    #[serde(default = "default_mysql_port")]
    pub port: u16,
    pub user: String,
    #[serde(default)]
    pub password: Option<String>,
    pub database: String,
}

impl MySqlParams {
    pub fn new(user: &str, database: &str) -> Self {
        Self {
            host: default_mysql_host(),
            port: default_mysql_port(),
            user: user.to_string(),
            password: None,
            database: database.to_string(),
        }
    }

    pub fn connect_options(&self) -> MySqlConnectOptions {
        let options = MySqlConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .database(&self.database);
        match &self.password {
            Some(password) => options.password(password),
            None => options,
        }
    }
}

/// Oracle credentials and data source name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OracleParams {
    pub user: String,
    pub password: String,
    pub dsn: String,
}

fn default_true() -> bool {
    true
}

fn default_mysql_host() -> String {
    "localhost".to_string()
}

fn default_mysql_port() -> u16 {
    3306
}

/// Decodes column `$index` of a driver row into a [`Value`], trying the
/// listed Rust types in order.
macro_rules! decode_column {
    ($row:expr, $index:expr, [$($ty:ty => $variant:expr),+ $(,)?]) => {{
        let raw = $row.try_get_raw($index)?;
        if raw.is_null() {
            Value::Null
        } $(else if let Ok(v) = $row.try_get::<$ty, _>($index) {
            $variant(v)
        })+ else {
            Value::Null
        }
    }};
}

fn sqlite_row(row: &sqlx::sqlite::SqliteRow) -> std::result::Result<Row, sqlx::Error> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        values.push(decode_column!(row, i, [
            String => Value::Text,
            i64 => Value::Integer,
            f64 => Value::Real,
            bool => Value::Bool,
            Vec<u8> => Value::Bytes,
        ]));
    }
    Ok(Row::new(values))
}

fn postgres_row(row: &sqlx::postgres::PgRow) -> std::result::Result<Row, sqlx::Error> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        values.push(decode_column!(row, i, [
            String => Value::Text,
            i64 => Value::Integer,
            i32 => |v: i32| Value::Integer(v.into()),
            i16 => |v: i16| Value::Integer(v.into()),
            f64 => Value::Real,
            bool => Value::Bool,
            Vec<u8> => Value::Bytes,
        ]));
    }
    Ok(Row::new(values))
}

fn mysql_row(row: &sqlx::mysql::MySqlRow) -> std::result::Result<Row, sqlx::Error> {
    let mut values = Vec::with_capacity(row.len());
    for i in 0..row.len() {
        values.push(decode_column!(row, i, [
            String => Value::Text,
            i64 => Value::Integer,
            u64 => |v: u64| Value::Integer(i64::try_from(v).unwrap_or(i64::MAX)),
            i32 => |v: i32| Value::Integer(v.into()),
            f64 => Value::Real,
            bool => Value::Bool,
            Vec<u8> => |v: Vec<u8>| match String::from_utf8(v) {
                Ok(text) => Value::Text(text),
                Err(e) => Value::Bytes(e.into_bytes()),
            },
        ]));
    }
    Ok(Row::new(values))
}

/// A database reachable through one of the supported drivers.
///
/// Holds connect options only; [`Driver`] calls open and close a connection
/// each time.
#[derive(Debug, Clone)]
pub enum DatabaseConnection {
    Sqlite(SqliteConnectOptions),
    Postgres(PgConnectOptions),
    /// Options plus the configured database, which the options do not
    /// expose back.
    MySql(MySqlConnectOptions, String),
    #[cfg(feature = "oracle")]
    Oracle(OracleParams),
}

impl DatabaseConnection {
    /// Build connect options from parameters. Nothing is contacted yet.
    pub fn new(params: &ConnectionParams) -> Result<Self> {
        match params {
            ConnectionParams::Sqlite(sqlite) => Ok(DatabaseConnection::Sqlite(
                SqliteConnectOptions::new()
                    .filename(&sqlite.path)
                    .create_if_missing(sqlite.create_if_missing),
            )),
            ConnectionParams::Postgres(postgres) => {
                Ok(DatabaseConnection::Postgres(postgres.connect_options()?))
            }
            ConnectionParams::MySql(mysql) => Ok(DatabaseConnection::MySql(
                mysql.connect_options(),
                mysql.database.clone(),
            )),
            #[cfg(feature = "oracle")]
            ConnectionParams::Oracle(oracle) => Ok(DatabaseConnection::Oracle(oracle.clone())),
            #[cfg(not(feature = "oracle"))]
            ConnectionParams::Oracle(_) => Err(Error::ConfigError(
                "Oracle support requires the `oracle` feature".to_string(),
            )),
        }
    }

    /// Open a connection and run a trivial query, to find out whether the
    /// parameters point at a reachable database of this backend.
    pub fn probe(&self) -> Result<()> {
        let sql = match self.backend() {
            Backend::Sqlite => "SELECT count(*) FROM sqlite_master",
            Backend::Oracle => "SELECT 1 FROM dual",
            Backend::Postgres | Backend::MySql => "SELECT 1",
        };
        self.select(sql, &[])?;
        info!(backend = %self.backend(), "connected");
        Ok(())
    }

    fn runtime() -> Result<tokio::runtime::Runtime> {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(Error::Runtime)
    }

    fn wrap(&self, context: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
        let backend = self.backend();
        let context = context.to_string();
        move |source| Error::driver(backend, context, source)
    }
}

impl Driver for DatabaseConnection {
    fn backend(&self) -> Backend {
        match self {
            DatabaseConnection::Sqlite(_) => Backend::Sqlite,
            DatabaseConnection::Postgres(_) => Backend::Postgres,
            DatabaseConnection::MySql(..) => Backend::MySql,
            #[cfg(feature = "oracle")]
            DatabaseConnection::Oracle(_) => Backend::Oracle,
        }
    }

    fn select(&self, sql: &str, params: &[&str]) -> Result<Vec<Row>> {
        debug!(backend = %self.backend(), sql = sql.trim(), ?params, "catalog query");
        let context = format!("running `{}`", first_line(sql));
        let runtime = Self::runtime()?;
        match self {
            DatabaseConnection::Sqlite(options) => runtime
                .block_on(async {
                    let mut conn = SqliteConnection::connect_with(options).await?;
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = query.bind(*param);
                    }
                    let rows = query.fetch_all(&mut conn).await?;
                    conn.close().await?;
                    rows.iter().map(sqlite_row).collect::<std::result::Result<Vec<_>, _>>()
                })
                .map_err(self.wrap(&context)),
            DatabaseConnection::Postgres(options) => runtime
                .block_on(async {
                    let mut conn = PgConnection::connect_with(options).await?;
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = query.bind(*param);
                    }
                    let rows = query.fetch_all(&mut conn).await?;
                    conn.close().await?;
                    rows.iter().map(postgres_row).collect::<std::result::Result<Vec<_>, _>>()
                })
                .map_err(self.wrap(&context)),
            DatabaseConnection::MySql(options, _) => runtime
                .block_on(async {
                    let mut conn = MySqlConnection::connect_with(options).await?;
                    let mut query = sqlx::query(sql);
                    for param in params {
                        query = query.bind(*param);
                    }
                    let rows = query.fetch_all(&mut conn).await?;
                    conn.close().await?;
                    rows.iter().map(mysql_row).collect::<std::result::Result<Vec<_>, _>>()
                })
                .map_err(self.wrap(&context)),
            #[cfg(feature = "oracle")]
            DatabaseConnection::Oracle(credentials) => {
                oracle_driver::select(credentials, sql, params, &context)
            }
        }
    }

    fn execute(&self, sql: &str) -> Result<()> {
        debug!(backend = %self.backend(), sql = sql.trim(), "execute");
        let context = format!("executing `{}`", first_line(sql));
        let runtime = Self::runtime()?;
        match self {
            DatabaseConnection::Sqlite(options) => runtime
                .block_on(async {
                    let mut conn = SqliteConnection::connect_with(options).await?;
                    (&mut conn).execute(sql).await?;
                    conn.close().await
                })
                .map_err(self.wrap(&context)),
            DatabaseConnection::Postgres(options) => runtime
                .block_on(async {
                    let mut conn = PgConnection::connect_with(options).await?;
                    (&mut conn).execute(sql).await?;
                    conn.close().await
                })
                .map_err(self.wrap(&context)),
            DatabaseConnection::MySql(options, _) => runtime
                .block_on(async {
                    let mut conn = MySqlConnection::connect_with(options).await?;
                    (&mut conn).execute(sql).await?;
                    conn.close().await
                })
                .map_err(self.wrap(&context)),
            #[cfg(feature = "oracle")]
            DatabaseConnection::Oracle(params) => oracle_driver::execute(params, sql, &context),
        }
    }

    fn database_name(&self) -> Option<String> {
        match self {
            DatabaseConnection::Sqlite(options) => {
                Some(options.clone().get_filename().to_string_lossy().into_owned())
            }
            DatabaseConnection::Postgres(options) => options.get_database().map(str::to_string),
            DatabaseConnection::MySql(_, database) => Some(database.clone()),
            // the user_* views belong to the connecting schema
            #[cfg(feature = "oracle")]
            DatabaseConnection::Oracle(params) => Some(params.user.clone()),
        }
    }
}

fn first_line(sql: &str) -> &str {
    sql.trim().lines().next().unwrap_or_default()
}

#[cfg(feature = "oracle")]
mod oracle_driver {
    use super::OracleParams;
    use crate::db::row::{Row, Value};
    use crate::error::{Error, Result};
    use oracle::sql_type::ToSql;

    fn wrap(context: &str) -> impl FnOnce(oracle::Error) -> Error + '_ {
        move |source| Error::Oracle {
            context: context.to_string(),
            source,
        }
    }

    pub(super) fn select(
        params: &OracleParams,
        sql: &str,
        binds: &[&str],
        context: &str,
    ) -> Result<Vec<Row>> {
        let conn = oracle::Connection::connect(&params.user, &params.password, &params.dsn)
            .map_err(wrap(context))?;
        let owned: Vec<String> = binds.iter().map(|b| b.to_string()).collect();
        let binds: Vec<&dyn ToSql> = owned.iter().map(|b| b as &dyn ToSql).collect();
        let result_set = conn.query(sql, &binds).map_err(wrap(context))?;
        let mut rows = Vec::new();
        for row in result_set {
            let row = row.map_err(wrap(context))?;
            let mut values = Vec::with_capacity(row.sql_values().len());
            for i in 0..row.sql_values().len() {
                let value: Option<String> = row.get(i).map_err(wrap(context))?;
                values.push(value.map_or(Value::Null, Value::Text));
            }
            rows.push(Row::new(values));
        }
        conn.close().map_err(wrap(context))?;
        Ok(rows)
    }

    pub(super) fn execute(params: &OracleParams, sql: &str, context: &str) -> Result<()> {
        let conn = oracle::Connection::connect(&params.user, &params.password, &params.dsn)
            .map_err(wrap(context))?;
        conn.execute(sql, &[]).map_err(wrap(context))?;
        conn.commit().map_err(wrap(context))?;
        conn.close().map_err(wrap(context))
    }
}
