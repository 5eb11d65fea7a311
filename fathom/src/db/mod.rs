//! Database access
//!
//! Connection parameters, the one-shot driver and the values it returns.

pub mod connection;
pub mod executor;
pub mod row;

pub use connection::{
    ConnectionParams, DatabaseConnection, Driver, MySqlParams, OracleParams, PostgresParams,
    SqliteParams,
};
pub use executor::SqlExecutor;
pub use row::{Row, Value};
