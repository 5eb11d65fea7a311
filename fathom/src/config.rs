//! Configuration handling for fathom
//!
//! ```toml
//! [database]
//! backend = "postgres"
//! connection_string = "host=localhost dbname=shop user=fathom"
//! schema = "public"
//!
//! [logging]
//! level = "debug"
//! format = "json"
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::db::connection::ConnectionParams;
use crate::error::{Error, Result};

/// Load configuration from a TOML file
pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    let config_str = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    load_from_str(&config_str)
}

/// Parse configuration from TOML text
pub fn load_from_str(config_str: &str) -> Result<Config> {
    toml::from_str(config_str)
        .map_err(|e| Error::ConfigError(format!("Failed to parse config file: {}", e)))
}

/// Represents the complete fathom configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Config {
    /// Database to inspect, tagged by `backend`.
    pub database: ConnectionParams,
    pub logging: Option<LoggingConfig>,
}

/// Logging configuration
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_level")]
    pub level: String,
    /// Log to this file instead of stdout.
    pub file: Option<String>,
    /// `text` or `json`.
    #[serde(default = "default_format")]
    pub format: String,
    #[serde(default = "default_true")]
    pub stdout: bool,
    #[serde(default = "default_true")]
    pub include_timestamps: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            file: None,
            format: default_format(),
            stdout: true,
            include_timestamps: true,
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_format() -> String {
    "text".to_string()
}

fn default_true() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::connection::{PostgresParams, SqliteParams};
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn postgres_config_with_logging() {
        let config = load_from_str(
            r#"
            [database]
            backend = "postgres"
            connection_string = "host=localhost dbname=shop"
            schema = "inventory"

            [logging]
            level = "debug"
            format = "json"
            "#,
        )
        .unwrap();

        let ConnectionParams::Postgres(params) = &config.database else {
            panic!("expected PostgreSQL parameters, got {:?}", config.database);
        };
        assert_eq!(
            params,
            &PostgresParams {
                schema: Some("inventory".into()),
                ..PostgresParams::from_connection_string("host=localhost dbname=shop")
            }
        );
        let logging = config.logging.unwrap();
        assert_eq!(logging.level, "debug");
        assert_eq!(logging.format, "json");
        assert!(logging.stdout);
    }

    #[test]
    fn logging_section_is_optional() {
        let config = load_from_str("[database]\nbackend = \"sqlite\"\npath = \"app.db\"\n").unwrap();
        assert_eq!(config.database, ConnectionParams::Sqlite(SqliteParams::new("app.db")));
        assert_eq!(config.logging, None);
    }

    #[test]
    fn unknown_backend_is_a_config_error() {
        let err = load_from_str("[database]\nbackend = \"mssql\"\n").unwrap_err();
        assert!(matches!(err, Error::ConfigError(_)));
    }

    #[test]
    fn load_from_file_reads_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[database]\nbackend = \"sqlite\"\npath = \"x.db\"").unwrap();
        let config = load_from_file(file.path()).unwrap();
        assert_eq!(config.database.backend(), crate::inspector::Backend::Sqlite);
        assert!(load_from_file("/nonexistent/fathom.toml").is_err());
    }
}
