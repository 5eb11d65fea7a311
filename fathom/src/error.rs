//! Error types for fathom

use thiserror::Error;

use crate::inspector::Backend;
use crate::parser::ParseError;

/// Result type for fathom operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for fathom
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// A driver-level failure, passed through with the backend and the
    /// operation that triggered it.
    #[error("{backend} error while {context}: {source}")]
    Driver {
        backend: Backend,
        context: String,
        #[source]
        source: sqlx::Error,
    },

    #[cfg(feature = "oracle")]
    #[error("Oracle error while {context}: {source}")]
    Oracle {
        context: String,
        #[source]
        source: oracle::Error,
    },

    #[error("Failed to parse CREATE TABLE statement of `{table}`: {source}")]
    Parse {
        table: String,
        #[source]
        source: ParseError,
    },

    #[error("Unsupported or unreachable database (tried {0})")]
    UnsupportedDatabase(String),

    #[error("Collection `{0}` was already fetched from the database and cannot be reassigned")]
    AlreadyPopulated(String),

    #[error("Table `{0}` has been dropped")]
    DroppedTable(String),

    #[error("Object not found in catalog: {0}")]
    NotFound(String),

    #[error("Schema analysis error: {0}")]
    SchemaAnalysisError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Failed to start driver runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Wrap a driver error with the backend and the operation it interrupted.
    pub fn driver(backend: Backend, context: impl Into<String>, source: sqlx::Error) -> Self {
        Error::Driver {
            backend,
            context: context.into(),
            source,
        }
    }
}

/// Convert Serde JSON errors to fathom errors
impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Error::SerializationError(error.to_string())
    }
}

/// Convert TOML deserialization errors to fathom errors
impl From<toml::de::Error> for Error {
    fn from(error: toml::de::Error) -> Self {
        Error::ConfigError(error.to_string())
    }
}
