//! Logging setup
//!
//! Installs a `tracing` subscriber according to the `[logging]` section of
//! the configuration. Without that section nothing is installed and the
//! application is free to set up its own subscriber.

use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use tracing::Level;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Filter honouring `RUST_LOG`, with fathom's own level taken from the
/// configuration.
pub fn env_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    let directive = format!("fathom={}", parse_level(&config.level))
        .parse()
        .map_err(|e| Error::ConfigError(format!("invalid log directive: {e}")))?;
    Ok(EnvFilter::from_default_env().add_directive(directive))
}

/// Initialize logging based on configuration
pub fn init_logging(config: &Option<LoggingConfig>) -> Result<()> {
    let Some(config) = config else {
        return Ok(());
    };

    let filter = env_filter(config)?;
    let json = config.format.eq_ignore_ascii_case("json");
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(true);

    let installed = match (&config.file, json, config.include_timestamps) {
        (Some(path), json, timestamps) => {
            if let Some(parent) = Path::new(path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            let file = Arc::new(File::create(path)?);
            let builder = builder.with_writer(file).with_ansi(false);
            match (json, timestamps) {
                (true, _) => tracing::subscriber::set_global_default(builder.json().finish()),
                (false, true) => tracing::subscriber::set_global_default(builder.finish()),
                (false, false) => {
                    tracing::subscriber::set_global_default(builder.without_time().finish())
                }
            }
        }
        (None, _, _) if !config.stdout => return Ok(()),
        (None, true, _) => tracing::subscriber::set_global_default(builder.json().finish()),
        (None, false, true) => tracing::subscriber::set_global_default(builder.finish()),
        (None, false, false) => {
            tracing::subscriber::set_global_default(builder.without_time().finish())
        }
    };

    installed.map_err(|e| Error::ConfigError(format!("logging already initialised: {e}")))
}
