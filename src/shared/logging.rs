//! Logging Setup
//!
//! Installs the global `tracing` subscriber from the `logging` config section.

use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::shared::errors::{DataPortalError, Result};

/// Translate a configured level name into a `tracing` filter directive.
///
/// Accepts both `tracing` names and the `WARNING`/`CRITICAL` spellings used
/// in existing configuration files.
#[must_use]
pub fn level_directive(level: &str) -> &'static str {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "warn" | "warning" => "warn",
        "error" | "critical" | "fatal" => "error",
        _ => "info",
    }
}

/// Install the global subscriber.
///
/// `RUST_LOG` wins over `level` when set. `format` is `json` or anything else
/// for the plain formatter. When `file` is given, log lines are appended to it
/// instead of stderr.
///
/// # Errors
///
/// Returns `DataPortalError::Configuration` if the log file cannot be opened
/// or a global subscriber is already installed.
pub fn setup_logging(level: &str, format: &str, file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level_directive(level)))
        .map_err(|e| {
            DataPortalError::configuration("Invalid logging level").with_details(e.to_string())
        })?;

    let writer = match file {
        Some(path) => {
            let log_file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| {
                    DataPortalError::configuration(format!(
                        "Failed to open log file: {}",
                        path.display()
                    ))
                    .with_details(e.to_string())
                })?;
            BoxMakeWriter::new(Mutex::new(log_file))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(writer)
        .with_ansi(file.is_none());
    let fmt_layer: Box<dyn Layer<Registry> + Send + Sync> = if format.eq_ignore_ascii_case("json") {
        fmt_layer.json().boxed()
    } else {
        fmt_layer.boxed()
    };

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(filter)
        .try_init()
        .map_err(|e| {
            DataPortalError::configuration("Failed to install logging subscriber")
                .with_details(e.to_string())
        })?;

    tracing::info!(
        level = level_directive(level),
        file = ?file.map(Path::display),
        "Logging configured"
    );
    Ok(())
}
