//! Structured logging setup

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use crate::config::LoggingConfig;

/// Error raised when the global subscriber cannot be installed
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to install tracing subscriber: {0}")]
    Install(String),
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over `logging.level` when set.
pub fn init_tracing(config: &LoggingConfig) -> Result<(), LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
                filter: config.level.clone(),
                reason: e.to_string(),
            })?
        }
    };

    let registry = tracing_subscriber::registry().with(filter);

    let result = if config.format == "pretty" {
        registry.with(fmt::layer().pretty()).try_init()
    } else {
        registry
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
    };

    result.map_err(|e| LoggingError::Install(e.to_string()))
}
