//! Logging initialization
//!
//! `RUST_LOG` takes precedence over the configured level. Output goes to stdout,
//! as JSON lines when `logging.structured` is set.

use dings_auth::config::LoggingConfig;
use std::io;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, fmt};

/// Install the global subscriber
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init(config: &LoggingConfig) -> io::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    let subscriber = tracing_subscriber::registry().with(filter);

    if config.structured {
        subscriber
            .with(fmt::layer().json().with_current_span(false))
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    } else {
        subscriber
            .with(fmt::layer())
            .try_init()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}
