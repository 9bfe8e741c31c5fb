//! Tracing subscriber setup
//!
//! The engine itself only emits `tracing` events; the embedding controller
//! calls [`init`] once to decide where they go. `RUST_LOG` takes precedence
//! over the configured level.

use crate::config::LoggingConfig;
use crate::{Error, Result};
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber described by `config`
///
/// Returns an error if a global subscriber is already installed or the log
/// file cannot be opened.
pub fn init(config: &LoggingConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    match &config.file {
        Some(path) => {
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
                .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e)))
        }
        None => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .try_init()
            .map_err(|e| Error::Internal(format!("Tracing init failed: {}", e))),
    }
}
