//! Logging setup
//!
//! stdout carries the CNI result, so logs go to stderr and/or an append-only
//! file. `RUST_LOG` overrides the configured level.

use crate::config::LoggingConfig;
use crate::error::EngineError;
use std::fs::OpenOptions;
use std::sync::Mutex;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Install the global subscriber for this process
pub fn init(config: &LoggingConfig) -> Result<(), EngineError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directive()));

    let file = match &config.log_file {
        Some(path) => Some(
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(|e| EngineError::io(path, e))?,
        ),
        None => None,
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_target(false);
    let installed = match (file, config.to_stderr()) {
        (Some(file), true) => builder
            .with_writer(std::io::stderr.and(Mutex::new(file)))
            .try_init(),
        (Some(file), false) => builder.with_writer(Mutex::new(file)).try_init(),
        (None, true) => builder.with_writer(std::io::stderr).try_init(),
        (None, false) => builder.with_writer(std::io::sink).try_init(),
    };
    installed.map_err(|e| EngineError::Config(format!("failed to initialise logging: {e}")))
}
