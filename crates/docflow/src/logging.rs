//! Subscriber setup for the binary.

use thiserror::Error;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum LogFormat {
    /// Human readable, one line per event.
    Pretty,
    /// One JSON object per event, with the current span's fields.
    Json,
}

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log filter: {0}")]
    Filter(#[from] tracing_subscriber::filter::ParseError),

    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] log::SetLoggerError),
}

/// Builds the event filter: an explicit directive wins, then `RUST_LOG`,
/// then `info`.
pub fn env_filter(directive: Option<&str>) -> Result<EnvFilter, LoggingError> {
    match directive {
        Some(directive) => Ok(EnvFilter::try_new(directive)?),
        None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))),
    }
}

/// Installs the global subscriber and routes `log` records into it.
pub fn init(format: LogFormat, directive: Option<&str>) -> Result<(), LoggingError> {
    let registry = tracing_subscriber::registry().with(env_filter(directive)?);

    match format {
        LogFormat::Pretty => tracing::subscriber::set_global_default(
            registry.with(fmt::layer().with_target(true).compact()),
        )?,
        LogFormat::Json => tracing::subscriber::set_global_default(
            registry.with(
                fmt::layer()
                    .json()
                    .with_current_span(true)
                    .with_span_list(false),
            ),
        )?,
    }

    tracing_log::LogTracer::init()?;
    Ok(())
}
