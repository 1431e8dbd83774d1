//! Process-wide log setup.
//!
//! Leaf modules log through the `log` facade and orchestration code through
//! `tracing`. Both end up in the same `tracing-subscriber` pipeline.

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

#[derive(Error, Debug)]
pub enum TelemetryError {
    #[error("Invalid log filter '{filter}': {reason}")]
    InvalidFilter { filter: String, reason: String },

    #[error("Failed to bridge `log` records: {0}")]
    LogBridge(#[from] log::SetLoggerError),

    #[error("Failed to install the global subscriber: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),
}

/// Output format of log lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Installs the global subscriber. `RUST_LOG`, when set, takes precedence
/// over `default_level`.
pub fn init_logging(default_level: &str, format: LogFormat) -> Result<(), TelemetryError> {
    let filter = build_filter(default_level)?;
    tracing_log::LogTracer::init()?;

    match format {
        LogFormat::Text => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().with_target(true));
            tracing::subscriber::set_global_default(subscriber)?;
        }
        LogFormat::Json => {
            let subscriber = Registry::default()
                .with(filter)
                .with(fmt::layer().json().with_target(true));
            tracing::subscriber::set_global_default(subscriber)?;
        }
    }
    Ok(())
}

fn build_filter(default_level: &str) -> Result<EnvFilter, TelemetryError> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(default_level).map_err(|e| TelemetryError::InvalidFilter {
        filter: default_level.to_string(),
        reason: e.to_string(),
    })
}
