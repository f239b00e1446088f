//! Tracing subscriber initialization.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable lines.
    #[default]
    Pretty,
    /// One JSON object per event, including the current span.
    Json,
}

/// Installs the global tracing subscriber.
///
/// The level comes from `RUST_LOG` and defaults to `info`.
///
/// # Errors
///
/// Returns [`ConfigError::Logging`] if the filter is malformed or a global
/// subscriber is already installed.
pub fn init_tracing(format: LogFormat) -> Result<(), ConfigError> {
    init_tracing_with_default(format, "info")
}

/// Installs the global tracing subscriber with a fallback filter used when
/// `RUST_LOG` is unset.
///
/// # Errors
///
/// See [`init_tracing`].
pub fn init_tracing_with_default(format: LogFormat, default_filter: &str) -> Result<(), ConfigError> {
    let filter = env_filter(default_filter)?;
    let registry = tracing_subscriber::registry().with(filter);

    let result = match format {
        LogFormat::Pretty => registry
            .with(fmt::layer().with_target(true).with_level(true))
            .try_init(),
        LogFormat::Json => registry
            .with(fmt::layer().json().with_current_span(true).with_span_list(false))
            .try_init(),
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))
}

fn env_filter(default_filter: &str) -> Result<EnvFilter, ConfigError> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_filter))
        .map_err(|e| ConfigError::Logging(format!("invalid filter '{default_filter}': {e}")))
}
