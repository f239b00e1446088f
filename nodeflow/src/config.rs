//! Engine configuration.
//!
//! One document configures validation, execution, the repair loop and log
//! output. Every field has a default, so `{}` is a valid configuration.
//!
//! ```json
//! {
//!   "validator": { "strictUnknownParams": true },
//!   "executor": { "defaultImageMime": "image/webp" },
//!   "repair": { "maxAttempts": 5 },
//!   "logFormat": "json"
//! }
//! ```

use crate::errors::ConfigError;
use crate::executor::ExecutorConfig;
use crate::observability::LogFormat;
use crate::repair::RepairConfig;
use crate::validation::ValidatorOptions;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Validator strictness.
    #[serde(default)]
    pub validator: ValidatorOptions,
    /// Executor runtime settings.
    #[serde(default)]
    pub executor: ExecutorConfig,
    /// Repair loop settings.
    #[serde(default)]
    pub repair: RepairConfig,
    /// Log output format for [`init_tracing`](crate::observability::init_tracing).
    #[serde(default)]
    pub log_format: LogFormat,
}

impl EngineConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and
    /// [`ConfigError::Invalid`] for out-of-range values.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, otherwise see
    /// [`EngineConfig::from_json_str`].
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&contents)
    }

    /// Sets the validator options.
    #[must_use]
    pub fn with_validator(mut self, validator: ValidatorOptions) -> Self {
        self.validator = validator;
        self
    }

    /// Sets the executor settings.
    #[must_use]
    pub fn with_executor(mut self, executor: ExecutorConfig) -> Self {
        self.executor = executor;
        self
    }

    /// Sets the repair loop settings.
    #[must_use]
    pub fn with_repair(mut self, repair: RepairConfig) -> Self {
        self.repair = repair;
        self
    }

    /// Sets the log format.
    #[must_use]
    pub fn with_log_format(mut self, log_format: LogFormat) -> Self {
        self.log_format = log_format;
        self
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.repair.max_attempts == 0 {
            return Err(ConfigError::invalid("repair.maxAttempts", "must be at least 1"));
        }
        let mime = self.executor.default_image_mime.trim();
        if mime.is_empty() || !mime.contains('/') {
            return Err(ConfigError::invalid(
                "executor.defaultImageMime",
                format!("'{mime}' is not a MIME type"),
            ));
        }
        if self.validator.marker_prefix.is_empty() {
            return Err(ConfigError::invalid("validator.markerPrefix", "must not be empty"));
        }
        Ok(())
    }
}
