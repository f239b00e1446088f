//! Validation issue records.

use crate::core::StepKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Whether an issue blocks execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Blocks execution.
    Error,
    /// Advisory.
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Error => write!(f, "error"),
            Self::Warning => write!(f, "warning"),
        }
    }
}

/// Stable issue codes consumed by repair loops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    /// A required parameter is absent.
    MissingRequiredParam,
    /// A parameter is not declared by the schema.
    UnknownParam,
    /// A parameter violates its declared type, enum or bounds.
    InvalidParamType,
    /// No schema is registered for the provider (strict mode only).
    UnknownProvider,
}

impl IssueCode {
    /// Returns the stable code string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingRequiredParam => "MISSING_REQUIRED_PARAM",
            Self::UnknownParam => "UNKNOWN_PARAM",
            Self::InvalidParamType => "INVALID_PARAM_TYPE",
            Self::UnknownProvider => "UNKNOWN_PROVIDER",
        }
    }
}

impl fmt::Display for IssueCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One semantic problem found in a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    /// Error or warning.
    pub severity: Severity,
    /// Stable code.
    pub code: IssueCode,
    /// Human-readable message.
    pub message: String,
    /// Index of the offending step.
    pub step_index: usize,
    /// Kind of the offending step.
    pub step_kind: StepKind,
    /// Provider or operation name of the step.
    pub provider_name: String,
    /// Offending parameter, when the issue concerns one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
}

impl ValidationIssue {
    /// Returns true if the issue blocks execution.
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} at step {} ({} '{}'): {}",
            self.severity, self.code, self.step_index, self.step_kind, self.provider_name, self.message
        )
    }
}

/// Returns true if any issue blocks execution.
#[must_use]
pub fn has_blocking_issues(issues: &[ValidationIssue]) -> bool {
    issues.iter().any(ValidationIssue::is_error)
}
