//! Semantic validation of compiled pipelines.
//!
//! The [`StepValidator`] checks provider-backed steps against the schemas in
//! a [`CapabilityRegistry`] and reports [`ValidationIssue`]s with stable
//! codes. Errors block execution; warnings are advisory.

mod issues;
mod registry;
mod validator;

pub use issues::{has_blocking_issues, IssueCode, Severity, ValidationIssue};
pub use registry::{json_type_name, CapabilityRegistry, ParamSpec, ParamType, ProviderSchema};
pub use validator::{validate, StepValidator, ValidatorOptions};
