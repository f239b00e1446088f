//! Semantic validation of compiled steps against provider schemas.

use super::issues::{IssueCode, Severity, ValidationIssue};
use super::registry::{json_type_name, CapabilityRegistry, ParamSpec, ParamType};
use crate::core::{Pipeline, Step, StepKind, INTERNAL_PARAM_PREFIX};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Parameters consumed by the engine itself rather than the provider.
const ENGINE_PARAMS: &[&str] = &["prePrompt"];

fn default_marker_prefix() -> String {
    INTERNAL_PARAM_PREFIX.to_string()
}

/// Options controlling validation strictness.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatorOptions {
    /// Report undeclared parameters as errors instead of warnings.
    #[serde(default)]
    pub strict_unknown_params: bool,
    /// Report steps whose provider has no schema as errors instead of
    /// skipping them.
    #[serde(default)]
    pub require_schemas: bool,
    /// Parameters starting with this prefix are ignored.
    #[serde(default = "default_marker_prefix")]
    pub marker_prefix: String,
}

impl Default for ValidatorOptions {
    fn default() -> Self {
        Self {
            strict_unknown_params: false,
            require_schemas: false,
            marker_prefix: default_marker_prefix(),
        }
    }
}

impl ValidatorOptions {
    /// Options with both escalations enabled.
    #[must_use]
    pub fn strict() -> Self {
        Self {
            strict_unknown_params: true,
            require_schemas: true,
            ..Self::default()
        }
    }

    /// Sets unknown-parameter escalation.
    #[must_use]
    pub fn with_strict_unknown_params(mut self, strict: bool) -> Self {
        self.strict_unknown_params = strict;
        self
    }

    /// Sets missing-schema escalation.
    #[must_use]
    pub fn with_require_schemas(mut self, require: bool) -> Self {
        self.require_schemas = require;
        self
    }

    /// Sets the internal marker prefix.
    #[must_use]
    pub fn with_marker_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.marker_prefix = prefix.into();
        self
    }

    fn is_internal(&self, name: &str) -> bool {
        !self.marker_prefix.is_empty() && name.starts_with(&self.marker_prefix)
    }
}

/// Checks pipeline steps against a capability registry.
///
/// Validation never fails and never mutates the pipeline; every finding is
/// returned as a [`ValidationIssue`].
#[derive(Debug)]
pub struct StepValidator<'r> {
    registry: &'r CapabilityRegistry,
    options: ValidatorOptions,
}

impl<'r> StepValidator<'r> {
    /// Creates a validator.
    #[must_use]
    pub fn new(registry: &'r CapabilityRegistry, options: ValidatorOptions) -> Self {
        Self { registry, options }
    }

    /// Returns the options in use.
    #[must_use]
    pub fn options(&self) -> &ValidatorOptions {
        &self.options
    }

    /// Validates every provider-backed step.
    #[must_use]
    pub fn validate(&self, pipeline: &Pipeline) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();
        for (step_index, step) in pipeline.iter().enumerate() {
            self.validate_step(step_index, step, &mut issues);
        }

        debug!(
            pipeline = %pipeline.name,
            steps = pipeline.len(),
            errors = issues.iter().filter(|i| i.is_error()).count(),
            warnings = issues.iter().filter(|i| !i.is_error()).count(),
            "Pipeline validated"
        );
        issues
    }

    fn validate_step(&self, step_index: usize, step: &Step, issues: &mut Vec<ValidationIssue>) {
        let kind = step.kind();
        if !kind.is_provider_backed() {
            return;
        }
        let (Some(provider), Some(params)) = (step.provider(), step.params()) else {
            return;
        };

        let issue = |severity, code, message: String, parameter: Option<&str>| ValidationIssue {
            severity,
            code,
            message,
            step_index,
            step_kind: kind,
            provider_name: provider.to_string(),
            parameter_name: parameter.map(str::to_string),
        };

        let Some(schema) = self.registry.get(provider, kind) else {
            if self.options.require_schemas {
                issues.push(issue(
                    Severity::Error,
                    IssueCode::UnknownProvider,
                    format!("No schema registered for {kind} provider '{provider}'"),
                    None,
                ));
            }
            return;
        };

        let supplied = implicitly_supplied(step);
        for name in schema.required_params() {
            if self.options.is_internal(name) || supplied.iter().any(|s| *s == name) {
                continue;
            }
            let present = params.get(name).is_some_and(|v| !v.is_null());
            if !present {
                issues.push(issue(
                    Severity::Error,
                    IssueCode::MissingRequiredParam,
                    format!("Missing required parameter '{name}' for '{provider}'"),
                    Some(name),
                ));
            }
        }

        for (name, value) in params {
            let name = name.as_str();
            if self.options.is_internal(name) || ENGINE_PARAMS.iter().any(|p| *p == name) || value.is_null() {
                continue;
            }
            match schema.parameters.get(name) {
                None => {
                    let severity = if self.options.strict_unknown_params {
                        Severity::Error
                    } else {
                        Severity::Warning
                    };
                    issues.push(issue(
                        severity,
                        IssueCode::UnknownParam,
                        format!("Parameter '{name}' is not declared by '{provider}'"),
                        Some(name),
                    ));
                }
                Some(spec) => {
                    if let Some(message) = check_value(name, spec, value) {
                        issues.push(issue(
                            Severity::Error,
                            IssueCode::InvalidParamType,
                            message,
                            Some(name),
                        ));
                    }
                }
            }
        }
    }
}

/// Parameter names a step receives from markers or its primary input
/// rather than from its parameter map.
fn implicitly_supplied(step: &Step) -> Vec<&'static str> {
    let mut names = Vec::new();
    if let Some(deferred) = step.deferred() {
        if deferred.prompt.is_some() {
            names.push("prompt");
        }
        if !deferred.references.is_empty() {
            names.push("referenceImages");
        }
        if !deferred.overlays.is_empty() {
            names.push("overlays");
        }
    }
    if matches!(step.kind(), StepKind::Transform | StepKind::Vision) {
        names.push("image");
    }
    match step {
        Step::Text(s) if s.input.is_some() => names.push("context"),
        Step::Vision(s) if s.context.is_some() => names.push("context"),
        _ => {}
    }
    names
}

/// Checks a present value against its spec, returning a message on mismatch.
fn check_value(name: &str, spec: &ParamSpec, value: &serde_json::Value) -> Option<String> {
    if !spec.param_type.accepts(value) {
        return Some(format!(
            "Parameter '{name}' must be {}, got {}",
            spec.param_type,
            json_type_name(value)
        ));
    }

    if let (Some(allowed), Some(s)) = (&spec.enum_values, value.as_str()) {
        if !allowed.iter().any(|a| a == s) {
            return Some(format!(
                "Parameter '{name}' must be one of [{}], got '{s}'",
                allowed.join(", ")
            ));
        }
    }

    if matches!(spec.param_type, ParamType::Number | ParamType::Integer) {
        if let Some(n) = value.as_f64() {
            if let Some(min) = spec.minimum.filter(|min| n < *min) {
                return Some(format!("Parameter '{name}' must be >= {min}, got {n}"));
            }
            if let Some(max) = spec.maximum.filter(|max| n > *max) {
                return Some(format!("Parameter '{name}' must be <= {max}, got {n}"));
            }
        }
    }

    None
}

/// Validates a pipeline against a registry.
#[must_use]
pub fn validate(
    pipeline: &Pipeline,
    registry: &CapabilityRegistry,
    options: ValidatorOptions,
) -> Vec<ValidationIssue> {
    StepValidator::new(registry, options).validate(pipeline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{DeferredRefs, GenerateStep, Params, PromptRef, SaveStep};
    use crate::validation::{has_blocking_issues, ProviderSchema};
    use serde_json::json;

    fn flux_registry() -> CapabilityRegistry {
        CapabilityRegistry::from_schemas([ProviderSchema::new("flux")
            .for_kind(StepKind::Generate)
            .with_param("prompt", ParamSpec::new(ParamType::String).required())
            .with_param(
                "style",
                ParamSpec::new(ParamType::String).with_enum(["photo", "anime"]),
            )
            .with_param(
                "steps",
                ParamSpec::new(ParamType::Integer).with_range(Some(1.0), Some(50.0)),
            )
            .with_param("hdr", ParamSpec::new(ParamType::Boolean))])
    }

    fn generate(params: serde_json::Value) -> Step {
        let params: Params = serde_json::from_value(params).unwrap();
        Step::Generate(GenerateStep {
            generator: "flux".to_string(),
            params,
            deferred: DeferredRefs::default(),
            out: "gen".to_string(),
        })
    }

    fn pipeline(steps: Vec<Step>) -> Pipeline {
        Pipeline::new("test", steps)
    }

    #[test]
    fn test_valid_step_has_no_issues() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({"prompt": "a fox", "style": "photo", "steps": 20}))]);

        assert!(validate(&p, &registry, ValidatorOptions::default()).is_empty());
    }

    #[test]
    fn test_missing_required_param() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({"style": "anime"}))]);

        let issues = validate(&p, &registry, ValidatorOptions::default());

        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::MissingRequiredParam);
        assert_eq!(issues[0].severity, Severity::Error);
        assert_eq!(issues[0].parameter_name.as_deref(), Some("prompt"));
        assert_eq!(issues[0].step_index, 0);
        assert_eq!(issues[0].provider_name, "flux");
    }

    #[test]
    fn test_null_counts_as_missing() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({"prompt": null}))]);

        let issues = validate(&p, &registry, ValidatorOptions::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::MissingRequiredParam);
    }

    #[test]
    fn test_unknown_param_is_warning_by_default() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({"prompt": "x", "seed": 7}))]);

        let issues = validate(&p, &registry, ValidatorOptions::default());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::UnknownParam);
        assert_eq!(issues[0].severity, Severity::Warning);
        assert!(!has_blocking_issues(&issues));

        let strict = validate(&p, &registry, ValidatorOptions::strict());
        assert_eq!(strict[0].severity, Severity::Error);
    }

    #[test]
    fn test_type_enum_and_bounds() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({
            "prompt": 42,
            "style": "watercolor",
            "steps": 80,
            "hdr": "yes"
        }))]);

        let issues = validate(&p, &registry, ValidatorOptions::default());
        let params: Vec<_> = issues
            .iter()
            .map(|i| (i.code, i.parameter_name.clone().unwrap_or_default()))
            .collect();

        assert_eq!(
            params,
            vec![
                (IssueCode::InvalidParamType, "hdr".to_string()),
                (IssueCode::InvalidParamType, "prompt".to_string()),
                (IssueCode::InvalidParamType, "steps".to_string()),
                (IssueCode::InvalidParamType, "style".to_string()),
            ]
        );
        assert!(issues[3].message.contains("photo, anime"));
        assert!(issues[2].message.contains("<= 50"));
    }

    #[test]
    fn test_internal_and_engine_params_are_ignored() {
        let registry = flux_registry();
        let p = pipeline(vec![generate(json!({
            "prompt": "x",
            "__trace": true,
            "prePrompt": "cinematic"
        }))]);

        assert!(validate(&p, &registry, ValidatorOptions::default()).is_empty());
    }

    #[test]
    fn test_prompt_marker_supplies_prompt() {
        let registry = flux_registry();
        let step = Step::Generate(GenerateStep {
            generator: "flux".to_string(),
            params: Params::new(),
            deferred: DeferredRefs {
                prompt: Some(PromptRef::new("caption", None)),
                ..DeferredRefs::default()
            },
            out: "gen".to_string(),
        });

        assert!(validate(&pipeline(vec![step]), &registry, ValidatorOptions::default()).is_empty());
    }

    #[test]
    fn test_missing_schema_skipped_unless_required() {
        let registry = CapabilityRegistry::new();
        let p = pipeline(vec![generate(json!({"prompt": "x"}))]);

        assert!(validate(&p, &registry, ValidatorOptions::default()).is_empty());

        let issues = validate(&p, &registry, ValidatorOptions::default().with_require_schemas(true));
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].code, IssueCode::UnknownProvider);
    }

    #[test]
    fn test_save_steps_are_not_validated() {
        let registry = CapabilityRegistry::new();
        let p = pipeline(vec![Step::Save(SaveStep {
            node_id: "out".to_string(),
            input: "gen".to_string(),
            destination: "gallery".to_string(),
            provider: "local".to_string(),
            params: Params::new(),
        })]);

        assert!(validate(&p, &registry, ValidatorOptions::strict()).is_empty());
    }
}
