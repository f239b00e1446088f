//! Bounded repair loop for generated graphs.
//!
//! Graphs authored by an external generator go through the same compiler
//! and validator as hand-built ones. [`RepairLoop`] asks the generator for a
//! graph, compiles and validates it, and on failure hands the collected
//! [`RepairFeedback`] back to the generator for the next attempt. Attempts
//! are sequential and bounded by [`RepairConfig::max_attempts`].

mod suggestions;

pub use suggestions::{get_suggestion, register_suggestion, suggestion_for, RepairSuggestion};

use crate::compiler::GraphCompiler;
use crate::core::CompiledGraph;
use crate::errors::{codes, CompileError, ExecutionError, NodeflowError};
use crate::graph::Graph;
use crate::observability::SpanTimer;
use crate::validation::{
    has_blocking_issues, CapabilityRegistry, Severity, StepValidator, ValidationIssue,
    ValidatorOptions,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, warn};

/// Produces graphs from a natural-language request.
#[async_trait]
pub trait GraphGenerator: Send + Sync {
    /// Generates a graph. `feedback` is empty on the first attempt and holds
    /// the previous attempt's problems afterwards.
    ///
    /// # Errors
    ///
    /// Any generation failure; the loop records it and tries again.
    async fn generate(&self, request: &str, feedback: &[RepairFeedback]) -> anyhow::Result<Graph>;
}

/// One problem reported back to the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairFeedback {
    /// Stable code.
    pub code: String,
    /// Human-readable message.
    pub message: String,
    /// Node the problem is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_id: Option<String>,
    /// Step the problem is attributed to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_index: Option<usize>,
    /// Offending parameter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameter_name: Option<String>,
    /// Error or warning.
    pub severity: Severity,
    /// Remediation guidance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
}

impl RepairFeedback {
    fn error(code: &str, message: String) -> Self {
        Self {
            code: code.to_string(),
            message,
            node_id: None,
            step_index: None,
            parameter_name: None,
            severity: Severity::Error,
            fix_hint: suggestion_for(code),
        }
    }

    /// Converts a structural compile error.
    #[must_use]
    pub fn from_compile_error(err: &CompileError) -> Self {
        let mut feedback = Self::error(err.code(), err.to_string());
        feedback.node_id = err.node_id().map(str::to_string);
        if let CompileError::MissingNodeParam { parameter, .. }
        | CompileError::InvalidNodeParam { parameter, .. } = err
        {
            feedback.parameter_name = Some(parameter.clone());
        }
        feedback
    }

    /// Converts a validation issue.
    #[must_use]
    pub fn from_issue(issue: &ValidationIssue) -> Self {
        let code = issue.code.as_str();
        Self {
            code: code.to_string(),
            message: issue.to_string(),
            node_id: None,
            step_index: Some(issue.step_index),
            parameter_name: issue.parameter_name.clone(),
            severity: issue.severity,
            fix_hint: suggestion_for(code),
        }
    }

    /// Converts a runtime error, for callers that retry after execution.
    #[must_use]
    pub fn from_execution_error(err: &ExecutionError) -> Self {
        let mut feedback = Self::error(err.code(), err.to_string());
        feedback.node_id = err.node_id().map(str::to_string);
        feedback.step_index = err.step_index();
        feedback
    }

    /// Converts a generator failure.
    #[must_use]
    pub fn from_generation_error(err: &anyhow::Error) -> Self {
        Self::error(codes::GENERATION_FAILED, format!("Graph generation failed: {err:#}"))
    }
}

fn default_max_attempts() -> usize {
    3
}

/// Repair loop settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepairConfig {
    /// Attempts before giving up; at least one.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: usize,
}

impl Default for RepairConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
        }
    }
}

impl RepairConfig {
    /// Sets the attempt budget.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts;
        self
    }
}

/// A graph that compiled and passed validation.
#[derive(Debug, Clone)]
pub struct RepairOutcome {
    /// The accepted graph.
    pub graph: Graph,
    /// Its compiled pipeline and variable map.
    pub compiled: CompiledGraph,
    /// Advisory issues left on the accepted pipeline.
    pub warnings: Vec<ValidationIssue>,
    /// Attempts used, including the successful one.
    pub attempts: usize,
}

/// Regenerate, compile and validate until a graph is accepted.
pub struct RepairLoop {
    generator: Arc<dyn GraphGenerator>,
    registry: Arc<CapabilityRegistry>,
    compiler: GraphCompiler,
    options: ValidatorOptions,
    config: RepairConfig,
}

impl std::fmt::Debug for RepairLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepairLoop")
            .field("compiler", &self.compiler)
            .field("options", &self.options)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl RepairLoop {
    /// Creates a loop with default compiler, validator options and config.
    #[must_use]
    pub fn new(generator: Arc<dyn GraphGenerator>, registry: Arc<CapabilityRegistry>) -> Self {
        Self {
            generator,
            registry,
            compiler: GraphCompiler::new(),
            options: ValidatorOptions::default(),
            config: RepairConfig::default(),
        }
    }

    /// Sets the compiler.
    #[must_use]
    pub fn with_compiler(mut self, compiler: GraphCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Sets the validator options.
    #[must_use]
    pub fn with_validator_options(mut self, options: ValidatorOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the loop configuration.
    #[must_use]
    pub fn with_config(mut self, config: RepairConfig) -> Self {
        self.config = config;
        self
    }

    /// Runs the loop from a fresh request.
    ///
    /// # Errors
    ///
    /// Returns [`NodeflowError::RepairExhausted`] with the last attempt's
    /// feedback when no attempt succeeds.
    pub async fn run(&self, request: &str) -> Result<RepairOutcome, NodeflowError> {
        self.run_with_feedback(request, Vec::new()).await
    }

    /// Runs the loop with feedback already known, such as a runtime failure
    /// of a previously accepted graph.
    ///
    /// # Errors
    ///
    /// See [`RepairLoop::run`].
    pub async fn run_with_feedback(
        &self,
        request: &str,
        mut feedback: Vec<RepairFeedback>,
    ) -> Result<RepairOutcome, NodeflowError> {
        let max_attempts = self.config.max_attempts.max(1);
        let validator = StepValidator::new(&self.registry, self.options.clone());

        for attempt in 1..=max_attempts {
            let timer = SpanTimer::start("repair.attempt");
            info!(attempt, max_attempts, feedback = feedback.len(), "Repair attempt started");

            let graph = match self.generator.generate(request, &feedback).await {
                Ok(graph) => graph,
                Err(err) => {
                    warn!(attempt, error = %err, "Graph generation failed");
                    feedback = vec![RepairFeedback::from_generation_error(&err)];
                    continue;
                }
            };

            let compiled = match self.compiler.compile_graph(&graph) {
                Ok(compiled) => compiled,
                Err(err) => {
                    warn!(attempt, code = err.code(), error = %err, "Generated graph failed to compile");
                    feedback = vec![RepairFeedback::from_compile_error(&err)];
                    continue;
                }
            };

            let issues = validator.validate(&compiled.pipeline);
            if has_blocking_issues(&issues) {
                warn!(attempt, issues = issues.len(), "Generated graph failed validation");
                feedback = issues
                    .iter()
                    .filter(|i| i.is_error())
                    .map(RepairFeedback::from_issue)
                    .collect();
                continue;
            }

            let duration_ms = timer.finish();
            info!(attempt, steps = compiled.pipeline.len(), duration_ms, "Generated graph accepted");
            return Ok(RepairOutcome {
                graph,
                compiled,
                warnings: issues,
                attempts: attempt,
            });
        }

        Err(NodeflowError::RepairExhausted {
            attempts: max_attempts,
            feedback,
        })
    }
}
