//! Error types for nodeflow.
//!
//! Errors fall into three families matching the three phases of a run:
//! structural errors raised by the compiler, runtime errors raised by the
//! executor, and configuration errors. Every error exposes a stable `code()`
//! so automated repair loops can branch on codes instead of parsing messages.

use crate::core::StepKind;
use crate::repair::RepairFeedback;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// Stable error codes.
///
/// These strings are part of the public contract and must not change
/// between versions.
pub mod codes {
    /// The graph contains a dependency cycle.
    pub const CYCLE_DETECTED: &str = "CYCLE_DETECTED";
    /// A node is missing a required inbound connection.
    pub const MISSING_CONNECTION: &str = "MISSING_CONNECTION";
    /// A node is missing a required parameter.
    pub const MISSING_NODE_PARAM: &str = "MISSING_NODE_PARAM";
    /// A node parameter is present but malformed.
    pub const INVALID_NODE_PARAM: &str = "INVALID_NODE_PARAM";
    /// Two nodes share an id.
    pub const DUPLICATE_NODE_ID: &str = "DUPLICATE_NODE_ID";
    /// An edge references a node that does not exist.
    pub const UNKNOWN_NODE_REFERENCE: &str = "UNKNOWN_NODE_REFERENCE";
    /// A single-connection port received more than one edge.
    pub const DUPLICATE_PORT: &str = "DUPLICATE_PORT";
    /// Two steps would produce the same variable.
    pub const VARIABLE_CONFLICT: &str = "VARIABLE_CONFLICT";

    /// A step consumed a variable that was never produced.
    pub const MISSING_VARIABLE: &str = "MISSING_VARIABLE";
    /// One or more reference/overlay images were never produced.
    pub const MISSING_IMAGE_INPUTS: &str = "MISSING_IMAGE_INPUTS";
    /// A variable holds a value of the wrong shape.
    pub const UNEXPECTED_VALUE: &str = "UNEXPECTED_VALUE";
    /// A structured output lacks a requested field.
    pub const MISSING_OUTPUT_FIELD: &str = "MISSING_OUTPUT_FIELD";
    /// Array-mode fan-out received an array of the wrong length.
    pub const FAN_OUT_LENGTH_MISMATCH: &str = "FAN_OUT_LENGTH_MISMATCH";
    /// A collect step in `all` mode found unproduced inputs.
    pub const COLLECT_INCOMPLETE: &str = "COLLECT_INCOMPLETE";
    /// A router could not select from its candidates.
    pub const ROUTER_SELECTION_FAILED: &str = "ROUTER_SELECTION_FAILED";
    /// The step runner reported a failure.
    pub const STEP_FAILED: &str = "STEP_FAILED";
    /// The step runner returned nothing for a step that must produce a value.
    pub const EMPTY_STEP_OUTPUT: &str = "EMPTY_STEP_OUTPUT";
    /// The run was cancelled between steps.
    pub const EXECUTION_CANCELLED: &str = "EXECUTION_CANCELLED";

    /// Configuration could not be read, parsed or accepted.
    pub const INVALID_CONFIG: &str = "INVALID_CONFIG";
    /// A graph document could not be deserialized.
    pub const INVALID_GRAPH_DOCUMENT: &str = "INVALID_GRAPH_DOCUMENT";
    /// The graph generator itself failed.
    pub const GENERATION_FAILED: &str = "GENERATION_FAILED";
    /// The repair loop ran out of attempts.
    pub const REPAIR_EXHAUSTED: &str = "REPAIR_EXHAUSTED";
}

/// Structured diagnostics for a surfaced error.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct ErrorInfo {
    /// Stable error code.
    pub code: String,
    /// Human-readable description.
    pub summary: String,
    /// Optional remediation guidance.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fix_hint: Option<String>,
    /// Additional context such as the node id or step index.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub context: BTreeMap<String, String>,
}

impl ErrorInfo {
    /// Creates a new error info.
    #[must_use]
    pub fn new(code: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            summary: summary.into(),
            fix_hint: None,
            context: BTreeMap::new(),
        }
    }

    /// Sets the fix hint.
    #[must_use]
    pub fn with_fix_hint(mut self, hint: impl Into<String>) -> Self {
        self.fix_hint = Some(hint.into());
        self
    }

    /// Adds a single context entry.
    #[must_use]
    pub fn with_context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }
}

/// Structural error raised while compiling a graph.
///
/// Compilation is fail-fast: the first defect found halts it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CompileError {
    /// The graph contains a cycle.
    #[error("Cycle detected among nodes: {}", nodes.join(", "))]
    CycleDetected {
        /// Nodes that could not be ordered.
        nodes: Vec<String>,
    },

    /// A required connection is absent.
    #[error("{message} (node '{node_id}')")]
    MissingConnection {
        /// The node lacking the connection.
        node_id: String,
        /// What is missing.
        message: String,
    },

    /// A required node parameter is absent.
    #[error("Node '{node_id}' is missing required parameter '{parameter}'")]
    MissingNodeParam {
        /// The node.
        node_id: String,
        /// The parameter name.
        parameter: String,
    },

    /// A node parameter has an unusable value.
    #[error("Node '{node_id}' has invalid parameter '{parameter}': {reason}")]
    InvalidNodeParam {
        /// The node.
        node_id: String,
        /// The parameter name.
        parameter: String,
        /// Why the value was rejected.
        reason: String,
    },

    /// Two nodes share an id.
    #[error("Duplicate node id '{node_id}'")]
    DuplicateNodeId {
        /// The repeated id.
        node_id: String,
    },

    /// An edge names a node that is not in the graph.
    #[error("Edge {edge_index} references unknown node '{node_id}'")]
    UnknownNodeReference {
        /// The missing node id.
        node_id: String,
        /// Position of the offending edge.
        edge_index: usize,
    },

    /// A port that takes a single connection received several.
    #[error("Node '{node_id}' has more than one connection on port '{port}'")]
    DuplicatePort {
        /// The node.
        node_id: String,
        /// The port identifier.
        port: String,
    },

    /// A variable name would be produced twice.
    #[error("Variable '{name}' produced by node '{node_id}' is already produced by another node")]
    VariableConflict {
        /// The conflicting variable name.
        name: String,
        /// The second producer.
        node_id: String,
    },
}

impl CompileError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::CycleDetected { .. } => codes::CYCLE_DETECTED,
            Self::MissingConnection { .. } => codes::MISSING_CONNECTION,
            Self::MissingNodeParam { .. } => codes::MISSING_NODE_PARAM,
            Self::InvalidNodeParam { .. } => codes::INVALID_NODE_PARAM,
            Self::DuplicateNodeId { .. } => codes::DUPLICATE_NODE_ID,
            Self::UnknownNodeReference { .. } => codes::UNKNOWN_NODE_REFERENCE,
            Self::DuplicatePort { .. } => codes::DUPLICATE_PORT,
            Self::VariableConflict { .. } => codes::VARIABLE_CONFLICT,
        }
    }

    /// Returns the node the error is attributed to, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::CycleDetected { nodes } => nodes.first().map(String::as_str),
            Self::MissingConnection { node_id, .. }
            | Self::MissingNodeParam { node_id, .. }
            | Self::InvalidNodeParam { node_id, .. }
            | Self::DuplicateNodeId { node_id }
            | Self::UnknownNodeReference { node_id, .. }
            | Self::DuplicatePort { node_id, .. }
            | Self::VariableConflict { node_id, .. } => Some(node_id),
        }
    }

    /// Builds structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        let mut info = ErrorInfo::new(self.code(), self.to_string());
        if let Some(hint) = crate::repair::suggestion_for(self.code()) {
            info = info.with_fix_hint(hint);
        }
        if let Some(node_id) = self.node_id() {
            info = info.with_context_entry("nodeId", node_id);
        }
        info
    }
}

/// Which auxiliary image port a missing image belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImagePort {
    /// Multi-edge reference images.
    References,
    /// Indexed overlay images.
    Overlays,
}

impl fmt::Display for ImagePort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::References => write!(f, "reference"),
            Self::Overlays => write!(f, "overlay"),
        }
    }
}

/// A reference or overlay image that was never produced.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MissingImage {
    /// The variable name.
    pub name: String,
    /// The declared index on the port.
    pub index: usize,
}

impl fmt::Display for MissingImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (index {})", self.name, self.index)
    }
}

fn join_missing(missing: &[MissingImage]) -> String {
    missing
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Runtime error raised while executing a pipeline.
///
/// Any runtime error aborts all remaining steps.
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// A consumed variable was never produced.
    #[error("Step {step_index} ({kind} '{node_id}'): variable '{name}' was never produced")]
    MissingVariable {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
        /// The missing variable.
        name: String,
    },

    /// Reference or overlay images were never produced.
    #[error("Step {step_index} ({kind} '{node_id}'): missing {port} images: {}", join_missing(missing))]
    MissingImages {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
        /// The port the images were declared on.
        port: ImagePort,
        /// Every missing image with its declared index.
        missing: Vec<MissingImage>,
    },

    /// A variable holds a value of the wrong shape.
    #[error("Step {step_index} ({kind} '{node_id}'): variable '{name}' holds {found}, expected {expected}")]
    UnexpectedValue {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
        /// The variable.
        name: String,
        /// What was expected.
        expected: &'static str,
        /// What was found.
        found: &'static str,
    },

    /// A structured output does not contain a requested field.
    #[error("Step {step_index} ({kind} '{node_id}'): output of '{name}' has no field '{field}'")]
    MissingField {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
        /// The variable read.
        name: String,
        /// The field that was requested.
        field: String,
    },

    /// Array-mode fan-out length does not match the declared slot count.
    #[error("Step {step_index} (fan-out '{node_id}'): array '{property}' has {actual} elements but {expected} slots are declared")]
    FanOutLengthMismatch {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// The array property read.
        property: String,
        /// Declared slot count.
        expected: usize,
        /// Actual array length.
        actual: usize,
    },

    /// A collect step in `all` mode found inputs without a value.
    #[error("Step {step_index} (collect '{node_id}'): inputs were never produced: {}", missing.join(", "))]
    CollectIncomplete {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Declared inputs that have no value.
        missing: Vec<String>,
    },

    /// A router could not select from its candidates.
    #[error("Step {step_index} (router '{node_id}'): {reason}")]
    RouterSelection {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Why selection failed.
        reason: String,
    },

    /// The injected step runner failed.
    #[error("Step {step_index} ({kind} '{node_id}') failed in provider '{provider}': {source}")]
    StepFailed {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
        /// Provider or operation name.
        provider: String,
        /// The underlying failure.
        source: anyhow::Error,
    },

    /// The runner returned nothing for a step that must produce a value.
    #[error("Step {step_index} ({kind} '{node_id}') returned no output")]
    EmptyOutput {
        /// Index of the failing step.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Kind of the failing step.
        kind: StepKind,
    },

    /// A variable was bound twice.
    #[error("Variable '{name}' is already bound")]
    VariableConflict {
        /// The variable name.
        name: String,
    },

    /// The run was cancelled between steps.
    #[error("Execution cancelled after {completed_steps} step(s): {reason}")]
    Cancelled {
        /// Cancellation reason.
        reason: String,
        /// Steps that finished before cancellation was observed.
        completed_steps: usize,
    },
}

impl ExecutionError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingVariable { .. } => codes::MISSING_VARIABLE,
            Self::MissingImages { .. } => codes::MISSING_IMAGE_INPUTS,
            Self::UnexpectedValue { .. } => codes::UNEXPECTED_VALUE,
            Self::MissingField { .. } => codes::MISSING_OUTPUT_FIELD,
            Self::FanOutLengthMismatch { .. } => codes::FAN_OUT_LENGTH_MISMATCH,
            Self::CollectIncomplete { .. } => codes::COLLECT_INCOMPLETE,
            Self::RouterSelection { .. } => codes::ROUTER_SELECTION_FAILED,
            Self::StepFailed { .. } => codes::STEP_FAILED,
            Self::EmptyOutput { .. } => codes::EMPTY_STEP_OUTPUT,
            Self::VariableConflict { .. } => codes::VARIABLE_CONFLICT,
            Self::Cancelled { .. } => codes::EXECUTION_CANCELLED,
        }
    }

    /// Returns the index of the failing step, if the error belongs to one.
    #[must_use]
    pub fn step_index(&self) -> Option<usize> {
        match self {
            Self::MissingVariable { step_index, .. }
            | Self::MissingImages { step_index, .. }
            | Self::UnexpectedValue { step_index, .. }
            | Self::MissingField { step_index, .. }
            | Self::FanOutLengthMismatch { step_index, .. }
            | Self::CollectIncomplete { step_index, .. }
            | Self::RouterSelection { step_index, .. }
            | Self::StepFailed { step_index, .. }
            | Self::EmptyOutput { step_index, .. } => Some(*step_index),
            Self::VariableConflict { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Returns the node the failing step was compiled from, if any.
    #[must_use]
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::MissingVariable { node_id, .. }
            | Self::MissingImages { node_id, .. }
            | Self::UnexpectedValue { node_id, .. }
            | Self::MissingField { node_id, .. }
            | Self::FanOutLengthMismatch { node_id, .. }
            | Self::CollectIncomplete { node_id, .. }
            | Self::RouterSelection { node_id, .. }
            | Self::StepFailed { node_id, .. }
            | Self::EmptyOutput { node_id, .. } => Some(node_id),
            Self::VariableConflict { .. } | Self::Cancelled { .. } => None,
        }
    }

    /// Builds structured diagnostics for this error.
    #[must_use]
    pub fn error_info(&self) -> ErrorInfo {
        let mut info = ErrorInfo::new(self.code(), self.to_string());
        if let Some(hint) = crate::repair::suggestion_for(self.code()) {
            info = info.with_fix_hint(hint);
        }
        if let Some(node_id) = self.node_id() {
            info = info.with_context_entry("nodeId", node_id);
        }
        if let Some(index) = self.step_index() {
            info = info.with_context_entry("stepIndex", index.to_string());
        }
        info
    }
}

/// Error raised while loading or checking configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config file '{path}': {source}")]
    Io {
        /// The file path.
        path: String,
        /// The underlying IO error.
        source: std::io::Error,
    },

    /// The configuration document could not be parsed.
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A configuration value is out of range.
    #[error("Invalid config value for '{field}': {reason}")]
    Invalid {
        /// The offending field.
        field: String,
        /// Why it was rejected.
        reason: String,
    },

    /// The global tracing subscriber could not be installed.
    #[error("Failed to initialize logging: {0}")]
    Logging(String),
}

impl ConfigError {
    /// Creates an invalid-value error.
    #[must_use]
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// The umbrella error type for nodeflow operations.
#[derive(Debug, Error)]
pub enum NodeflowError {
    /// Structural compile error.
    #[error("{0}")]
    Compile(#[from] CompileError),

    /// Runtime execution error.
    #[error("{0}")]
    Execution(#[from] ExecutionError),

    /// Configuration error.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// A graph document could not be deserialized.
    #[error("Invalid graph document: {0}")]
    GraphDocument(#[from] serde_json::Error),

    /// The repair loop used every attempt without producing a valid graph.
    #[error("No valid graph after {attempts} attempt(s); last feedback: {}", summarize_feedback(feedback))]
    RepairExhausted {
        /// Attempts made.
        attempts: usize,
        /// Feedback collected on the final attempt.
        feedback: Vec<RepairFeedback>,
    },
}

fn summarize_feedback(feedback: &[RepairFeedback]) -> String {
    if feedback.is_empty() {
        return "none".to_string();
    }
    feedback
        .iter()
        .map(|f| format!("[{}] {}", f.code, f.message))
        .collect::<Vec<_>>()
        .join("; ")
}

impl NodeflowError {
    /// Returns the stable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Compile(err) => err.code(),
            Self::Execution(err) => err.code(),
            Self::Config(_) => codes::INVALID_CONFIG,
            Self::GraphDocument(_) => codes::INVALID_GRAPH_DOCUMENT,
            Self::RepairExhausted { .. } => codes::REPAIR_EXHAUSTED,
        }
    }
}
