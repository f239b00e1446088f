//! Suggestion registry mapping stable codes to fix hints.
//!
//! Every code produced by the compiler, validator and executor has a
//! preloaded suggestion. Hosts may register more, or override them.

use crate::errors::codes;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::LazyLock;

/// Remediation guidance for one code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepairSuggestion {
    /// The code this suggestion applies to.
    pub code: String,
    /// Short title.
    pub title: String,
    /// Steps to fix the problem.
    pub fix_steps: Vec<String>,
}

impl RepairSuggestion {
    /// Creates a suggestion.
    #[must_use]
    pub fn new<I, S>(code: impl Into<String>, title: impl Into<String>, fix_steps: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            code: code.into(),
            title: title.into(),
            fix_steps: fix_steps.into_iter().map(Into::into).collect(),
        }
    }

    /// Returns the fix steps as one hint line.
    #[must_use]
    pub fn hint(&self) -> String {
        self.fix_steps.join("; ")
    }
}

static SUGGESTIONS: LazyLock<RwLock<HashMap<String, RepairSuggestion>>> = LazyLock::new(|| {
    let defaults = [
        RepairSuggestion::new(
            codes::CYCLE_DETECTED,
            "Dependency Cycle Detected",
            [
                "Review the reported nodes",
                "Remove at least one edge so data flows in one direction",
            ],
        ),
        RepairSuggestion::new(
            codes::MISSING_CONNECTION,
            "Missing Connection",
            ["Connect an upstream node to the required input port of the reported node"],
        ),
        RepairSuggestion::new(
            codes::MISSING_NODE_PARAM,
            "Missing Node Parameter",
            ["Set the reported parameter on the node"],
        ),
        RepairSuggestion::new(
            codes::INVALID_NODE_PARAM,
            "Invalid Node Parameter",
            [
                "Use a supported value for the reported parameter",
                "Fan-out count must be a positive integer and mode one of count or array",
            ],
        ),
        RepairSuggestion::new(
            codes::DUPLICATE_NODE_ID,
            "Duplicate Node Id",
            ["Give every node a unique id"],
        ),
        RepairSuggestion::new(
            codes::UNKNOWN_NODE_REFERENCE,
            "Unknown Node Reference",
            ["Point the edge at an existing node or remove it"],
        ),
        RepairSuggestion::new(
            codes::DUPLICATE_PORT,
            "Duplicate Port Connection",
            ["Keep a single edge on the reported port"],
        ),
        RepairSuggestion::new(
            codes::VARIABLE_CONFLICT,
            "Variable Conflict",
            ["Rename the node whose id collides with a generated slot or context name"],
        ),
        RepairSuggestion::new(
            "MISSING_REQUIRED_PARAM",
            "Missing Required Parameter",
            ["Add the parameter required by the provider schema"],
        ),
        RepairSuggestion::new(
            "UNKNOWN_PARAM",
            "Unknown Parameter",
            ["Remove the parameter or check its spelling against the provider schema"],
        ),
        RepairSuggestion::new(
            "INVALID_PARAM_TYPE",
            "Invalid Parameter Value",
            ["Use a value of the declared type, within the allowed range or values"],
        ),
        RepairSuggestion::new(
            "UNKNOWN_PROVIDER",
            "Unknown Provider",
            ["Use a provider with a registered schema"],
        ),
        RepairSuggestion::new(
            codes::MISSING_VARIABLE,
            "Missing Variable",
            ["Make sure the upstream node runs and produces a value before this step"],
        ),
        RepairSuggestion::new(
            codes::MISSING_IMAGE_INPUTS,
            "Missing Image Inputs",
            ["Connect image-producing nodes to every listed reference or overlay port"],
        ),
        RepairSuggestion::new(
            codes::UNEXPECTED_VALUE,
            "Unexpected Value",
            ["Connect a node whose output matches what the port expects"],
        ),
        RepairSuggestion::new(
            codes::MISSING_OUTPUT_FIELD,
            "Missing Output Field",
            ["Ask the upstream node for structured output containing the field, or change the field name"],
        ),
        RepairSuggestion::new(
            codes::FAN_OUT_LENGTH_MISMATCH,
            "Fan-out Length Mismatch",
            ["Match the fan-out count to the number of array elements the upstream node returns"],
        ),
        RepairSuggestion::new(
            codes::COLLECT_INCOMPLETE,
            "Collect Incomplete",
            ["Fix the failing branch, or set waitMode to available"],
        ),
        RepairSuggestion::new(
            codes::ROUTER_SELECTION_FAILED,
            "Router Selection Failed",
            ["Make the selection reference an existing candidate index or value"],
        ),
        RepairSuggestion::new(
            codes::STEP_FAILED,
            "Provider Failure",
            ["Check the provider parameters and retry"],
        ),
        RepairSuggestion::new(
            codes::EMPTY_STEP_OUTPUT,
            "Empty Step Output",
            ["Check that the provider returns a result for this step"],
        ),
        RepairSuggestion::new(
            codes::EXECUTION_CANCELLED,
            "Execution Cancelled",
            ["Run the pipeline again"],
        ),
        RepairSuggestion::new(
            codes::INVALID_GRAPH_DOCUMENT,
            "Invalid Graph Document",
            ["Emit a JSON object with nodes and edges arrays"],
        ),
        RepairSuggestion::new(
            codes::GENERATION_FAILED,
            "Generation Failed",
            ["Retry generation"],
        ),
    ];

    RwLock::new(
        defaults
            .into_iter()
            .map(|s| (s.code.clone(), s))
            .collect(),
    )
});

/// Registers a suggestion, replacing any existing one for the same code.
pub fn register_suggestion(suggestion: RepairSuggestion) {
    SUGGESTIONS.write().insert(suggestion.code.clone(), suggestion);
}

/// Returns the suggestion registered for a code.
#[must_use]
pub fn get_suggestion(code: &str) -> Option<RepairSuggestion> {
    SUGGESTIONS.read().get(code).cloned()
}

/// Returns the fix hint for a code.
#[must_use]
pub fn suggestion_for(code: &str) -> Option<String> {
    SUGGESTIONS.read().get(code).map(RepairSuggestion::hint)
}
