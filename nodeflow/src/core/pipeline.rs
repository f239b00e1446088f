//! Compiled pipelines.

use super::Step;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Mapping from node id to the variable name the node produces.
pub type NodeVarMap = BTreeMap<String, String>;

/// A named, dependency-ordered sequence of steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
    /// The pipeline name.
    pub name: String,
    /// Steps in topological order.
    pub steps: Vec<Step>,
}

impl Pipeline {
    /// Creates a pipeline.
    #[must_use]
    pub fn new(name: impl Into<String>, steps: Vec<Step>) -> Self {
        Self {
            name: name.into(),
            steps,
        }
    }

    /// Returns the number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true if the pipeline has no steps.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Iterates over the steps in execution order.
    pub fn iter(&self) -> std::slice::Iter<'_, Step> {
        self.steps.iter()
    }

    /// Returns the index of the step compiled from `node_id`.
    #[must_use]
    pub fn position_of(&self, node_id: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.node_id() == node_id)
    }

    /// Returns the step kinds in execution order.
    #[must_use]
    pub fn kinds(&self) -> Vec<super::StepKind> {
        self.steps.iter().map(Step::kind).collect()
    }
}

impl<'a> IntoIterator for &'a Pipeline {
    type Item = &'a Step;
    type IntoIter = std::slice::Iter<'a, Step>;

    fn into_iter(self) -> Self::IntoIter {
        self.steps.iter()
    }
}

/// The result of compiling a graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledGraph {
    /// The ordered pipeline.
    pub pipeline: Pipeline,
    /// Node id to produced variable name, including `input` nodes.
    pub node_vars: NodeVarMap,
}

impl CompiledGraph {
    /// Splits into the pipeline and the node/variable map.
    #[must_use]
    pub fn into_parts(self) -> (Pipeline, NodeVarMap) {
        (self.pipeline, self.node_vars)
    }
}
