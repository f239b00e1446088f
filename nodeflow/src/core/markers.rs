//! Deferred reference markers.
//!
//! A marker records that part of a step's input is only known once an
//! upstream step has run. Markers are attached at compile time and resolved
//! once, immediately before the step runner is invoked; the runner never
//! sees them.

use serde::{Deserialize, Serialize};

/// Parameter names starting with this prefix are internal bookkeeping.
///
/// The validator ignores them and the executor strips them before a
/// provider sees the parameters.
pub const INTERNAL_PARAM_PREFIX: &str = "__";

/// Prompt read from another step's output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptRef {
    /// Variable holding the prompt text.
    pub variable: String,
    /// Structured-output field to extract instead of the full text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl PromptRef {
    /// Creates a prompt reference.
    #[must_use]
    pub fn new(variable: impl Into<String>, field: Option<String>) -> Self {
        Self {
            variable: variable.into(),
            field,
        }
    }
}

/// An image read from another step's output, at a declared index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRef {
    /// Variable holding the image.
    pub variable: String,
    /// Declared index. For overlays this is the port index verbatim; for
    /// references it is the edge declaration position.
    pub index: usize,
}

impl ImageRef {
    /// Creates an image reference.
    #[must_use]
    pub fn new(variable: impl Into<String>, index: usize) -> Self {
        Self {
            variable: variable.into(),
            index,
        }
    }
}

/// All deferred references attached to one step.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeferredRefs {
    /// Prompt-from-variable marker.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<PromptRef>,
    /// Reference images in edge declaration order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<ImageRef>,
    /// Overlay images sorted by index; sparse indices are kept.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overlays: Vec<ImageRef>,
}

impl DeferredRefs {
    /// Returns true when no marker is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.references.is_empty() && self.overlays.is_empty()
    }

    /// Returns every variable named by a marker.
    #[must_use]
    pub fn variables(&self) -> Vec<&str> {
        self.prompt
            .iter()
            .map(|p| p.variable.as_str())
            .chain(self.references.iter().map(|r| r.variable.as_str()))
            .chain(self.overlays.iter().map(|o| o.variable.as_str()))
            .collect()
    }

    /// Returns the overlay indices in stored order.
    #[must_use]
    pub fn overlay_indices(&self) -> Vec<usize> {
        self.overlays.iter().map(|o| o.index).collect()
    }
}
