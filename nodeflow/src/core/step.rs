//! Compiled step variants.
//!
//! Each node kind except `input` lowers to exactly one [`Step`] case, and each
//! case carries only the fields meaningful to it.

use super::markers::DeferredRefs;
use super::Params;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind of a compiled step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepKind {
    /// Image generation.
    Generate,
    /// Image transform (filter, composite, upscale, ...).
    Transform,
    /// Persist an upstream value.
    Save,
    /// Image understanding producing text or structured output.
    Vision,
    /// Text generation.
    Text,
    /// Split one value into several slots.
    FanOut,
    /// Join several variables into one ordered list.
    Collect,
    /// Select candidates by a runtime-computed selection.
    Router,
}

impl StepKind {
    /// Returns true for kinds whose parameters are checked against a
    /// provider schema.
    #[must_use]
    pub fn is_provider_backed(&self) -> bool {
        matches!(
            self,
            Self::Generate | Self::Transform | Self::Vision | Self::Text
        )
    }

    /// Returns true for flow-control kinds executed in-process.
    #[must_use]
    pub fn is_flow_control(&self) -> bool {
        matches!(self, Self::FanOut | Self::Collect | Self::Router)
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Generate => write!(f, "generate"),
            Self::Transform => write!(f, "transform"),
            Self::Save => write!(f, "save"),
            Self::Vision => write!(f, "vision"),
            Self::Text => write!(f, "text"),
            Self::FanOut => write!(f, "fan-out"),
            Self::Collect => write!(f, "collect"),
            Self::Router => write!(f, "router"),
        }
    }
}

/// Generate an image with a named generator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateStep {
    /// Generator provider name.
    pub generator: String,
    /// Provider parameters.
    pub params: Params,
    /// Late-bound prompt and image references.
    #[serde(default, skip_serializing_if = "DeferredRefs::is_empty")]
    pub deferred: DeferredRefs,
    /// Output variable.
    pub out: String,
}

/// Apply a transform operation to one primary image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformStep {
    /// Operation name.
    pub op: String,
    /// Primary image variable.
    #[serde(rename = "in")]
    pub input: String,
    /// Operation parameters.
    pub params: Params,
    /// Late-bound prompt, reference and overlay images.
    #[serde(default, skip_serializing_if = "DeferredRefs::is_empty")]
    pub deferred: DeferredRefs,
    /// Output variable.
    pub out: String,
}

/// Persist an upstream value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveStep {
    /// The save node id; save produces no variable to name it by.
    pub node_id: String,
    /// Variable to persist.
    #[serde(rename = "in")]
    pub input: String,
    /// Destination identifier.
    pub destination: String,
    /// Storage provider name.
    pub provider: String,
    /// Remaining save parameters.
    #[serde(default)]
    pub params: Params,
}

/// Run an image-understanding provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisionStep {
    /// Provider name.
    pub provider: String,
    /// Image variable to inspect.
    #[serde(rename = "in")]
    pub input: String,
    /// Optional auxiliary variable wired to the `context` port.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    /// Provider parameters.
    pub params: Params,
    /// Late-bound prompt and image references.
    #[serde(default, skip_serializing_if = "DeferredRefs::is_empty")]
    pub deferred: DeferredRefs,
    /// Output variable.
    pub out: String,
}

/// Run a text provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextStep {
    /// Provider name.
    pub provider: String,
    /// Optional context variable.
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub input: Option<String>,
    /// Provider parameters.
    pub params: Params,
    /// Late-bound prompt and image references.
    #[serde(default, skip_serializing_if = "DeferredRefs::is_empty")]
    pub deferred: DeferredRefs,
    /// Output variable.
    pub out: String,
}

/// How a fan-out fills its slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FanOutMode {
    /// Broadcast the input to every slot.
    #[default]
    Count,
    /// Assign element `i` of an array property to slot `i`.
    Array,
}

/// Split one input into a fixed number of slots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FanOutStep {
    /// The fan-out node id, also bound to the list of all slot values.
    pub node_id: String,
    /// Input variable.
    #[serde(rename = "in")]
    pub input: String,
    /// Slot filling mode.
    pub mode: FanOutMode,
    /// Declared slot count.
    pub count: usize,
    /// Array property read in array mode.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub array_property: Option<String>,
    /// Slot variable names, `count` of them.
    pub out: Vec<String>,
}

/// Whether a collect step tolerates unproduced inputs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WaitMode {
    /// Every declared input must have a value.
    #[default]
    All,
    /// Only produced inputs are gathered.
    Available,
}

/// Gather several variables into one ordered list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectStep {
    /// Input variables in declared slot order.
    #[serde(rename = "in")]
    pub inputs: Vec<String>,
    /// Missing-input policy.
    pub wait_mode: WaitMode,
    /// Output variable.
    pub out: String,
}

/// How a router interprets its selection value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SelectionType {
    /// Numeric index into the candidates.
    #[default]
    Index,
    /// Match candidates by value.
    Value,
}

/// Select from a candidate list using a runtime selection value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterStep {
    /// Candidate list variable.
    #[serde(rename = "in")]
    pub input: String,
    /// Selection variable.
    pub selection_in: String,
    /// Selection interpretation.
    pub selection_type: SelectionType,
    /// Field of the selection's structured output to read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_property: Option<String>,
    /// Number of candidates to select.
    pub output_count: usize,
    /// Secondary field of the selection to expose downstream.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_property: Option<String>,
    /// Output variable.
    pub out: String,
    /// Variable bound to the extracted context field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_out: Option<String>,
}

/// One executable unit of a compiled pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Step {
    /// See [`GenerateStep`].
    Generate(GenerateStep),
    /// See [`TransformStep`].
    Transform(TransformStep),
    /// See [`SaveStep`].
    Save(SaveStep),
    /// See [`VisionStep`].
    Vision(VisionStep),
    /// See [`TextStep`].
    Text(TextStep),
    /// See [`FanOutStep`].
    FanOut(FanOutStep),
    /// See [`CollectStep`].
    Collect(CollectStep),
    /// See [`RouterStep`].
    Router(RouterStep),
}

impl Step {
    /// Returns the step kind.
    #[must_use]
    pub fn kind(&self) -> StepKind {
        match self {
            Self::Generate(_) => StepKind::Generate,
            Self::Transform(_) => StepKind::Transform,
            Self::Save(_) => StepKind::Save,
            Self::Vision(_) => StepKind::Vision,
            Self::Text(_) => StepKind::Text,
            Self::FanOut(_) => StepKind::FanOut,
            Self::Collect(_) => StepKind::Collect,
            Self::Router(_) => StepKind::Router,
        }
    }

    /// Returns the id of the node this step was compiled from.
    #[must_use]
    pub fn node_id(&self) -> &str {
        match self {
            Self::Generate(s) => &s.out,
            Self::Transform(s) => &s.out,
            Self::Save(s) => &s.node_id,
            Self::Vision(s) => &s.out,
            Self::Text(s) => &s.out,
            Self::FanOut(s) => &s.node_id,
            Self::Collect(s) => &s.out,
            Self::Router(s) => &s.out,
        }
    }

    /// Returns the provider or operation name for provider-invoking steps.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        match self {
            Self::Generate(s) => Some(&s.generator),
            Self::Transform(s) => Some(&s.op),
            Self::Save(s) => Some(&s.provider),
            Self::Vision(s) => Some(&s.provider),
            Self::Text(s) => Some(&s.provider),
            Self::FanOut(_) | Self::Collect(_) | Self::Router(_) => None,
        }
    }

    /// Returns the provider parameters, if the step has any.
    #[must_use]
    pub fn params(&self) -> Option<&Params> {
        match self {
            Self::Generate(s) => Some(&s.params),
            Self::Transform(s) => Some(&s.params),
            Self::Save(s) => Some(&s.params),
            Self::Vision(s) => Some(&s.params),
            Self::Text(s) => Some(&s.params),
            Self::FanOut(_) | Self::Collect(_) | Self::Router(_) => None,
        }
    }

    /// Returns the deferred references, if the step kind carries them.
    #[must_use]
    pub fn deferred(&self) -> Option<&DeferredRefs> {
        match self {
            Self::Generate(s) => Some(&s.deferred),
            Self::Transform(s) => Some(&s.deferred),
            Self::Vision(s) => Some(&s.deferred),
            Self::Text(s) => Some(&s.deferred),
            Self::Save(_) | Self::FanOut(_) | Self::Collect(_) | Self::Router(_) => None,
        }
    }

    /// Returns the primary input variable, if any.
    #[must_use]
    pub fn primary_input(&self) -> Option<&str> {
        match self {
            Self::Transform(s) => Some(&s.input),
            Self::Save(s) => Some(&s.input),
            Self::Vision(s) => Some(&s.input),
            Self::Text(s) => s.input.as_deref(),
            Self::FanOut(s) => Some(&s.input),
            Self::Router(s) => Some(&s.input),
            Self::Generate(_) | Self::Collect(_) => None,
        }
    }

    /// Returns every variable this step reads.
    #[must_use]
    pub fn inputs(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.primary_input().into_iter().collect();
        match self {
            Self::Collect(s) => names.extend(s.inputs.iter().map(String::as_str)),
            Self::Router(s) => names.push(&s.selection_in),
            Self::Vision(s) => names.extend(s.context.as_deref()),
            _ => {}
        }
        if let Some(deferred) = self.deferred() {
            names.extend(deferred.variables());
        }
        names
    }

    /// Returns every variable this step binds.
    #[must_use]
    pub fn outputs(&self) -> Vec<&str> {
        match self {
            Self::Generate(s) => vec![&s.out],
            Self::Transform(s) => vec![&s.out],
            Self::Vision(s) => vec![&s.out],
            Self::Text(s) => vec![&s.out],
            Self::Collect(s) => vec![&s.out],
            Self::Save(_) => Vec::new(),
            Self::FanOut(s) => {
                let mut names = vec![s.node_id.as_str()];
                names.extend(s.out.iter().map(String::as_str));
                names
            }
            Self::Router(s) => {
                let mut names = vec![s.out.as_str()];
                names.extend(s.context_out.as_deref());
                names
            }
        }
    }
}
