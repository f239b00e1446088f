//! The step-runner seam where providers live.

use crate::core::{ImageArtifact, Params, StepKind, VariableValue};
use async_trait::async_trait;

/// An overlay image resolved for a transform, with its declared index.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedOverlay {
    /// Declared overlay index, never renumbered.
    pub index: usize,
    /// The overlay image.
    pub image: ImageArtifact,
    /// Entry at the same index of the node's `overlays` parameter list, if
    /// one was given (position, opacity, ...).
    pub settings: Option<serde_json::Value>,
}

/// Everything a provider needs to run one step.
///
/// Deferred markers and internal parameters have already been resolved and
/// removed; `params` is exactly what the provider should see.
#[derive(Debug, Clone, PartialEq)]
pub struct StepRequest {
    /// Index of the step in the pipeline.
    pub step_index: usize,
    /// Node the step was compiled from.
    pub node_id: String,
    /// Step kind.
    pub kind: StepKind,
    /// Provider or operation name.
    pub provider: String,
    /// Resolved provider parameters.
    pub params: Params,
    /// Value of the step's primary input, if it has one.
    pub input: Option<VariableValue>,
    /// Value wired to a vision step's `context` port alongside its image.
    pub context: Option<VariableValue>,
    /// Reference images in declaration order.
    ///
    /// These arrive here rather than as a `referenceImages` entry in
    /// `params`; a provider that expects that parameter builds it from this
    /// list.
    pub reference_images: Vec<ImageArtifact>,
    /// Overlay images sorted by declared index.
    ///
    /// Each overlay carries the settings the node declared at the same
    /// index of its `overlays` parameter, which is removed from `params`.
    pub overlays: Vec<ResolvedOverlay>,
}

impl StepRequest {
    /// Returns the resolved prompt, if any.
    #[must_use]
    pub fn prompt(&self) -> Option<&str> {
        self.params.get("prompt").and_then(serde_json::Value::as_str)
    }

    /// Returns the primary input as an image, if it is one.
    #[must_use]
    pub fn input_image(&self) -> Option<&ImageArtifact> {
        self.input.as_ref().and_then(VariableValue::as_image)
    }
}

/// What a provider returned.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutput {
    /// Nothing; valid only for save steps.
    Empty,
    /// A single value.
    Value(VariableValue),
    /// Several values, bound together as a list.
    Values(Vec<VariableValue>),
}

impl StepOutput {
    /// Converts the output into the value to bind.
    ///
    /// A one-element `Values` binds as the element itself.
    #[must_use]
    pub fn into_value(self) -> Option<VariableValue> {
        match self {
            Self::Empty => None,
            Self::Value(value) => Some(value),
            Self::Values(mut values) => match values.len() {
                0 => None,
                1 => values.pop(),
                _ => Some(VariableValue::List(values)),
            },
        }
    }
}

impl From<VariableValue> for StepOutput {
    fn from(value: VariableValue) -> Self {
        Self::Value(value)
    }
}

impl From<ImageArtifact> for StepOutput {
    fn from(image: ImageArtifact) -> Self {
        Self::Value(VariableValue::Image(image))
    }
}

/// Runs provider-backed steps.
///
/// Implementations own the actual generation, transform, vision, text and
/// storage providers. The executor awaits each call before starting the
/// next step.
#[async_trait]
pub trait StepRunner: Send + Sync {
    /// Runs one step.
    ///
    /// # Errors
    ///
    /// Any provider failure; the executor wraps it as `StepFailed`.
    async fn run(&self, request: StepRequest) -> anyhow::Result<StepOutput>;
}
