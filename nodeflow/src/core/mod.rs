//! Core domain model types for nodeflow.
//!
//! This module contains the types shared by the compiler, validator and
//! executor:
//! - The closed [`Step`] variant and its per-kind structs
//! - [`Pipeline`] and the compiled node/variable map
//! - Deferred-reference markers
//! - Runtime values and produced artifacts

mod artifact;
pub mod markers;
mod pipeline;
mod step;
mod value;

pub use artifact::ProducedArtifact;
pub use markers::{DeferredRefs, ImageRef, PromptRef, INTERNAL_PARAM_PREFIX};
pub use pipeline::{CompiledGraph, NodeVarMap, Pipeline};
pub use step::{
    CollectStep, FanOutMode, FanOutStep, GenerateStep, RouterStep, SaveStep, SelectionType, Step,
    StepKind, TextStep, TransformStep, VisionStep, WaitMode,
};
pub use value::{lookup_path, DataArtifact, ImageArtifact, VariableValue};

/// String-keyed provider parameters.
pub type Params = serde_json::Map<String, serde_json::Value>;
