//! Executor lifecycle events.

use crate::core::StepKind;
use serde::Serialize;
use uuid::Uuid;

/// A lifecycle event emitted by the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type")]
pub enum PipelineEvent {
    /// A run began.
    #[serde(rename = "pipeline.started", rename_all = "camelCase")]
    PipelineStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Pipeline name.
        pipeline: String,
        /// Number of steps to run.
        step_count: usize,
    },
    /// A step began.
    #[serde(rename = "step.started", rename_all = "camelCase")]
    StepStarted {
        /// Run identifier.
        run_id: Uuid,
        /// Step index.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Step kind.
        kind: StepKind,
    },
    /// A step finished and its outputs are bound.
    #[serde(rename = "step.completed", rename_all = "camelCase")]
    StepCompleted {
        /// Run identifier.
        run_id: Uuid,
        /// Step index.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Step kind.
        kind: StepKind,
        /// Variables bound by the step.
        outputs: Vec<String>,
        /// Step wall-clock time.
        duration_ms: u64,
    },
    /// A step failed; the run aborts.
    #[serde(rename = "step.failed", rename_all = "camelCase")]
    StepFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Step index.
        step_index: usize,
        /// Node the step was compiled from.
        node_id: String,
        /// Step kind.
        kind: StepKind,
        /// Stable error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// Every step finished.
    #[serde(rename = "pipeline.completed", rename_all = "camelCase")]
    PipelineCompleted {
        /// Run identifier.
        run_id: Uuid,
        /// Pipeline name.
        pipeline: String,
        /// Number of recorded artifacts.
        artifact_count: usize,
        /// Run wall-clock time.
        duration_ms: u64,
    },
    /// The run aborted with an error.
    #[serde(rename = "pipeline.failed", rename_all = "camelCase")]
    PipelineFailed {
        /// Run identifier.
        run_id: Uuid,
        /// Pipeline name.
        pipeline: String,
        /// Stable error code.
        code: String,
        /// Error message.
        message: String,
    },
    /// The run stopped on a cancellation request.
    #[serde(rename = "pipeline.cancelled", rename_all = "camelCase")]
    PipelineCancelled {
        /// Run identifier.
        run_id: Uuid,
        /// Pipeline name.
        pipeline: String,
        /// Cancellation reason.
        reason: String,
        /// Steps finished before cancellation was observed.
        completed_steps: usize,
    },
}

impl PipelineEvent {
    /// Returns the dotted event name.
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            Self::PipelineStarted { .. } => "pipeline.started",
            Self::StepStarted { .. } => "step.started",
            Self::StepCompleted { .. } => "step.completed",
            Self::StepFailed { .. } => "step.failed",
            Self::PipelineCompleted { .. } => "pipeline.completed",
            Self::PipelineFailed { .. } => "pipeline.failed",
            Self::PipelineCancelled { .. } => "pipeline.cancelled",
        }
    }

    /// Returns the run the event belongs to.
    #[must_use]
    pub fn run_id(&self) -> Uuid {
        match self {
            Self::PipelineStarted { run_id, .. }
            | Self::StepStarted { run_id, .. }
            | Self::StepCompleted { run_id, .. }
            | Self::StepFailed { run_id, .. }
            | Self::PipelineCompleted { run_id, .. }
            | Self::PipelineFailed { run_id, .. }
            | Self::PipelineCancelled { run_id, .. } => *run_id,
        }
    }

    /// Serializes the event payload.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}
