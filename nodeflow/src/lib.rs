//! # Nodeflow
//!
//! Compiles node-based image-generation graphs into linear pipelines,
//! validates provider parameters against declared schemas, and executes the
//! result against an injected step runner.
//!
//! - **Compilation**: topological ordering, per-kind lowering, deferred
//!   markers for prompts, reference images and overlays
//! - **Validation**: non-throwing issue lists against a capability registry
//! - **Execution**: sequential runs with fan-out, collect and router flow
//!   control, artifact recording and cancellation
//! - **Repair**: a bounded generate, compile, validate loop that feeds
//!   structured errors back to a graph generator
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use nodeflow::prelude::*;
//!
//! let graph = Graph::from_json_str(document)?;
//! let compiled = GraphCompiler::new().compile_graph(&graph)?;
//!
//! let issues = validate(&compiled.pipeline, &registry, ValidatorOptions::default());
//! for issue in issues.iter().filter(|i| i.severity == Severity::Error) {
//!     eprintln!("{issue}");
//! }
//!
//! let result = PipelineExecutor::new(runner)
//!     .execute(&compiled.pipeline, inputs)
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod compiler;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod executor;
pub mod graph;
pub mod observability;
pub mod repair;
pub mod testing;
pub mod utils;
pub mod validation;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::cancellation::CancellationToken;
    pub use crate::compiler::{compile, GraphCompiler};
    pub use crate::config::EngineConfig;
    pub use crate::core::{
        CompiledGraph, DataArtifact, ImageArtifact, Pipeline, ProducedArtifact, Step, StepKind,
        VariableValue,
    };
    pub use crate::errors::{
        CompileError, ConfigError, ErrorInfo, ExecutionError, NodeflowError,
    };
    pub use crate::events::{EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::executor::{
        execute, ExecutionResult, ExecutorConfig, PipelineExecutor, StepOutput, StepRequest,
        StepRunner,
    };
    pub use crate::graph::{Edge, Graph, Node, NodeKind};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::repair::{GraphGenerator, RepairConfig, RepairFeedback, RepairLoop};
    pub use crate::validation::{
        has_blocking_issues, validate, CapabilityRegistry, ProviderSchema, Severity,
        ValidationIssue, ValidatorOptions,
    };
}
