//! Pipeline execution.
//!
//! [`PipelineExecutor`] runs a compiled [`Pipeline`] strictly in step order
//! against one fresh [`VariableStore`]. Before each provider-backed step it
//! resolves the deferred markers left by the compiler; fan-out, collect and
//! router steps run in-process. Any error aborts the remaining steps.
//!
//! Providers live behind the [`StepRunner`] seam. Each invocation is awaited
//! before the next step starts, so independent branches run one after the
//! other in compiled order.

mod config;
mod flow;
mod resolve;
mod runner;
mod store;

#[cfg(test)]
mod integration_tests;

pub use config::ExecutorConfig;
pub use runner::{ResolvedOverlay, StepOutput, StepRequest, StepRunner};
pub use store::VariableStore;

use crate::cancellation::CancellationToken;
use crate::core::{
    DeferredRefs, Params, Pipeline, ProducedArtifact, Step, VariableValue,
};
use crate::errors::ExecutionError;
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::observability::SpanTimer;
use crate::utils::{content_id, generate_run_id};
use flow::Bindings;
use resolve::StepScope;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Outcome of a successful run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionResult {
    /// Run identifier.
    pub run_id: Uuid,
    /// Name of the executed pipeline.
    pub pipeline_name: String,
    /// Provider outputs in step completion order.
    pub artifacts: Vec<ProducedArtifact>,
    /// Every binding made during the run.
    pub variables: VariableStore,
    /// Number of steps that ran.
    pub completed_steps: usize,
    /// Wall-clock duration of the run.
    pub duration_ms: u64,
}

impl ExecutionResult {
    /// Returns the value bound to `name`.
    #[must_use]
    pub fn variable(&self, name: &str) -> Option<&VariableValue> {
        self.variables.get(name)
    }

    /// Returns the artifacts produced by one node.
    #[must_use]
    pub fn artifacts_for(&self, node_id: &str) -> Vec<&ProducedArtifact> {
        self.artifacts.iter().filter(|a| a.node_id == node_id).collect()
    }
}

/// Parameters, input and markers of one provider invocation.
struct Invocation<'s> {
    provider: &'s str,
    params: &'s Params,
    deferred: Option<&'s DeferredRefs>,
    input: Option<&'s str>,
    context: Option<&'s str>,
    requires_image: bool,
}

/// Executes compiled pipelines.
pub struct PipelineExecutor {
    runner: Arc<dyn StepRunner>,
    config: ExecutorConfig,
    events: Arc<dyn EventSink>,
    cancellation: Option<Arc<CancellationToken>>,
}

impl std::fmt::Debug for PipelineExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipelineExecutor")
            .field("config", &self.config)
            .field("cancellation", &self.cancellation)
            .finish_non_exhaustive()
    }
}

impl PipelineExecutor {
    /// Creates an executor over a step runner.
    #[must_use]
    pub fn new(runner: Arc<dyn StepRunner>) -> Self {
        Self {
            runner,
            config: ExecutorConfig::default(),
            events: Arc::new(NoOpEventSink),
            cancellation: None,
        }
    }

    /// Sets the runtime configuration.
    #[must_use]
    pub fn with_config(mut self, config: ExecutorConfig) -> Self {
        self.config = config;
        self
    }

    /// Sets the lifecycle event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Sets a cancellation token checked before every step.
    #[must_use]
    pub fn with_cancellation(mut self, token: Arc<CancellationToken>) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the runtime configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Runs every step of `pipeline` in order.
    ///
    /// `initial` holds externally supplied values, such as uploaded files
    /// bound to input node ids.
    ///
    /// # Errors
    ///
    /// Returns the first [`ExecutionError`] raised by a step; later steps do
    /// not run. Cancellation observed between steps yields
    /// [`ExecutionError::Cancelled`].
    pub async fn execute(
        &self,
        pipeline: &Pipeline,
        initial: HashMap<String, VariableValue>,
    ) -> Result<ExecutionResult, ExecutionError> {
        let run_id = generate_run_id();
        let started = Instant::now();
        let mut store = VariableStore::with_initial(initial)?;
        let mut artifacts = Vec::new();

        info!(
            %run_id,
            pipeline = %pipeline.name,
            steps = pipeline.len(),
            initial_variables = store.len(),
            "Pipeline started"
        );
        self.emit(PipelineEvent::PipelineStarted {
            run_id,
            pipeline: pipeline.name.clone(),
            step_count: pipeline.len(),
        })
        .await;

        for (index, step) in pipeline.iter().enumerate() {
            if let Some(reason) = self.cancel_reason() {
                warn!(%run_id, completed_steps = index, %reason, "Pipeline cancelled");
                self.emit(PipelineEvent::PipelineCancelled {
                    run_id,
                    pipeline: pipeline.name.clone(),
                    reason: reason.clone(),
                    completed_steps: index,
                })
                .await;
                return Err(ExecutionError::Cancelled {
                    reason,
                    completed_steps: index,
                });
            }

            let span = info_span!(
                "step",
                %run_id,
                step_index = index,
                node_id = %step.node_id(),
                kind = %step.kind(),
            );
            let outcome = self
                .run_step(run_id, index, step, &mut store, &mut artifacts)
                .instrument(span)
                .await;

            if let Err(err) = outcome {
                error!(%run_id, pipeline = %pipeline.name, code = err.code(), error = %err, "Pipeline failed");
                self.emit(PipelineEvent::PipelineFailed {
                    run_id,
                    pipeline: pipeline.name.clone(),
                    code: err.code().to_string(),
                    message: err.to_string(),
                })
                .await;
                return Err(err);
            }
        }

        let duration_ms = crate::utils::elapsed_ms(started);
        info!(
            %run_id,
            pipeline = %pipeline.name,
            artifacts = artifacts.len(),
            duration_ms,
            "Pipeline completed"
        );
        self.emit(PipelineEvent::PipelineCompleted {
            run_id,
            pipeline: pipeline.name.clone(),
            artifact_count: artifacts.len(),
            duration_ms,
        })
        .await;

        Ok(ExecutionResult {
            run_id,
            pipeline_name: pipeline.name.clone(),
            artifacts,
            variables: store,
            completed_steps: pipeline.len(),
            duration_ms,
        })
    }

    async fn run_step(
        &self,
        run_id: Uuid,
        index: usize,
        step: &Step,
        store: &mut VariableStore,
        artifacts: &mut Vec<ProducedArtifact>,
    ) -> Result<(), ExecutionError> {
        let scope = StepScope {
            index,
            node_id: step.node_id(),
            kind: step.kind(),
        };
        self.emit(PipelineEvent::StepStarted {
            run_id,
            step_index: index,
            node_id: scope.node_id.to_string(),
            kind: scope.kind,
        })
        .await;
        info!(provider = step.provider().unwrap_or("-"), "Step started");
        let timer = SpanTimer::start(scope.node_id);

        let bindings = match self.perform(scope, step, store).await {
            Ok(bindings) => bindings,
            Err(err) => {
                error!(code = err.code(), error = %err, "Step failed");
                self.emit(PipelineEvent::StepFailed {
                    run_id,
                    step_index: index,
                    node_id: scope.node_id.to_string(),
                    kind: scope.kind,
                    code: err.code().to_string(),
                    message: err.to_string(),
                })
                .await;
                return Err(err);
            }
        };

        let provider_backed = scope.kind.is_provider_backed();
        let mut outputs = Vec::with_capacity(bindings.len());
        for (name, value) in bindings {
            if provider_backed {
                record_artifacts(index, scope.node_id, &name, &value, artifacts);
            }
            debug!(variable = %name, value_type = value.type_name(), "Variable bound");
            store.bind(name.clone(), value)?;
            outputs.push(name);
        }

        let duration_ms = timer.finish();
        info!(duration_ms, outputs = ?outputs, "Step completed");
        self.emit(PipelineEvent::StepCompleted {
            run_id,
            step_index: index,
            node_id: scope.node_id.to_string(),
            kind: scope.kind,
            outputs,
            duration_ms,
        })
        .await;
        Ok(())
    }

    async fn perform(
        &self,
        scope: StepScope<'_>,
        step: &Step,
        store: &VariableStore,
    ) -> Result<Bindings, ExecutionError> {
        let (invocation, out) = match step {
            Step::FanOut(s) => return flow::fan_out(scope, store, s),
            Step::Collect(s) => return flow::collect(scope, store, s),
            Step::Router(s) => return flow::route(scope, store, s),
            Step::Save(s) => {
                let mut params = s.params.clone();
                params.insert(
                    "destination".to_string(),
                    serde_json::Value::String(s.destination.clone()),
                );
                let invocation = Invocation {
                    provider: &s.provider,
                    params: &params,
                    deferred: None,
                    input: Some(&s.input),
                    context: None,
                    requires_image: false,
                };
                // Whatever storage returns (a URL, a record) is not bound.
                self.invoke(scope, store, invocation).await?;
                return Ok(Vec::new());
            }
            Step::Generate(s) => (
                Invocation {
                    provider: &s.generator,
                    params: &s.params,
                    deferred: Some(&s.deferred),
                    input: None,
                    context: None,
                    requires_image: false,
                },
                &s.out,
            ),
            Step::Transform(s) => (
                Invocation {
                    provider: &s.op,
                    params: &s.params,
                    deferred: Some(&s.deferred),
                    input: Some(&s.input),
                    context: None,
                    requires_image: true,
                },
                &s.out,
            ),
            Step::Vision(s) => (
                Invocation {
                    provider: &s.provider,
                    params: &s.params,
                    deferred: Some(&s.deferred),
                    input: Some(&s.input),
                    context: s.context.as_deref(),
                    requires_image: true,
                },
                &s.out,
            ),
            Step::Text(s) => (
                Invocation {
                    provider: &s.provider,
                    params: &s.params,
                    deferred: Some(&s.deferred),
                    input: s.input.as_deref(),
                    context: None,
                    requires_image: false,
                },
                &s.out,
            ),
        };

        let output = self.invoke(scope, store, invocation).await?;
        let mut value = output.into_value().ok_or_else(|| ExecutionError::EmptyOutput {
            step_index: scope.index,
            node_id: scope.node_id.to_string(),
            kind: scope.kind,
        })?;
        self.normalize_images(out, &mut value);
        Ok(vec![(out.clone(), value)])
    }

    async fn invoke(
        &self,
        scope: StepScope<'_>,
        store: &VariableStore,
        invocation: Invocation<'_>,
    ) -> Result<StepOutput, ExecutionError> {
        let input = match invocation.input {
            Some(name) => {
                let value = scope.read(store, name)?;
                if invocation.requires_image && value.images().is_empty() {
                    return Err(scope.unexpected(name, "an image", value.type_name()));
                }
                Some(value.clone())
            }
            None => None,
        };
        let context = match invocation.context {
            Some(name) => Some(scope.read(store, name)?.clone()),
            None => None,
        };

        let empty = DeferredRefs::default();
        let resolved = resolve::resolve(
            scope,
            store,
            invocation.params,
            invocation.deferred.unwrap_or(&empty),
            &self.config.prompt_separator,
        )?;

        let request = StepRequest {
            step_index: scope.index,
            node_id: scope.node_id.to_string(),
            kind: scope.kind,
            provider: invocation.provider.to_string(),
            params: resolved.params,
            input,
            context,
            reference_images: resolved.reference_images,
            overlays: resolved.overlays,
        };

        self.runner
            .run(request)
            .await
            .map_err(|source| ExecutionError::StepFailed {
                step_index: scope.index,
                node_id: scope.node_id.to_string(),
                kind: scope.kind,
                provider: invocation.provider.to_string(),
                source,
            })
    }

    /// Fills a MIME type and a content id on images the provider left bare.
    fn normalize_images(&self, variable: &str, value: &mut VariableValue) {
        for image in value.images_mut() {
            if image.mime_type.is_none() {
                image.mime_type = Some(self.config.default_image_mime.clone());
            }
            if image.id.is_none() {
                image.id = Some(content_id(variable, &image.data));
            }
        }
    }

    fn cancel_reason(&self) -> Option<String> {
        self.cancellation
            .as_ref()
            .filter(|token| token.is_cancelled())
            .map(|token| token.reason().unwrap_or_else(|| "cancelled".to_string()))
    }

    async fn emit(&self, event: PipelineEvent) {
        if self.config.emit_events {
            self.events.emit(&event).await;
        }
    }
}

fn record_artifacts(
    step_index: usize,
    node_id: &str,
    variable: &str,
    value: &VariableValue,
    artifacts: &mut Vec<ProducedArtifact>,
) {
    match value {
        VariableValue::Image(image) => {
            artifacts.push(ProducedArtifact::from_image(step_index, node_id, variable, image));
        }
        VariableValue::Data(data) => {
            artifacts.push(ProducedArtifact::from_text(step_index, node_id, variable, &data.text));
        }
        VariableValue::List(items) => {
            for item in items {
                record_artifacts(step_index, node_id, variable, item, artifacts);
            }
        }
    }
}

/// Runs `pipeline` with a default executor over `runner`.
///
/// # Errors
///
/// See [`PipelineExecutor::execute`].
pub async fn execute(
    pipeline: &Pipeline,
    runner: Arc<dyn StepRunner>,
    initial: HashMap<String, VariableValue>,
) -> Result<ExecutionResult, ExecutionError> {
    PipelineExecutor::new(runner).execute(pipeline, initial).await
}
