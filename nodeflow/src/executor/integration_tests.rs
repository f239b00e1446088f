//! End-to-end scenarios: compile, validate, execute.

use super::*;
use crate::compiler::GraphCompiler;
use crate::core::{ImageArtifact, StepKind};
use crate::events::CollectingEventSink;
use crate::graph::{Graph, Node, NodeKind};
use crate::testing::{
    assert_no_blocking_issues, assert_step_kinds, image_value, sample_registry, text_value,
    GraphFixture, MockStepRunner,
};
use crate::validation::{validate, ValidatorOptions};
use async_trait::async_trait;
use mockall::{mock, predicate, Sequence};
use pretty_assertions::assert_eq;

mock! {
    pub Runner {}

    #[async_trait]
    impl StepRunner for Runner {
        async fn run(&self, request: StepRequest) -> anyhow::Result<StepOutput>;
    }
}

fn compile(graph: &Graph) -> Pipeline {
    GraphCompiler::new().compile_graph(graph).unwrap().pipeline
}

fn initial(values: &[(&str, VariableValue)]) -> HashMap<String, VariableValue> {
    values
        .iter()
        .map(|(name, value)| ((*name).to_string(), value.clone()))
        .collect()
}

fn blur(id: &str) -> Node {
    Node::new(id, NodeKind::Transform)
        .with_param("operation", "blur")
        .with_param("radius", 4)
}

#[tokio::test]
async fn test_generate_transform_save_chain() {
    let graph = GraphFixture::new()
        .generator("gen", "flux", "a lighthouse at dusk")
        .node(blur("soft"))
        .save("out")
        .edge("gen", "soft")
        .edge("soft", "out")
        .build();
    let pipeline = compile(&graph);
    assert_step_kinds(
        &pipeline,
        &[StepKind::Generate, StepKind::Transform, StepKind::Save],
    );
    assert_no_blocking_issues(&validate(&pipeline, &sample_registry(), ValidatorOptions::default()));

    let runner = Arc::new(MockStepRunner::new());
    let result = PipelineExecutor::new(runner.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap();

    assert_eq!(result.completed_steps, 3);
    assert_eq!(result.pipeline_name, "graph");
    assert_eq!(runner.called_nodes(), vec!["gen", "soft", "out"]);

    let soft = runner.request_for("soft").unwrap();
    assert_eq!(soft.input_image().map(|i| i.data.clone()), Some(b"flux:gen".to_vec()));
    assert_eq!(soft.params.get("radius"), Some(&serde_json::json!(4)));

    let save = runner.request_for("out").unwrap();
    assert_eq!(save.params.get("destination"), Some(&serde_json::json!("gallery")));
    assert_eq!(save.provider, "local");

    let artifacts: Vec<(&str, &str)> = result
        .artifacts
        .iter()
        .map(|a| (a.node_id.as_str(), a.mime_type.as_str()))
        .collect();
    assert_eq!(artifacts, vec![("gen", "image/png"), ("soft", "image/png")]);
    assert!(result.artifacts[0].id.starts_with("gen-"));
    assert_eq!(result.artifacts[1].step_index, 1);
    assert!(result.variable("out").is_none());
}

#[tokio::test]
async fn test_strict_runner_expectations() {
    let graph = GraphFixture::new()
        .generator("gen", "flux", "a fox")
        .node(blur("soft"))
        .edge("gen", "soft")
        .build();
    let pipeline = compile(&graph);

    let mut runner = MockRunner::new();
    let mut seq = Sequence::new();
    runner
        .expect_run()
        .withf(|r| r.node_id == "gen" && r.kind == StepKind::Generate && r.prompt() == Some("a fox"))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ImageArtifact::new(vec![1, 2, 3]).with_mime_type("image/jpeg").into()));
    runner
        .expect_run()
        .with(predicate::function(|r: &StepRequest| {
            r.node_id == "soft"
                && r.input_image().map(|i| i.mime_type.as_deref()) == Some(Some("image/jpeg"))
        }))
        .times(1)
        .in_sequence(&mut seq)
        .returning(|_| Ok(ImageArtifact::new(vec![4]).with_id("soft-final").into()));

    let result = execute(&pipeline, Arc::new(runner), HashMap::new()).await.unwrap();

    assert_eq!(result.artifacts[0].mime_type, "image/jpeg");
    assert_eq!(result.artifacts[1].id, "soft-final");
    assert_eq!(result.artifacts[1].mime_type, "image/png");
}

#[tokio::test]
async fn test_router_selects_by_index_property() {
    let graph = GraphFixture::new()
        .input("a")
        .input("b")
        .input("c")
        .collect("pool", "all")
        .node(
            Node::new("judge", NodeKind::Text)
                .with_param("provider", "writer")
                .with_param("prompt", "Pick the best caption"),
        )
        .router("pick", "best_index")
        .edge_to("a", "pool", "in[0]")
        .edge_to("b", "pool", "in[1]")
        .edge_to("c", "pool", "in[2]")
        .edge_to("pool", "judge", "context")
        .edge_to("pool", "pick", "candidates")
        .edge_to("judge", "pick", "selection")
        .build();
    let pipeline = compile(&graph);
    assert_step_kinds(&pipeline, &[StepKind::Collect, StepKind::Text, StepKind::Router]);

    let runner = Arc::new(MockStepRunner::new().with_text("judge", r#"{"best_index": 1}"#));
    let result = PipelineExecutor::new(runner.clone())
        .execute(
            &pipeline,
            initial(&[("a", text_value("A")), ("b", text_value("B")), ("c", text_value("C"))]),
        )
        .await
        .unwrap();

    assert_eq!(result.variable("pick"), Some(&text_value("B")));
    let judge = runner.request_for("judge").unwrap();
    assert_eq!(judge.input.and_then(|v| v.text_content()), Some("A\nB\nC".to_string()));
}

#[tokio::test]
async fn test_fan_out_slots_feed_collect_in_declared_order() {
    let graph = GraphFixture::new()
        .input("photo")
        .fan_out("split", 3)
        .node(blur("b0"))
        .node(blur("b1"))
        .node(blur("b2"))
        .collect("joined", "all")
        .edge("photo", "split")
        .edge_between("split", "out[0]", "b0", "image")
        .edge_between("split", "out[1]", "b1", "image")
        .edge_between("split", "out[2]", "b2", "image")
        .edge_to("b2", "joined", "in[2]")
        .edge_to("b0", "joined", "in[0]")
        .edge_to("b1", "joined", "in[1]")
        .build();
    let pipeline = compile(&graph);
    assert_eq!(
        pipeline.iter().next().map(Step::outputs),
        Some(vec!["split", "split_0", "split_1", "split_2"])
    );

    let runner = Arc::new(MockStepRunner::new());
    let result = PipelineExecutor::new(runner)
        .execute(&pipeline, initial(&[("photo", image_value(b"raw"))]))
        .await
        .unwrap();

    let joined = result.variable("joined").and_then(VariableValue::as_list).unwrap();
    let data: Vec<Vec<u8>> = joined
        .iter()
        .filter_map(|v| v.as_image().map(|i| i.data.clone()))
        .collect();
    assert_eq!(
        data,
        vec![b"blur:b0".to_vec(), b"blur:b1".to_vec(), b"blur:b2".to_vec()]
    );
    assert_eq!(result.variable("split_1"), Some(&image_value(b"raw")));
}

#[tokio::test]
async fn test_collect_all_fails_when_branch_missing() {
    let graph = GraphFixture::new()
        .input("x")
        .input("y")
        .collect("joined", "all")
        .edge_to("x", "joined", "in[0]")
        .edge_to("y", "joined", "in[1]")
        .build();
    let pipeline = compile(&graph);
    let runner = Arc::new(MockStepRunner::new());

    let err = PipelineExecutor::new(runner.clone())
        .execute(&pipeline, initial(&[("x", text_value("only x"))]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), "COLLECT_INCOMPLETE");
    assert!(err.to_string().contains('y'));

    let available = GraphFixture::new()
        .input("x")
        .input("y")
        .collect("joined", "available")
        .edge_to("x", "joined", "in[0]")
        .edge_to("y", "joined", "in[1]")
        .build();
    let result = PipelineExecutor::new(runner)
        .execute(&compile(&available), initial(&[("x", text_value("only x"))]))
        .await
        .unwrap();
    assert_eq!(
        result.variable("joined"),
        Some(&VariableValue::List(vec![text_value("only x")]))
    );
}

#[tokio::test]
async fn test_missing_overlay_reports_name_and_index() {
    let graph = GraphFixture::new()
        .input("bg")
        .input("overlay_1")
        .input("logo")
        .transform("comp", "composite")
        .edge_to("bg", "comp", "image")
        .edge_to("overlay_1", "comp", "overlays[0]")
        .edge_to("logo", "comp", "overlays[3]")
        .build();
    let pipeline = compile(&graph);
    assert_no_blocking_issues(&validate(&pipeline, &sample_registry(), ValidatorOptions::default()));

    let runner = MockRunner::new();
    let err = execute(
        &pipeline,
        Arc::new(runner),
        initial(&[("bg", image_value(b"bg")), ("logo", image_value(b"logo"))]),
    )
    .await
    .unwrap_err();

    assert_eq!(err.code(), "MISSING_IMAGE_INPUTS");
    assert_eq!(
        err.to_string(),
        "Step 0 (transform 'comp'): missing overlay images: overlay_1 (index 0)"
    );
}

#[tokio::test]
async fn test_overlays_keep_sparse_indices() {
    let graph = GraphFixture::new()
        .input("bg")
        .input("badge")
        .input("logo")
        .node(
            Node::new("comp", NodeKind::Transform)
                .with_param("operation", "composite")
                .with_param("overlays", serde_json::json!([null, null, {"opacity": 0.5}, null, null, {"opacity": 1}])),
        )
        .edge_to("bg", "comp", "image")
        .edge_to("logo", "comp", "overlays[5]")
        .edge_to("badge", "comp", "overlays[2]")
        .build();
    let pipeline = compile(&graph);
    let runner = Arc::new(MockStepRunner::new());

    PipelineExecutor::new(runner.clone())
        .execute(
            &pipeline,
            initial(&[
                ("bg", image_value(b"bg")),
                ("badge", image_value(b"badge")),
                ("logo", image_value(b"logo")),
            ]),
        )
        .await
        .unwrap();

    let request = runner.request_for("comp").unwrap();
    let overlays: Vec<(usize, Vec<u8>)> = request
        .overlays
        .iter()
        .map(|o| (o.index, o.image.data.clone()))
        .collect();
    assert_eq!(overlays, vec![(2, b"badge".to_vec()), (5, b"logo".to_vec())]);
    assert_eq!(request.overlays[0].settings, Some(serde_json::json!({"opacity": 0.5})));
    assert!(!request.params.contains_key("overlays"));
}

#[tokio::test]
async fn test_structured_prompt_with_pre_prompt() {
    let graph = GraphFixture::new()
        .input("photo")
        .vision("describe", "describe")
        .node(
            Node::new("gen", NodeKind::Generator)
                .with_param("generator", "flux")
                .with_param("prePrompt", "Watercolor."),
        )
        .edge("photo", "describe")
        .edge_between("describe", "output.scene", "gen", "text")
        .edge_to("photo", "gen", "references")
        .build();
    let pipeline = compile(&graph);
    assert_no_blocking_issues(&validate(&pipeline, &sample_registry(), ValidatorOptions::strict()));

    let runner = Arc::new(
        MockStepRunner::new().with_text("describe", "```json\n{\"scene\": \"a foggy pier\"}\n```"),
    );
    PipelineExecutor::new(runner.clone())
        .execute(&pipeline, initial(&[("photo", image_value(b"photo"))]))
        .await
        .unwrap();

    let gen = runner.request_for("gen").unwrap();
    assert_eq!(gen.prompt(), Some("Watercolor.\n\na foggy pier"));
    assert!(!gen.params.contains_key("prePrompt"));
    assert!(gen.params.keys().all(|k| !k.starts_with("__")));
    assert_eq!(gen.reference_images.len(), 1);
}

#[tokio::test]
async fn test_vision_receives_image_and_context() {
    let graph = GraphFixture::new()
        .input("upload")
        .input("notes")
        .vision("describe", "describe")
        .edge_to("upload", "describe", "image")
        .edge_to("notes", "describe", "context")
        .build();
    let pipeline = compile(&graph);
    assert_no_blocking_issues(&validate(&pipeline, &sample_registry(), ValidatorOptions::default()));

    let runner = Arc::new(MockStepRunner::new());
    PipelineExecutor::new(runner.clone())
        .execute(
            &pipeline,
            initial(&[
                ("upload", image_value(b"photo")),
                ("notes", text_value("focus on the boats")),
            ]),
        )
        .await
        .unwrap();

    let request = runner.request_for("describe").unwrap();
    assert_eq!(request.input_image().map(|i| i.data.clone()), Some(b"photo".to_vec()));
    assert_eq!(request.context, Some(text_value("focus on the boats")));
}

#[tokio::test]
async fn test_fan_out_array_mode_routes_prompts() {
    let graph = GraphFixture::new()
        .node(
            Node::new("planner", NodeKind::Text)
                .with_param("provider", "writer")
                .with_param("prompt", "Plan two shots"),
        )
        .node(
            Node::new("shots", NodeKind::FanOut)
                .with_param("mode", "array")
                .with_param("count", 2)
                .with_param("arrayProperty", "prompts"),
        )
        .node(Node::new("g0", NodeKind::Generator).with_param("generator", "flux"))
        .node(Node::new("g1", NodeKind::Generator).with_param("generator", "flux"))
        .edge("planner", "shots")
        .edge_between("shots", "out[0]", "g0", "text")
        .edge_between("shots", "out[1]", "g1", "text")
        .build();
    let pipeline = compile(&graph);
    assert_step_kinds(
        &pipeline,
        &[StepKind::Text, StepKind::FanOut, StepKind::Generate, StepKind::Generate],
    );
    assert_no_blocking_issues(&validate(&pipeline, &sample_registry(), ValidatorOptions::default()));

    let runner = Arc::new(
        MockStepRunner::new().with_text("planner", r#"{"prompts": ["wide shot", "close-up"]}"#),
    );
    PipelineExecutor::new(runner.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap();

    assert_eq!(runner.request_for("g0").unwrap().prompt(), Some("wide shot"));
    assert_eq!(runner.request_for("g1").unwrap().prompt(), Some("close-up"));

    let short = Arc::new(MockStepRunner::new().with_text("planner", r#"{"prompts": ["only one"]}"#));
    let err = PipelineExecutor::new(short.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FAN_OUT_LENGTH_MISMATCH");
    assert_eq!(short.called_nodes(), vec!["planner"]);
}

#[tokio::test]
async fn test_step_failure_aborts_and_emits_events() {
    let graph = GraphFixture::new()
        .generator("gen", "flux", "a fox")
        .node(blur("soft"))
        .edge("gen", "soft")
        .build();
    let pipeline = compile(&graph);
    let runner = Arc::new(MockStepRunner::new().with_failure("gen", "quota exceeded"));
    let events = Arc::new(CollectingEventSink::new());

    let err = PipelineExecutor::new(runner.clone())
        .with_event_sink(events.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "STEP_FAILED");
    assert_eq!(err.step_index(), Some(0));
    assert!(err.to_string().contains("quota exceeded"));
    assert_eq!(runner.called_nodes(), vec!["gen"]);
    assert_eq!(
        events.names(),
        vec!["pipeline.started", "step.started", "step.failed", "pipeline.failed"]
    );
}

#[tokio::test]
async fn test_success_events_and_disabled_events() {
    let graph = GraphFixture::new().generator("gen", "flux", "a fox").build();
    let pipeline = compile(&graph);
    let events = Arc::new(CollectingEventSink::new());

    PipelineExecutor::new(Arc::new(MockStepRunner::new()))
        .with_event_sink(events.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap();
    assert_eq!(
        events.names(),
        vec!["pipeline.started", "step.started", "step.completed", "pipeline.completed"]
    );

    events.clear();
    PipelineExecutor::new(Arc::new(MockStepRunner::new()))
        .with_config(ExecutorConfig::default().with_emit_events(false))
        .with_event_sink(events.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap();
    assert!(events.is_empty());
}

#[tokio::test]
async fn test_empty_output_is_an_error() {
    let graph = GraphFixture::new().generator("gen", "flux", "a fox").build();
    let runner = Arc::new(MockStepRunner::new().with_output("gen", StepOutput::Empty));

    let err = execute(&compile(&graph), runner, HashMap::new()).await.unwrap_err();
    assert_eq!(err.code(), "EMPTY_STEP_OUTPUT");
}

/// Cancels the shared token while running the first step.
struct CancellingRunner {
    token: Arc<CancellationToken>,
    inner: MockStepRunner,
}

#[async_trait]
impl StepRunner for CancellingRunner {
    async fn run(&self, request: StepRequest) -> anyhow::Result<StepOutput> {
        self.token.cancel("user pressed stop");
        self.inner.run(request).await
    }
}

#[tokio::test]
async fn test_cancellation_between_steps() {
    let graph = GraphFixture::new()
        .generator("gen", "flux", "a fox")
        .node(blur("soft"))
        .edge("gen", "soft")
        .build();
    let pipeline = compile(&graph);
    let token = Arc::new(CancellationToken::new());
    let runner = Arc::new(CancellingRunner {
        token: token.clone(),
        inner: MockStepRunner::new(),
    });
    let events = Arc::new(CollectingEventSink::new());

    let err = PipelineExecutor::new(runner.clone())
        .with_cancellation(token)
        .with_event_sink(events.clone())
        .execute(&pipeline, HashMap::new())
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        ExecutionError::Cancelled { completed_steps: 1, ref reason } if reason == "user pressed stop"
    ));
    assert_eq!(runner.inner.called_nodes(), vec!["gen"]);
    assert_eq!(events.names().last(), Some(&"pipeline.cancelled"));
}

#[tokio::test]
async fn test_missing_input_variable() {
    let graph = GraphFixture::new()
        .input("photo")
        .node(blur("soft"))
        .edge("photo", "soft")
        .build();

    let err = execute(&compile(&graph), Arc::new(MockRunner::new()), HashMap::new())
        .await
        .unwrap_err();

    assert_eq!(err.code(), "MISSING_VARIABLE");
    assert_eq!(err.node_id(), Some("soft"));
}

#[tokio::test]
async fn test_result_serializes_variables() {
    let graph = GraphFixture::new().generator("gen", "flux", "a fox").build();
    let result = execute(&compile(&graph), Arc::new(MockStepRunner::new()), HashMap::new())
        .await
        .unwrap();

    let json = serde_json::to_value(&result).unwrap();
    assert_eq!(json["pipelineName"], "graph");
    assert_eq!(json["completedSteps"], 1);
    assert_eq!(json["variables"]["gen"]["type"], "image");
    assert_eq!(json["artifacts"][0]["nodeId"], "gen");
}
