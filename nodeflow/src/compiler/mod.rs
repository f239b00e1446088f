//! Graph compiler.
//!
//! Lowers a node/edge graph into a dependency-ordered [`Pipeline`] plus the
//! node-id to variable-name map. Compilation is pure, synchronous and
//! fail-fast: the first structural defect is returned as a [`CompileError`].

mod lowering;

use crate::core::{CompiledGraph, NodeVarMap, Pipeline};
use crate::errors::CompileError;
use crate::graph::{Edge, Graph, GraphIndex, Node};
use lowering::Lowering;
use std::collections::HashSet;
use tracing::{debug, trace};

/// Pipeline name used when neither the compiler nor the graph names one.
pub const DEFAULT_PIPELINE_NAME: &str = "graph";

/// Compiles graphs into pipelines.
#[derive(Debug, Clone)]
pub struct GraphCompiler {
    pipeline_name: String,
}

impl Default for GraphCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl GraphCompiler {
    /// Creates a compiler with the default pipeline name.
    #[must_use]
    pub fn new() -> Self {
        Self {
            pipeline_name: DEFAULT_PIPELINE_NAME.to_string(),
        }
    }

    /// Sets the name given to compiled pipelines.
    #[must_use]
    pub fn with_pipeline_name(mut self, name: impl Into<String>) -> Self {
        self.pipeline_name = name.into();
        self
    }

    /// Compiles a graph document, naming the pipeline after the graph when
    /// it has a name.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found.
    pub fn compile_graph(&self, graph: &Graph) -> Result<CompiledGraph, CompileError> {
        let name = graph.name.as_deref().unwrap_or(&self.pipeline_name);
        self.compile_named(name, &graph.nodes, &graph.edges)
    }

    /// Compiles nodes and edges into an ordered pipeline.
    ///
    /// # Errors
    ///
    /// Returns the first structural defect found: duplicate ids, dangling
    /// edges, cycles, missing connections or parameters, malformed
    /// flow-control parameters, doubly connected ports, or variable name
    /// collisions.
    pub fn compile(&self, nodes: &[Node], edges: &[Edge]) -> Result<CompiledGraph, CompileError> {
        self.compile_named(&self.pipeline_name, nodes, edges)
    }

    fn compile_named(
        &self,
        name: &str,
        nodes: &[Node],
        edges: &[Edge],
    ) -> Result<CompiledGraph, CompileError> {
        debug!(
            pipeline = %name,
            nodes = nodes.len(),
            edges = edges.len(),
            "Compiling graph"
        );

        let index = GraphIndex::build(nodes, edges)?;
        let order = index.topological_order()?;

        let mut steps = Vec::with_capacity(index.len());
        let mut node_vars = NodeVarMap::new();
        let mut produced: HashSet<String> = HashSet::new();

        for position in order {
            let node = index.node(position);
            let lowering = Lowering {
                index: &index,
                position,
            };

            match lowering.lower()? {
                Some(step) => {
                    for name in step.outputs() {
                        claim(&mut produced, name, &node.id)?;
                    }
                    trace!(
                        step_index = steps.len(),
                        node_id = %node.id,
                        kind = %step.kind(),
                        "Lowered node"
                    );
                    steps.push(step);
                }
                None => claim(&mut produced, &node.id, &node.id)?,
            }

            if node.kind.produces_variable() {
                node_vars.insert(node.id.clone(), node.id.clone());
            }
        }

        debug!(pipeline = %name, steps = steps.len(), "Graph compiled");

        Ok(CompiledGraph {
            pipeline: Pipeline::new(name, steps),
            node_vars,
        })
    }
}

fn claim(produced: &mut HashSet<String>, name: &str, node_id: &str) -> Result<(), CompileError> {
    if produced.insert(name.to_string()) {
        Ok(())
    } else {
        Err(CompileError::VariableConflict {
            name: name.to_string(),
            node_id: node_id.to_string(),
        })
    }
}

/// Compiles nodes and edges with a default compiler.
///
/// # Errors
///
/// See [`GraphCompiler::compile`].
pub fn compile(nodes: &[Node], edges: &[Edge]) -> Result<CompiledGraph, CompileError> {
    GraphCompiler::new().compile(nodes, edges)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        FanOutMode, ImageRef, PromptRef, SelectionType, Step, StepKind, WaitMode,
    };
    use crate::graph::NodeKind;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn generator(id: &str) -> Node {
        Node::new(id, NodeKind::Generator)
            .with_param("generator", "flux")
            .with_param("prompt", "a lighthouse")
    }

    fn transform(id: &str, op: &str) -> Node {
        Node::new(id, NodeKind::Transform).with_param("operation", op)
    }

    fn save(id: &str) -> Node {
        Node::new(id, NodeKind::Save)
    }

    fn ordered_ids(compiled: &CompiledGraph) -> Vec<String> {
        compiled
            .pipeline
            .iter()
            .map(|s| s.node_id().to_string())
            .collect()
    }

    #[test]
    fn test_chain_compiles_in_dependency_order() {
        let nodes = vec![save("out"), transform("blur", "blur"), generator("gen")];
        let edges = vec![Edge::new("gen", "blur"), Edge::new("blur", "out")];

        let compiled = compile(&nodes, &edges).unwrap();

        assert_eq!(
            compiled.pipeline.kinds(),
            vec![StepKind::Generate, StepKind::Transform, StepKind::Save]
        );
        assert_eq!(compiled.node_vars.get("gen").map(String::as_str), Some("gen"));
        assert!(!compiled.node_vars.contains_key("out"));
    }

    #[test]
    fn test_generate_step_fields() {
        let compiled = compile(&[generator("gen")], &[]).unwrap();
        let Step::Generate(step) = &compiled.pipeline.steps[0] else {
            panic!("expected generate step");
        };

        assert_eq!(step.generator, "flux");
        assert_eq!(step.out, "gen");
        assert_eq!(step.params.get("prompt"), Some(&json!("a lighthouse")));
        assert!(!step.params.contains_key("generator"));
        assert!(step.deferred.is_empty());
    }

    #[test]
    fn test_shuffled_nodes_compile_identically() {
        let nodes = vec![
            Node::new("upload", NodeKind::Input),
            generator("gen"),
            transform("composite", "composite"),
            transform("sharpen", "sharpen"),
            save("out"),
        ];
        let edges = vec![
            Edge::new("upload", "composite").with_target_handle("base"),
            Edge::new("gen", "composite").with_target_handle("overlays[0]"),
            Edge::new("composite", "sharpen"),
            Edge::new("sharpen", "out"),
        ];
        let mut shuffled = nodes.clone();
        shuffled.rotate_left(2);
        shuffled.swap(0, 2);

        let first = compile(&nodes, &edges).unwrap();
        let second = compile(&shuffled, &edges).unwrap();

        assert_eq!(first, second);
        assert_eq!(ordered_ids(&first), vec!["gen", "composite", "sharpen", "out"]);
    }

    #[test]
    fn test_input_node_emits_no_step() {
        let nodes = vec![
            Node::new("upload", NodeKind::Input),
            transform("gray", "grayscale"),
        ];
        let edges = vec![Edge::new("upload", "gray").with_target_handle("image")];

        let compiled = compile(&nodes, &edges).unwrap();

        assert_eq!(compiled.pipeline.len(), 1);
        assert_eq!(compiled.node_vars.get("upload").map(String::as_str), Some("upload"));
        assert_eq!(compiled.pipeline.steps[0].primary_input(), Some("upload"));
    }

    #[test]
    fn test_transform_without_image_fails() {
        let nodes = vec![generator("gen"), transform("blur_1", "blur")];
        let edges = vec![Edge::new("gen", "blur_1").with_target_handle("text")];

        let err = compile(&nodes, &edges).unwrap_err();

        assert_eq!(err.code(), "MISSING_CONNECTION");
        assert_eq!(err.node_id(), Some("blur_1"));
        assert!(err
            .to_string()
            .contains("Transform node requires an input image connection"));
    }

    #[test]
    fn test_transform_with_two_primary_images_fails() {
        let nodes = vec![generator("a"), generator("b"), transform("t", "blur")];
        let edges = vec![Edge::new("a", "t"), Edge::new("b", "t").with_target_handle("image")];

        let err = compile(&nodes, &edges).unwrap_err();
        assert_eq!(err.code(), "DUPLICATE_PORT");
    }

    #[test]
    fn test_sparse_overlay_indices_are_preserved() {
        let nodes = vec![
            generator("bg"),
            generator("logo"),
            generator("badge"),
            transform("comp", "composite"),
        ];
        let edges = vec![
            Edge::new("badge", "comp").with_target_handle("overlays[5]"),
            Edge::new("bg", "comp").with_target_handle("base"),
            Edge::new("logo", "comp").with_target_handle("overlays[2]"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let step = compiled
            .pipeline
            .iter()
            .find(|s| s.kind() == StepKind::Transform)
            .unwrap();
        let deferred = step.deferred().unwrap();

        assert_eq!(deferred.overlay_indices(), vec![2, 5]);
        assert_eq!(
            deferred.overlays,
            vec![ImageRef::new("logo", 2), ImageRef::new("badge", 5)]
        );
        assert_eq!(step.primary_input(), Some("bg"));
    }

    #[test]
    fn test_references_keep_declaration_order() {
        let nodes = vec![
            generator("style_b"),
            generator("style_a"),
            Node::new("upload", NodeKind::Input),
            transform("restyle", "style-transfer"),
        ];
        let edges = vec![
            Edge::new("upload", "restyle"),
            Edge::new("style_b", "restyle").with_target_handle("references"),
            Edge::new("style_a", "restyle").with_target_handle("references"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let deferred = compiled.pipeline.steps.last().unwrap().deferred().unwrap().clone();

        assert_eq!(
            deferred.references,
            vec![ImageRef::new("style_b", 0), ImageRef::new("style_a", 1)]
        );
    }

    #[test]
    fn test_prompt_from_structured_field() {
        let nodes = vec![
            Node::new("upload", NodeKind::Input),
            Node::new("describe", NodeKind::Vision).with_param("provider", "gpt-vision"),
            generator("gen"),
        ];
        let edges = vec![
            Edge::new("upload", "describe"),
            Edge::new("describe", "gen")
                .with_source_handle("output.scene")
                .with_target_handle("text"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let deferred = compiled.pipeline.steps[1].deferred().unwrap();

        assert_eq!(
            deferred.prompt,
            Some(PromptRef::new("describe", Some("scene".to_string())))
        );
    }

    #[test]
    fn test_vision_requires_image() {
        let nodes = vec![Node::new("describe", NodeKind::Vision).with_param("provider", "v")];
        let err = compile(&nodes, &[]).unwrap_err();

        assert!(err
            .to_string()
            .contains("Vision node requires an input image connection"));
    }

    #[test]
    fn test_vision_image_with_context() {
        let nodes = vec![
            Node::new("upload", NodeKind::Input),
            Node::new("notes", NodeKind::Input),
            Node::new("describe", NodeKind::Vision).with_param("provider", "v"),
        ];
        let edges = vec![
            Edge::new("upload", "describe").with_target_handle("image"),
            Edge::new("notes", "describe").with_target_handle("context"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let Step::Vision(step) = &compiled.pipeline.steps[0] else {
            panic!("expected vision step");
        };
        assert_eq!(step.input, "upload");
        assert_eq!(step.context.as_deref(), Some("notes"));
        assert_eq!(compiled.pipeline.steps[0].inputs(), vec!["upload", "notes"]);
    }

    #[test]
    fn test_vision_lone_context_edge_is_the_image() {
        let nodes = vec![
            Node::new("upload", NodeKind::Input),
            Node::new("describe", NodeKind::Vision).with_param("provider", "v"),
        ];
        let edges = vec![Edge::new("upload", "describe").with_target_handle("context")];

        let compiled = compile(&nodes, &edges).unwrap();
        let Step::Vision(step) = &compiled.pipeline.steps[0] else {
            panic!("expected vision step");
        };
        assert_eq!(step.input, "upload");
        assert_eq!(step.context, None);
    }

    #[test]
    fn test_text_context_is_optional() {
        let nodes = vec![Node::new("write", NodeKind::Text).with_param("provider", "llm")];
        let compiled = compile(&nodes, &[]).unwrap();

        let Step::Text(step) = &compiled.pipeline.steps[0] else {
            panic!("expected text step");
        };
        assert_eq!(step.input, None);
        assert_eq!(step.provider, "llm");
    }

    #[test]
    fn test_missing_provider_param() {
        let nodes = vec![Node::new("gen", NodeKind::Generator)];
        let err = compile(&nodes, &[]).unwrap_err();

        assert_eq!(
            err,
            CompileError::MissingNodeParam {
                node_id: "gen".to_string(),
                parameter: "generator".to_string()
            }
        );
    }

    #[test]
    fn test_save_requires_input() {
        let err = compile(&[save("out")], &[]).unwrap_err();
        assert!(err.to_string().contains("Save node requires an input connection"));
    }

    #[test]
    fn test_save_defaults() {
        let nodes = vec![generator("gen"), save("out").with_param("destination", "s3://bucket")];
        let compiled = compile(&nodes, &[Edge::new("gen", "out")]).unwrap();
        let Step::Save(step) = &compiled.pipeline.steps[1] else {
            panic!("expected save step");
        };

        assert_eq!(step.destination, "s3://bucket");
        assert_eq!(step.provider, "local");
        assert_eq!(step.input, "gen");
    }

    #[test]
    fn test_fan_out_count_slots() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", 3),
        ];
        let compiled = compile(&nodes, &[Edge::new("gen", "split")]).unwrap();
        let Step::FanOut(step) = &compiled.pipeline.steps[1] else {
            panic!("expected fan-out step");
        };

        assert_eq!(step.mode, FanOutMode::Count);
        assert_eq!(step.out, vec!["split_0", "split_1", "split_2"]);
    }

    #[test]
    fn test_fan_out_array_requires_property() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut)
                .with_param("mode", "array")
                .with_param("count", 2),
        ];
        let err = compile(&nodes, &[Edge::new("gen", "split")]).unwrap_err();

        assert_eq!(
            err,
            CompileError::MissingNodeParam {
                node_id: "split".to_string(),
                parameter: "arrayProperty".to_string()
            }
        );
    }

    #[test]
    fn test_fan_out_invalid_count() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", 0),
        ];
        let err = compile(&nodes, &[Edge::new("gen", "split")]).unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE_PARAM");
    }

    #[test]
    fn test_fan_out_count_above_limit_is_rejected() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", u64::MAX),
        ];
        let err = compile(&nodes, &[Edge::new("gen", "split")]).unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE_PARAM");
        assert!(err.to_string().contains("up to 1024"));
    }

    #[test]
    fn test_router_output_count_above_limit_is_rejected() {
        let nodes = vec![
            Node::new("cands", NodeKind::Input),
            Node::new("judge", NodeKind::Input),
            Node::new("pick", NodeKind::Router).with_param("outputCount", 1025),
        ];
        let edges = vec![
            Edge::new("cands", "pick").with_target_handle("candidates"),
            Edge::new("judge", "pick").with_target_handle("selection"),
        ];
        let err = compile(&nodes, &edges).unwrap_err();
        assert_eq!(err.code(), "INVALID_NODE_PARAM");
    }

    #[test]
    fn test_fan_out_slot_source_handles() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", "2"),
            transform("blur", "blur"),
            transform("sharpen", "sharpen"),
            Node::new("join", NodeKind::Collect).with_param("waitMode", "available"),
        ];
        let edges = vec![
            Edge::new("gen", "split"),
            Edge::new("split", "blur").with_source_handle("out[0]"),
            Edge::new("split", "sharpen").with_source_handle("out[1]"),
            Edge::new("sharpen", "join").with_target_handle("in[1]"),
            Edge::new("blur", "join").with_target_handle("in[0]"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let blur = &compiled.pipeline.steps[compiled.pipeline.position_of("blur").unwrap()];
        let Step::Collect(join) = compiled.pipeline.steps.last().unwrap() else {
            panic!("expected collect step");
        };

        assert_eq!(blur.primary_input(), Some("split_0"));
        assert_eq!(join.inputs, vec!["blur", "sharpen"]);
        assert_eq!(join.wait_mode, WaitMode::Available);
    }

    #[test]
    fn test_fan_out_slot_out_of_range() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", 2),
            transform("blur", "blur"),
        ];
        let edges = vec![
            Edge::new("gen", "split"),
            Edge::new("split", "blur").with_source_handle("out[2]"),
        ];
        let err = compile(&nodes, &edges).unwrap_err();

        assert_eq!(err.code(), "INVALID_NODE_PARAM");
        assert_eq!(err.node_id(), Some("split"));
    }

    #[test]
    fn test_collect_duplicate_slot() {
        let nodes = vec![
            generator("a"),
            generator("b"),
            Node::new("join", NodeKind::Collect),
        ];
        let edges = vec![
            Edge::new("a", "join").with_target_handle("in[0]"),
            Edge::new("b", "join").with_target_handle("in[0]"),
        ];
        let err = compile(&nodes, &edges).unwrap_err();

        assert_eq!(
            err,
            CompileError::DuplicatePort {
                node_id: "join".to_string(),
                port: "in[0]".to_string()
            }
        );
    }

    #[test]
    fn test_router_requires_both_ports() {
        let nodes = vec![generator("a"), Node::new("pick", NodeKind::Router)];
        let edges = vec![Edge::new("a", "pick").with_target_handle("candidates")];
        let err = compile(&nodes, &edges).unwrap_err();

        assert_eq!(err.code(), "MISSING_CONNECTION");
        assert!(err.to_string().contains("selection"));
    }

    #[test]
    fn test_router_fields_and_context_output() {
        let nodes = vec![
            Node::new("cands", NodeKind::Input),
            Node::new("judge", NodeKind::Input),
            Node::new("pick", NodeKind::Router)
                .with_param("selectionType", "index")
                .with_param("selectionProperty", "best_index")
                .with_param("contextProperty", "reason")
                .with_param("outputCount", 2),
            Node::new("write", NodeKind::Text).with_param("provider", "llm"),
        ];
        let edges = vec![
            Edge::new("cands", "pick").with_target_handle("candidates"),
            Edge::new("judge", "pick").with_target_handle("selection"),
            Edge::new("pick", "write")
                .with_source_handle("context")
                .with_target_handle("text"),
        ];

        let compiled = compile(&nodes, &edges).unwrap();
        let Step::Router(router) = &compiled.pipeline.steps[0] else {
            panic!("expected router step");
        };

        assert_eq!(router.input, "cands");
        assert_eq!(router.selection_in, "judge");
        assert_eq!(router.selection_type, SelectionType::Index);
        assert_eq!(router.selection_property.as_deref(), Some("best_index"));
        assert_eq!(router.output_count, 2);
        assert_eq!(router.context_out.as_deref(), Some("pick_context"));
        assert_eq!(
            compiled.pipeline.steps[1].deferred().unwrap().prompt,
            Some(PromptRef::new("pick_context", None))
        );
    }

    #[test]
    fn test_variable_conflict_with_slot_name() {
        let nodes = vec![
            generator("gen"),
            Node::new("split", NodeKind::FanOut).with_param("count", 1),
            Node::new("split_0", NodeKind::Input),
        ];
        let err = compile(&nodes, &[Edge::new("gen", "split")]).unwrap_err();
        assert_eq!(err.code(), "VARIABLE_CONFLICT");
    }

    #[test]
    fn test_compile_graph_uses_graph_name() {
        let graph = Graph::new(vec![generator("gen")], Vec::new()).with_name("poster");
        let compiled = GraphCompiler::new().compile_graph(&graph).unwrap();
        assert_eq!(compiled.pipeline.name, "poster");

        let unnamed = Graph::new(vec![generator("gen")], Vec::new());
        let compiled = GraphCompiler::new()
            .with_pipeline_name("custom")
            .compile_graph(&unnamed)
            .unwrap();
        assert_eq!(compiled.pipeline.name, "custom");
    }
}
