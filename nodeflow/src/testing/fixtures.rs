//! Graph and registry fixtures.

use crate::core::{ImageArtifact, StepKind, VariableValue};
use crate::graph::{Edge, Graph, Node, NodeKind};
use crate::validation::{CapabilityRegistry, ParamSpec, ParamType, ProviderSchema};

/// Builds graphs node by node.
#[derive(Debug, Clone, Default)]
pub struct GraphFixture {
    name: Option<String>,
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

impl GraphFixture {
    /// Creates an empty fixture.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Names the graph.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Adds an arbitrary node.
    #[must_use]
    pub fn node(mut self, node: Node) -> Self {
        self.nodes.push(node);
        self
    }

    /// Adds an input node.
    #[must_use]
    pub fn input(self, id: &str) -> Self {
        self.node(Node::new(id, NodeKind::Input))
    }

    /// Adds a generator node with a static prompt.
    #[must_use]
    pub fn generator(self, id: &str, generator: &str, prompt: &str) -> Self {
        self.node(
            Node::new(id, NodeKind::Generator)
                .with_param("generator", generator)
                .with_param("prompt", prompt),
        )
    }

    /// Adds a transform node.
    #[must_use]
    pub fn transform(self, id: &str, operation: &str) -> Self {
        self.node(Node::new(id, NodeKind::Transform).with_param("operation", operation))
    }

    /// Adds a vision node.
    #[must_use]
    pub fn vision(self, id: &str, provider: &str) -> Self {
        self.node(Node::new(id, NodeKind::Vision).with_param("provider", provider))
    }

    /// Adds a text node.
    #[must_use]
    pub fn text(self, id: &str, provider: &str) -> Self {
        self.node(Node::new(id, NodeKind::Text).with_param("provider", provider))
    }

    /// Adds a save node with default destination and provider.
    #[must_use]
    pub fn save(self, id: &str) -> Self {
        self.node(Node::new(id, NodeKind::Save))
    }

    /// Adds a count-mode fan-out node.
    #[must_use]
    pub fn fan_out(self, id: &str, count: u64) -> Self {
        self.node(
            Node::new(id, NodeKind::FanOut)
                .with_param("mode", "count")
                .with_param("count", count),
        )
    }

    /// Adds a collect node.
    #[must_use]
    pub fn collect(self, id: &str, wait_mode: &str) -> Self {
        self.node(Node::new(id, NodeKind::Collect).with_param("waitMode", wait_mode))
    }

    /// Adds an index-mode router node reading `selection_property`.
    #[must_use]
    pub fn router(self, id: &str, selection_property: &str) -> Self {
        self.node(
            Node::new(id, NodeKind::Router)
                .with_param("selectionType", "index")
                .with_param("selectionProperty", selection_property),
        )
    }

    /// Connects two default ports.
    #[must_use]
    pub fn edge(mut self, source: &str, target: &str) -> Self {
        self.edges.push(Edge::new(source, target));
        self
    }

    /// Connects `source` to a named port of `target`.
    #[must_use]
    pub fn edge_to(mut self, source: &str, target: &str, target_handle: &str) -> Self {
        self.edges
            .push(Edge::new(source, target).with_target_handle(target_handle));
        self
    }

    /// Connects a named port of `source` to a named port of `target`.
    #[must_use]
    pub fn edge_between(
        mut self,
        source: &str,
        source_handle: &str,
        target: &str,
        target_handle: &str,
    ) -> Self {
        self.edges.push(
            Edge::new(source, target)
                .with_source_handle(source_handle)
                .with_target_handle(target_handle),
        );
        self
    }

    /// Builds the graph.
    #[must_use]
    pub fn build(self) -> Graph {
        let graph = Graph::new(self.nodes, self.edges);
        match self.name {
            Some(name) => graph.with_name(name),
            None => graph,
        }
    }
}

/// Returns a registry covering the providers used by the fixtures:
/// `flux` (generate), `blur` and `composite` (transform), `describe`
/// (vision), `writer` (text) and `local` (save, unchecked).
#[must_use]
pub fn sample_registry() -> CapabilityRegistry {
    CapabilityRegistry::from_schemas([
        ProviderSchema::new("flux")
            .for_kind(StepKind::Generate)
            .with_param("prompt", ParamSpec::new(ParamType::String).required())
            .with_param(
                "width",
                ParamSpec::new(ParamType::Integer).with_range(Some(64.0), Some(2048.0)),
            )
            .with_param(
                "height",
                ParamSpec::new(ParamType::Integer).with_range(Some(64.0), Some(2048.0)),
            )
            .with_param("seed", ParamSpec::new(ParamType::Integer))
            .with_param("referenceImages", ParamSpec::new(ParamType::Array)),
        ProviderSchema::new("blur")
            .for_kind(StepKind::Transform)
            .with_param(
                "radius",
                ParamSpec::new(ParamType::Number)
                    .required()
                    .with_range(Some(0.0), Some(100.0)),
            ),
        ProviderSchema::new("composite")
            .for_kind(StepKind::Transform)
            .with_param("overlays", ParamSpec::new(ParamType::Array).required())
            .with_param(
                "blendMode",
                ParamSpec::new(ParamType::String).with_enum(["normal", "multiply", "screen"]),
            ),
        ProviderSchema::new("describe")
            .for_kind(StepKind::Vision)
            .with_param("prompt", ParamSpec::new(ParamType::String)),
        ProviderSchema::new("writer")
            .for_kind(StepKind::Text)
            .with_param("prompt", ParamSpec::new(ParamType::String).required())
            .with_param(
                "temperature",
                ParamSpec::new(ParamType::Number).with_range(Some(0.0), Some(2.0)),
            ),
    ])
}

/// Returns an image value with the given bytes and no id or MIME type.
#[must_use]
pub fn image_value(bytes: &[u8]) -> VariableValue {
    VariableValue::Image(ImageArtifact::new(bytes.to_vec()))
}

/// Returns a text value.
#[must_use]
pub fn text_value(text: &str) -> VariableValue {
    VariableValue::text(text)
}
