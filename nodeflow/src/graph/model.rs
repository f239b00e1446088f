//! Node, edge and graph documents.

use crate::core::Params;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The kind tag of a graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NodeKind {
    /// Externally supplied value, such as an uploaded image.
    Input,
    /// Image generation.
    #[serde(alias = "generate")]
    Generator,
    /// Image transform.
    Transform,
    /// Persist an upstream value.
    Save,
    /// Image understanding.
    Vision,
    /// Text generation.
    Text,
    /// Split one value into slots.
    #[serde(alias = "fanOut", alias = "fan_out")]
    FanOut,
    /// Join several values into a list.
    Collect,
    /// Data-driven selection.
    Router,
}

impl NodeKind {
    /// Returns true if nodes of this kind bind a variable named by their id.
    #[must_use]
    pub fn produces_variable(&self) -> bool {
        !matches!(self, Self::Save)
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Input => "input",
            Self::Generator => "generator",
            Self::Transform => "transform",
            Self::Save => "save",
            Self::Vision => "vision",
            Self::Text => "text",
            Self::FanOut => "fan-out",
            Self::Collect => "collect",
            Self::Router => "router",
        };
        write!(f, "{name}")
    }
}

/// A node of the workflow graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    /// Unique node id.
    pub id: String,
    /// Kind tag.
    #[serde(alias = "type")]
    pub kind: NodeKind,
    /// Arbitrary node parameters.
    #[serde(default, alias = "data", alias = "params")]
    pub parameters: Params,
}

impl Node {
    /// Creates a node without parameters.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            parameters: Params::new(),
        }
    }

    /// Adds a parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Returns a parameter value. JSON `null` counts as absent.
    #[must_use]
    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.parameters.get(key).filter(|v| !v.is_null())
    }

    /// Returns a non-empty string parameter.
    #[must_use]
    pub fn param_str(&self, key: &str) -> Option<&str> {
        self.param(key)
            .and_then(serde_json::Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the first non-empty string parameter among `keys`, with the
    /// key it was found under.
    #[must_use]
    pub fn first_param_str<'a>(&'a self, keys: &[&'a str]) -> Option<(&'a str, &'a str)> {
        keys.iter()
            .find_map(|key| self.param_str(key).map(|value| (*key, value)))
    }
}

/// A directed connection between two node ports.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Source port; absent means the node's default output.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    /// Target port; absent means the node's default input.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<String>,
}

impl Edge {
    /// Creates an edge between default ports.
    #[must_use]
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            source_handle: None,
            target_handle: None,
        }
    }

    /// Sets the source port.
    #[must_use]
    pub fn with_source_handle(mut self, handle: impl Into<String>) -> Self {
        self.source_handle = Some(handle.into());
        self
    }

    /// Sets the target port.
    #[must_use]
    pub fn with_target_handle(mut self, handle: impl Into<String>) -> Self {
        self.target_handle = Some(handle.into());
        self
    }
}

/// A complete graph document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Graph {
    /// Optional name used for the compiled pipeline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Nodes in document order.
    #[serde(default)]
    pub nodes: Vec<Node>,
    /// Edges in declaration order.
    #[serde(default)]
    pub edges: Vec<Edge>,
}

impl Graph {
    /// Creates a graph from nodes and edges.
    #[must_use]
    pub fn new(nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        Self {
            name: None,
            nodes,
            edges,
        }
    }

    /// Sets the graph name.
    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Parses a graph document.
    ///
    /// # Errors
    ///
    /// Returns the deserialization error for malformed documents.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes the graph document.
    ///
    /// # Errors
    ///
    /// Returns the serialization error, which only occurs for non-string map keys.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
