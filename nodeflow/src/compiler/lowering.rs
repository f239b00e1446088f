//! Per-kind lowering of nodes into steps.

use crate::core::{
    CollectStep, DeferredRefs, FanOutMode, FanOutStep, GenerateStep, ImageRef, Params, PromptRef,
    RouterStep, SaveStep, SelectionType, Step, TextStep, TransformStep, VisionStep, WaitMode,
};
use crate::errors::CompileError;
use crate::graph::{Edge, GraphIndex, Node, NodeKind, SourcePort, TargetPort};

const DEFAULT_SAVE_DESTINATION: &str = "gallery";
const DEFAULT_SAVE_PROVIDER: &str = "local";
/// Upper bound for fan-out `count` and router `outputCount`.
pub(crate) const MAX_FAN_WIDTH: usize = 1024;

/// Lowering context for one node.
pub(super) struct Lowering<'i, 'a> {
    pub(super) index: &'i GraphIndex<'a>,
    pub(super) position: usize,
}

impl<'i, 'a> Lowering<'i, 'a> {
    fn node(&self) -> &'a Node {
        self.index.node(self.position)
    }

    /// Lowers the node into zero or one step.
    pub(super) fn lower(&self) -> Result<Option<Step>, CompileError> {
        let node = self.node();
        let step = match node.kind {
            NodeKind::Input => return Ok(None),
            NodeKind::Generator => self.generate()?,
            NodeKind::Transform => self.transform()?,
            NodeKind::Save => self.save()?,
            NodeKind::Vision => self.vision()?,
            NodeKind::Text => self.text()?,
            NodeKind::FanOut => self.fan_out()?,
            NodeKind::Collect => self.collect()?,
            NodeKind::Router => self.router()?,
        };
        Ok(Some(step))
    }

    fn generate(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let (key, generator) = required_str(node, &["generator", "provider"])?;
        Ok(Step::Generate(GenerateStep {
            generator: generator.to_string(),
            params: params_without(node, &[key]),
            deferred: self.deferred()?,
            out: node.id.clone(),
        }))
    }

    fn transform(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let (key, op) = required_str(node, &["operation", "op"])?;
        let input = self
            .single_input(TargetPort::is_primary_image, "image")?
            .ok_or_else(|| missing_connection(node, "Transform node requires an input image connection"))?;
        Ok(Step::Transform(TransformStep {
            op: op.to_string(),
            input,
            params: params_without(node, &[key]),
            deferred: self.deferred()?,
            out: node.id.clone(),
        }))
    }

    fn save(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let input = self
            .single_input(|_| true, "in")?
            .ok_or_else(|| missing_connection(node, "Save node requires an input connection"))?;
        Ok(Step::Save(SaveStep {
            node_id: node.id.clone(),
            input,
            destination: node
                .param_str("destination")
                .unwrap_or(DEFAULT_SAVE_DESTINATION)
                .to_string(),
            provider: node
                .param_str("provider")
                .unwrap_or(DEFAULT_SAVE_PROVIDER)
                .to_string(),
            params: params_without(node, &["destination", "provider"]),
        }))
    }

    fn vision(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let (key, provider) = required_str(node, &["provider"])?;
        let image = self.single_input(TargetPort::is_primary_image, "image")?;
        let context = self.single_input(|port| *port == TargetPort::Context, "context")?;
        // A lone context edge carries the image.
        let (input, context) = match (image, context) {
            (Some(image), context) => (image, context),
            (None, Some(context)) => (context, None),
            (None, None) => {
                return Err(missing_connection(
                    node,
                    "Vision node requires an input image connection",
                ))
            }
        };
        Ok(Step::Vision(VisionStep {
            provider: provider.to_string(),
            input,
            context,
            params: params_without(node, &[key]),
            deferred: self.deferred()?,
            out: node.id.clone(),
        }))
    }

    fn text(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let (key, provider) = required_str(node, &["provider"])?;
        let input = self.single_input(
            |port| matches!(port, TargetPort::Context | TargetPort::Default),
            "context",
        )?;
        Ok(Step::Text(TextStep {
            provider: provider.to_string(),
            input,
            params: params_without(node, &[key]),
            deferred: self.deferred()?,
            out: node.id.clone(),
        }))
    }

    fn fan_out(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let input = self
            .single_input(|_| true, "in")?
            .ok_or_else(|| missing_connection(node, "Fan-out node requires an input connection"))?;
        let mode = match node.param_str("mode") {
            None | Some("count") => FanOutMode::Count,
            Some("array") => FanOutMode::Array,
            Some(other) => {
                return Err(invalid_param(
                    node,
                    "mode",
                    format!("expected 'count' or 'array', got '{other}'"),
                ))
            }
        };
        let count = fan_out_count(node)?;
        let array_property = match mode {
            FanOutMode::Array => Some(
                node.first_param_str(&["arrayProperty", "array_property"])
                    .map(|(_, property)| property.to_string())
                    .ok_or_else(|| CompileError::MissingNodeParam {
                        node_id: node.id.clone(),
                        parameter: "arrayProperty".to_string(),
                    })?,
            ),
            FanOutMode::Count => None,
        };
        Ok(Step::FanOut(FanOutStep {
            node_id: node.id.clone(),
            input,
            mode,
            count,
            array_property,
            out: (0..count).map(|i| slot_variable(&node.id, i)).collect(),
        }))
    }

    fn collect(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let mut slotted: Vec<(usize, String)> = Vec::new();
        let mut unslotted: Vec<String> = Vec::new();
        for (edge_index, edge) in self.index.incoming(self.position) {
            let variable = self.source_variable(edge_index, edge)?;
            match TargetPort::parse(edge.target_handle.as_deref()) {
                TargetPort::Slot(slot) => {
                    if slotted.iter().any(|(existing, _)| *existing == slot) {
                        return Err(CompileError::DuplicatePort {
                            node_id: node.id.clone(),
                            port: format!("in[{slot}]"),
                        });
                    }
                    slotted.push((slot, variable));
                }
                _ => unslotted.push(variable),
            }
        }
        if slotted.is_empty() && unslotted.is_empty() {
            return Err(missing_connection(
                node,
                "Collect node requires at least one input connection",
            ));
        }
        slotted.sort_by_key(|(slot, _)| *slot);

        let wait_mode = match node.param_str("waitMode") {
            None | Some("all") => WaitMode::All,
            Some("available") => WaitMode::Available,
            Some(other) => {
                return Err(invalid_param(
                    node,
                    "waitMode",
                    format!("expected 'all' or 'available', got '{other}'"),
                ))
            }
        };

        Ok(Step::Collect(CollectStep {
            inputs: slotted
                .into_iter()
                .map(|(_, variable)| variable)
                .chain(unslotted)
                .collect(),
            wait_mode,
            out: node.id.clone(),
        }))
    }

    fn router(&self) -> Result<Step, CompileError> {
        let node = self.node();
        let input = self
            .single_input(|port| *port == TargetPort::Candidates, "candidates")?
            .ok_or_else(|| missing_connection(node, "Router node requires a candidates connection"))?;
        let selection_in = self
            .single_input(|port| *port == TargetPort::Selection, "selection")?
            .ok_or_else(|| missing_connection(node, "Router node requires a selection connection"))?;
        let selection_type = match node.param_str("selectionType") {
            None | Some("index") => SelectionType::Index,
            Some("value") => SelectionType::Value,
            Some(other) => {
                return Err(invalid_param(
                    node,
                    "selectionType",
                    format!("expected 'index' or 'value', got '{other}'"),
                ))
            }
        };
        let output_count = optional_positive_int(node, "outputCount")?.unwrap_or(1);
        let context_property = node.param_str("contextProperty").map(str::to_string);
        Ok(Step::Router(RouterStep {
            input,
            selection_in,
            selection_type,
            selection_property: node.param_str("selectionProperty").map(str::to_string),
            output_count,
            context_out: context_property.as_ref().map(|_| context_variable(&node.id)),
            context_property,
            out: node.id.clone(),
        }))
    }

    /// Resolves the single edge on the ports accepted by `accepts`.
    fn single_input(
        &self,
        accepts: impl Fn(&TargetPort) -> bool,
        port_name: &str,
    ) -> Result<Option<String>, CompileError> {
        let mut matching = self
            .index
            .incoming(self.position)
            .filter(|(_, edge)| accepts(&TargetPort::parse(edge.target_handle.as_deref())));
        let Some((edge_index, first)) = matching.next() else {
            return Ok(None);
        };
        if matching.next().is_some() {
            return Err(CompileError::DuplicatePort {
                node_id: self.node().id.clone(),
                port: port_name.to_string(),
            });
        }
        self.source_variable(edge_index, first).map(Some)
    }

    /// Builds the deferred markers from the text, references and overlay
    /// ports.
    fn deferred(&self) -> Result<DeferredRefs, CompileError> {
        let node = self.node();
        let mut deferred = DeferredRefs::default();
        for (edge_index, edge) in self.index.incoming(self.position) {
            match TargetPort::parse(edge.target_handle.as_deref()) {
                TargetPort::Text => {
                    if deferred.prompt.is_some() {
                        return Err(CompileError::DuplicatePort {
                            node_id: node.id.clone(),
                            port: "text".to_string(),
                        });
                    }
                    let field = SourcePort::parse(edge.source_handle.as_deref()).field();
                    deferred.prompt = Some(PromptRef::new(self.source_variable(edge_index, edge)?, field));
                }
                TargetPort::References => {
                    let position = deferred.references.len();
                    deferred
                        .references
                        .push(ImageRef::new(self.source_variable(edge_index, edge)?, position));
                }
                TargetPort::Overlay(index) => {
                    if deferred.overlays.iter().any(|o| o.index == index) {
                        return Err(CompileError::DuplicatePort {
                            node_id: node.id.clone(),
                            port: format!("overlays[{index}]"),
                        });
                    }
                    deferred
                        .overlays
                        .push(ImageRef::new(self.source_variable(edge_index, edge)?, index));
                }
                _ => {}
            }
        }
        deferred.overlays.sort_by_key(|o| o.index);
        Ok(deferred)
    }

    /// Names the variable an edge reads.
    fn source_variable(&self, edge_index: usize, edge: &Edge) -> Result<String, CompileError> {
        let Some(source) = self.index.node_by_id(&edge.source) else {
            return Err(CompileError::UnknownNodeReference {
                node_id: edge.source.clone(),
                edge_index,
            });
        };
        let port = SourcePort::parse(edge.source_handle.as_deref());
        match (source.kind, port) {
            (NodeKind::Save, _) => Err(missing_connection(
                self.node(),
                &format!("Node '{}' is a save node and has no output to connect", source.id),
            )),
            (NodeKind::FanOut, SourcePort::Slot(slot)) => {
                let count = fan_out_count(source)?;
                if slot >= count {
                    return Err(invalid_param(
                        source,
                        "count",
                        format!("slot out[{slot}] is out of range for {count} slot(s)"),
                    ));
                }
                Ok(slot_variable(&source.id, slot))
            }
            (NodeKind::Router, SourcePort::Context) => {
                if source.param_str("contextProperty").is_none() {
                    return Err(CompileError::MissingNodeParam {
                        node_id: source.id.clone(),
                        parameter: "contextProperty".to_string(),
                    });
                }
                Ok(context_variable(&source.id))
            }
            _ => Ok(source.id.clone()),
        }
    }
}

/// Variable name of fan-out slot `i`.
pub(super) fn slot_variable(node_id: &str, slot: usize) -> String {
    format!("{node_id}_{slot}")
}

fn context_variable(node_id: &str) -> String {
    format!("{node_id}_context")
}

fn missing_connection(node: &Node, message: &str) -> CompileError {
    CompileError::MissingConnection {
        node_id: node.id.clone(),
        message: message.to_string(),
    }
}

fn invalid_param(node: &Node, parameter: &str, reason: String) -> CompileError {
    CompileError::InvalidNodeParam {
        node_id: node.id.clone(),
        parameter: parameter.to_string(),
        reason,
    }
}

fn required_str<'a>(node: &'a Node, keys: &[&'a str]) -> Result<(&'a str, &'a str), CompileError> {
    node.first_param_str(keys)
        .ok_or_else(|| CompileError::MissingNodeParam {
            node_id: node.id.clone(),
            parameter: keys.first().copied().unwrap_or_default().to_string(),
        })
}

fn fan_out_count(node: &Node) -> Result<usize, CompileError> {
    optional_positive_int(node, "count")?.ok_or_else(|| CompileError::MissingNodeParam {
        node_id: node.id.clone(),
        parameter: "count".to_string(),
    })
}

/// Reads a positive integer no larger than [`MAX_FAN_WIDTH`], given as a JSON
/// integer or a numeric string.
fn optional_positive_int(node: &Node, key: &str) -> Result<Option<usize>, CompileError> {
    let Some(value) = node.param(key) else {
        return Ok(None);
    };
    let parsed = match value {
        serde_json::Value::Number(n) => n.as_u64(),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed.and_then(|n| usize::try_from(n).ok()) {
        Some(n) if (1..=MAX_FAN_WIDTH).contains(&n) => Ok(Some(n)),
        _ => Err(invalid_param(
            node,
            key,
            format!("expected a positive integer up to {MAX_FAN_WIDTH}, got {value}"),
        )),
    }
}

fn params_without(node: &Node, keys: &[&str]) -> Params {
    node.parameters
        .iter()
        .filter(|(key, _)| !keys.contains(&key.as_str()))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect()
}
