//! Port (handle) identifiers.
//!
//! Handles are free-form strings on edges. They are parsed once into typed
//! ports so lowering code can match exhaustively.

/// An input port on the target side of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetPort {
    /// No handle: the node's single default input.
    Default,
    /// `image`.
    Image,
    /// `base`, the background of a composite.
    Base,
    /// `text`: prompt read from another step's output.
    Text,
    /// `references`: multi-edge reference images.
    References,
    /// `context`: optional auxiliary input.
    Context,
    /// `candidates`: router candidate list.
    Candidates,
    /// `selection`: router selection value.
    Selection,
    /// `overlays[i]`: indexed overlay image.
    Overlay(usize),
    /// `in[k]`: indexed collect slot.
    Slot(usize),
    /// Any other handle.
    Other(String),
}

impl TargetPort {
    /// Parses a target handle.
    #[must_use]
    pub fn parse(handle: Option<&str>) -> Self {
        let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) else {
            return Self::Default;
        };
        match handle {
            "default" | "input" | "in" => Self::Default,
            "image" => Self::Image,
            "base" => Self::Base,
            "text" | "prompt" => Self::Text,
            "references" | "reference" => Self::References,
            "context" => Self::Context,
            "candidates" => Self::Candidates,
            "selection" => Self::Selection,
            _ => indexed(handle, &["overlays", "overlay"])
                .map(Self::Overlay)
                .or_else(|| indexed(handle, &["in", "inputs"]).map(Self::Slot))
                .unwrap_or_else(|| Self::Other(handle.to_string())),
        }
    }

    /// Returns true for ports that carry a transform's primary image.
    #[must_use]
    pub fn is_primary_image(&self) -> bool {
        matches!(self, Self::Default | Self::Image | Self::Base)
    }
}

/// An output port on the source side of an edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourcePort {
    /// No handle: the node's default output.
    Default,
    /// `out[i]`: a fan-out slot.
    Slot(usize),
    /// `output.<field>`: a structured-output field.
    Field(String),
    /// `context`: a router's extracted context value.
    Context,
    /// Any other handle.
    Other(String),
}

impl SourcePort {
    /// Parses a source handle.
    #[must_use]
    pub fn parse(handle: Option<&str>) -> Self {
        let Some(handle) = handle.map(str::trim).filter(|h| !h.is_empty()) else {
            return Self::Default;
        };
        if matches!(handle, "default" | "output" | "out") {
            return Self::Default;
        }
        if handle == "context" {
            return Self::Context;
        }
        if let Some(field) = handle.strip_prefix("output.").filter(|f| !f.is_empty()) {
            return Self::Field(field.to_string());
        }
        indexed(handle, &["out", "output"])
            .map(Self::Slot)
            .unwrap_or_else(|| Self::Other(handle.to_string()))
    }

    /// Returns the structured-output field, if the handle names one.
    #[must_use]
    pub fn field(&self) -> Option<String> {
        match self {
            Self::Field(field) => Some(field.clone()),
            _ => None,
        }
    }
}

/// Parses `name[n]` for any of the given names.
fn indexed(handle: &str, names: &[&str]) -> Option<usize> {
    names.iter().find_map(|name| {
        handle
            .strip_prefix(name)?
            .strip_prefix('[')?
            .strip_suffix(']')?
            .trim()
            .parse()
            .ok()
    })
}
