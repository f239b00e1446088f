//! Runtime values bound to variables.

use serde::{Deserialize, Serialize};

/// An image produced by a provider or supplied by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageArtifact {
    /// Stable identifier. Assigned by the executor when a provider omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// MIME type. Defaulted by the executor when a provider omits it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    /// Encoded image bytes.
    #[serde(default, with = "crate::utils::base64_bytes")]
    pub data: Vec<u8>,
    /// Remote location, when the provider hosts the image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl ImageArtifact {
    /// Creates an image from raw bytes.
    #[must_use]
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: data.into(),
            ..Self::default()
        }
    }

    /// Sets the identifier.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sets the MIME type.
    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Sets the remote location.
    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }
}

/// A text or structured output, such as a vision description.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataArtifact {
    /// Raw text as returned by the provider.
    pub text: String,
}

impl DataArtifact {
    /// Creates a text artifact.
    #[must_use]
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }

    /// Creates an artifact holding serialized JSON.
    #[must_use]
    pub fn from_json(value: &serde_json::Value) -> Self {
        match value {
            serde_json::Value::String(s) => Self::new(s.clone()),
            other => Self::new(other.to_string()),
        }
    }

    /// Parses the text as JSON.
    ///
    /// A surrounding markdown code fence is tolerated, since language models
    /// frequently wrap structured output in one.
    #[must_use]
    pub fn json(&self) -> Option<serde_json::Value> {
        let trimmed = strip_code_fence(self.text.trim());
        serde_json::from_str(trimmed).ok()
    }

    /// Reads a field of the parsed JSON. Dotted paths descend into nested
    /// objects, numeric segments index arrays.
    #[must_use]
    pub fn field(&self, path: &str) -> Option<serde_json::Value> {
        self.json().and_then(|json| lookup_path(&json, path).cloned())
    }
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let body = match rest.find('\n') {
        Some(newline) => &rest[newline + 1..],
        None => rest,
    };
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Looks up a dotted path in a JSON value.
#[must_use]
pub fn lookup_path<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    path.split('.').try_fold(value, |current, segment| match current {
        serde_json::Value::Object(map) => map.get(segment),
        serde_json::Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// The value bound to a variable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum VariableValue {
    /// An image.
    Image(ImageArtifact),
    /// Text or structured data.
    Data(DataArtifact),
    /// An ordered list, produced by fan-out, collect and multi-output steps.
    List(Vec<VariableValue>),
}

impl VariableValue {
    /// Wraps text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Data(DataArtifact::new(text))
    }

    /// Wraps a JSON value as structured data.
    #[must_use]
    pub fn json(value: &serde_json::Value) -> Self {
        Self::Data(DataArtifact::from_json(value))
    }

    /// Wraps image bytes.
    #[must_use]
    pub fn image(data: impl Into<Vec<u8>>) -> Self {
        Self::Image(ImageArtifact::new(data))
    }

    /// Returns a short name for the value's shape.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Image(_) => "an image",
            Self::Data(_) => "text data",
            Self::List(_) => "a list",
        }
    }

    /// Returns the image, if this is one.
    #[must_use]
    pub fn as_image(&self) -> Option<&ImageArtifact> {
        match self {
            Self::Image(image) => Some(image),
            _ => None,
        }
    }

    /// Returns the data artifact, if this is one.
    #[must_use]
    pub fn as_data(&self) -> Option<&DataArtifact> {
        match self {
            Self::Data(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the list items, if this is a list.
    #[must_use]
    pub fn as_list(&self) -> Option<&[VariableValue]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    /// Returns the textual content: the text of a data artifact, or the
    /// newline-joined text of every data item in a list.
    #[must_use]
    pub fn text_content(&self) -> Option<String> {
        match self {
            Self::Data(data) => Some(data.text.clone()),
            Self::Image(_) => None,
            Self::List(items) => {
                let parts: Vec<String> = items.iter().filter_map(Self::text_content).collect();
                if parts.is_empty() {
                    None
                } else {
                    Some(parts.join("\n"))
                }
            }
        }
    }

    /// Returns the parsed structured content.
    ///
    /// Lists become JSON arrays of their items' structured content, with
    /// non-JSON text kept as strings.
    #[must_use]
    pub fn structured(&self) -> Option<serde_json::Value> {
        match self {
            Self::Data(data) => data.json(),
            Self::Image(_) => None,
            Self::List(items) => Some(serde_json::Value::Array(
                items
                    .iter()
                    .map(|item| match item {
                        Self::Data(data) => data
                            .json()
                            .unwrap_or_else(|| serde_json::Value::String(data.text.clone())),
                        other => other.structured().unwrap_or(serde_json::Value::Null),
                    })
                    .collect(),
            )),
        }
    }

    /// Returns true if this value matches a router selection value.
    ///
    /// Data matches on parsed JSON equality or trimmed text equality; images
    /// match on their identifier.
    #[must_use]
    pub fn matches_selection(&self, target: &serde_json::Value) -> bool {
        match self {
            Self::Data(data) => {
                if data.json().as_ref() == Some(target) {
                    return true;
                }
                match target {
                    serde_json::Value::String(s) => data.text.trim() == s.trim(),
                    other => data.text.trim() == other.to_string(),
                }
            }
            Self::Image(image) => match (image.id.as_deref(), target.as_str()) {
                (Some(id), Some(wanted)) => id == wanted,
                _ => false,
            },
            Self::List(_) => false,
        }
    }

    /// Visits every image leaf, depth first.
    pub fn images_mut(&mut self) -> Vec<&mut ImageArtifact> {
        match self {
            Self::Image(image) => vec![image],
            Self::Data(_) => Vec::new(),
            Self::List(items) => items.iter_mut().flat_map(Self::images_mut).collect(),
        }
    }

    /// Returns every image leaf, depth first.
    #[must_use]
    pub fn images(&self) -> Vec<&ImageArtifact> {
        match self {
            Self::Image(image) => vec![image],
            Self::Data(_) => Vec::new(),
            Self::List(items) => items.iter().flat_map(Self::images).collect(),
        }
    }
}

impl From<ImageArtifact> for VariableValue {
    fn from(image: ImageArtifact) -> Self {
        Self::Image(image)
    }
}

impl From<DataArtifact> for VariableValue {
    fn from(data: DataArtifact) -> Self {
        Self::Data(data)
    }
}
