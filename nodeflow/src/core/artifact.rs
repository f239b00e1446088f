//! Artifact records produced by a run.

use super::ImageArtifact;
use serde::{Deserialize, Serialize};

/// A provider output recorded in step completion order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducedArtifact {
    /// Stable identifier.
    pub id: String,
    /// Index of the producing step.
    pub step_index: usize,
    /// Node the producing step was compiled from.
    pub node_id: String,
    /// Variable the artifact is bound to.
    pub variable: String,
    /// MIME type.
    pub mime_type: String,
    /// Binary payload.
    #[serde(with = "crate::utils::base64_bytes")]
    pub data: Vec<u8>,
    /// Remote location, when the provider hosts the payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// When the artifact was recorded (ISO 8601).
    pub created_at: String,
}

impl ProducedArtifact {
    /// Records an image produced by a step.
    ///
    /// The image must already carry its id and MIME type; the executor fills
    /// both before recording.
    #[must_use]
    pub fn from_image(
        step_index: usize,
        node_id: impl Into<String>,
        variable: impl Into<String>,
        image: &ImageArtifact,
    ) -> Self {
        let variable = variable.into();
        Self {
            id: image
                .id
                .clone()
                .unwrap_or_else(|| crate::utils::content_id(&variable, &image.data)),
            step_index,
            node_id: node_id.into(),
            variable,
            mime_type: image.mime_type.clone().unwrap_or_default(),
            data: image.data.clone(),
            url: image.url.clone(),
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Records a text output produced by a step.
    #[must_use]
    pub fn from_text(
        step_index: usize,
        node_id: impl Into<String>,
        variable: impl Into<String>,
        text: &str,
    ) -> Self {
        let variable = variable.into();
        Self {
            id: crate::utils::content_id(&variable, text.as_bytes()),
            step_index,
            node_id: node_id.into(),
            variable,
            mime_type: "text/plain".to_string(),
            data: text.as_bytes().to_vec(),
            url: None,
            created_at: crate::utils::iso_timestamp(),
        }
    }

    /// Returns the payload size in bytes.
    #[must_use]
    pub fn size(&self) -> usize {
        self.data.len()
    }
}
