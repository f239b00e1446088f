//! Executor configuration.

use serde::{Deserialize, Serialize};

fn default_image_mime() -> String {
    "image/png".to_string()
}

fn default_prompt_separator() -> String {
    "\n\n".to_string()
}

fn default_emit_events() -> bool {
    true
}

/// Runtime settings for [`PipelineExecutor`](super::PipelineExecutor).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutorConfig {
    /// MIME type given to images whose provider omitted one.
    #[serde(default = "default_image_mime")]
    pub default_image_mime: String,
    /// Joins `prePrompt` and the resolved prompt.
    #[serde(default = "default_prompt_separator")]
    pub prompt_separator: String,
    /// Whether lifecycle events are sent to the event sink.
    #[serde(default = "default_emit_events")]
    pub emit_events: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            default_image_mime: default_image_mime(),
            prompt_separator: default_prompt_separator(),
            emit_events: default_emit_events(),
        }
    }
}

impl ExecutorConfig {
    /// Sets the default image MIME type.
    #[must_use]
    pub fn with_default_image_mime(mut self, mime: impl Into<String>) -> Self {
        self.default_image_mime = mime.into();
        self
    }

    /// Sets the prompt separator.
    #[must_use]
    pub fn with_prompt_separator(mut self, separator: impl Into<String>) -> Self {
        self.prompt_separator = separator.into();
        self
    }

    /// Enables or disables event emission.
    #[must_use]
    pub fn with_emit_events(mut self, emit: bool) -> Self {
        self.emit_events = emit;
        self
    }
}
