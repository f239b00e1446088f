//! Mock step runners for testing.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;

use crate::core::{ImageArtifact, StepKind, VariableValue};
use crate::executor::{StepOutput, StepRequest, StepRunner};

/// A runner that records every request and answers from a script.
///
/// Nodes without a scripted answer get a default output by kind: an image
/// whose bytes spell `provider:node` for generate and transform, text for
/// vision and text, and nothing for save.
#[derive(Debug, Default)]
pub struct MockStepRunner {
    outputs: Mutex<HashMap<String, StepOutput>>,
    failures: Mutex<HashMap<String, String>>,
    requests: Mutex<Vec<StepRequest>>,
}

impl MockStepRunner {
    /// Creates a runner with default outputs only.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Scripts the output of one node.
    #[must_use]
    pub fn with_output(self, node_id: impl Into<String>, output: impl Into<StepOutput>) -> Self {
        self.outputs.lock().insert(node_id.into(), output.into());
        self
    }

    /// Scripts a text output for one node.
    #[must_use]
    pub fn with_text(self, node_id: impl Into<String>, text: impl Into<String>) -> Self {
        self.with_output(node_id, VariableValue::text(text))
    }

    /// Scripts a failure for one node.
    #[must_use]
    pub fn with_failure(self, node_id: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.lock().insert(node_id.into(), message.into());
        self
    }

    /// Returns every request received, in call order.
    #[must_use]
    pub fn requests(&self) -> Vec<StepRequest> {
        self.requests.lock().clone()
    }

    /// Returns the request received for one node.
    #[must_use]
    pub fn request_for(&self, node_id: &str) -> Option<StepRequest> {
        self.requests.lock().iter().find(|r| r.node_id == node_id).cloned()
    }

    /// Returns the node ids called, in call order.
    #[must_use]
    pub fn called_nodes(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.node_id.clone()).collect()
    }

    /// Returns the number of calls.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }

    /// Forgets recorded requests.
    pub fn reset(&self) {
        self.requests.lock().clear();
    }

    fn default_output(request: &StepRequest) -> StepOutput {
        match request.kind {
            StepKind::Generate | StepKind::Transform => {
                let bytes = format!("{}:{}", request.provider, request.node_id).into_bytes();
                StepOutput::from(ImageArtifact::new(bytes))
            }
            StepKind::Vision | StepKind::Text => StepOutput::from(VariableValue::text(format!(
                "{} output for {}",
                request.provider, request.node_id
            ))),
            _ => StepOutput::Empty,
        }
    }
}

#[async_trait]
impl StepRunner for MockStepRunner {
    async fn run(&self, request: StepRequest) -> anyhow::Result<StepOutput> {
        self.requests.lock().push(request.clone());

        if let Some(message) = self.failures.lock().get(&request.node_id) {
            anyhow::bail!("{message}");
        }
        let scripted = self.outputs.lock().get(&request.node_id).cloned();
        Ok(scripted.unwrap_or_else(|| Self::default_output(&request)))
    }
}

/// A runner that fails every call.
#[derive(Debug, Clone)]
pub struct FailingStepRunner {
    message: String,
}

impl FailingStepRunner {
    /// Creates a failing runner.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl Default for FailingStepRunner {
    fn default() -> Self {
        Self::new("provider unavailable")
    }
}

#[async_trait]
impl StepRunner for FailingStepRunner {
    async fn run(&self, request: StepRequest) -> anyhow::Result<StepOutput> {
        anyhow::bail!("{} ({})", self.message, request.provider)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Params;

    fn request(node_id: &str, kind: StepKind) -> StepRequest {
        StepRequest {
            step_index: 0,
            node_id: node_id.to_string(),
            kind,
            provider: "flux".to_string(),
            params: Params::new(),
            input: None,
            context: None,
            reference_images: Vec::new(),
            overlays: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_mock_runner_defaults_and_script() {
        let runner = MockStepRunner::new().with_text("caption", "a red fox");

        let image = runner.run(request("gen", StepKind::Generate)).await.unwrap();
        let text = runner.run(request("caption", StepKind::Vision)).await.unwrap();
        let save = runner.run(request("out", StepKind::Save)).await.unwrap();

        assert_eq!(
            image.into_value().and_then(|v| v.as_image().map(|i| i.data.clone())),
            Some(b"flux:gen".to_vec())
        );
        assert_eq!(text.into_value(), Some(VariableValue::text("a red fox")));
        assert_eq!(save, StepOutput::Empty);
        assert_eq!(runner.called_nodes(), vec!["gen", "caption", "out"]);
    }

    #[tokio::test]
    async fn test_mock_runner_failure() {
        let runner = MockStepRunner::new().with_failure("gen", "quota exceeded");
        let err = runner.run(request("gen", StepKind::Generate)).await.unwrap_err();

        assert_eq!(err.to_string(), "quota exceeded");
        assert_eq!(runner.call_count(), 1);
        assert!(runner.request_for("gen").is_some());
    }

    #[tokio::test]
    async fn test_failing_runner() {
        let err = FailingStepRunner::default()
            .run(request("gen", StepKind::Generate))
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "provider unavailable (flux)");
    }

    #[test]
    fn test_reset_clears_recorded_requests() {
        let runner = MockStepRunner::new();
        tokio_test::block_on(runner.run(request("gen", StepKind::Generate))).unwrap();
        assert_eq!(runner.call_count(), 1);

        runner.reset();
        assert_eq!(runner.call_count(), 0);
        assert!(runner.requests().is_empty());
    }
}
