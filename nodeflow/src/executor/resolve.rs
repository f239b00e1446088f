//! Resolution of deferred markers into provider inputs.

use super::runner::ResolvedOverlay;
use super::store::VariableStore;
use crate::core::{
    lookup_path, DeferredRefs, ImageArtifact, ImageRef, Params, PromptRef, StepKind, VariableValue,
    INTERNAL_PARAM_PREFIX,
};
use crate::errors::{ExecutionError, ImagePort, MissingImage};

/// Parameter prepended to a resolved prompt.
pub(super) const PRE_PROMPT_PARAM: &str = "prePrompt";
const PROMPT_PARAM: &str = "prompt";
const OVERLAYS_PARAM: &str = "overlays";

/// Identifies the running step for error attribution.
#[derive(Debug, Clone, Copy)]
pub(super) struct StepScope<'a> {
    pub(super) index: usize,
    pub(super) node_id: &'a str,
    pub(super) kind: StepKind,
}

impl StepScope<'_> {
    /// Reads a variable that must exist.
    pub(super) fn read<'s>(
        &self,
        store: &'s VariableStore,
        name: &str,
    ) -> Result<&'s VariableValue, ExecutionError> {
        store.get(name).ok_or_else(|| ExecutionError::MissingVariable {
            step_index: self.index,
            node_id: self.node_id.to_string(),
            kind: self.kind,
            name: name.to_string(),
        })
    }

    pub(super) fn unexpected(
        &self,
        name: &str,
        expected: &'static str,
        found: &'static str,
    ) -> ExecutionError {
        ExecutionError::UnexpectedValue {
            step_index: self.index,
            node_id: self.node_id.to_string(),
            kind: self.kind,
            name: name.to_string(),
            expected,
            found,
        }
    }

    pub(super) fn missing_field(&self, name: &str, field: &str) -> ExecutionError {
        ExecutionError::MissingField {
            step_index: self.index,
            node_id: self.node_id.to_string(),
            kind: self.kind,
            name: name.to_string(),
            field: field.to_string(),
        }
    }

    /// Reads a field of a variable's structured content.
    pub(super) fn field(
        &self,
        store: &VariableStore,
        name: &str,
        field: &str,
    ) -> Result<serde_json::Value, ExecutionError> {
        let value = self.read(store, name)?;
        let structured = value
            .structured()
            .ok_or_else(|| self.unexpected(name, "structured data", value.type_name()))?;
        lookup_path(&structured, field)
            .cloned()
            .ok_or_else(|| self.missing_field(name, field))
    }
}

/// Provider inputs after marker resolution.
#[derive(Debug, Default)]
pub(super) struct ResolvedInputs {
    pub(super) params: Params,
    pub(super) reference_images: Vec<ImageArtifact>,
    pub(super) overlays: Vec<ResolvedOverlay>,
}

/// Resolves markers against the store and strips internal parameters.
pub(super) fn resolve(
    scope: StepScope<'_>,
    store: &VariableStore,
    params: &Params,
    deferred: &DeferredRefs,
    prompt_separator: &str,
) -> Result<ResolvedInputs, ExecutionError> {
    let mut params: Params = params
        .iter()
        .filter(|(key, _)| !key.starts_with(INTERNAL_PARAM_PREFIX))
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();

    resolve_prompt(scope, store, &mut params, deferred.prompt.as_ref(), prompt_separator)?;
    let reference_images = resolve_references(scope, store, &deferred.references)?;
    let overlays = resolve_overlays(scope, store, &mut params, &deferred.overlays)?;

    Ok(ResolvedInputs {
        params,
        reference_images,
        overlays,
    })
}

fn resolve_prompt(
    scope: StepScope<'_>,
    store: &VariableStore,
    params: &mut Params,
    marker: Option<&PromptRef>,
    separator: &str,
) -> Result<(), ExecutionError> {
    let pre_prompt = params
        .remove(PRE_PROMPT_PARAM)
        .and_then(|v| v.as_str().map(str::to_string))
        .filter(|s| !s.trim().is_empty());

    let content = match marker {
        Some(marker) => Some(prompt_content(scope, store, marker)?),
        None => params
            .get(PROMPT_PARAM)
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
    };

    let prompt = match (pre_prompt, content) {
        (Some(pre), Some(content)) => format!("{pre}{separator}{content}"),
        (Some(pre), None) => pre,
        (None, Some(content)) => content,
        (None, None) => return Ok(()),
    };
    params.insert(PROMPT_PARAM.to_string(), serde_json::Value::String(prompt));
    Ok(())
}

fn prompt_content(
    scope: StepScope<'_>,
    store: &VariableStore,
    marker: &PromptRef,
) -> Result<String, ExecutionError> {
    if let Some(field) = &marker.field {
        return Ok(match scope.field(store, &marker.variable, field)? {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });
    }
    let value = scope.read(store, &marker.variable)?;
    value
        .text_content()
        .ok_or_else(|| scope.unexpected(&marker.variable, "text data", value.type_name()))
}

fn resolve_references(
    scope: StepScope<'_>,
    store: &VariableStore,
    markers: &[ImageRef],
) -> Result<Vec<ImageArtifact>, ExecutionError> {
    let mut images = Vec::new();
    let mut missing = Vec::new();
    for marker in markers {
        match store.get(&marker.variable) {
            Some(value) => {
                let found = value.images();
                if found.is_empty() {
                    return Err(scope.unexpected(&marker.variable, "an image", value.type_name()));
                }
                images.extend(found.into_iter().cloned());
            }
            None => missing.push(MissingImage {
                name: marker.variable.clone(),
                index: marker.index,
            }),
        }
    }
    if !missing.is_empty() {
        return Err(missing_images(scope, ImagePort::References, missing));
    }
    Ok(images)
}

fn resolve_overlays(
    scope: StepScope<'_>,
    store: &VariableStore,
    params: &mut Params,
    markers: &[ImageRef],
) -> Result<Vec<ResolvedOverlay>, ExecutionError> {
    if markers.is_empty() {
        return Ok(Vec::new());
    }
    let settings = match params.remove(OVERLAYS_PARAM) {
        Some(serde_json::Value::Array(items)) => items,
        _ => Vec::new(),
    };

    let mut overlays = Vec::with_capacity(markers.len());
    let mut missing = Vec::new();
    for marker in markers {
        match store.get(&marker.variable) {
            Some(value) => {
                let image = value
                    .images()
                    .into_iter()
                    .next()
                    .cloned()
                    .ok_or_else(|| scope.unexpected(&marker.variable, "an image", value.type_name()))?;
                overlays.push(ResolvedOverlay {
                    index: marker.index,
                    image,
                    settings: settings.get(marker.index).cloned(),
                });
            }
            None => missing.push(MissingImage {
                name: marker.variable.clone(),
                index: marker.index,
            }),
        }
    }
    if !missing.is_empty() {
        return Err(missing_images(scope, ImagePort::Overlays, missing));
    }
    Ok(overlays)
}

fn missing_images(scope: StepScope<'_>, port: ImagePort, missing: Vec<MissingImage>) -> ExecutionError {
    ExecutionError::MissingImages {
        step_index: scope.index,
        node_id: scope.node_id.to_string(),
        kind: scope.kind,
        port,
        missing,
    }
}
