//! In-process runtime for fan-out, collect and router steps.
//!
//! Each function returns the bindings its step produces, in binding order;
//! the executor commits them to the store.

use super::resolve::StepScope;
use super::store::VariableStore;
use crate::core::{
    lookup_path, CollectStep, FanOutMode, FanOutStep, RouterStep, SelectionType, VariableValue,
    WaitMode,
};
use crate::errors::ExecutionError;
use serde_json::Value;

pub(super) type Bindings = Vec<(String, VariableValue)>;

/// Splits the input into the declared slots.
///
/// The node id is bound to the list of all slot values, ahead of the slots.
pub(super) fn fan_out(
    scope: StepScope<'_>,
    store: &VariableStore,
    step: &FanOutStep,
) -> Result<Bindings, ExecutionError> {
    let input = scope.read(store, &step.input)?;
    let values = match step.mode {
        FanOutMode::Count => vec![input.clone(); step.count],
        FanOutMode::Array => {
            let elements = array_elements(scope, input, &step.input, step.array_property.as_deref())?;
            if elements.len() != step.count {
                return Err(ExecutionError::FanOutLengthMismatch {
                    step_index: scope.index,
                    node_id: step.node_id.clone(),
                    property: step.array_property.clone().unwrap_or_default(),
                    expected: step.count,
                    actual: elements.len(),
                });
            }
            elements
        }
    };

    let mut bindings = Vec::with_capacity(values.len() + 1);
    bindings.push((step.node_id.clone(), VariableValue::List(values.clone())));
    bindings.extend(step.out.iter().cloned().zip(values));
    Ok(bindings)
}

fn array_elements(
    scope: StepScope<'_>,
    input: &VariableValue,
    name: &str,
    property: Option<&str>,
) -> Result<Vec<VariableValue>, ExecutionError> {
    if let (None, VariableValue::List(items)) = (property, input) {
        return Ok(items.clone());
    }
    let structured = input
        .structured()
        .ok_or_else(|| scope.unexpected(name, "structured data", input.type_name()))?;
    let target = match property {
        Some(path) => lookup_path(&structured, path).ok_or_else(|| scope.missing_field(name, path))?,
        None => &structured,
    };
    match target {
        Value::Array(items) => Ok(items.iter().map(VariableValue::json).collect()),
        _ => Err(scope.unexpected(name, "an array", "a non-array value")),
    }
}

/// Gathers the declared inputs into one list in declared order.
pub(super) fn collect(
    scope: StepScope<'_>,
    store: &VariableStore,
    step: &CollectStep,
) -> Result<Bindings, ExecutionError> {
    let mut values = Vec::with_capacity(step.inputs.len());
    let mut missing = Vec::new();
    for name in &step.inputs {
        match store.get(name) {
            Some(value) => values.push(value.clone()),
            None => missing.push(name.clone()),
        }
    }
    if step.wait_mode == WaitMode::All && !missing.is_empty() {
        return Err(ExecutionError::CollectIncomplete {
            step_index: scope.index,
            node_id: step.out.clone(),
            missing,
        });
    }
    Ok(vec![(step.out.clone(), VariableValue::List(values))])
}

/// Selects candidates using the runtime selection value.
pub(super) fn route(
    scope: StepScope<'_>,
    store: &VariableStore,
    step: &RouterStep,
) -> Result<Bindings, ExecutionError> {
    let candidates = candidates(scope.read(store, &step.input)?);
    let selection = selection_value(scope, store, step)?;

    let mut selected: Vec<VariableValue> = match step.selection_type {
        SelectionType::Index => {
            let indices = selected_indices(&selection, step.output_count, candidates.len())
                .map_err(|reason| router_error(scope, step, reason))?;
            indices
                .into_iter()
                .map(|i| {
                    candidates.get(i).cloned().ok_or_else(|| {
                        router_error(
                            scope,
                            step,
                            format!("index {i} is out of range for {} candidate(s)", candidates.len()),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        }
        SelectionType::Value => {
            let targets = match &selection {
                Value::Array(items) => items.clone(),
                other => vec![other.clone()],
            };
            candidates
                .iter()
                .filter(|c| targets.iter().any(|t| c.matches_selection(t)))
                .take(step.output_count)
                .cloned()
                .collect()
        }
    };

    if selected.is_empty() {
        return Err(router_error(
            scope,
            step,
            format!("no candidate matches selection {selection}"),
        ));
    }

    let output = if step.output_count == 1 && selected.len() == 1 {
        selected.swap_remove(0)
    } else {
        VariableValue::List(selected)
    };

    let mut bindings = vec![(step.out.clone(), output)];
    if let (Some(property), Some(context_out)) = (&step.context_property, &step.context_out) {
        let context = scope.field(store, &step.selection_in, property)?;
        bindings.push((context_out.clone(), VariableValue::json(&context)));
    }
    Ok(bindings)
}

fn candidates(value: &VariableValue) -> Vec<VariableValue> {
    match value {
        VariableValue::List(items) => items.clone(),
        VariableValue::Data(data) => match data.json() {
            Some(Value::Array(items)) => items.iter().map(VariableValue::json).collect(),
            _ => vec![value.clone()],
        },
        VariableValue::Image(_) => vec![value.clone()],
    }
}

fn selection_value(
    scope: StepScope<'_>,
    store: &VariableStore,
    step: &RouterStep,
) -> Result<Value, ExecutionError> {
    if let Some(property) = &step.selection_property {
        return scope.field(store, &step.selection_in, property);
    }
    let value = scope.read(store, &step.selection_in)?;
    value
        .structured()
        .or_else(|| value.text_content().map(Value::String))
        .ok_or_else(|| scope.unexpected(&step.selection_in, "text data", value.type_name()))
}

/// Turns the selection into candidate indices.
///
/// A single index selects `output_count` consecutive candidates starting
/// there; the whole run must fit inside `available`.
fn selected_indices(
    selection: &Value,
    output_count: usize,
    available: usize,
) -> Result<Vec<usize>, String> {
    match selection {
        Value::Array(items) => items
            .iter()
            .take(output_count)
            .map(|item| as_index(item).ok_or_else(|| format!("selection {item} is not an index")))
            .collect(),
        other => {
            let start = as_index(other).ok_or_else(|| format!("selection {other} is not an index"))?;
            match start.checked_add(output_count) {
                Some(end) if end <= available => Ok((start..end).collect()),
                _ => Err(format!(
                    "indices {start}..{start}+{output_count} are out of range for {available} candidate(s)"
                )),
            }
        }
    }
}

fn as_index(value: &Value) -> Option<usize> {
    match value {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn router_error(scope: StepScope<'_>, step: &RouterStep, reason: String) -> ExecutionError {
    ExecutionError::RouterSelection {
        step_index: scope.index,
        node_id: step.out.clone(),
        reason,
    }
}
