//! Test assertions for pipelines and validation issues.

use crate::core::{Pipeline, StepKind};
use crate::validation::{IssueCode, ValidationIssue};

/// Asserts the pipeline's step kinds, in order.
pub fn assert_step_kinds(pipeline: &Pipeline, expected: &[StepKind]) {
    assert_eq!(
        pipeline.kinds(),
        expected,
        "Unexpected step kinds for pipeline '{}'",
        pipeline.name
    );
}

/// Asserts the node ids of the pipeline's steps, in order.
pub fn assert_step_order(pipeline: &Pipeline, expected: &[&str]) {
    let actual: Vec<&str> = pipeline.iter().map(|s| s.node_id()).collect();
    assert_eq!(actual, expected, "Unexpected step order");
}

/// Asserts that exactly one issue with `code` names `parameter`.
pub fn assert_single_issue(issues: &[ValidationIssue], code: IssueCode, parameter: &str) {
    let matching: Vec<&ValidationIssue> = issues
        .iter()
        .filter(|i| i.code == code && i.parameter_name.as_deref() == Some(parameter))
        .collect();
    assert_eq!(
        matching.len(),
        1,
        "Expected exactly one {code} issue for '{parameter}', got: {issues:#?}"
    );
}

/// Asserts that no issue blocks execution.
pub fn assert_no_blocking_issues(issues: &[ValidationIssue]) {
    let errors: Vec<String> = issues
        .iter()
        .filter(|i| i.is_error())
        .map(ToString::to_string)
        .collect();
    assert!(errors.is_empty(), "Expected no blocking issues, got: {errors:#?}");
}
