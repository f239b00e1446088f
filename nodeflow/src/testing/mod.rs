//! Testing utilities for nodeflow graphs.
//!
//! This module provides:
//! - Mock step runners that record requests
//! - Graph fixtures and a sample capability registry
//! - Assertions over compiled pipelines and validation issues

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{
    assert_no_blocking_issues, assert_single_issue, assert_step_kinds, assert_step_order,
};
pub use fixtures::{image_value, sample_registry, text_value, GraphFixture};
pub use mocks::{FailingStepRunner, MockStepRunner};
