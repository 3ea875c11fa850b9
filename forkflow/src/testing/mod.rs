//! Testing utilities for forkflow pipelines.
//!
//! This module provides:
//! - Mock stages and a scripted page cursor
//! - Assertions over branch statuses and pipeline failures
//! - Tabular page fixtures

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_branch_status, assert_failed_in_branch, assert_stage_statuses};
pub use fixtures::{numbered_page, tabular_pages};
pub use mocks::{
    CountingStage, FailingStage, RecordingStage, ScriptedCursor, ScriptedSource, SlowStage,
};
