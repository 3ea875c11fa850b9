//! Test assertions for pipeline outcomes.

use crate::core::StageState;
use crate::errors::PipelineError;
use crate::pipeline::Branch;

/// Asserts that a branch settled with the expected status.
pub fn assert_branch_status(branch: &Branch, expected: StageState) {
    assert_eq!(
        branch.status(),
        expected,
        "Expected branch {:?} to be {:?}, got {:?} (stages: {:?})",
        branch.name(),
        expected,
        branch.status(),
        branch.stage_statuses()
    );
}

/// Asserts the per-stage statuses of a branch.
pub fn assert_stage_statuses(branch: &Branch, expected: &[StageState]) {
    assert_eq!(
        branch.stage_statuses(),
        expected,
        "Unexpected stage statuses for branch {:?} (stages: {:?})",
        branch.name(),
        branch.stages()
    );
}

/// Asserts that a pipeline failed because of `branch` (`None` for the base chain).
pub fn assert_failed_in_branch(err: &PipelineError, branch: Option<&str>) {
    match err {
        PipelineError::StructuralViolation(violation) => {
            assert!(
                violation.is_branch_failure(),
                "Expected a branch failure, got: {violation}"
            );
            assert_eq!(
                violation.branch.as_deref(),
                branch,
                "Failure attributed to the wrong branch: {violation}"
            );
        }
        other => panic!("Expected a structural violation, got: {other}"),
    }
}
