//! Per-branch status bookkeeping.

use crate::core::StageState;
use serde::{Deserialize, Serialize};

/// Status view of one branch: the base chain or a named fork.
///
/// The engine owns every `Branch`; callers receive clones through the
/// pipeline observers and cannot drive transitions themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Branch {
    /// Fork name, `None` for the base chain.
    name: Option<String>,
    /// Stage names in chain order.
    stages: Vec<String>,
    /// Per-stage status, parallel to `stages`.
    stage_statuses: Vec<StageState>,
    /// Aggregate status of the branch.
    status: StageState,
}

impl Branch {
    /// Creates a branch whose stages have not started.
    #[must_use]
    pub(crate) fn new(name: Option<String>, stages: Vec<String>) -> Self {
        let stage_statuses = vec![StageState::NotStarted; stages.len()];
        Self {
            name,
            stages,
            stage_statuses,
            status: StageState::NotStarted,
        }
    }

    /// Returns the fork name, or `None` for the base chain.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Returns true for the base chain.
    #[must_use]
    pub fn is_base(&self) -> bool {
        self.name.is_none()
    }

    /// Returns the stage names in chain order.
    #[must_use]
    pub fn stages(&self) -> &[String] {
        &self.stages
    }

    /// Returns the per-stage statuses, parallel to [`Branch::stages`].
    #[must_use]
    pub fn stage_statuses(&self) -> &[StageState] {
        &self.stage_statuses
    }

    /// Returns the status of the stage at `index`.
    #[must_use]
    pub fn stage_status(&self, index: usize) -> Option<StageState> {
        self.stage_statuses.get(index).copied()
    }

    /// Returns the aggregate branch status.
    #[must_use]
    pub fn status(&self) -> StageState {
        self.status
    }

    /// Marks the branch and all its stages as running.
    pub(crate) fn mark_running(&mut self) {
        for state in &mut self.stage_statuses {
            *state = StageState::Running;
        }
        self.status = StageState::Running;
    }

    /// Records that the stage at `index` finished normally.
    ///
    /// Returns true when this completes the branch, which happens when the
    /// terminal stage finishes. Events for settled branches or for stages
    /// that are no longer running are ignored.
    pub(crate) fn mark_stage_finished(&mut self, index: usize) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        match self.stage_statuses.get_mut(index) {
            Some(state) if *state == StageState::Running => *state = StageState::Complete,
            _ => return false,
        }
        if index + 1 == self.stage_statuses.len() {
            self.status = StageState::Complete;
            return true;
        }
        false
    }

    /// Records that the stage at `index` failed.
    ///
    /// The stage becomes `Error`, every other running stage of the branch
    /// becomes `Cancelled`, and completed stages keep `Complete`. Returns
    /// false (changing nothing) if the branch already settled.
    pub(crate) fn mark_stage_errored(&mut self, index: usize) -> bool {
        if self.status.is_terminal() || index >= self.stage_statuses.len() {
            return false;
        }
        for (i, state) in self.stage_statuses.iter_mut().enumerate() {
            if i == index {
                *state = StageState::Error;
            } else if *state == StageState::Running {
                *state = StageState::Cancelled;
            }
        }
        self.status = StageState::Error;
        true
    }

    /// Cancels a running branch because a sibling failed.
    ///
    /// Idempotent: settled branches are left untouched and false is returned.
    pub(crate) fn cancel(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        for state in &mut self.stage_statuses {
            if *state == StageState::Running {
                *state = StageState::Cancelled;
            }
        }
        self.status = StageState::Cancelled;
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn running_branch(stages: &[&str]) -> Branch {
        let mut branch = Branch::new(
            Some("fork".to_string()),
            stages.iter().map(|s| (*s).to_string()).collect(),
        );
        branch.mark_running();
        branch
    }

    #[test]
    fn test_new_branch_not_started() {
        let branch = Branch::new(None, vec!["producer".to_string()]);
        assert!(branch.is_base());
        assert_eq!(branch.status(), StageState::NotStarted);
        assert_eq!(branch.stage_statuses(), &[StageState::NotStarted]);
    }

    #[test]
    fn test_finishing_terminal_stage_completes_branch() {
        let mut branch = running_branch(&["a", "b"]);

        assert!(!branch.mark_stage_finished(0));
        assert_eq!(branch.status(), StageState::Running);
        assert!(branch.mark_stage_finished(1));
        assert_eq!(branch.status(), StageState::Complete);
        assert_eq!(
            branch.stage_statuses(),
            &[StageState::Complete, StageState::Complete]
        );
    }

    #[test]
    fn test_error_cascades_to_running_stages() {
        let mut branch = running_branch(&["a", "b", "c"]);
        branch.mark_stage_finished(0);

        assert!(branch.mark_stage_errored(1));
        assert_eq!(branch.status(), StageState::Error);
        assert_eq!(
            branch.stage_statuses(),
            &[StageState::Complete, StageState::Error, StageState::Cancelled]
        );
    }

    #[test]
    fn test_error_is_recorded_once() {
        let mut branch = running_branch(&["a", "b"]);

        assert!(branch.mark_stage_errored(0));
        assert!(!branch.mark_stage_errored(1));
        assert!(!branch.mark_stage_finished(1));
        assert_eq!(
            branch.stage_statuses(),
            &[StageState::Error, StageState::Cancelled]
        );
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let mut branch = running_branch(&["a", "b"]);
        branch.mark_stage_finished(0);

        assert!(branch.cancel());
        assert!(!branch.cancel());
        assert_eq!(branch.status(), StageState::Cancelled);
        assert_eq!(
            branch.stage_statuses(),
            &[StageState::Complete, StageState::Cancelled]
        );
    }

    #[test]
    fn test_completed_branch_is_not_cancelled() {
        let mut branch = running_branch(&["only"]);
        branch.mark_stage_finished(0);

        assert!(!branch.cancel());
        assert_eq!(branch.status(), StageState::Complete);
    }
}
