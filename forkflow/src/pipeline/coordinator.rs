//! Aggregation of branch events into one pipeline status.
//!
//! Stage tasks never touch shared status directly. Each posts a
//! [`CoordinatorEvent`] onto the run's channel and a single coordinator task
//! applies them, in order, to the [`StatusTable`]. The table itself is a
//! plain state machine so it can be exercised without running any stages.

use super::branch::Branch;
use crate::cancellation::CancellationToken;
use crate::core::PipelineStatus;
use crate::errors::{shared_cause, PipelineError, StageLocation, StructuralViolationError};
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

/// Index of the base chain in the status table.
pub(crate) const BASE_BRANCH: usize = 0;

/// The settled result of a pipeline run.
pub(crate) type Outcome = Option<Result<(), PipelineError>>;

/// A message posted by a stage task or by the pipeline handle.
#[derive(Debug)]
pub(crate) enum CoordinatorEvent {
    /// The stage drained its upstream and flushed its output.
    StageFinished { branch: usize, index: usize },
    /// The stage failed.
    StageFailed {
        branch: usize,
        index: usize,
        error: anyhow::Error,
    },
    /// The pipeline was misused while running.
    Violation(StructuralViolationError),
}

/// Status of every branch plus the pipeline as a whole.
#[derive(Debug, Clone)]
pub(crate) struct StatusTable {
    status: PipelineStatus,
    /// Base chain first, then forks in registration order.
    branches: Vec<Branch>,
    completed_branches: usize,
}

impl StatusTable {
    /// Creates a table for a base chain and its forks.
    pub(crate) fn new(base: Branch, forks: impl IntoIterator<Item = Branch>) -> Self {
        let mut branches = vec![base];
        branches.extend(forks);
        Self {
            status: PipelineStatus::NotStarted,
            branches,
            completed_branches: 0,
        }
    }

    pub(crate) fn status(&self) -> PipelineStatus {
        self.status
    }

    pub(crate) fn branches(&self) -> &[Branch] {
        &self.branches
    }

    pub(crate) fn branch(&self, index: usize) -> Option<&Branch> {
        self.branches.get(index)
    }

    /// Moves the pipeline and every branch to `Running`.
    pub(crate) fn start(&mut self) {
        debug_assert!(self.status.can_transition_to(PipelineStatus::Running));
        self.status = PipelineStatus::Running;
        for branch in &mut self.branches {
            branch.mark_running();
        }
    }

    /// Applies one event.
    ///
    /// Returns the outcome the first time the pipeline settles; afterwards
    /// every event is ignored so an error is surfaced at most once and
    /// `Error` is never replaced by `Complete`.
    pub(crate) fn apply(&mut self, event: CoordinatorEvent) -> Outcome {
        if self.status != PipelineStatus::Running {
            debug!(?event, status = %self.status, "Ignoring event for settled pipeline");
            return None;
        }
        let total = self.branches.len();

        match event {
            CoordinatorEvent::StageFinished { branch, index } => {
                let Some(target) = self.branches.get_mut(branch) else {
                    warn!(branch, index, "Finish event for unknown branch");
                    return None;
                };
                if target.mark_stage_finished(index) {
                    self.completed_branches += 1;
                    debug!(
                        branch = target.name().unwrap_or("<base>"),
                        completed = self.completed_branches,
                        total,
                        "Branch complete"
                    );
                }
                if self.completed_branches == total {
                    self.status = PipelineStatus::Complete;
                    return Some(Ok(()));
                }
                None
            }
            CoordinatorEvent::StageFailed {
                branch,
                index,
                error,
            } => {
                let Some(target) = self.branches.get_mut(branch) else {
                    warn!(branch, index, "Failure event for unknown branch");
                    return None;
                };
                if !target.mark_stage_errored(index) {
                    return None;
                }
                let location = StageLocation {
                    name: target.stages()[index].clone(),
                    index,
                };
                let err = StructuralViolationError::branch_failed(
                    target.name(),
                    location,
                    shared_cause(error),
                );
                self.cancel_others(branch);
                self.status = PipelineStatus::Error;
                Some(Err(err.into()))
            }
            CoordinatorEvent::Violation(err) => {
                self.cancel_others(usize::MAX);
                self.status = PipelineStatus::Error;
                Some(Err(err.into()))
            }
        }
    }

    /// Cancels every running branch except `failed`.
    fn cancel_others(&mut self, failed: usize) {
        for (i, branch) in self.branches.iter_mut().enumerate() {
            if i != failed && branch.cancel() {
                debug!(branch = branch.name().unwrap_or("<base>"), "Branch cancelled");
            }
        }
    }
}

/// Consumes coordinator events until the run settles.
///
/// On failure the shared token is tripped so every stage task stops pulling
/// new work. The settled outcome is published to all `done()` waiters.
pub(crate) async fn run_coordinator(
    table: Arc<RwLock<StatusTable>>,
    mut events: mpsc::UnboundedReceiver<CoordinatorEvent>,
    token: Arc<CancellationToken>,
    outcome: watch::Sender<Outcome>,
) {
    while let Some(event) = events.recv().await {
        let settled = table.write().apply(event);
        let Some(result) = settled else {
            continue;
        };

        match &result {
            Ok(()) => info!("Pipeline complete"),
            Err(err) => {
                error!(error = %err, branch = err.branch().unwrap_or("<base>"), "Pipeline failed");
                token.cancel(err.to_string());
            }
        }
        outcome.send_replace(Some(result));
        return;
    }
    debug!("Coordinator channel closed before the pipeline settled");
}
