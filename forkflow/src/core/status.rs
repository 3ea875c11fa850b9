//! Pipeline and stage status enums.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle status of a whole pipeline.
///
/// Transitions only move forward: `NotStarted -> Running -> {Complete | Error}`.
/// Cancellation never settles a pipeline; a cancelled branch always means the
/// pipeline ends in [`PipelineStatus::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    /// Topology is still being configured.
    NotStarted,
    /// `start_pipeline` has wired the branches and resumed the producer.
    Running,
    /// Every branch finished without error.
    Complete,
    /// Some branch failed.
    Error,
}

impl Default for PipelineStatus {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
        }
    }
}

impl PipelineStatus {
    /// Returns true once the pipeline has settled.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error)
    }

    /// Returns true if `next` is a legal forward transition from `self`.
    #[must_use]
    pub fn can_transition_to(&self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::NotStarted, Self::Running) | (Self::Running, Self::Complete | Self::Error)
        )
    }
}

/// Status of a single stage or of a branch as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    /// Not wired yet.
    NotStarted,
    /// Wired and consuming items.
    Running,
    /// Upstream exhausted and all work flushed.
    Complete,
    /// Failed while processing.
    Error,
    /// Stopped because another stage or branch failed.
    Cancelled,
}

impl Default for StageState {
    fn default() -> Self {
        Self::NotStarted
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotStarted => write!(f, "not_started"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Error => write!(f, "error"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

impl StageState {
    /// Returns true if the state represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Error | Self::Cancelled)
    }

    /// Returns true if the state indicates success.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Returns true if the state indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error | Self::Cancelled)
    }
}
