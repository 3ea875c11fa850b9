//! Error types for the forkflow engine.
//!
//! Three kinds of failure exist:
//! - structural violations (topology touched after start, repeated start,
//!   and branch failures surfaced through `done()`)
//! - argument errors (addressing a fork that does not exist)
//! - operation failures raised by the paginated source adapter

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// A shareable error cause.
///
/// Causes are reference counted so a settled pipeline outcome can be cloned
/// out to every `done()` waiter.
pub type SharedCause = Arc<dyn StdError + Send + Sync + 'static>;

/// Converts a stage error into a [`SharedCause`].
#[must_use]
pub fn shared_cause(err: anyhow::Error) -> SharedCause {
    let boxed: Box<dyn StdError + Send + Sync + 'static> = err.into();
    Arc::from(boxed)
}

/// The main error type for forkflow operations.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The pipeline topology or lifecycle was violated, or a branch failed.
    #[error("{0}")]
    StructuralViolation(#[from] StructuralViolationError),

    /// An argument referenced something that does not exist.
    #[error("{0}")]
    Argument(#[from] ArgumentError),

    /// A remote paging operation failed.
    #[error("{0}")]
    OperationFailed(#[from] OperationFailedError),
}

/// Coarse classification of a [`PipelineError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// See [`StructuralViolationError`].
    StructuralViolation,
    /// See [`ArgumentError`].
    Argument,
    /// See [`OperationFailedError`].
    OperationFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StructuralViolation => write!(f, "structural_violation"),
            Self::Argument => write!(f, "argument"),
            Self::OperationFailed => write!(f, "operation_failed"),
        }
    }
}

impl PipelineError {
    /// Returns the kind of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StructuralViolation(_) => ErrorKind::StructuralViolation,
            Self::Argument(_) => ErrorKind::Argument,
            Self::OperationFailed(_) => ErrorKind::OperationFailed,
        }
    }

    /// Returns true for structural violations.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::StructuralViolation(_))
    }

    /// Returns the failing branch for branch-execution failures.
    ///
    /// `None` both for errors unrelated to a branch and for failures of the
    /// base chain; use [`StructuralViolationError::is_branch_failure`] to
    /// tell them apart.
    #[must_use]
    pub fn branch(&self) -> Option<&str> {
        match self {
            Self::StructuralViolation(err) => err.branch.as_deref(),
            _ => None,
        }
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = match self {
            Self::StructuralViolation(err) => err.to_dict(),
            Self::Argument(err) => {
                let mut map = HashMap::new();
                map.insert("name".to_string(), serde_json::json!(err.name));
                map
            }
            Self::OperationFailed(err) => {
                let mut map = HashMap::new();
                map.insert("operation".to_string(), serde_json::json!(err.operation));
                map.insert("page".to_string(), serde_json::json!(err.page));
                map.insert("cause".to_string(), serde_json::json!(err.source.to_string()));
                map
            }
        };
        map.insert("kind".to_string(), serde_json::json!(self.kind().to_string()));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map
    }
}

/// Where in a branch a failure happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageLocation {
    /// Stage name.
    pub name: String,
    /// Position of the stage within its branch.
    pub index: usize,
}

/// Raised when the pipeline's structure or lifecycle is violated.
///
/// Branch failures are reported through this type as well, with `branch`
/// naming the fork (or `None` for the base chain) and `cause` embedding the
/// original stage error.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct StructuralViolationError {
    /// The error message.
    pub message: String,
    /// The offending call, for topology and lifecycle violations.
    pub operation: Option<String>,
    /// The failing fork; `None` for the base chain or non-branch errors.
    pub branch: Option<String>,
    /// The failing stage, for branch failures.
    pub stage: Option<StageLocation>,
    /// The original error.
    #[source]
    pub cause: Option<SharedCause>,
}

impl StructuralViolationError {
    /// Creates a new structural violation.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            operation: None,
            branch: None,
            stage: None,
            cause: None,
        }
    }

    /// A topology mutation attempted once the pipeline was sealed.
    #[must_use]
    pub fn sealed(operation: &str) -> Self {
        Self::new(format!(
            "Cannot call {operation}() once the pipeline has started or is being awaited"
        ))
        .with_operation(operation)
    }

    /// `start_pipeline` called on an already-started pipeline.
    #[must_use]
    pub fn already_started() -> Self {
        Self::new("start_pipeline() called more than once").with_operation("start_pipeline")
    }

    /// The pipeline handle went away before the run settled.
    #[must_use]
    pub fn dropped() -> Self {
        Self::new("Pipeline dropped before completion")
    }

    /// A stage in a branch failed.
    #[must_use]
    pub fn branch_failed(branch: Option<&str>, stage: StageLocation, cause: SharedCause) -> Self {
        let origin = match branch {
            Some(name) => format!("Fork '{name}'"),
            None => "Base chain".to_string(),
        };
        let mut err = Self::new(format!(
            "{origin} failed at stage '{}' (#{}): {cause}",
            stage.name, stage.index
        ));
        err.branch = branch.map(str::to_string);
        err.stage = Some(stage);
        err.cause = Some(cause);
        err
    }

    /// Sets the offending operation.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    /// Returns true if this wraps a stage failure.
    #[must_use]
    pub fn is_branch_failure(&self) -> bool {
        self.stage.is_some()
    }

    /// Converts to a dictionary representation.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        map.insert("message".to_string(), serde_json::json!(self.message));
        if let Some(ref op) = self.operation {
            map.insert("operation".to_string(), serde_json::json!(op));
        }
        if self.is_branch_failure() {
            map.insert("branch".to_string(), serde_json::json!(self.branch));
        }
        if let Some(ref stage) = self.stage {
            map.insert("stage".to_string(), serde_json::json!(stage.name));
            map.insert("stage_index".to_string(), serde_json::json!(stage.index));
        }
        if let Some(ref cause) = self.cause {
            map.insert("cause".to_string(), serde_json::json!(cause.to_string()));
        }
        map
    }
}

/// Raised when a call names a fork that is unknown or already taken.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ArgumentError {
    /// The error message.
    pub message: String,
    /// The fork name involved.
    pub name: String,
}

impl ArgumentError {
    /// No fork with this name was registered.
    #[must_use]
    pub fn unknown_fork(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            message: format!("Fork '{name}' does not exist"),
            name,
        }
    }

    /// A fork with this name is already registered.
    #[must_use]
    pub fn duplicate_fork(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            message: format!("Fork '{name}' is already registered"),
            name,
        }
    }
}

/// Failures reported by a page cursor.
#[derive(Debug, Clone, Error)]
pub enum CursorError {
    /// The remote engine failed to execute the query.
    #[error("Query execution failed: {message}")]
    Execution {
        /// Remote failure description.
        message: String,
    },

    /// The page request could not be delivered or answered.
    #[error("Transport error: {message}")]
    Transport {
        /// Transport failure description.
        message: String,
    },
}

impl CursorError {
    /// Creates an execution error.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution {
            message: message.into(),
        }
    }

    /// Creates a transport error.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Terminal error of a paginated row stream.
#[derive(Debug, Clone, Error)]
#[error("Operation '{operation}' failed on page {page}: {source}")]
pub struct OperationFailedError {
    /// The operation that failed.
    pub operation: String,
    /// Zero-based index of the page being fetched.
    pub page: usize,
    /// The cursor failure.
    #[source]
    pub source: CursorError,
}

impl OperationFailedError {
    /// Creates a new operation failure.
    #[must_use]
    pub fn new(operation: impl Into<String>, page: usize, source: CursorError) -> Self {
        Self {
            operation: operation.into(),
            page,
            source,
        }
    }
}
