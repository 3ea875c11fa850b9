//! Core domain model types for forkflow.
//!
//! This module contains the shared status vocabulary used by the pipeline,
//! its branches and their stages.

mod status;

pub use status::{PipelineStatus, StageState};
