//! Pipeline building and execution.
//!
//! This module provides:
//! - The forking pipeline engine and its topology builders
//! - Per-branch status views
//! - The coordinator that folds branch events into one outcome

mod branch;
mod channel;
mod coordinator;
mod engine;
mod registry;


pub use branch::Branch;
pub use engine::{ForkHandle, ForkingPipeline, PRODUCER_STAGE_NAME};
