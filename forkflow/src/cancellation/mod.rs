//! Cooperative cancellation for pipeline runs.
//!
//! Every stage task of one pipeline run shares a single
//! [`CancellationToken`]; the coordinator trips it when any branch fails.

mod token;

pub use token::CancellationToken;
