//! # Forkflow
//!
//! A stream-forking pipeline engine.
//!
//! Forkflow takes one producer of discrete items and replicates it across any
//! number of independently composed downstream chains ("forks"), with:
//!
//! - **One lifecycle view**: not-started, running, complete or errored, for the
//!   whole pipeline and per branch and stage
//! - **Coordinated cancellation**: the first failing stage cancels every other
//!   branch and is surfaced exactly once through `done()`
//! - **Independent pacing**: a slow fork never stalls its siblings
//! - **Paginated sources**: a page-at-a-time remote query result exposed as a
//!   lazy row stream that plugs in as a producer
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use forkflow::prelude::*;
//!
//! let pipeline = ForkingPipeline::from_iter(rows);
//! pipeline.add_streams([shared(ParseStage::new())])?;
//! pipeline.fork("csv", [shared(CsvWriter::new(csv_out))])?;
//! pipeline.fork("audit", [])?;
//!
//! pipeline.start_pipeline()?;
//! pipeline.done().await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod cancellation;
pub mod config;
pub mod core;
pub mod errors;
pub mod observability;
pub mod pipeline;
pub mod source;
pub mod stages;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::{HeaderPolicy, PaginationConfig, PipelineConfig};
    pub use crate::core::{PipelineStatus, StageState};
    pub use crate::errors::{
        ArgumentError, CursorError, ErrorKind, OperationFailedError, PipelineError,
        StructuralViolationError,
    };
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{Branch, ForkHandle, ForkingPipeline};
    pub use crate::source::{
        ObjectRowConverter, PageCursor, PagedResultSource, PaginatedRows, QueryHandle,
        ResultPage, RowConverter, TabularPage,
    };
    pub use crate::stages::{
        shared, AsyncFnStage, FnStage, InspectStage, PassThroughStage, SharedStage, Stage,
    };
}
