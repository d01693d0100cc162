//! Core domain models
//!
//! This module defines the fundamental data structures that represent
//! pipelines, stages, state, and run records.

pub mod config;
pub mod parameter;
pub mod pipeline;
pub mod predicate;
pub mod run;
pub mod stage;
pub mod state;
pub mod status;

pub use config::{ConfigError, PipelineConfig};
pub use pipeline::{Batch, Pipeline};
pub use predicate::{can_proceed, Predicate};
pub use run::{PipelineRun, RunCounts, StageResult};
pub use stage::{Command, RetryPolicy, Stage};
pub use state::{PipelineState, StateDelta, Value};
pub use status::{FailurePolicy, RunStatus, ScanStatus, StageStatus};
