//! conveyor - a declarative build-pipeline execution engine

pub mod cli;
pub mod core;
pub mod exec;
pub mod notify;
pub mod persistence;
pub mod tools;

// Re-export commonly used types
pub use crate::core::{
    can_proceed, ConfigError, FailurePolicy, Pipeline, PipelineConfig, PipelineRun, PipelineState,
    RunStatus, ScanStatus, StageResult, StageStatus, Value,
};
pub use exec::{with_retry, CancelSignal, Engine};
pub use notify::{LogNotifier, Notifier};
pub use tools::{Invocation, ProcessAdapter, ToolAdapter, ToolError};
