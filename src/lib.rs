//! stagerun - run staged CI pipelines locally

pub mod cli;
pub mod core;
pub mod execution;

// Re-export commonly used types
pub use core::{ConfigError, JobConfig, JobResult, JobStatus, PipelineConfig, PipelineReport, PipelineStatus};
pub use execution::{
    EnvironmentContext, ExecutionEvent, ExecutionMode, JobExecutor, JobRunner, ShellRunner, StageOrchestrator,
};
