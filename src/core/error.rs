//! Error types shared across the crate

use std::path::PathBuf;
use thiserror::Error;

/// Malformed or structurally invalid pipeline configuration
///
/// Always raised before any job runs.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("{} must contain a YAML mapping at the top level", .0.display())]
    NotAMapping(PathBuf),

    #[error("include cycle detected: {0}")]
    IncludeCycle(String),

    #[error("unsupported include {0}: only local files can be included")]
    UnsupportedInclude(String),

    #[error("job '{job}' uses stage '{stage}' which is not declared in stages")]
    UnknownStage { job: String, stage: String },

    #[error("stage '{0}' is declared more than once")]
    DuplicateStage(String),

    #[error("{location}: {value} is not a string")]
    InvalidScript { location: String, value: String },

    #[error("invalid variable name '{0}'")]
    InvalidVariableName(String),

    #[error("variable '{name}' has an unsupported value")]
    InvalidVariableValue { name: String },

    #[error("{0}")]
    Invalid(String),
}

/// A job whose work or cleanup phases failed
#[derive(Debug, Clone, Error)]
#[error("Job {job} failed{}", .exit_code.map(|c| format!(" with exit code {}", c)).unwrap_or_default())]
pub struct JobExecutionError {
    pub job: String,
    pub exit_code: Option<i32>,
}

/// Aggregate failure of a pipeline run
#[derive(Debug, Clone, Error)]
#[error("pipeline failed: {} failed job(s) [{}], {} skipped job(s) [{}]",
    .failed.len(), .failed.join(", "), .skipped.len(), .skipped.join(", "))]
pub struct PipelineExecutionError {
    pub failed: Vec<String>,
    pub skipped: Vec<String>,
}

/// Failures of the orchestrator itself, not of any job
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("worker pool closed while dispatching stage '{0}'")]
    PoolClosed(String),
}
