//! Core domain models for pipelines
//!
//! This module defines the pipeline records built from configuration,
//! the results produced while running them, and the shared error types.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod state;

pub use config::ConfigurationLoader;
pub use error::{ConfigError, EngineError, JobExecutionError, PipelineExecutionError};
pub use pipeline::*;
pub use state::*;
