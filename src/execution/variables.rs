//! Variable resolution - builds the environment a job's shell runs with
//!
//! Variables are only ever bound through the child process environment.
//! Script text is never rewritten, so the interpreter expands each
//! reference exactly once at run time and values containing quotes or `$`
//! reach the script untouched.

use crate::core::{JobConfig, PipelineConfig};
use std::collections::HashMap;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Non-empty value disables ANSI colors in streamed output
pub const NO_COLOR_VAR: &str = "NO_COLOR";

/// Non-empty value starts the interpreter as a login shell
pub const LOGIN_SHELL_VAR: &str = "STAGERUN_LOGIN_SHELL";

/// Complete environment of a child process
///
/// Keys and values stay OS strings so inherited variables that are not
/// valid UTF-8 reach the child unchanged.
pub type Environment = HashMap<OsString, OsString>;

/// Snapshot of the invoking process's environment
///
/// Captured once when a run starts and shared read-only by every job.
#[derive(Debug, Clone)]
pub struct EnvironmentContext {
    inherited: Arc<Environment>,
    working_dir: PathBuf,
}

impl EnvironmentContext {
    /// Capture the current process environment and working directory
    pub fn capture() -> std::io::Result<Self> {
        Ok(Self::new(std::env::vars_os().collect(), std::env::current_dir()?))
    }

    pub fn new(inherited: Environment, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            inherited: Arc::new(inherited),
            working_dir: working_dir.into(),
        }
    }

    /// Use a different working directory with the same variables
    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = working_dir.into();
        self
    }

    pub fn inherited(&self) -> &Environment {
        &self.inherited
    }

    /// Inherited value, if set and valid UTF-8
    pub fn get(&self, key: &str) -> Option<&str> {
        self.inherited.get(OsStr::new(key)).and_then(|v| v.to_str())
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn color_enabled(&self) -> bool {
        !self.flag(NO_COLOR_VAR)
    }

    pub fn login_shell(&self) -> bool {
        self.flag(LOGIN_SHELL_VAR)
    }

    fn flag(&self, name: &str) -> bool {
        self.get(name).is_some_and(|v| !v.is_empty())
    }
}

/// Compute the full environment for a job
///
/// Layers, lowest precedence first: inherited environment, default
/// variables, global variables, job variables.
pub fn prepare_environment(
    context: &EnvironmentContext,
    pipeline: &PipelineConfig,
    job: &JobConfig,
) -> Environment {
    let mut env = context.inherited().clone();
    for layer in [&pipeline.default.variables, &pipeline.variables, &job.variables] {
        env.extend(layer.iter().map(|(k, v)| (OsString::from(k), OsString::from(v))));
    }
    env
}
