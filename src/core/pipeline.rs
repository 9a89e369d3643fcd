//! Pipeline domain model

use serde::Serialize;
use std::collections::HashMap;

/// Stage used when neither the pipeline nor the job names one
pub const DEFAULT_STAGE: &str = "test";

/// A fully processed pipeline definition
///
/// Built once per run from the raw configuration and never mutated afterwards.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PipelineConfig {
    /// Stage names in execution order
    pub stages: Vec<String>,

    /// Global variables available to all jobs
    pub variables: HashMap<String, String>,

    /// Settings applied to every job
    pub default: DefaultConfig,

    /// Jobs in declaration order
    pub jobs: Vec<JobConfig>,
}

/// The `default:` block
#[derive(Debug, Clone, Default, Serialize)]
pub struct DefaultConfig {
    pub before_script: Vec<String>,
    pub after_script: Vec<String>,
    pub variables: HashMap<String, String>,
}

/// A single job after merging with the defaults
#[derive(Debug, Clone, Serialize)]
pub struct JobConfig {
    /// Unique job name
    pub name: String,

    /// Stage this job belongs to
    pub stage: String,

    /// Default before_script followed by the job's own lines
    pub before_script: Vec<String>,

    /// Main script lines
    pub script: Vec<String>,

    /// Job's own after_script lines followed by the default ones
    pub after_script: Vec<String>,

    /// Resolved variables (job > global > default)
    pub variables: HashMap<String, String>,
}

impl JobConfig {
    /// Create a job with an empty body in the given stage
    pub fn new(name: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stage: stage.into(),
            before_script: Vec::new(),
            script: Vec::new(),
            after_script: Vec::new(),
            variables: HashMap::new(),
        }
    }

    pub fn with_before_script<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.before_script = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_script<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.script = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_after_script<I, S>(mut self, lines: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after_script = lines.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_variable(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.variables.insert(key.into(), value.into());
        self
    }
}

impl PipelineConfig {
    /// Create a pipeline with the given stages and no jobs
    pub fn new<I, S>(stages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            stages: stages.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    /// Append a job, keeping declaration order
    pub fn with_job(mut self, job: JobConfig) -> Self {
        self.jobs.push(job);
        self
    }

    /// Get a job by name
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }

    /// Jobs assigned to a stage, in declaration order
    pub fn jobs_in_stage<'a>(&'a self, stage: &'a str) -> impl Iterator<Item = &'a JobConfig> + 'a {
        self.jobs.iter().filter(move |j| j.stage == stage)
    }
}
