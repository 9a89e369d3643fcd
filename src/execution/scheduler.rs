//! Execution scheduler - stage partitioning and pool sizing

use crate::core::{JobConfig, PipelineConfig};
use serde::Serialize;

/// How many jobs of one stage may run at the same time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulingStrategy {
    /// One job at a time, in declaration order
    Sequential,

    /// Limited parallelism (max N concurrent jobs)
    LimitedParallel(usize),
}

impl Default for SchedulingStrategy {
    fn default() -> Self {
        SchedulingStrategy::Sequential
    }
}

impl SchedulingStrategy {
    /// Strategy for a maximum degree of parallelism; zero is treated as one
    pub fn from_parallelism(max: usize) -> Self {
        match max {
            0 | 1 => SchedulingStrategy::Sequential,
            n => SchedulingStrategy::LimitedParallel(n),
        }
    }

    /// Size of the worker pool
    pub fn permits(&self) -> usize {
        match self {
            SchedulingStrategy::Sequential => 1,
            SchedulingStrategy::LimitedParallel(n) => (*n).max(1),
        }
    }

    pub fn is_parallel(&self) -> bool {
        self.permits() > 1
    }
}

/// A job as it would run: name plus the text of each phase
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedJob {
    pub name: String,
    pub stage: String,
    pub before_script: Vec<String>,
    pub script: Vec<String>,
    pub after_script: Vec<String>,
}

impl From<&JobConfig> for PlannedJob {
    fn from(job: &JobConfig) -> Self {
        Self {
            name: job.name.clone(),
            stage: job.stage.clone(),
            before_script: job.before_script.clone(),
            script: job.script.clone(),
            after_script: job.after_script.clone(),
        }
    }
}

/// One stage of the plan with its jobs in declaration order
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagePlan {
    pub name: String,
    pub jobs: Vec<PlannedJob>,
}

/// Ordered stages and jobs of a pipeline
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionPlan {
    pub stages: Vec<StagePlan>,
}

impl ExecutionPlan {
    /// Partition jobs by stage, following the declared stage order
    pub fn for_pipeline(pipeline: &PipelineConfig) -> Self {
        let stages = pipeline
            .stages
            .iter()
            .map(|stage| StagePlan {
                name: stage.clone(),
                jobs: pipeline.jobs_in_stage(stage).map(PlannedJob::from).collect(),
            })
            .collect();

        Self { stages }
    }

    pub fn job_count(&self) -> usize {
        self.stages.iter().map(|s| s.jobs.len()).sum()
    }

    /// Job names in execution order
    pub fn job_names(&self) -> Vec<&str> {
        self.stages
            .iter()
            .flat_map(|s| s.jobs.iter().map(|j| j.name.as_str()))
            .collect()
    }

    pub fn stage(&self, name: &str) -> Option<&StagePlan> {
        self.stages.iter().find(|s| s.name == name)
    }
}
