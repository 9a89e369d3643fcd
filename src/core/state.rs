//! Execution state models

use crate::core::error::{JobExecutionError, PipelineExecutionError};
use crate::execution::scheduler::ExecutionPlan;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// One of the three script phases of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    BeforeScript,
    Script,
    AfterScript,
}

impl Phase {
    /// All phases in execution order
    pub const ALL: [Phase; 3] = [Phase::BeforeScript, Phase::Script, Phase::AfterScript];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::BeforeScript => "before_script",
            Phase::Script => "script",
            Phase::AfterScript => "after_script",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal status of a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum JobStatus {
    Succeeded,
    Failed,
    /// An earlier stage failed so the job never ran
    Skipped,
}

/// Captured output of one phase (capture mode only)
#[derive(Debug, Clone, Serialize)]
pub struct PhaseOutput {
    pub phase: Phase,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Outcome of executing (or skipping) one job
#[derive(Debug, Clone, Serialize)]
pub struct JobResult {
    pub job: String,
    pub stage: String,
    pub status: JobStatus,

    /// Exit code of the job's work: the failing before_script, or script
    pub exit_code: Option<i32>,

    /// Phase that made the job's work fail
    pub failed_phase: Option<Phase>,

    /// Exit code of after_script, tracked apart from the work
    pub after_exit_code: Option<i32>,

    /// Error that prevented a phase from producing an exit code
    pub error: Option<String>,

    /// Per-phase output, filled in capture mode
    pub phases: Vec<PhaseOutput>,

    pub started_at: Option<DateTime<Utc>>,
    pub duration: Duration,
}

impl JobResult {
    /// Result for a job that was never started
    pub fn skipped(job: impl Into<String>, stage: impl Into<String>) -> Self {
        Self {
            job: job.into(),
            stage: stage.into(),
            status: JobStatus::Skipped,
            exit_code: None,
            failed_phase: None,
            after_exit_code: None,
            error: None,
            phases: Vec::new(),
            started_at: None,
            duration: Duration::ZERO,
        }
    }

    /// Result for a job that could not be run at all
    pub fn aborted(job: impl Into<String>, stage: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            status: JobStatus::Failed,
            error: Some(error.into()),
            ..Self::skipped(job, stage)
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }

    pub fn is_failed(&self) -> bool {
        self.status == JobStatus::Failed
    }

    /// True when before_script or script failed
    pub fn work_failed(&self) -> bool {
        self.failed_phase.is_some() || (self.is_failed() && !self.cleanup_failed())
    }

    /// True when the work succeeded but after_script did not
    pub fn cleanup_failed(&self) -> bool {
        self.failed_phase.is_none() && self.after_exit_code.is_some_and(|c| c != 0)
    }

    /// Captured output of a phase, if any
    pub fn phase_output(&self, phase: Phase) -> Option<&PhaseOutput> {
        self.phases.iter().find(|p| p.phase == phase)
    }

    /// All captured stdout, phase by phase
    pub fn stdout(&self) -> String {
        self.phases.iter().map(|p| p.stdout.as_str()).collect()
    }

    /// Convert a failed result into the job-level error
    pub fn to_error(&self) -> Option<JobExecutionError> {
        let exit_code = if self.cleanup_failed() {
            self.after_exit_code
        } else {
            self.exit_code
        };
        self.is_failed().then(|| JobExecutionError {
            job: self.job.clone(),
            exit_code,
        })
    }
}

/// Overall pipeline status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

/// Everything known about a finished pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub execution_id: Uuid,
    pub status: PipelineStatus,
    pub dry_run: bool,
    pub plan: ExecutionPlan,

    /// Job results in plan order
    pub results: Vec<JobResult>,

    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl PipelineReport {
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Succeeded
    }

    /// Get the result of a job by name
    pub fn result(&self, job: &str) -> Option<&JobResult> {
        self.results.iter().find(|r| r.job == job)
    }

    pub fn failed_jobs(&self) -> Vec<String> {
        self.jobs_with(JobStatus::Failed)
    }

    pub fn skipped_jobs(&self) -> Vec<String> {
        self.jobs_with(JobStatus::Skipped)
    }

    fn jobs_with(&self, status: JobStatus) -> Vec<String> {
        self.results
            .iter()
            .filter(|r| r.status == status)
            .map(|r| r.job.clone())
            .collect()
    }

    /// Wall-clock duration of the run
    pub fn duration(&self) -> Duration {
        self.completed_at
            .signed_duration_since(self.started_at)
            .to_std()
            .unwrap_or_default()
    }

    /// Turn a failed report into the aggregate pipeline error
    pub fn into_result(self) -> Result<Self, PipelineExecutionError> {
        if self.is_success() {
            Ok(self)
        } else {
            Err(PipelineExecutionError {
                failed: self.failed_jobs(),
                skipped: self.skipped_jobs(),
            })
        }
    }
}
