//! Job executor - runs a job's phases through the shell layer

use crate::{
    core::{JobConfig, JobResult, JobStatus, Phase, PhaseOutput},
    execution::{
        engine::{EventEmitter, ExecutionEvent},
        pump::OutputMode,
        scheduler::PlannedJob,
        shell::{ConsoleSink, ShellError, ShellRequest, ShellRunner},
        variables::Environment,
    },
};
use async_trait::async_trait;
use chrono::Utc;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Runs one job to a terminal result
///
/// Implementations never return an error: anything that goes wrong is
/// recorded on the [`JobResult`] so sibling jobs keep running.
#[async_trait]
pub trait JobRunner: Send + Sync {
    async fn execute_job(
        &self,
        job: &JobConfig,
        environment: &Environment,
        events: &EventEmitter,
    ) -> JobResult;
}

/// Where a job's output goes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Forward lines to the console as they arrive
    Stream {
        color: bool,
        /// Prefix each line with the job name
        label_lines: bool,
    },
    /// Record output on the job result
    Capture,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Stream {
            color: true,
            label_lines: false,
        }
    }
}

/// Outcome of one phase invocation
#[derive(Debug)]
struct PhaseRun {
    exit_code: Option<i32>,
    stdout: Option<String>,
    stderr: Option<String>,
    error: Option<String>,
}

impl PhaseRun {
    fn succeeded(&self) -> bool {
        self.error.is_none() && self.exit_code == Some(0)
    }
}

/// Runs before_script, script and after_script for real
#[derive(Debug, Clone, Default)]
pub struct JobExecutor {
    shell: ShellRunner,
    mode: ExecutionMode,
    working_dir: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl JobExecutor {
    pub fn new(shell: ShellRunner) -> Self {
        Self {
            shell,
            ..Self::default()
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_working_dir(mut self, working_dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(working_dir.into());
        self
    }

    /// Per-phase time limit
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Join a phase's lines into one script, dropping blank lines
    ///
    /// Returns `None` when nothing is left to run.
    pub fn phase_script(lines: &[String]) -> Option<String> {
        let lines: Vec<&str> = lines
            .iter()
            .map(String::as_str)
            .filter(|line| !line.trim().is_empty())
            .collect();

        if lines.is_empty() {
            None
        } else {
            Some(format!("{}\n", lines.join("\n")))
        }
    }

    fn output_mode(&self, job: &JobConfig) -> OutputMode {
        match self.mode {
            ExecutionMode::Capture => OutputMode::Capture,
            ExecutionMode::Stream { color, label_lines } => {
                let sink = ConsoleSink::new(color);
                let sink = if label_lines {
                    sink.with_prefix(job.name.as_str())
                } else {
                    sink
                };
                OutputMode::Stream(Arc::new(sink))
            }
        }
    }

    /// Run one phase; `None` when the phase has no lines
    async fn run_phase(
        &self,
        job: &JobConfig,
        phase: Phase,
        environment: &Environment,
        output: &OutputMode,
        events: &EventEmitter,
    ) -> Option<PhaseRun> {
        let lines = match phase {
            Phase::BeforeScript => &job.before_script,
            Phase::Script => &job.script,
            Phase::AfterScript => &job.after_script,
        };
        let script = Self::phase_script(lines)?;

        info!("Job {} {}:\n$ {}", job.name, phase, script.trim_end());
        events.emit(ExecutionEvent::PhaseStarted {
            job: job.name.clone(),
            phase,
            script: script.clone(),
        });

        let mut request = ShellRequest::new(script)
            .env(environment.clone())
            .mode(output.clone())
            .timeout(self.timeout);
        if let Some(dir) = &self.working_dir {
            request = request.current_dir(dir);
        }

        let run = match self.shell.execute(request).await {
            Ok(out) => PhaseRun {
                exit_code: Some(out.exit_code),
                stdout: out.stdout,
                stderr: out.stderr,
                error: None,
            },
            Err(ShellError::ProcessFailure {
                exit_code,
                stdout,
                stderr,
                ..
            }) => {
                warn!("Job {} {} exited with code {}", job.name, phase, exit_code);
                PhaseRun {
                    exit_code: Some(exit_code),
                    stdout,
                    stderr,
                    error: None,
                }
            }
            Err(e) => {
                error!("Job {} {} could not run: {}", job.name, phase, e);
                PhaseRun {
                    exit_code: None,
                    stdout: None,
                    stderr: None,
                    error: Some(e.to_string()),
                }
            }
        };

        events.emit(ExecutionEvent::PhaseFinished {
            job: job.name.clone(),
            phase,
            exit_code: run.exit_code,
        });
        Some(run)
    }

    fn record(result: &mut JobResult, phase: Phase, run: &mut PhaseRun) {
        if run.stdout.is_none() && run.stderr.is_none() {
            return;
        }
        result.phases.push(PhaseOutput {
            phase,
            exit_code: run.exit_code,
            stdout: run.stdout.take().unwrap_or_default(),
            stderr: run.stderr.take().unwrap_or_default(),
        });
    }
}

#[async_trait]
impl JobRunner for JobExecutor {
    async fn execute_job(
        &self,
        job: &JobConfig,
        environment: &Environment,
        events: &EventEmitter,
    ) -> JobResult {
        info!("Executing job: {} (stage {})", job.name, job.stage);
        let clock = Instant::now();
        let output = self.output_mode(job);

        let mut result = JobResult {
            status: JobStatus::Succeeded,
            started_at: Some(Utc::now()),
            ..JobResult::skipped(job.name.as_str(), job.stage.as_str())
        };

        for phase in [Phase::BeforeScript, Phase::Script] {
            let Some(mut run) = self.run_phase(job, phase, environment, &output, events).await else {
                continue;
            };
            result.exit_code = run.exit_code;
            Self::record(&mut result, phase, &mut run);

            if !run.succeeded() {
                result.failed_phase = Some(phase);
                result.error = run.error.take();
                break;
            }
        }

        // after_script runs whatever happened above
        if let Some(mut run) = self.run_phase(job, Phase::AfterScript, environment, &output, events).await {
            result.after_exit_code = run.exit_code;
            Self::record(&mut result, Phase::AfterScript, &mut run);

            if !run.succeeded() {
                warn!("Job {} after_script failed", job.name);
                if result.error.is_none() {
                    result.error = run.error.take();
                }
                result.status = JobStatus::Failed;
            }
        }

        if result.failed_phase.is_some() {
            result.status = JobStatus::Failed;
        }
        result.duration = clock.elapsed();

        match result.status {
            JobStatus::Succeeded => info!("Job {} succeeded in {:?}", job.name, result.duration),
            _ => warn!("Job {} failed in {:?}", job.name, result.duration),
        }
        result
    }
}

/// Reports what a job would run without spawning anything
#[derive(Debug, Clone, Copy, Default)]
pub struct DryRunExecutor;

#[async_trait]
impl JobRunner for DryRunExecutor {
    async fn execute_job(
        &self,
        job: &JobConfig,
        _environment: &Environment,
        events: &EventEmitter,
    ) -> JobResult {
        debug!("Planning job: {}", job.name);
        events.emit(ExecutionEvent::JobPlanned {
            job: PlannedJob::from(job),
        });

        JobResult {
            status: JobStatus::Succeeded,
            started_at: Some(Utc::now()),
            ..JobResult::skipped(job.name.as_str(), job.stage.as_str())
        }
    }
}
