//! Test utility functions for stagerun

#![allow(dead_code)]

use async_trait::async_trait;
use stagerun::core::{JobConfig, JobResult, JobStatus, Phase, PipelineConfig, PipelineReport};
use stagerun::execution::{
    Environment, EnvironmentContext, EventEmitter, ExecutionEvent, ExecutionMode, JobExecutor, JobRunner,
    ShellRunner, StageOrchestrator,
};
use std::collections::HashSet;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Mock runner that records calls and how many jobs were live at once
#[derive(Default)]
pub struct MockRunner {
    delay: Option<Duration>,
    failing: HashSet<String>,
    live: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep every job busy for `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make the named job fail its script phase
    pub fn failing(mut self, job: &str) -> Self {
        self.failing.insert(job.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of jobs running at the same time
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobRunner for MockRunner {
    async fn execute_job(
        &self,
        job: &JobConfig,
        _environment: &Environment,
        _events: &EventEmitter,
    ) -> JobResult {
        self.calls.lock().unwrap().push(job.name.clone());
        let live = self.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(live, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.live.fetch_sub(1, Ordering::SeqCst);

        let failed = self.failing.contains(&job.name);
        JobResult {
            status: if failed { JobStatus::Failed } else { JobStatus::Succeeded },
            exit_code: Some(if failed { 1 } else { 0 }),
            failed_phase: failed.then_some(Phase::Script),
            ..JobResult::skipped(job.name.as_str(), job.stage.as_str())
        }
    }
}

/// Collects every event an orchestrator emits
#[derive(Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl EventLog {
    pub fn attach(orchestrator: &StageOrchestrator) -> Self {
        let log = Self::default();
        let events = log.events.clone();
        orchestrator.add_event_handler(move |event| events.lock().unwrap().push(event));
        log
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Names of jobs in the order they got a worker slot
    pub fn started_jobs(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecutionEvent::JobStarted { job, .. } => Some(job),
                _ => None,
            })
            .collect()
    }

    /// Highest number of jobs between JobStarted and JobFinished at once
    pub fn peak_live_jobs(&self) -> usize {
        let mut live = 0usize;
        let mut peak = 0usize;
        for event in self.events() {
            match event {
                ExecutionEvent::JobStarted { .. } => {
                    live += 1;
                    peak = peak.max(live);
                }
                ExecutionEvent::JobFinished { .. } => live = live.saturating_sub(1),
                _ => {}
            }
        }
        peak
    }
}

/// Orchestrator running real shells in capture mode inside `working_dir`
pub fn capture_orchestrator(working_dir: &Path) -> StageOrchestrator {
    let context = EnvironmentContext::capture()
        .expect("process environment")
        .with_working_dir(working_dir);
    let executor = JobExecutor::new(ShellRunner::default())
        .with_mode(ExecutionMode::Capture)
        .with_working_dir(working_dir);
    StageOrchestrator::new(Arc::new(executor), context)
}

/// Run a pipeline with real shells, capturing output
pub async fn run_captured(
    pipeline: &PipelineConfig,
    working_dir: &Path,
    max_parallelism: usize,
) -> PipelineReport {
    capture_orchestrator(working_dir)
        .execute_pipeline(pipeline, false, max_parallelism)
        .await
        .expect("orchestrator error")
}

/// Run a pipeline with any runner, returning the report and every event
pub async fn run_with_runner(
    pipeline: &PipelineConfig,
    runner: Arc<dyn JobRunner>,
    dry_run: bool,
    max_parallelism: usize,
) -> (PipelineReport, EventLog) {
    let context = EnvironmentContext::new(Environment::new(), ".");
    let orchestrator = StageOrchestrator::new(runner, context);
    let log = EventLog::attach(&orchestrator);
    let report = orchestrator
        .execute_pipeline(pipeline, dry_run, max_parallelism)
        .await
        .expect("orchestrator error");
    (report, log)
}

/// Parse a pipeline from YAML string
pub fn pipeline_from_yaml(yaml: &str) -> PipelineConfig {
    PipelineConfig::from_yaml(yaml).unwrap_or_else(|e| panic!("Failed to parse pipeline YAML: {}", e))
}

/// Captured stdout of every phase of a job
pub fn job_stdout(report: &PipelineReport, job: &str) -> String {
    report
        .result(job)
        .unwrap_or_else(|| panic!("Job '{}' not found in report", job))
        .stdout()
}

/// Assert the terminal status of a job
pub fn assert_job_status(report: &PipelineReport, job: &str, expected: JobStatus) {
    let result = report
        .result(job)
        .unwrap_or_else(|| panic!("Job '{}' not found in report", job));
    assert_eq!(
        result.status, expected,
        "Job '{}' should be {:?}, but was {:?} (error: {:?}, phases: {:?})",
        job, expected, result.status, result.error, result.phases
    );
}

/// Assert pipeline succeeded
pub fn assert_pipeline_succeeded(report: &PipelineReport) {
    assert!(
        report.is_success(),
        "Pipeline should have succeeded, but failed jobs were: {:?}",
        report.failed_jobs()
    );
}

/// Assert pipeline failed
pub fn assert_pipeline_failed(report: &PipelineReport) {
    assert!(!report.is_success(), "Pipeline should have failed");
}
