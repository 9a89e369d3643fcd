//! Stage orchestrator - runs the pipeline stage by stage

use crate::{
    core::{EngineError, JobResult, Phase, PipelineConfig, PipelineReport, PipelineStatus},
    execution::{
        executor::{DryRunExecutor, JobRunner},
        scheduler::{ExecutionPlan, PlannedJob, SchedulingStrategy, StagePlan},
        variables::{prepare_environment, EnvironmentContext},
    },
};
use chrono::Utc;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Events that can occur during pipeline execution
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    PipelineStarted {
        execution_id: Uuid,
        stages: usize,
        jobs: usize,
        dry_run: bool,
    },
    StageStarted {
        stage: String,
        jobs: usize,
    },
    /// A job got a worker slot
    JobStarted {
        job: String,
        stage: String,
    },
    /// Carries the joined script about to run
    PhaseStarted {
        job: String,
        phase: Phase,
        script: String,
    },
    PhaseFinished {
        job: String,
        phase: Phase,
        exit_code: Option<i32>,
    },
    /// Dry run only: what the job would have executed
    JobPlanned {
        job: PlannedJob,
    },
    /// Emitted before the job's worker slot is released
    JobFinished {
        result: JobResult,
    },
    /// An earlier stage failed; none of these jobs will run
    StageSkipped {
        stage: String,
        jobs: Vec<String>,
    },
    PipelineFinished {
        execution_id: Uuid,
        status: PipelineStatus,
        duration: Duration,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fan-out of execution events to registered handlers
///
/// Cheap to clone; clones share the same handler list. Handlers are called
/// synchronously on the emitting task, possibly from several jobs at once.
#[derive(Clone, Default)]
pub struct EventEmitter {
    handlers: Arc<RwLock<Vec<EventHandler>>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an event handler
    pub fn subscribe<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        let mut handlers = match self.handlers.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        handlers.push(Arc::new(handler));
    }

    /// Emit an event to all handlers
    pub fn emit(&self, event: ExecutionEvent) {
        let handlers = match self.handlers.read() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        for handler in handlers.iter() {
            handler(event.clone());
        }
    }
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count = self.handlers.read().map(|h| h.len()).unwrap_or_default();
        f.debug_struct("EventEmitter").field("handlers", &count).finish()
    }
}

/// Runs stages in declared order with a barrier between them
pub struct StageOrchestrator {
    runner: Arc<dyn JobRunner>,
    context: EnvironmentContext,
    events: EventEmitter,
}

impl StageOrchestrator {
    pub fn new(runner: Arc<dyn JobRunner>, context: EnvironmentContext) -> Self {
        Self {
            runner,
            context,
            events: EventEmitter::new(),
        }
    }

    /// Add an event handler
    pub fn add_event_handler<F>(&self, handler: F)
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.subscribe(handler);
    }

    pub fn events(&self) -> &EventEmitter {
        &self.events
    }

    /// Execute the entire pipeline
    ///
    /// Job failures are reported in the returned [`PipelineReport`]; an
    /// error here means the orchestrator itself could not continue.
    pub async fn execute_pipeline(
        &self,
        pipeline: &PipelineConfig,
        dry_run: bool,
        max_parallelism: usize,
    ) -> Result<PipelineReport, EngineError> {
        let execution_id = Uuid::new_v4();
        let started_at = Utc::now();
        let plan = ExecutionPlan::for_pipeline(pipeline);
        let strategy = SchedulingStrategy::from_parallelism(max_parallelism);
        let runner: Arc<dyn JobRunner> = if dry_run {
            Arc::new(DryRunExecutor)
        } else {
            self.runner.clone()
        };

        info!(
            "Starting pipeline execution {} ({} stage(s), {} job(s), {:?}{})",
            execution_id,
            plan.stages.len(),
            plan.job_count(),
            strategy,
            if dry_run { ", dry run" } else { "" }
        );
        self.events.emit(ExecutionEvent::PipelineStarted {
            execution_id,
            stages: plan.stages.len(),
            jobs: plan.job_count(),
            dry_run,
        });

        let mut results = Vec::with_capacity(plan.job_count());
        let mut failed_stage: Option<&str> = None;

        for stage in &plan.stages {
            if let Some(failed) = failed_stage {
                info!("Skipping stage {} after failure in {}", stage.name, failed);
                results.extend(
                    stage
                        .jobs
                        .iter()
                        .map(|job| JobResult::skipped(job.name.as_str(), stage.name.as_str())),
                );
                self.events.emit(ExecutionEvent::StageSkipped {
                    stage: stage.name.clone(),
                    jobs: stage.jobs.iter().map(|j| j.name.clone()).collect(),
                });
                continue;
            }

            self.events.emit(ExecutionEvent::StageStarted {
                stage: stage.name.clone(),
                jobs: stage.jobs.len(),
            });

            let stage_results = self.run_stage(pipeline, stage, &runner, strategy).await?;
            if stage_results.iter().any(JobResult::is_failed) {
                warn!("Stage {} failed", stage.name);
                failed_stage = Some(stage.name.as_str());
            }
            results.extend(stage_results);
        }

        let status = if results.iter().any(JobResult::is_failed) {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Succeeded
        };

        let report = PipelineReport {
            execution_id,
            status,
            dry_run,
            plan,
            results,
            started_at,
            completed_at: Utc::now(),
        };

        info!("Pipeline execution finished: {} - {:?}", execution_id, status);
        self.events.emit(ExecutionEvent::PipelineFinished {
            execution_id,
            status,
            duration: report.duration(),
        });

        Ok(report)
    }

    /// Dispatch one stage's jobs and wait for all of them
    async fn run_stage(
        &self,
        pipeline: &PipelineConfig,
        stage: &StagePlan,
        runner: &Arc<dyn JobRunner>,
        strategy: SchedulingStrategy,
    ) -> Result<Vec<JobResult>, EngineError> {
        let pool = Arc::new(Semaphore::new(strategy.permits()));
        let mut handles = Vec::with_capacity(stage.jobs.len());

        for job in pipeline.jobs_in_stage(&stage.name) {
            // Waiting here keeps admission in declaration order
            let permit = pool
                .clone()
                .acquire_owned()
                .await
                .map_err(|_| EngineError::PoolClosed(stage.name.clone()))?;

            let environment = prepare_environment(&self.context, pipeline, job);
            let job = job.clone();
            let runner = runner.clone();
            let events = self.events.clone();

            events.emit(ExecutionEvent::JobStarted {
                job: job.name.clone(),
                stage: job.stage.clone(),
            });

            let name = job.name.clone();
            let handle = tokio::spawn(async move {
                let result = runner.execute_job(&job, &environment, &events).await;
                events.emit(ExecutionEvent::JobFinished {
                    result: result.clone(),
                });
                drop(permit);
                result
            });
            handles.push((name, handle));
        }

        // Stage barrier
        let mut results = Vec::with_capacity(handles.len());
        for (name, handle) in handles {
            match handle.await {
                Ok(result) => results.push(result),
                Err(e) => {
                    error!("Job {} aborted: {}", name, e);
                    let result = JobResult::aborted(name, stage.name.as_str(), e.to_string());
                    self.events.emit(ExecutionEvent::JobFinished {
                        result: result.clone(),
                    });
                    results.push(result);
                }
            }
        }

        Ok(results)
    }
}
