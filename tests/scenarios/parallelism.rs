//! Test: Parallelism - bounded worker pool per stage

use crate::helpers::*;
use stagerun::core::{JobConfig, PipelineConfig};
use std::sync::Arc;
use std::time::Duration;

fn four_job_stage() -> PipelineConfig {
    ["one", "two", "three", "four"]
        .into_iter()
        .fold(PipelineConfig::new(["test"]), |pipeline, name| {
            pipeline.with_job(JobConfig::new(name, "test").with_script(["sleep 0.2"]))
        })
}

/// Never more than two jobs live with a pool of two
#[tokio::test]
async fn test_pool_of_two_bounds_live_jobs() {
    let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(100)));
    let (report, log) = run_with_runner(&four_job_stage(), runner.clone(), false, 2).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(runner.calls().len(), 4);
    assert_eq!(runner.peak(), 2);
    assert!(log.peak_live_jobs() <= 2);
}

/// A pool of one runs jobs strictly in declaration order
#[tokio::test]
async fn test_pool_of_one_is_sequential() {
    let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(20)));
    let (report, log) = run_with_runner(&four_job_stage(), runner.clone(), false, 1).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(runner.peak(), 1);
    assert_eq!(runner.calls(), vec!["one", "two", "three", "four"]);
    assert_eq!(log.started_jobs(), vec!["one", "two", "three", "four"]);
    assert_eq!(log.peak_live_jobs(), 1);
}

/// Zero is treated as a pool of one
#[tokio::test]
async fn test_zero_parallelism_still_runs() {
    let runner = Arc::new(MockRunner::new());
    let (report, _) = run_with_runner(&four_job_stage(), runner.clone(), false, 0).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(runner.calls(), vec!["one", "two", "three", "four"]);
}

/// Real child processes stay within the bound
#[tokio::test]
async fn test_real_shells_respect_bound() {
    let dir = tempfile::tempdir().unwrap();
    let orchestrator = capture_orchestrator(dir.path());
    let log = EventLog::attach(&orchestrator);

    let report = orchestrator
        .execute_pipeline(&four_job_stage(), false, 2)
        .await
        .unwrap();

    assert_pipeline_succeeded(&report);
    assert_eq!(log.peak_live_jobs(), 2);
}

/// A larger pool lets all jobs of a stage overlap
#[tokio::test]
async fn test_wide_pool_overlaps_jobs() {
    let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(100)));
    let (report, _) = run_with_runner(&four_job_stage(), runner.clone(), false, 8).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(runner.peak(), 4);
}
