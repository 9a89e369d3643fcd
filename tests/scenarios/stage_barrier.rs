//! Test: Stage barrier - a failed stage stops every later stage

use crate::helpers::*;
use stagerun::core::{JobStatus, PipelineStatus};
use stagerun::execution::ExecutionEvent;
use std::sync::Arc;
use std::time::Duration;

/// A failing build job keeps every test job from running
#[tokio::test]
async fn test_failed_stage_blocks_next_stage() {
    let yaml = r#"
stages: [build, test]
compile:
  stage: build
  script:
    - exit 1
unit:
  stage: test
  script:
    - echo test-output
    - touch ran.txt
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 1).await;

    assert_eq!(report.status, PipelineStatus::Failed);
    assert_job_status(&report, "compile", JobStatus::Failed);
    assert_job_status(&report, "unit", JobStatus::Skipped);
    assert!(job_stdout(&report, "unit").is_empty());
    assert!(!dir.path().join("ran.txt").exists());
    assert!(report.into_result().is_err());
}

/// Siblings of a failed job in the same stage still finish
#[tokio::test]
async fn test_siblings_are_not_cancelled() {
    let yaml = r#"
stages: [build, test]
broken:
  stage: build
  script: exit 3
slow-sibling:
  stage: build
  script:
    - sleep 0.3
    - echo finished
unit:
  stage: test
  script: echo never
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 2).await;

    assert_job_status(&report, "broken", JobStatus::Failed);
    assert_job_status(&report, "slow-sibling", JobStatus::Succeeded);
    assert_eq!(job_stdout(&report, "slow-sibling"), "finished\n");
    assert_job_status(&report, "unit", JobStatus::Skipped);
}

/// The next stage starts only after every job of the previous one finished
#[tokio::test]
async fn test_next_stage_waits_for_all_jobs() {
    let pipeline = pipeline_from_yaml(
        r#"
stages: [build, test]
a:
  stage: build
  script: "true"
b:
  stage: build
  script: "true"
c:
  stage: test
  script: "true"
"#,
    );
    let runner = Arc::new(MockRunner::new().with_delay(Duration::from_millis(50)));
    let (report, log) = run_with_runner(&pipeline, runner, false, 4).await;

    assert_pipeline_succeeded(&report);

    let events = log.events();
    let test_stage = events
        .iter()
        .position(|e| matches!(e, ExecutionEvent::StageStarted { stage, .. } if stage == "test"))
        .unwrap();
    let build_finished: Vec<_> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, ExecutionEvent::JobFinished { result } if result.stage == "build"))
        .map(|(i, _)| i)
        .collect();

    assert_eq!(build_finished.len(), 2);
    assert!(build_finished.iter().all(|&i| i < test_stage));
}

/// Skipped stages are reported with their jobs
#[tokio::test]
async fn test_skip_propagates_to_all_later_stages() {
    let pipeline = pipeline_from_yaml(
        r#"
stages: [build, test, deploy]
compile:
  stage: build
  script: make
unit:
  stage: test
  script: cargo test
ship:
  stage: deploy
  script: ./ship.sh
"#,
    );
    let runner = Arc::new(MockRunner::new().failing("compile"));
    let (report, log) = run_with_runner(&pipeline, runner.clone(), false, 1).await;

    assert_pipeline_failed(&report);
    assert_eq!(runner.calls(), vec!["compile"]);
    assert_eq!(report.skipped_jobs(), vec!["unit", "ship"]);

    let skipped: Vec<_> = log
        .events()
        .into_iter()
        .filter_map(|e| match e {
            ExecutionEvent::StageSkipped { stage, jobs } => Some((stage, jobs)),
            _ => None,
        })
        .collect();
    assert_eq!(
        skipped,
        vec![
            ("test".to_string(), vec!["unit".to_string()]),
            ("deploy".to_string(), vec!["ship".to_string()]),
        ]
    );
}
