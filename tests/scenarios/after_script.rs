//! Test: after_script - always runs, failures tracked apart from the work

use crate::helpers::*;
use stagerun::core::{JobStatus, Phase};

/// after_script runs after a failed script and the job stays failed
#[tokio::test]
async fn test_after_script_runs_after_failure() {
    let yaml = r#"
stages: [test]
cleanup:
  stage: test
  script:
    - "false"
  after_script:
    - echo after
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 1).await;

    assert_pipeline_failed(&report);
    assert_job_status(&report, "cleanup", JobStatus::Failed);

    let result = report.result("cleanup").unwrap();
    assert_eq!(result.exit_code, Some(1));
    assert_eq!(result.after_exit_code, Some(0));
    assert_eq!(result.phase_output(Phase::AfterScript).unwrap().stdout, "after\n");
}

/// A failing after_script fails the job but keeps the script's exit code
#[tokio::test]
async fn test_cleanup_failure_is_distinguishable() {
    let yaml = r#"
stages: [test]
flaky-cleanup:
  stage: test
  script:
    - echo work
  after_script:
    - exit 9
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 1).await;

    assert_pipeline_failed(&report);
    let result = report.result("flaky-cleanup").unwrap();
    assert_eq!(result.exit_code, Some(0));
    assert_eq!(result.after_exit_code, Some(9));
    assert!(result.cleanup_failed());
    assert!(!result.work_failed());
    assert_eq!(result.to_error().unwrap().exit_code, Some(9));
}

/// Default after_script lines run after the job's own
#[tokio::test]
async fn test_default_after_script_is_appended() {
    let yaml = r#"
stages: [test]
default:
  before_script:
    - echo default-before
  after_script:
    - echo default-after
merged:
  stage: test
  before_script:
    - echo job-before
  script:
    - echo main
  after_script:
    - echo job-after
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 1).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(
        job_stdout(&report, "merged"),
        "default-before\njob-before\nmain\njob-after\ndefault-after\n"
    );
}

/// after_script sees the job's variables too
#[tokio::test]
async fn test_after_script_has_job_environment() {
    let yaml = r#"
stages: [test]
env-after:
  stage: test
  variables:
    TARGET: release
  script:
    - "true"
  after_script:
    - echo "cleaning $TARGET"
"#;
    let dir = tempfile::tempdir().unwrap();
    let report = run_captured(&pipeline_from_yaml(yaml), dir.path(), 1).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(job_stdout(&report, "env-after"), "cleaning release\n");
}
