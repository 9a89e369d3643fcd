//! Test: Includes - local files merged into the root configuration

use crate::helpers::*;
use stagerun::core::{ConfigError, PipelineConfig};
use std::fs;

/// Jobs and variables from included files run like local ones
#[tokio::test]
async fn test_included_jobs_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("ci")).unwrap();
    fs::write(
        dir.path().join("ci/build.yml"),
        r#"
variables:
  TARGET: debug
  SHARED: from-include
compile:
  stage: build
  script:
    - echo "compile $TARGET"
"#,
    )
    .unwrap();
    fs::write(
        dir.path().join(".gitlab-ci.yml"),
        r#"
include:
  - local: ci/build.yml
stages: [build, test]
variables:
  TARGET: release
unit:
  stage: test
  script:
    - echo "unit $SHARED"
"#,
    )
    .unwrap();

    let pipeline = PipelineConfig::from_file(dir.path().join(".gitlab-ci.yml")).unwrap();
    let report = run_captured(&pipeline, dir.path(), 1).await;

    assert_pipeline_succeeded(&report);
    assert_eq!(report.plan.job_names(), vec!["compile", "unit"]);
    assert_eq!(job_stdout(&report, "compile"), "compile release\n");
    assert_eq!(job_stdout(&report, "unit"), "unit from-include\n");
}

/// A cycle is reported before anything runs
#[test]
fn test_include_cycle_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("a.yml"), "include: b.yml\n").unwrap();
    fs::write(dir.path().join("b.yml"), "include: a.yml\n").unwrap();

    let err = PipelineConfig::from_file(dir.path().join("a.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::IncludeCycle(_)), "unexpected error: {}", err);
}

/// A job in an undeclared stage is a configuration error
#[test]
fn test_unknown_stage_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("pipeline.yml"),
        "stages: [build]\nlint:\n  stage: check\n  script: echo lint\n",
    )
    .unwrap();

    let err = PipelineConfig::from_file(dir.path().join("pipeline.yml")).unwrap_err();
    assert!(matches!(err, ConfigError::UnknownStage { .. }), "unexpected error: {}", err);
}
