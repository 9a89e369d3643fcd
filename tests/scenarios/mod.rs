//! Scenario-based tests for stagerun

mod after_script;
mod includes;
mod parallelism;
mod stage_barrier;
