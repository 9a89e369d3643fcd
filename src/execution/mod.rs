//! Pipeline execution engine

pub mod engine;
pub mod executor;
pub mod pump;
pub mod scheduler;
pub mod shell;
pub mod variables;

pub use engine::{EventEmitter, EventHandler, ExecutionEvent, StageOrchestrator};
pub use executor::{DryRunExecutor, ExecutionMode, JobExecutor, JobRunner};
pub use pump::{LineSink, OutputMode, StreamKind};
pub use scheduler::{ExecutionPlan, PlannedJob, SchedulingStrategy, StagePlan};
pub use shell::{
    BashInterpreter, ConsoleSink, FixedInterpreter, Interpreter, InterpreterStrategy, ShellError,
    ShellOutput, ShellRequest, ShellRunner,
};
pub use variables::{prepare_environment, Environment, EnvironmentContext};
