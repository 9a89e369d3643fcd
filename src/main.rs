use anyhow::{Context, Result};
use stagerun::cli::output::{format_execution_event, format_report_summary, style, CROSS, INFO};
use stagerun::cli::Cli;
use stagerun::core::PipelineConfig;
use stagerun::execution::{
    EnvironmentContext, ExecutionMode, JobExecutor, ShellRunner, StageOrchestrator,
};
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::from_args();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set logging subscriber")?;

    let success = run_pipeline(&cli).await?;
    if !success {
        std::process::exit(1);
    }

    Ok(())
}

async fn run_pipeline(cli: &Cli) -> Result<bool> {
    let path = cli.config_path();
    let pipeline = match PipelineConfig::from_file(&path) {
        Ok(pipeline) => pipeline,
        Err(e) => {
            println!("{} Invalid configuration {}:", CROSS, style(path.display()).bold());
            println!("  {}", style(&e).red());
            return Ok(false);
        }
    };

    let context = EnvironmentContext::capture().context("Failed to read process environment")?;
    if !context.color_enabled() {
        console::set_colors_enabled(false);
        console::set_colors_enabled_stderr(false);
    }

    let max_parallelism = cli.max_parallelism();
    let mode = if cli.json {
        ExecutionMode::Capture
    } else {
        ExecutionMode::Stream {
            color: context.color_enabled(),
            label_lines: max_parallelism > 1,
        }
    };

    let executor = JobExecutor::new(ShellRunner::from_context(&context))
        .with_mode(mode)
        .with_working_dir(context.working_dir())
        .with_timeout(cli.phase_timeout());
    let orchestrator = StageOrchestrator::new(Arc::new(executor), context);

    if !cli.json {
        println!(
            "{} Loaded {} ({} stage(s), {} job(s))",
            INFO,
            style(path.display()).bold(),
            pipeline.stages.len(),
            pipeline.jobs.len()
        );
        orchestrator.add_event_handler(|event| {
            if let Some(line) = format_execution_event(&event) {
                println!("{}", line);
            }
        });
    }

    let report = orchestrator
        .execute_pipeline(&pipeline, cli.dry_run, max_parallelism)
        .await
        .context("Pipeline execution aborted")?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", format_report_summary(&report));
    }

    let success = report.is_success();
    if let Err(e) = report.into_result() {
        error!("{}", e);
    }
    Ok(success)
}
