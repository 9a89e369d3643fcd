//! CLI output formatting

use crate::{
    core::{JobResult, JobStatus, Phase, PipelineReport, PipelineStatus},
    execution::{ExecutionEvent, PlannedJob},
};
use console::Emoji;
use std::time::Duration;

// Re-export style
pub use console::style;

// Emojis for output
pub static CHECK: Emoji<'_, '_> = Emoji("✅ ", "✓ ");
pub static CROSS: Emoji<'_, '_> = Emoji("❌ ", "✗ ");
pub static SPINNER: Emoji<'_, '_> = Emoji("⏳ ", "~ ");
pub static INFO: Emoji<'_, '_> = Emoji("ℹ️  ", "i ");
pub static WARN: Emoji<'_, '_> = Emoji("⚠️  ", "! ");
pub static ROCKET: Emoji<'_, '_> = Emoji("🚀 ", "> ");
pub static SKIP: Emoji<'_, '_> = Emoji("⏭️  ", "- ");

/// Horizontal rule as wide as the terminal
pub fn separator() -> String {
    let width = term_size::dimensions_stdout().map(|(w, _)| w).unwrap_or(80).min(120);
    "─".repeat(width)
}

/// Format a pipeline status for display
pub fn format_status(status: PipelineStatus) -> String {
    match status {
        PipelineStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        PipelineStatus::Failed => style("FAILED").red().to_string(),
    }
}

/// Format a job status for display
pub fn format_job_status(status: JobStatus) -> String {
    match status {
        JobStatus::Succeeded => style("SUCCEEDED").green().to_string(),
        JobStatus::Failed => style("FAILED").red().to_string(),
        JobStatus::Skipped => style("SKIPPED").dim().to_string(),
    }
}

fn short_id(id: &uuid::Uuid) -> String {
    id.to_string()[..8].to_string()
}

fn describe_exit(exit_code: Option<i32>) -> String {
    match exit_code {
        Some(code) => format!("exit code {}", code),
        None => "no exit code".to_string(),
    }
}

/// Why a job failed, in one line
pub fn failure_reason(result: &JobResult) -> Option<String> {
    if !result.is_failed() {
        return None;
    }

    let reason = if let Some(phase) = result.failed_phase {
        format!("{} failed ({})", phase, describe_exit(result.exit_code))
    } else if result.cleanup_failed() {
        format!("{} failed ({})", Phase::AfterScript, describe_exit(result.after_exit_code))
    } else {
        "job could not run".to_string()
    };

    Some(match &result.error {
        Some(error) => format!("{}: {}", reason, error),
        None => reason,
    })
}

/// Format an execution event for display
///
/// Returns `None` for events that produce no console line.
pub fn format_execution_event(event: &ExecutionEvent) -> Option<String> {
    let line = match event {
        ExecutionEvent::PipelineStarted {
            execution_id,
            stages,
            jobs,
            dry_run,
        } => format!(
            "{} {} pipeline ({}): {} stage(s), {} job(s)",
            ROCKET,
            if *dry_run { "Planning" } else { "Running" },
            style(short_id(execution_id)).dim(),
            stages,
            jobs
        ),
        ExecutionEvent::StageStarted { stage, jobs } => format!(
            "{}\n{} Stage {} ({} job(s))",
            style(separator()).dim(),
            INFO,
            style(stage).bold(),
            jobs
        ),
        ExecutionEvent::JobStarted { job, .. } => format!("{} {}", SPINNER, style(job).cyan()),
        ExecutionEvent::PhaseStarted { job, phase, script } => {
            let mut out = style(format!("   {} > {}", job, phase)).dim().to_string();
            for line in script.lines() {
                out.push_str(&format!("\n     {}", style(format!("$ {}", line)).dim()));
            }
            out
        }
        ExecutionEvent::PhaseFinished {
            job,
            phase,
            exit_code,
        } => {
            if *exit_code == Some(0) {
                return None;
            }
            format!(
                "   {} {} > {} ({})",
                CROSS,
                style(job).red(),
                phase,
                describe_exit(*exit_code)
            )
        }
        ExecutionEvent::JobPlanned { job } => format_planned_job(job),
        ExecutionEvent::JobFinished { result } => match result.status {
            JobStatus::Succeeded => format!(
                "{} {} {}",
                CHECK,
                style(&result.job).green(),
                style(format_duration(result.duration)).dim()
            ),
            JobStatus::Failed => format!(
                "{} {}: {}",
                CROSS,
                style(&result.job).red(),
                style(failure_reason(result).unwrap_or_default()).dim()
            ),
            JobStatus::Skipped => format!("{} {}", SKIP, style(&result.job).dim()),
        },
        ExecutionEvent::StageSkipped { stage, jobs } => format!(
            "{} Skipping stage {} ({})",
            WARN,
            style(stage).yellow(),
            if jobs.is_empty() {
                "no jobs".to_string()
            } else {
                jobs.join(", ")
            }
        ),
        ExecutionEvent::PipelineFinished {
            execution_id,
            status,
            duration,
        } => format!(
            "{} Pipeline ({}) {} in {}",
            INFO,
            style(short_id(execution_id)).dim(),
            format_status(*status),
            format_duration(*duration)
        ),
    };

    Some(line)
}

/// Phases and their lines for a dry run
pub fn format_planned_job(job: &PlannedJob) -> String {
    let mut out = format!("{} {}", INFO, style(&job.name).cyan());
    let phases = [
        (Phase::BeforeScript, &job.before_script),
        (Phase::Script, &job.script),
        (Phase::AfterScript, &job.after_script),
    ];
    for (phase, lines) in phases {
        if lines.is_empty() {
            continue;
        }
        out.push_str(&format!("\n   {}:", style(phase).dim()));
        for line in lines {
            out.push_str(&format!("\n     $ {}", line));
        }
    }
    out
}

/// Final per-job table and overall status
pub fn format_report_summary(report: &PipelineReport) -> String {
    let mut lines = vec![
        style(separator()).dim().to_string(),
        format!("{} Summary", INFO),
    ];

    for result in &report.results {
        let icon = match result.status {
            JobStatus::Succeeded => CHECK,
            JobStatus::Failed => CROSS,
            JobStatus::Skipped => SKIP,
        };
        let mut line = format!(
            "  {}{} [{}] {}",
            icon,
            style(&result.job).bold(),
            style(&result.stage).dim(),
            format_job_status(result.status)
        );
        if let Some(reason) = failure_reason(result) {
            line.push_str(&format!(" - {}", reason));
        }
        lines.push(line);
    }

    let icon = if report.is_success() { CHECK } else { CROSS };
    lines.push(format!(
        "{} Pipeline {}{} in {}",
        icon,
        format_status(report.status),
        if report.dry_run { " (dry run)" } else { "" },
        format_duration(report.duration())
    ));
    lines.join("\n")
}

pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs == 0 {
        format!("{}ms", duration.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", duration.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
