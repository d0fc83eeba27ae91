//! Run presentation: advance reports, status, list and recovery text/json.

use super::{format_timestamp, to_json};
use crate::cli::OutputFormat;
use crate::pipeline::{
    AdvanceOutcome, AdvanceReport, AttemptOutcome, RecoveryReport, Run, RunStatus, Stage,
    TerminalResult,
};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use owo_colors::OwoColorize;

/// Stage name colored by how much attention it needs.
pub fn stage_label(stage: Stage) -> String {
    match stage {
        Stage::Integrated => stage.as_str().green().to_string(),
        Stage::Failed => stage.as_str().red().to_string(),
        Stage::AwaitingReview => stage.as_str().yellow().to_string(),
        Stage::ContextAssembly | Stage::Generating => stage.as_str().cyan().to_string(),
    }
}

fn result_label(run: &Run) -> String {
    match &run.result {
        Some(TerminalResult::Integrated { attempt_seq }) => format!("attempt {}", attempt_seq),
        Some(TerminalResult::Failed { reason }) => reason.to_string(),
        None => "-".to_string(),
    }
}

fn first_line(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() > max {
        let cut: String = line.chars().take(max.saturating_sub(1)).collect();
        format!("{}…", cut)
    } else {
        line.to_string()
    }
}

pub fn format_advance_report(report: &AdvanceReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(report);
    }
    let detail = match report.outcome {
        AdvanceOutcome::Transitioned { from, to } => {
            format!("{} -> {}", from.as_str(), stage_label(to))
        }
        AdvanceOutcome::AwaitingDecision => {
            format!("{} (waiting for a review decision)", stage_label(report.stage))
        }
        AdvanceOutcome::AlreadyTerminal => {
            format!("{} (already terminal)", stage_label(report.stage))
        }
    };
    format!(
        "Run {} [iteration {}]: {}",
        report.run_id, report.iteration, detail
    )
}

pub fn format_run_status(status: &RunStatus, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(status);
    }
    let run = &status.run;
    let mut out = format!("{}\n", format!("Run {}", run.id).bold());
    out.push_str(&format!("Task: {}\n", run.task_description));
    out.push_str(&format!("Stage: {}\n", stage_label(run.stage)));
    out.push_str(&format!(
        "Iteration: {} of {}\n",
        run.iteration, run.max_iterations
    ));
    out.push_str(&format!("Result: {}\n", result_label(run)));
    out.push_str(&format!("Created: {}\n", format_timestamp(run.created_at_ms)));
    out.push_str(&format!("Updated: {}\n", format_timestamp(run.updated_at_ms)));
    if status.cancellation_requested {
        out.push_str("Cancellation: requested\n");
    }
    if let Some(review) = &status.pending_review {
        let state = match &review.decision {
            Some(decision) => format!("resolved ({})", decision.label()),
            None => "waiting".to_string(),
        };
        out.push_str(&format!(
            "Review: attempt {} {}\n",
            review.attempt_seq, state
        ));
    }

    if !run.feedback.is_empty() {
        out.push_str("\nReviewer feedback:\n");
        for (i, comment) in run.feedback.iter().enumerate() {
            out.push_str(&format!("  {}. {}\n", i + 1, comment));
        }
    }

    if status.attempts.is_empty() {
        out.push_str("\nNo attempts yet.\n");
        return out;
    }
    out.push_str("\nAttempts:\n");
    for attempt in &status.attempts {
        let outcome = match attempt.outcome {
            AttemptOutcome::Approved => attempt.outcome.as_str().green().to_string(),
            AttemptOutcome::Rejected | AttemptOutcome::GenerationFailed => {
                attempt.outcome.as_str().red().to_string()
            }
            _ => attempt.outcome.as_str().to_string(),
        };
        out.push_str(&format!(
            "  #{} iteration {} {} (snapshot {}, {} fragments, store v{})\n",
            attempt.seq,
            attempt.iteration,
            outcome,
            attempt.snapshot.snapshot_id.short(),
            attempt.snapshot.fragment_count,
            attempt.snapshot.store_version
        ));
        if let Some(artifact) = &attempt.artifact {
            out.push_str(&format!(
                "     {} [{}{}]\n",
                artifact.commentary.summary,
                artifact.language,
                artifact
                    .path
                    .as_deref()
                    .map(|p| format!(", {}", p))
                    .unwrap_or_default()
            ));
        }
        if let Some(error) = &attempt.error {
            out.push_str(&format!("     error: {}\n", error));
        }
        for warning in &attempt.warnings {
            out.push_str(&format!("     warning: {}\n", warning));
        }
    }
    out
}

pub fn format_run_list(runs: &[Run], format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(&runs);
    }
    if runs.is_empty() {
        return "No runs found.\n\nUse 'walk submit' to start one.".to_string();
    }
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Run", "Stage", "Iteration", "Result", "Task"]);
    for run in runs {
        table.add_row(vec![
            run.id.to_string(),
            run.stage.as_str().to_string(),
            format!("{}/{}", run.iteration, run.max_iterations),
            result_label(run),
            first_line(&run.task_description, 48),
        ]);
    }
    format!("{}\n\nTotal: {} run(s)", table, runs.len())
}

pub fn format_recovery_report(report: &RecoveryReport, format: OutputFormat) -> String {
    if format == OutputFormat::Json {
        return to_json(report);
    }
    let mut out = String::from("Recovery complete\n");
    out.push_str(&format!("  cancelled:          {}\n", report.cancelled.len()));
    out.push_str(&format!("  review re-requested: {}\n", report.reregistered.len()));
    out.push_str(&format!("  awaiting review:    {}\n", report.awaiting_review.len()));
    out.push_str(&format!("  resumable:          {}\n", report.resumable.len()));
    out.push_str(&format!(
        "  orphaned reviews:   {}\n",
        report.discarded_reviews.len()
    ));
    for id in &report.resumable {
        out.push_str(&format!("  resume: {}\n", id));
    }
    out
}
