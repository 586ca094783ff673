//! Commit message and run summary text.

use mender_core::util::truncate;
use mender_core::{Issue, Run, RunStatus};
use uuid::Uuid;

pub const AGENT_NAME: &str = "mender";
const SUBJECT_DESCRIPTION_CHARS: usize = 60;
const BODY_DESCRIPTION_CHARS: usize = 72;
const REASONING_CHARS: usize = 120;

/// A fixed issue together with the one-line rationale of the attempt that fixed it.
#[derive(Debug, Clone)]
pub struct FixedIssue {
    pub issue: Issue,
    pub reasoning: String,
}

fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// One commit for the whole batch. The trailers let tooling find the run
/// that produced it.
pub fn commit_message(run_id: Uuid, fixed: &[FixedIssue]) -> String {
    let subject = match fixed {
        [only] => format!(
            "fix({}): {}",
            only.issue.kind,
            truncate(&one_line(&only.issue.description), SUBJECT_DESCRIPTION_CHARS)
        ),
        _ => format!("fix: resolve {} issues", fixed.len()),
    };

    let mut message = subject;
    message.push_str("\n\n");
    for entry in fixed {
        message.push_str(&format!(
            "- {} {}: {}\n",
            entry.issue.kind,
            entry.issue.location_label(),
            truncate(&one_line(&entry.issue.description), BODY_DESCRIPTION_CHARS)
        ));
        let reasoning = one_line(&entry.reasoning);
        if !reasoning.is_empty() {
            message.push_str(&format!("  {}\n", truncate(&reasoning, REASONING_CHARS)));
        }
    }
    message.push_str(&format!(
        "\nMender-Run: {}\nAutomated-By: {}/{}\n",
        run_id,
        AGENT_NAME,
        env!("CARGO_PKG_VERSION")
    ));
    message
}

/// Hours a person would have spent on these fixes by hand.
pub fn hours_saved(fixed: &[FixedIssue]) -> f64 {
    let minutes: u32 = fixed.iter().map(|f| f.issue.kind.manual_minutes()).sum();
    f64::from(minutes) / 60.0
}

/// The sentence every run ends with, fatal or not.
pub fn summary(run: &Run) -> String {
    let mut text = if run.tasks_found == 0 && run.status != RunStatus::Failed {
        "Codebase is clean: no issues found.".to_string()
    } else {
        format!(
            "Found {} issue(s): {} fixed, {} failed, {} skipped. Spent ${:.4}, saved ~{:.1}h of manual work.",
            run.tasks_found,
            run.tasks_completed,
            run.tasks_failed,
            run.tasks_skipped,
            run.total_cost_usd,
            run.hours_saved
        )
    };
    if let Some(commit) = &run.commit {
        text.push_str(&format!(" Committed {}.", truncate_revision(commit)));
    }
    if run.dry_run && run.tasks_completed > 0 {
        text.push_str(" Dry run: changes were reverted.");
    }
    if run.status == RunStatus::Failed {
        text.push_str(" Run failed");
        if let Some(last) = run.errors.last() {
            text.push_str(&format!(": {}", truncate(last, 120)));
        }
        text.push('.');
    } else if !run.errors.is_empty() {
        text.push_str(&format!(" {} warning(s).", run.errors.len()));
    }
    text
}

fn truncate_revision(revision: &str) -> &str {
    revision.get(..10).unwrap_or(revision)
}
