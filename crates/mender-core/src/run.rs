//! Run and FixAttempt audit records.

use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    #[default]
    Running,
    Completed,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
        }
    }
}

/// One execution of the agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    pub id: Uuid,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
    pub status: RunStatus,
    pub tasks_found: usize,
    pub tasks_completed: usize,
    pub tasks_skipped: usize,
    pub tasks_failed: usize,
    pub total_cost_usd: f64,
    /// Revision id of the batch commit, if one was made
    #[serde(default)]
    pub commit: Option<String>,
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub errors: Vec<String>,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default)]
    pub hours_saved: f64,
}

impl Run {
    pub fn start(dry_run: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            started_at: Utc::now(),
            finished_at: None,
            status: RunStatus::Running,
            tasks_found: 0,
            tasks_completed: 0,
            tasks_skipped: 0,
            tasks_failed: 0,
            total_cost_usd: 0.0,
            commit: None,
            summary: String::new(),
            errors: Vec::new(),
            dry_run,
            hours_saved: 0.0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status != RunStatus::Running
    }

    /// Close the run. A terminal run stays as it is.
    pub fn finish(&mut self, status: RunStatus) {
        if self.is_terminal() || status == RunStatus::Running {
            return;
        }
        self.status = status;
        self.finished_at = Some(Utc::now());
    }

    pub fn record_error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.finished_at
            .map(|end| (end - self.started_at).num_milliseconds())
    }
}

/// One try at repairing one issue. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixAttempt {
    pub id: Uuid,
    pub run_id: Uuid,
    pub issue_id: Uuid,
    pub fingerprint: String,
    /// 1-based
    pub attempt: u32,
    pub strategy: Strategy,
    /// Which fixer produced it (`security`, `static_type`, `component`, `generic`, `linter`)
    pub fixer: String,
    /// Oracle model id, or `linter` for the autofix
    #[serde(default)]
    pub model: String,
    pub success: bool,
    pub cost_usd: f64,
    pub duration_ms: u64,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
}
