//! Contracts for everything the agent depends on but does not implement.

use crate::issue::Issue;
use crate::learning::LearningRecord;
use crate::run::{FixAttempt, Run};
use anyhow::Result;
use std::collections::HashMap;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq)]
pub struct OracleRequest {
    pub model: String,
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleReply {
    pub content: String,
    /// Reported by the service when available
    pub usage: Option<TokenUsage>,
}

/// Black-box text completion service used to propose repairs.
pub trait Oracle: Send + Sync {
    fn complete<'a>(
        &'a self,
        request: OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OracleReply>> + Send + 'a>>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    /// Whole-tree lint (or a single file when a path is given)
    Linter,
    /// Linter auto-fix on one file
    LinterFix,
    TypeChecker,
    Outdated,
    Audit,
}

impl ToolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolKind::Linter => "linter",
            ToolKind::LinterFix => "linter_fix",
            ToolKind::TypeChecker => "type_checker",
            ToolKind::Outdated => "outdated",
            ToolKind::Audit => "audit",
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// The source-tree tool surface. `Err` means the tool could not be run at
/// all (missing binary, timeout); a tool that ran and reported problems
/// returns `Ok` with a non-zero exit code.
pub trait Toolchain: Send + Sync {
    fn available(&self, tool: ToolKind) -> bool;

    fn run(&self, tool: ToolKind, file: Option<&Path>) -> Result<ToolOutput>;
}

pub trait VersionControl: Send + Sync {
    fn stage_all(&self) -> Result<()>;

    /// Returns the new revision id.
    fn commit(&self, message: &str) -> Result<String>;

    fn head_revision(&self) -> Result<Option<String>>;

    /// Restore a file to its last committed content.
    fn discard_file(&self, file: &Path) -> Result<()>;

    fn is_dirty(&self) -> Result<bool>;
}

/// Audit storage for runs, issues, and attempts.
pub trait RunStore: Send + Sync {
    fn upsert_run(&self, run: &Run) -> Result<()>;

    fn insert_issues(&self, run_id: Uuid, issues: &[Issue]) -> Result<()>;

    fn insert_attempt(&self, attempt: &FixAttempt) -> Result<()>;

    fn recent_runs(&self, limit: usize) -> Result<Vec<Run>>;
}

/// Backing storage for the learning store.
pub trait LearningBackend: Send + Sync {
    fn load_learning(&self) -> Result<HashMap<String, LearningRecord>>;

    fn save_learning(&self, records: &HashMap<String, LearningRecord>) -> Result<()>;
}
