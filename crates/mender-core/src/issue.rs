//! Issue records produced by a scan.
//!
//! An issue is created fresh on every scan. Severity, priority and fingerprint
//! are derived once at construction; afterwards only `status` moves, and only
//! along the fix lifecycle (`pending → fixing → fixed | failed`, or
//! `pending → skipped`).

use crate::classify::classify_parts;
use crate::error::TransitionError;
use crate::fingerprint::fingerprint_parts;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

/// Kind of defect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueType {
    Lint,
    DeadCode,
    TypeError,
    Dependency,
    Security,
    Performance,
    Optimization,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueType::Lint => "lint",
            IssueType::DeadCode => "dead_code",
            IssueType::TypeError => "type_error",
            IssueType::Dependency => "dependency",
            IssueType::Security => "security",
            IssueType::Performance => "performance",
            IssueType::Optimization => "optimization",
        }
    }

    /// Rough minutes a person would spend fixing one of these by hand.
    pub fn manual_minutes(&self) -> u32 {
        match self {
            IssueType::Lint => 5,
            IssueType::DeadCode => 10,
            IssueType::TypeError => 20,
            IssueType::Dependency => 15,
            IssueType::Security => 45,
            IssueType::Performance => 30,
            IssueType::Optimization => 20,
        }
    }
}

impl fmt::Display for IssueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Starting point for the priority score.
    pub fn base_priority(&self) -> i32 {
        match self {
            Severity::Critical => 10,
            Severity::High => 7,
            Severity::Medium => 5,
            Severity::Low => 3,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum IssueStatus {
    #[default]
    Pending,
    Fixing,
    Fixed,
    Skipped,
    Failed,
}

impl IssueStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            IssueStatus::Fixed | IssueStatus::Skipped | IssueStatus::Failed
        )
    }

    pub fn can_transition_to(&self, next: IssueStatus) -> bool {
        matches!(
            (self, next),
            (IssueStatus::Pending, IssueStatus::Fixing)
                | (IssueStatus::Pending, IssueStatus::Skipped)
                | (IssueStatus::Fixing, IssueStatus::Fixed)
                | (IssueStatus::Fixing, IssueStatus::Failed)
        )
    }
}

/// A single detected defect.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: IssueType,
    /// Repo-relative path
    pub file: PathBuf,
    pub line: Option<u32>,
    pub column: Option<u32>,
    pub description: String,
    /// Tool-specific rule or diagnostic code (e.g. `no-unused-vars`, `TS2339`)
    #[serde(default)]
    pub rule: Option<String>,
    /// Which scanner reported it
    #[serde(default)]
    pub source: String,
    pub severity: Severity,
    pub priority: u8,
    pub fingerprint: String,
    #[serde(default)]
    pub status: IssueStatus,
}

impl Issue {
    pub fn new(kind: IssueType, file: impl Into<PathBuf>, description: impl Into<String>) -> Self {
        let file = file.into();
        let description = description.into();
        let classification = classify_parts(kind, &file, &description);
        let fingerprint = fingerprint_parts(kind, &file, &description);
        Self {
            id: Uuid::new_v4(),
            kind,
            file,
            line: None,
            column: None,
            description,
            rule: None,
            source: String::new(),
            severity: classification.severity,
            priority: classification.priority,
            fingerprint,
            status: IssueStatus::Pending,
        }
    }

    pub fn with_location(mut self, line: Option<u32>, column: Option<u32>) -> Self {
        self.line = line;
        self.column = column;
        self
    }

    pub fn with_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// Move along the fix lifecycle, refusing illegal jumps.
    pub fn transition(&mut self, next: IssueStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        Ok(())
    }

    /// `path:line` for logs and commit messages.
    pub fn location_label(&self) -> String {
        match self.line {
            Some(line) => format!("{}:{}", self.file.display(), line),
            None => self.file.display().to_string(),
        }
    }
}
