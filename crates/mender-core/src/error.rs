use crate::issue::IssueStatus;
use thiserror::Error;

/// What the learning store should make of a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LearningOutcome {
    /// Tried and failed: evidence that escalation may be needed.
    Failed,
    /// The oracle refused or asked for a human; retrying at a higher tier will not help.
    Declined,
    /// Says nothing about the issue itself (budget, cancellation).
    Ignored,
}

/// Why a single fix attempt did not land.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FixError {
    #[error("budget exceeded: call needs ${needed:.4} but only ${remaining:.4} of ${ceiling:.2} remains")]
    BudgetExceeded {
        needed: f64,
        remaining: f64,
        ceiling: f64,
    },

    #[error("oracle declined: {0}")]
    Declined(String),

    #[error("requires manual review: {0}")]
    NeedsReview(String),

    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("unsafe fix rejected: {0}")]
    UnsafeFix(String),

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("run cancelled")]
    Cancelled,

    #[error("io error: {0}")]
    Io(String),
}

impl FixError {
    /// Whether the next rung of the ladder is worth trying.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            FixError::ValidationFailed(_)
                | FixError::UnsafeFix(_)
                | FixError::Oracle(_)
                | FixError::Timeout(_)
                | FixError::Io(_)
        )
    }

    pub fn learning_outcome(&self) -> LearningOutcome {
        match self {
            FixError::BudgetExceeded { .. } | FixError::Cancelled => LearningOutcome::Ignored,
            FixError::Declined(_) | FixError::NeedsReview(_) => LearningOutcome::Declined,
            _ => LearningOutcome::Failed,
        }
    }

    /// Short machine-friendly label for logs and audit rows.
    pub fn code(&self) -> &'static str {
        match self {
            FixError::BudgetExceeded { .. } => "budget_exceeded",
            FixError::Declined(_) => "declined",
            FixError::NeedsReview(_) => "needs_review",
            FixError::ValidationFailed(_) => "validation_failed",
            FixError::UnsafeFix(_) => "unsafe_fix",
            FixError::Oracle(_) => "oracle_error",
            FixError::Timeout(_) => "timeout",
            FixError::Cancelled => "cancelled",
            FixError::Io(_) => "io_error",
        }
    }
}

impl From<std::io::Error> for FixError {
    fn from(err: std::io::Error) -> Self {
        FixError::Io(err.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("illegal issue transition {from:?} -> {to:?}")]
pub struct TransitionError {
    pub from: IssueStatus,
    pub to: IssueStatus,
}
