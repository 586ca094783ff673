//! Core domain model and contracts for Mender.

pub mod classify;
pub mod error;
pub mod estimate;
pub mod fingerprint;
pub mod fix_loop;
pub mod issue;
pub mod learning;
pub mod memory;
pub mod protocol;
pub mod run;
pub mod strategy;
pub mod util;

pub use classify::{classify, Classification};
pub use error::{FixError, LearningOutcome, TransitionError};
pub use fingerprint::fingerprint;
pub use issue::{Issue, IssueStatus, IssueType, Severity};
pub use learning::LearningRecord;
pub use protocol::*;
pub use run::{FixAttempt, Run, RunStatus};
pub use strategy::Strategy;
