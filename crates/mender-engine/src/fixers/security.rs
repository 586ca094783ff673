use super::OracleCall;
use crate::oracle::prompts::{fix_user_prompt, security_system};
use crate::oracle::ModelTier;
use mender_core::classify::is_auth_path;
use mender_core::fingerprint::normalize_path;
use mender_core::{Issue, IssueType, Severity};

/// Security issues, anything classified critical (vulnerability or auth
/// wording), and anything living in an auth-related path.
pub(super) fn claims(issue: &Issue) -> bool {
    issue.kind == IssueType::Security
        || issue.severity == Severity::Critical
        || is_auth_path(&normalize_path(&issue.file))
}

pub(super) fn call(issue: &Issue, content: &str) -> OracleCall {
    OracleCall {
        tier: ModelTier::Smart,
        temperature: 0.0,
        system: security_system(),
        user: fix_user_prompt(issue, content, None),
        strict: true,
    }
}
