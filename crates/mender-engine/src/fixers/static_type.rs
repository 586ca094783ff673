use super::OracleCall;
use crate::oracle::prompts::{
    fix_user_prompt, numbered_window, with_contract, TYPE_GUARDED, TYPE_LOOSENED, TYPE_MINIMAL,
};
use crate::oracle::ModelTier;
use mender_core::{Issue, IssueType, Strategy};

/// Lines of context on each side of the reported line.
const WINDOW_RADIUS: u32 = 30;

pub(super) fn claims(issue: &Issue) -> bool {
    issue.kind == IssueType::TypeError
}

pub(super) fn call(issue: &Issue, content: &str, strategy: Strategy) -> OracleCall {
    let (tier, temperature, system) = match strategy {
        Strategy::Aggressive => (ModelTier::Smart, 0.3, TYPE_GUARDED),
        Strategy::LastResort => (ModelTier::Smart, 0.5, TYPE_LOOSENED),
        _ => (ModelTier::Balanced, 0.1, TYPE_MINIMAL),
    };
    let window = issue
        .line
        .and_then(|line| numbered_window(content, line, WINDOW_RADIUS));
    OracleCall {
        tier,
        temperature,
        system: with_contract(system),
        user: fix_user_prompt(issue, content, window.as_deref()),
        strict: false,
    }
}
