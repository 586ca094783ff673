use super::OracleCall;
use crate::oracle::prompts::{fix_user_prompt, with_contract, COMPONENT};
use crate::oracle::ModelTier;
use mender_core::util::literal_regex;
use mender_core::Issue;
use regex::Regex;
use std::sync::OnceLock;

fn framework_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        literal_regex(
            r"\b(?:(?i:hooks?|props?|state|lifecycle|re-?renders?|jsx|key prop|exhaustive-deps)|use[A-Z]\w*)\b",
        )
    })
}

fn is_component_file(issue: &Issue) -> bool {
    issue
        .file
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "tsx" | "jsx"))
}

pub(super) fn claims(issue: &Issue) -> bool {
    is_component_file(issue) || framework_terms().is_match(&issue.description)
}

pub(super) fn call(issue: &Issue, content: &str) -> OracleCall {
    OracleCall {
        tier: ModelTier::Smart,
        temperature: 0.2,
        system: with_contract(COMPONENT),
        user: fix_user_prompt(issue, content, None),
        strict: false,
    }
}
