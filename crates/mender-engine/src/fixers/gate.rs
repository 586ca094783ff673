//! Local acceptance checks every candidate must pass before it touches disk.

use mender_core::util::{collapse_whitespace, literal_regex};
use mender_core::FixError;
use regex::Regex;
use std::sync::OnceLock;

/// Largest accepted change in file length, as a share of the original.
pub const MAX_SIZE_DELTA: f64 = 0.5;

const SECURITY_KEYWORDS: [&str; 6] = [
    "authenticate",
    "authorize",
    "validate",
    "sanitize",
    "escape",
    "permission",
];

fn dangerous_constructs() -> &'static [(&'static str, Regex)] {
    static PATTERNS: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        [
            ("eval", r"\beval\s*\("),
            ("new Function", r"\bnew\s+Function\s*\("),
            ("innerHTML assignment", r"\.(?:inner|outer)HTML\s*\+?=(?:[^=]|$)"),
            ("dangerouslySetInnerHTML", r"dangerouslySetInnerHTML"),
            ("document.write", r"\bdocument\.write(?:ln)?\s*\("),
        ]
        .into_iter()
        .map(|(name, pattern)| (name, literal_regex(pattern)))
        .collect()
    })
}

/// The shared gate: the candidate must really differ from the original and
/// must not grow or shrink the file by more than half.
pub fn check_candidate(original: &str, candidate: &str) -> Result<(), FixError> {
    if collapse_whitespace(original) == collapse_whitespace(candidate) {
        return Err(FixError::UnsafeFix(
            "candidate only changes whitespace".to_string(),
        ));
    }
    let before = original.chars().count();
    let after = candidate.chars().count();
    if exceeds_size_delta(before, after) {
        return Err(FixError::UnsafeFix(format!(
            "file length changed from {} to {} characters",
            before, after
        )));
    }
    Ok(())
}

pub fn exceeds_size_delta(before: usize, after: usize) -> bool {
    if before == 0 {
        return after > 0;
    }
    let delta = before.abs_diff(after) as f64;
    delta / before as f64 > MAX_SIZE_DELTA
}

fn count_keyword(content: &str, keyword: &str) -> usize {
    content.to_lowercase().matches(keyword).count()
}

/// Extra checks for security-sensitive files.
pub fn check_security_candidate(original: &str, candidate: &str) -> Result<(), FixError> {
    let removed: usize = SECURITY_KEYWORDS
        .iter()
        .map(|k| count_keyword(original, k).saturating_sub(count_keyword(candidate, k)))
        .sum();
    let added: usize = SECURITY_KEYWORDS
        .iter()
        .map(|k| count_keyword(candidate, k).saturating_sub(count_keyword(original, k)))
        .sum();
    if removed > added {
        return Err(FixError::UnsafeFix(format!(
            "removes {} security check reference(s)",
            removed - added
        )));
    }

    for (name, pattern) in dangerous_constructs() {
        if pattern.is_match(candidate) && !pattern.is_match(original) {
            return Err(FixError::UnsafeFix(format!("introduces {}", name)));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn whitespace_only_change_is_rejected() {
        let err = check_candidate("let a = 1;\n", "let  a = 1;\n\n").unwrap_err();
        assert_eq!(err.code(), "unsafe_fix");
    }

    #[test]
    fn real_change_within_size_is_accepted() {
        assert!(check_candidate("let a = 1;\n", "const a = 1;\n").is_ok());
    }

    #[test]
    fn halving_the_file_is_rejected() {
        let original = "x".repeat(100);
        assert!(check_candidate(&original, &"x".repeat(49)).is_err());
        assert!(check_candidate(&original, &"y".repeat(50)).is_ok());
        assert!(check_candidate(&original, &"x".repeat(151)).is_err());
    }

    #[test]
    fn dropping_a_validation_call_is_rejected() {
        let original = "validate(input);\nsanitize(input);\nsave(input);\n";
        let candidate = "sanitize(input);\nsave(input);\nlog(input);\n";
        assert!(check_security_candidate(original, candidate).is_err());
    }

    #[test]
    fn introducing_eval_is_rejected_but_existing_eval_is_tolerated() {
        assert!(check_security_candidate("run(code);", "eval(code);").is_err());
        assert!(check_security_candidate("eval(a); eval(b);", "eval(a); run(b);").is_ok());
        assert!(check_security_candidate("el.textContent = x;", "el.innerHTML = x;").is_err());
    }

    proptest! {
        #[test]
        fn oversized_patches_are_always_rejected(len in 10usize..400, factor in 1.51f64..4.0) {
            let original = "a".repeat(len);
            let grown = "b".repeat((len as f64 * factor).ceil() as usize);
            prop_assert!(check_candidate(&original, &grown).is_err());
        }

        #[test]
        fn shrunk_patches_are_always_rejected(len in 10usize..400, keep in 0.0f64..0.49) {
            let original = "a".repeat(len);
            let shrunk = "b".repeat((len as f64 * keep).floor() as usize);
            prop_assert!(check_candidate(&original, &shrunk).is_err());
        }
    }
}
