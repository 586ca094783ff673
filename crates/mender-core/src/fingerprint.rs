//! Stable issue identity across scans.
//!
//! Line numbers drift whenever code above a defect changes, so positional
//! tokens are stripped before hashing. Two issues are the same defect iff
//! their fingerprints match.

use crate::issue::{Issue, IssueType};
use crate::util::{collapse_whitespace, hash_str, literal_regex};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn positional_words() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        literal_regex(r"\b(line|ln|lines|col|column|columns|row|position|pos|offset)(\s*[:#]?\s*)\d+")
    })
}

// `foo.ts:12:5` or `foo.ts:12`
fn file_positions() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"(\.[a-z0-9]+):\d+(?::\d+)?\b"))
}

// `(12,5)` as printed by tsc
fn paren_positions() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"\(\s*\d+\s*,\s*\d+\s*\)"))
}

/// Forward slashes, lowercase, no leading `./`.
pub fn normalize_path(path: &Path) -> String {
    let raw = path.to_string_lossy().replace('\\', "/").to_lowercase();
    let mut trimmed = raw.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}

/// Lowercase and replace position numerals with `X` (`"line 12"` → `"line X"`).
pub fn normalize_description(description: &str) -> String {
    let lowered = collapse_whitespace(&description.to_lowercase());
    let step = positional_words().replace_all(&lowered, "${1}${2}X");
    let step = file_positions().replace_all(&step, "${1}:X");
    paren_positions().replace_all(&step, "(X,X)").into_owned()
}

pub fn fingerprint_parts(kind: IssueType, file: &Path, description: &str) -> String {
    let key = format!(
        "{}:{}:{}",
        kind.as_str(),
        normalize_path(file),
        normalize_description(description)
    );
    hash_str(&key)
}

pub fn fingerprint(issue: &Issue) -> String {
    fingerprint_parts(issue.kind, &issue.file, &issue.description)
}
