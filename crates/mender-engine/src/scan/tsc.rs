//! `tsc --noEmit --pretty false` diagnostics.

use super::files::relativize;
use super::SOURCE_TSC;
use mender_core::util::literal_regex;
use mender_core::{Issue, IssueType};
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

fn diagnostic() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    // path(line,col): error TS1234: message
    // path:line:col - error TS1234: message
    RE.get_or_init(|| {
        literal_regex(
            r"^(?P<file>[^\s(][^(]*?)(?:\((?P<l1>\d+),(?P<c1>\d+)\)|:(?P<l2>\d+):(?P<c2>\d+))\s*[:-]\s*error\s+(?P<code>TS\d+):\s*(?P<msg>.+)$",
        )
    })
}

/// Continuation lines and summaries are ignored.
pub fn parse(output: &str, root: &Path) -> Vec<Issue> {
    output
        .lines()
        .filter_map(|line| {
            let caps = diagnostic().captures(line.trim_end())?;
            let number = |a: &str, b: &str| {
                caps.name(a)
                    .or_else(|| caps.name(b))
                    .and_then(|m| m.as_str().parse::<u32>().ok())
            };
            let code = caps.name("code")?.as_str();
            let message = caps.name("msg")?.as_str().trim();
            Some(
                Issue::new(
                    IssueType::TypeError,
                    relativize(root, caps.name("file")?.as_str()),
                    format!("{}: {}", code, message),
                )
                .with_location(number("l1", "l2"), number("c1", "c2"))
                .with_rule(code)
                .with_source(SOURCE_TSC),
            )
        })
        .collect()
}
