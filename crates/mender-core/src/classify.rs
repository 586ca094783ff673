//! Severity and priority assignment.

use crate::fingerprint::normalize_path;
use crate::issue::{Issue, IssueType, Severity};
use crate::util::literal_regex;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub severity: Severity,
    pub priority: u8,
}

fn security_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        literal_regex(
            r"secur|vulnerab|inject|xss|csrf|\bauth(?:n|z|entication|enticate|enticated|orization|orize|orized)?\b",
        )
    })
}

fn crash_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"crash|undefined|null[\s_-]?reference|null pointer"))
}

fn slow_terms() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"memory|performance"))
}

/// First match wins: security, then crash-like, then performance, else low.
pub fn severity_for(kind: IssueType, description: &str) -> Severity {
    let lower = description.to_lowercase();
    if kind == IssueType::Security || security_terms().is_match(&lower) {
        Severity::Critical
    } else if kind == IssueType::TypeError || crash_terms().is_match(&lower) {
        Severity::High
    } else if matches!(kind, IssueType::Optimization | IssueType::Performance)
        || slow_terms().is_match(&lower)
    {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn classify_parts(kind: IssueType, file: &Path, description: &str) -> Classification {
    let severity = severity_for(kind, description);
    let path = normalize_path(file);

    let mut priority = severity.base_priority();
    if is_route_path(&path) {
        priority += 1;
    }
    if is_auth_path(&path) {
        priority += 2;
    }
    if is_test_path(&path) {
        priority -= 1;
    }
    if kind == IssueType::Security {
        priority = 10;
    }

    Classification {
        severity,
        priority: priority.clamp(1, 10) as u8,
    }
}

pub fn classify(issue: &Issue) -> Classification {
    classify_parts(issue.kind, &issue.file, &issue.description)
}

fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn file_stem(path: &str) -> &str {
    let name = path.rsplit('/').next().unwrap_or(path);
    name.split('.').next().unwrap_or(name)
}

/// Request-handling code: `api/`, `routes/`, `route.ts`, controllers.
pub fn is_route_path(normalized: &str) -> bool {
    let dir_hit = segments(normalized).any(|seg| {
        matches!(
            seg,
            "api" | "apis" | "routes" | "router" | "routers" | "handlers" | "controllers" | "endpoints"
        )
    });
    dir_hit || matches!(file_stem(normalized), "route" | "routes" | "handler" | "router")
}

pub fn is_auth_path(normalized: &str) -> bool {
    const MARKERS: [&str; 7] = [
        "auth", "security", "session", "login", "password", "permission", "crypto",
    ];
    segments(normalized).any(|seg| MARKERS.iter().any(|m| seg.contains(m)))
}

pub fn is_test_path(normalized: &str) -> bool {
    let dir_hit = segments(normalized)
        .any(|seg| matches!(seg, "test" | "tests" | "__tests__" | "__mocks__" | "spec" | "e2e"));
    let name = normalized.rsplit('/').next().unwrap_or(normalized);
    dir_hit
        || name.contains(".test.")
        || name.contains(".spec.")
        || name.contains("_test.")
        || name.starts_with("test_")
}
