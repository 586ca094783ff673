//! `npm outdated --json` and `npm audit --json` reports.

use super::{SOURCE_AUDIT, SOURCE_OUTDATED};
use mender_core::{Issue, IssueType};
use serde_json::Value;

const MANIFEST: &str = "package.json";

fn major(version: &str) -> Option<u64> {
    version
        .trim()
        .trim_start_matches(|c: char| !c.is_ascii_digit())
        .split('.')
        .next()?
        .parse()
        .ok()
}

fn json_object(output: &str) -> Option<serde_json::Map<String, Value>> {
    let start = output.find('{')?;
    match serde_json::from_str::<Value>(&output[start..]).ok()? {
        Value::Object(map) => Some(map),
        _ => None,
    }
}

/// Only a gap in the major version is worth a fix. `wanted` is what the
/// declared range resolves to, so raising the range clears the issue.
pub fn parse_outdated(output: &str) -> Vec<Issue> {
    let Some(packages) = json_object(output) else {
        return Vec::new();
    };
    let mut issues = Vec::new();
    for (name, info) in packages {
        let version = |key: &str| info.get(key).and_then(Value::as_str).map(str::to_string);
        let (Some(wanted), Some(latest)) = (version("wanted").or_else(|| version("current")), version("latest"))
        else {
            continue;
        };
        let (Some(wanted_major), Some(latest_major)) = (major(&wanted), major(&latest)) else {
            continue;
        };
        if latest_major <= wanted_major {
            continue;
        }
        issues.push(
            Issue::new(
                IssueType::Dependency,
                MANIFEST,
                format!(
                    "Dependency '{}' is pinned below the latest major version (wanted {}, latest {})",
                    name, wanted, latest
                ),
            )
            .with_rule(name)
            .with_source(SOURCE_OUTDATED),
        );
    }
    issues.sort_by(|a, b| a.description.cmp(&b.description));
    issues
}

fn advisory_title(via: Option<&Value>) -> Option<String> {
    via?.as_array()?
        .iter()
        .find_map(|entry| entry.get("title").and_then(Value::as_str))
        .map(str::to_string)
}

/// Handles the npm 7+ `vulnerabilities` map and the older `advisories` map.
pub fn parse_audit(output: &str) -> Vec<Issue> {
    let Some(report) = json_object(output) else {
        return Vec::new();
    };
    let mut issues = Vec::new();

    if let Some(vulns) = report.get("vulnerabilities").and_then(Value::as_object) {
        for (name, vuln) in vulns {
            let severity = vuln.get("severity").and_then(Value::as_str).unwrap_or("unknown");
            let title = advisory_title(vuln.get("via"))
                .unwrap_or_else(|| "vulnerable transitive dependency".to_string());
            issues.push(audit_issue(name, severity, &title));
        }
    } else if let Some(advisories) = report.get("advisories").and_then(Value::as_object) {
        for advisory in advisories.values() {
            let Some(name) = advisory.get("module_name").and_then(Value::as_str) else {
                continue;
            };
            let severity = advisory.get("severity").and_then(Value::as_str).unwrap_or("unknown");
            let title = advisory.get("title").and_then(Value::as_str).unwrap_or("advisory");
            issues.push(audit_issue(name, severity, title));
        }
    }
    issues.sort_by(|a, b| a.description.cmp(&b.description));
    issues
}

fn audit_issue(name: &str, severity: &str, title: &str) -> Issue {
    Issue::new(
        IssueType::Security,
        MANIFEST,
        format!("Vulnerable dependency '{}' ({}): {}", name, severity, title),
    )
    .with_rule(name)
    .with_source(SOURCE_AUDIT)
}
