//! `eslint --format json` output.

use super::files::relativize;
use super::SOURCE_ESLINT;
use mender_core::{Issue, IssueType};
use serde::Deserialize;
use std::path::Path;

#[derive(Deserialize)]
struct FileResult {
    #[serde(rename = "filePath")]
    file_path: String,
    #[serde(default)]
    messages: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct LintMessage {
    #[serde(rename = "ruleId", default)]
    rule_id: Option<String>,
    #[serde(default)]
    severity: u8,
    message: String,
    #[serde(default)]
    line: Option<u32>,
    #[serde(default)]
    column: Option<u32>,
}

/// Warnings and errors both count. Entries that do not look like eslint
/// messages are skipped rather than failing the whole report; `None` means
/// there was no report at all.
pub fn parse(stdout: &str, root: &Path) -> Option<Vec<Issue>> {
    let start = stdout
        .find("[{")
        .or_else(|| stdout.find('['))
        .unwrap_or(0);
    let Ok(results) = serde_json::from_str::<Vec<serde_json::Value>>(&stdout[start..]) else {
        tracing::debug!("eslint output was not a JSON array");
        return None;
    };

    let mut issues = Vec::new();
    for value in results {
        let Ok(result) = serde_json::from_value::<FileResult>(value) else {
            continue;
        };
        let file = relativize(root, &result.file_path);
        for raw in result.messages {
            let Ok(message) = serde_json::from_value::<LintMessage>(raw) else {
                continue;
            };
            if message.severity == 0 {
                continue;
            }
            let mut issue = Issue::new(IssueType::Lint, file.clone(), message.message.trim())
                .with_location(message.line, message.column)
                .with_source(SOURCE_ESLINT);
            if let Some(rule) = message.rule_id {
                issue = issue.with_rule(rule);
            }
            issues.push(issue);
        }
    }
    Some(issues)
}
