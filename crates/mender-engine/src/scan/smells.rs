//! Regex rules for security and performance smells.

use super::files::source_files;
use super::SOURCE_SMELLS;
use mender_core::util::literal_regex;
use mender_core::{Issue, IssueType};
use rayon::prelude::*;
use regex::Regex;
use std::path::Path;
use std::sync::OnceLock;

struct Rule {
    id: &'static str,
    kind: IssueType,
    pattern: Regex,
    message: &'static str,
}

fn rules() -> &'static [Rule] {
    static RULES: OnceLock<Vec<Rule>> = OnceLock::new();
    RULES.get_or_init(|| {
        let rule = |id, kind, pattern: &str, message| Rule {
            id,
            kind,
            pattern: literal_regex(pattern),
            message,
        };
        vec![
            rule(
                "no-eval",
                IssueType::Security,
                r"(?:^|[^\w.$])eval\s*\(",
                "eval() executes arbitrary strings as code (injection risk)",
            ),
            rule(
                "no-new-function",
                IssueType::Security,
                r"\bnew\s+Function\s*\(",
                "new Function() compiles strings into code (injection risk)",
            ),
            rule(
                "no-dangerous-html",
                IssueType::Security,
                r"dangerouslySetInnerHTML",
                "dangerouslySetInnerHTML renders unescaped HTML (XSS risk)",
            ),
            rule(
                "no-inner-html",
                IssueType::Security,
                r"\.(?:inner|outer)HTML\s*\+?=[^=]",
                "innerHTML assignment renders unescaped HTML (XSS risk)",
            ),
            rule(
                "no-hardcoded-secret",
                IssueType::Security,
                r#"(?i)\b(?:api[_-]?key|secret|password|passwd|private[_-]?key|access[_-]?token)\w*["']?\s*[:=]\s*["'][^"'\s]{8,}["']"#,
                "Possible hard-coded secret",
            ),
            rule(
                "no-sync-fs",
                IssueType::Performance,
                r"\b(?:readFileSync|writeFileSync|appendFileSync|readdirSync|statSync|existsSync)\s*\(",
                "Synchronous fs call blocks the event loop",
            ),
            rule(
                "no-json-clone",
                IssueType::Optimization,
                r"JSON\.parse\s*\(\s*JSON\.stringify\s*\(",
                "JSON.parse(JSON.stringify()) deep clone is slow and lossy; use structuredClone",
            ),
        ]
    })
}

fn loop_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"^\s*(?:\}\s*)?(?:for|while)\s*\("))
}

fn awaits() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| literal_regex(r"\bawait\b"))
}

fn is_comment_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("//") || trimmed.starts_with("/*") || trimmed.starts_with('*')
}

fn brace_delta(line: &str) -> i32 {
    line.chars().fold(0, |acc, ch| match ch {
        '{' => acc + 1,
        '}' => acc - 1,
        _ => acc,
    })
}

/// Findings for one file's contents. `for await` loops are not flagged.
pub fn find_smells(file: &Path, source: &str) -> Vec<Issue> {
    let mut issues = Vec::new();
    let mut depth = 0i32;
    let mut loops: Vec<i32> = Vec::new();

    for (idx, line) in source.lines().enumerate() {
        let line_no = idx as u32 + 1;
        if is_comment_line(line) {
            continue;
        }

        for rule in rules() {
            if let Some(m) = rule.pattern.find(line) {
                issues.push(
                    Issue::new(rule.kind, file.to_path_buf(), rule.message)
                        .with_location(Some(line_no), Some(m.start() as u32 + 1))
                        .with_rule(rule.id)
                        .with_source(SOURCE_SMELLS),
                );
            }
        }

        if loop_header().is_match(line) {
            loops.push(depth);
        } else if !loops.is_empty() && awaits().is_match(line) {
            issues.push(
                Issue::new(
                    IssueType::Performance,
                    file.to_path_buf(),
                    "await inside a loop serializes independent async work; consider Promise.all",
                )
                .with_location(Some(line_no), None)
                .with_rule("no-await-in-loop")
                .with_source(SOURCE_SMELLS),
            );
        }

        depth += brace_delta(line);
        if line.contains('}') {
            while loops.last().is_some_and(|start| depth <= *start) {
                loops.pop();
            }
        }
    }
    issues
}

pub fn scan_file(root: &Path, file: &Path) -> std::io::Result<Vec<Issue>> {
    let source = std::fs::read_to_string(root.join(file))?;
    Ok(find_smells(file, &source))
}

pub fn scan_tree(root: &Path) -> Vec<Issue> {
    source_files(root)
        .par_iter()
        .flat_map_iter(|file| match std::fs::read_to_string(root.join(file)) {
            Ok(source) => find_smells(file, &source),
            Err(_) => Vec::new(),
        })
        .collect()
}
