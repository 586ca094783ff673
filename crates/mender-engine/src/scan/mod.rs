//! Scanner: runs every source of findings and turns their output into Issues.
//!
//! A tool that cannot run contributes zero issues and a warning; it never
//! fails the scan.

pub mod dead_code;
pub mod eslint;
pub mod files;
pub mod npm;
pub mod smells;
pub mod tsc;

use mender_adapters::AgentConfig;
use mender_core::{Issue, ToolKind, ToolOutput, Toolchain};
use std::path::Path;

pub const SOURCE_ESLINT: &str = "eslint";
pub const SOURCE_TSC: &str = "tsc";
pub const SOURCE_OUTDATED: &str = "npm-outdated";
pub const SOURCE_AUDIT: &str = "npm-audit";
pub const SOURCE_DEAD_CODE: &str = "dead-code";
pub const SOURCE_SMELLS: &str = "smells";

#[derive(Debug, Clone, Default)]
pub struct ScanReport {
    pub issues: Vec<Issue>,
    /// Sources that could not run
    pub warnings: Vec<String>,
}

pub struct Scanner<'a> {
    toolchain: &'a dyn Toolchain,
    root: &'a Path,
    config: &'a AgentConfig,
}

impl<'a> Scanner<'a> {
    pub fn new(toolchain: &'a dyn Toolchain, root: &'a Path, config: &'a AgentConfig) -> Self {
        Self {
            toolchain,
            root,
            config,
        }
    }

    pub fn scan(&self) -> ScanReport {
        let mut report = ScanReport::default();

        for source in [SOURCE_ESLINT, SOURCE_TSC, SOURCE_OUTDATED, SOURCE_AUDIT] {
            let Some(tool) = tool_for(source) else {
                continue;
            };
            if !self.toolchain.available(tool) {
                tracing::debug!(source, "tool not available, skipping");
                continue;
            }
            match self.run_source(source, None) {
                Ok(found) => {
                    tracing::debug!(source, count = found.len(), "scanned");
                    report.issues.extend(found);
                }
                Err(err) => {
                    tracing::warn!(source, error = %err, "scanner source failed");
                    report.warnings.push(format!("{}: {}", source, err));
                }
            }
        }

        let dead = dead_code::scan_tree(self.root);
        tracing::debug!(source = SOURCE_DEAD_CODE, count = dead.len(), "scanned");
        report.issues.extend(dead);
        let smells = smells::scan_tree(self.root);
        tracing::debug!(source = SOURCE_SMELLS, count = smells.len(), "scanned");
        report.issues.extend(smells);

        report.issues.retain(|issue| !self.config.is_ignored(&issue.file));
        report
    }

    /// Re-run the source that reported `issue`, scoped to its file where
    /// the tool allows, and return that file's findings from that source.
    pub fn rescan(&self, issue: &Issue) -> Result<Vec<Issue>, String> {
        let file = issue.file.as_path();
        let scoped = match issue.source.as_str() {
            SOURCE_DEAD_CODE => dead_code::scan_file(self.root, file).map_err(|e| e.to_string())?,
            SOURCE_SMELLS => smells::scan_file(self.root, file).map_err(|e| e.to_string())?,
            source => {
                let tool = tool_for(source)
                    .ok_or_else(|| format!("no validator for source '{}'", source))?;
                if !self.toolchain.available(tool) {
                    return Err(format!("{} unavailable", tool.as_str()));
                }
                let scope = (tool == ToolKind::Linter).then_some(file);
                self.run_source(source, scope)?
            }
        };
        Ok(scoped.into_iter().filter(|i| i.file == issue.file).collect())
    }

    fn run_source(&self, source: &str, file: Option<&Path>) -> Result<Vec<Issue>, String> {
        let tool = tool_for(source).ok_or_else(|| format!("unknown source '{}'", source))?;
        let output = self
            .toolchain
            .run(tool, file)
            .map_err(|e| format!("{:#}", e))?;
        parse_output(source, &output, self.root)
    }
}

fn tool_for(source: &str) -> Option<ToolKind> {
    match source {
        SOURCE_ESLINT => Some(ToolKind::Linter),
        SOURCE_TSC => Some(ToolKind::TypeChecker),
        SOURCE_OUTDATED => Some(ToolKind::Outdated),
        SOURCE_AUDIT => Some(ToolKind::Audit),
        _ => None,
    }
}

/// A failing exit with nothing parseable means the tool itself broke.
fn parse_output(source: &str, output: &ToolOutput, root: &Path) -> Result<Vec<Issue>, String> {
    let broken = || {
        format!(
            "exited with {:?} without a usable report: {}",
            output.exit_code,
            mender_core::util::truncate(output.stderr.trim(), 200)
        )
    };
    match source {
        SOURCE_ESLINT => eslint::parse(&output.stdout, root).ok_or_else(broken),
        SOURCE_TSC => {
            let combined = format!("{}\n{}", output.stdout, output.stderr);
            let issues = tsc::parse(&combined, root);
            if issues.is_empty() && !output.success() {
                return Err(broken());
            }
            Ok(issues)
        }
        SOURCE_OUTDATED => Ok(npm::parse_outdated(&output.stdout)),
        SOURCE_AUDIT => Ok(npm::parse_audit(&output.stdout)),
        _ => Err(format!("unknown source '{}'", source)),
    }
}
