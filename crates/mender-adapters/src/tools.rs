//! External tool surface: linter, type checker, dependency listings.
//!
//! Commands are detected from the project files and can be overridden in
//! `mender.toml`. A command that cannot be started, or that runs past its
//! timeout, is reported as unavailable rather than as findings.

use crate::config::ToolCommands;
use crate::util::{run_command_with_timeout, split_command_line};
use anyhow::{anyhow, Result};
use mender_core::{ToolKind, ToolOutput, Toolchain};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

const FILE_PLACEHOLDER: &str = "{file}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl ToolCommand {
    fn new(program: &str, args: &[&str]) -> Self {
        Self {
            program: program.to_string(),
            args: args.iter().map(|a| a.to_string()).collect(),
        }
    }

    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = split_command_line(line).into_iter();
        let program = parts.next()?;
        Some(Self {
            program,
            args: parts.collect(),
        })
    }

    /// `{file}` is substituted where present; otherwise the file is appended.
    fn args_for(&self, file: Option<&Path>) -> Vec<String> {
        let Some(file) = file else {
            return self
                .args
                .iter()
                .filter(|a| a.as_str() != FILE_PLACEHOLDER)
                .cloned()
                .collect();
        };
        let file = file.to_string_lossy().to_string();
        if self.args.iter().any(|a| a.contains(FILE_PLACEHOLDER)) {
            return self
                .args
                .iter()
                .map(|a| a.replace(FILE_PLACEHOLDER, &file))
                .collect();
        }
        let mut args = self.args.clone();
        args.push(file);
        args
    }

    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

pub fn program_available_on_path(program: &str) -> bool {
    let program = program.trim();
    if program.is_empty() {
        return false;
    }
    if program.contains('/') {
        return Path::new(program).is_file();
    }
    let Some(path) = std::env::var_os("PATH") else {
        return false;
    };
    std::env::split_paths(&path).any(|dir| is_executable(&dir.join(program)))
}

fn is_executable(candidate: &Path) -> bool {
    if !candidate.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::metadata(candidate)
            .map(|meta| meta.permissions().mode() & 0o111 != 0)
            .unwrap_or(false)
    }
    #[cfg(not(unix))]
    {
        true
    }
}

fn read_package_json(repo_root: &Path) -> Option<serde_json::Value> {
    let content = std::fs::read_to_string(repo_root.join("package.json")).ok()?;
    serde_json::from_str(&content).ok()
}

fn declares_dependency(package: &serde_json::Value, name: &str) -> bool {
    ["dependencies", "devDependencies"].iter().any(|section| {
        package
            .get(section)
            .and_then(|v| v.as_object())
            .is_some_and(|deps| deps.contains_key(name))
    })
}

fn has_eslint_config(repo_root: &Path) -> bool {
    const CONFIGS: [&str; 9] = [
        "eslint.config.js",
        "eslint.config.mjs",
        "eslint.config.cjs",
        "eslint.config.ts",
        ".eslintrc",
        ".eslintrc.js",
        ".eslintrc.cjs",
        ".eslintrc.json",
        ".eslintrc.yml",
    ];
    CONFIGS.iter().any(|name| repo_root.join(name).exists())
}

/// Default commands for a Node project.
pub fn detect_tool_commands(repo_root: &Path) -> HashMap<ToolKind, ToolCommand> {
    let mut commands = HashMap::new();
    let Some(package) = read_package_json(repo_root) else {
        return commands;
    };

    if declares_dependency(&package, "eslint") || has_eslint_config(repo_root) {
        commands.insert(
            ToolKind::Linter,
            ToolCommand::new("npx", &["eslint", "--format", "json", "."]),
        );
        commands.insert(
            ToolKind::LinterFix,
            ToolCommand::new("npx", &["eslint", "--fix", FILE_PLACEHOLDER]),
        );
    }
    if declares_dependency(&package, "typescript") || repo_root.join("tsconfig.json").exists() {
        commands.insert(
            ToolKind::TypeChecker,
            ToolCommand::new("npx", &["tsc", "--noEmit", "--pretty", "false"]),
        );
    }
    commands.insert(ToolKind::Outdated, ToolCommand::new("npm", &["outdated", "--json"]));
    commands.insert(ToolKind::Audit, ToolCommand::new("npm", &["audit", "--json"]));
    commands
}

/// A single-file lint replaces the trailing `.` target with the file.
fn linter_for_file(base: &ToolCommand) -> ToolCommand {
    let mut cmd = base.clone();
    if cmd.args.last().map(String::as_str) == Some(".") {
        cmd.args.pop();
    }
    cmd
}

/// Runs real processes in the repository root.
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    root: PathBuf,
    commands: HashMap<ToolKind, ToolCommand>,
    timeout: Duration,
}

impl CommandToolchain {
    pub fn new(root: &Path, overrides: &ToolCommands, timeout: Duration) -> Self {
        let mut commands = detect_tool_commands(root);
        let configured = [
            (ToolKind::Linter, &overrides.linter),
            (ToolKind::LinterFix, &overrides.linter_fix),
            (ToolKind::TypeChecker, &overrides.type_checker),
            (ToolKind::Outdated, &overrides.outdated),
            (ToolKind::Audit, &overrides.audit),
        ];
        for (kind, line) in configured {
            match line.as_deref().map(str::trim) {
                // An empty string disables the tool.
                Some("") => {
                    commands.remove(&kind);
                }
                Some(line) => {
                    if let Some(cmd) = ToolCommand::parse(line) {
                        commands.insert(kind, cmd);
                    }
                }
                None => {}
            }
        }
        Self {
            root: root.to_path_buf(),
            commands,
            timeout,
        }
    }

    pub fn command(&self, tool: ToolKind) -> Option<&ToolCommand> {
        self.commands.get(&tool)
    }
}

impl Toolchain for CommandToolchain {
    fn available(&self, tool: ToolKind) -> bool {
        self.commands
            .get(&tool)
            .is_some_and(|cmd| program_available_on_path(&cmd.program))
    }

    fn run(&self, tool: ToolKind, file: Option<&Path>) -> Result<ToolOutput> {
        let base = self
            .commands
            .get(&tool)
            .ok_or_else(|| anyhow!("no {} configured", tool.as_str()))?;
        let command = match (tool, file) {
            (ToolKind::Linter, Some(_)) => linter_for_file(base),
            _ => base.clone(),
        };
        let args = match tool {
            ToolKind::Linter | ToolKind::LinterFix => command.args_for(file),
            _ => command.args_for(None),
        };

        let mut cmd = Command::new(&command.program);
        cmd.current_dir(&self.root).args(&args);
        tracing::debug!(tool = tool.as_str(), command = %command.display(), "running tool");

        let run = run_command_with_timeout(&mut cmd, self.timeout)
            .map_err(|e| anyhow!("{} unavailable: {}", command.program, e))?;
        if run.timed_out {
            return Err(anyhow!(
                "{} timed out after {}s",
                command.display(),
                self.timeout.as_secs()
            ));
        }
        Ok(ToolOutput {
            stdout: run.stdout,
            stderr: run.stderr,
            exit_code: run.exit_code,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn no_package_json_means_no_tools() {
        let dir = tempfile::tempdir().unwrap();
        assert!(detect_tool_commands(dir.path()).is_empty());
    }

    #[test]
    fn detects_eslint_and_typescript() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "package.json",
            r#"{"devDependencies": {"eslint": "^9.0.0", "typescript": "^5.4.0"}}"#,
        );
        let commands = detect_tool_commands(dir.path());
        assert_eq!(
            commands.get(&ToolKind::TypeChecker).map(|c| c.display()),
            Some("npx tsc --noEmit --pretty false".to_string())
        );
        assert!(commands.contains_key(&ToolKind::Linter));
        assert!(commands.contains_key(&ToolKind::LinterFix));
        assert!(commands.contains_key(&ToolKind::Audit));
    }

    #[test]
    fn plain_package_gets_only_dependency_tools() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"dependencies": {"left-pad": "1.0.0"}}"#);
        let commands = detect_tool_commands(dir.path());
        assert!(!commands.contains_key(&ToolKind::Linter));
        assert!(!commands.contains_key(&ToolKind::TypeChecker));
        assert!(commands.contains_key(&ToolKind::Outdated));
    }

    #[test]
    fn file_argument_substitution() {
        let fix = ToolCommand::new("npx", &["eslint", "--fix", FILE_PLACEHOLDER]);
        assert_eq!(
            fix.args_for(Some(Path::new("src/a.ts"))),
            vec!["eslint", "--fix", "src/a.ts"]
        );
        let lint = linter_for_file(&ToolCommand::new("npx", &["eslint", "--format", "json", "."]));
        assert_eq!(
            lint.args_for(Some(Path::new("src/a.ts"))),
            vec!["eslint", "--format", "json", "src/a.ts"]
        );
        assert_eq!(fix.args_for(None), vec!["eslint", "--fix"]);
    }

    #[test]
    fn overrides_replace_and_disable() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "package.json", r#"{"devDependencies": {"eslint": "9"}}"#);
        let overrides = ToolCommands {
            type_checker: Some("sh -c \"exit 0\"".to_string()),
            audit: Some(String::new()),
            ..ToolCommands::default()
        };
        let tools = CommandToolchain::new(dir.path(), &overrides, Duration::from_secs(5));
        assert_eq!(
            tools.command(ToolKind::TypeChecker).map(|c| c.args.clone()),
            Some(vec!["-c".to_string(), "exit 0".to_string()])
        );
        assert!(tools.command(ToolKind::Audit).is_none());
        assert!(!tools.available(ToolKind::Audit));
    }

    #[test]
    fn runs_in_repo_root_and_reports_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "marker.txt", "here");
        let overrides = ToolCommands {
            type_checker: Some("sh -c \"cat marker.txt; exit 2\"".to_string()),
            ..ToolCommands::default()
        };
        let tools = CommandToolchain::new(dir.path(), &overrides, Duration::from_secs(5));
        let output = tools.run(ToolKind::TypeChecker, None).unwrap();
        assert_eq!(output.stdout, "here");
        assert_eq!(output.exit_code, Some(2));
        assert!(!output.success());
    }

    #[test]
    fn timeout_and_missing_tool_are_errors() {
        let dir = tempfile::tempdir().unwrap();
        let overrides = ToolCommands {
            type_checker: Some("sh -c \"sleep 5\"".to_string()),
            linter: Some("mender-no-such-linter".to_string()),
            ..ToolCommands::default()
        };
        let tools = CommandToolchain::new(dir.path(), &overrides, Duration::from_millis(200));
        assert!(tools.run(ToolKind::TypeChecker, None).is_err());
        assert!(tools.run(ToolKind::Linter, None).is_err());
        assert!(!tools.available(ToolKind::Linter));
        assert!(tools.run(ToolKind::Outdated, None).is_err());
    }
}
