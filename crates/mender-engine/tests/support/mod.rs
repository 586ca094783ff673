//! Scripted collaborators for driving whole runs.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use mender_adapters::AgentConfig;
use mender_core::memory::MemoryStore;
use mender_core::{
    Oracle, OracleReply, OracleRequest, TokenUsage, ToolKind, ToolOutput, Toolchain,
    VersionControl,
};
use mender_engine::{Agent, AgentContext};
use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Replies in order; errors once the script runs out.
#[derive(Default)]
pub struct ScriptedOracle {
    replies: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<OracleRequest>>,
}

impl ScriptedOracle {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<OracleRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Oracle for ScriptedOracle {
    fn complete<'a>(
        &'a self,
        request: OracleRequest,
    ) -> Pin<Box<dyn Future<Output = Result<OracleReply>> + Send + 'a>> {
        Box::pin(async move {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().unwrap().push(request);
            let next = self.replies.lock().unwrap().pop_front();
            match next {
                Some(content) => Ok(OracleReply {
                    content,
                    usage: Some(TokenUsage {
                        input_tokens: 1_000,
                        output_tokens: 200,
                    }),
                }),
                None => Err(anyhow!("oracle unavailable")),
            }
        })
    }
}

/// Each tool hands out its queued outputs in order and then keeps
/// repeating the last one.
#[derive(Default)]
pub struct QueuedTools {
    outputs: Mutex<HashMap<ToolKind, VecDeque<ToolOutput>>>,
}

impl QueuedTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(self, tool: ToolKind, outputs: &[ToolOutput]) -> Self {
        self.outputs
            .lock()
            .unwrap()
            .insert(tool, outputs.iter().cloned().collect());
        self
    }
}

impl Toolchain for QueuedTools {
    fn available(&self, tool: ToolKind) -> bool {
        self.outputs.lock().unwrap().contains_key(&tool)
    }

    fn run(&self, tool: ToolKind, _file: Option<&Path>) -> Result<ToolOutput> {
        let mut outputs = self.outputs.lock().unwrap();
        let queue = outputs
            .get_mut(&tool)
            .ok_or_else(|| anyhow!("{} not installed", tool.as_str()))?;
        let output = if queue.len() > 1 {
            queue.pop_front()
        } else {
            queue.front().cloned()
        };
        output.ok_or_else(|| anyhow!("{} produced nothing", tool.as_str()))
    }
}

/// What the linter's fixer does to the file it is pointed at.
#[derive(Debug, Clone, Copy)]
pub enum LintFix {
    Rewrites(&'static str),
    RewritesThenFails(&'static str),
}

/// Queued outputs for every tool, plus a linter fixer that really writes.
pub struct LintFixTools {
    root: PathBuf,
    fix: LintFix,
    inner: QueuedTools,
    fix_runs: AtomicUsize,
}

impl LintFixTools {
    pub fn new(root: &Path, fix: LintFix, inner: QueuedTools) -> Self {
        Self {
            root: root.to_path_buf(),
            fix,
            inner,
            fix_runs: AtomicUsize::new(0),
        }
    }

    pub fn fix_runs(&self) -> usize {
        self.fix_runs.load(Ordering::SeqCst)
    }
}

impl Toolchain for LintFixTools {
    fn available(&self, tool: ToolKind) -> bool {
        tool == ToolKind::LinterFix || self.inner.available(tool)
    }

    fn run(&self, tool: ToolKind, file: Option<&Path>) -> Result<ToolOutput> {
        if tool != ToolKind::LinterFix {
            return self.inner.run(tool, file);
        }
        self.fix_runs.fetch_add(1, Ordering::SeqCst);
        let file = file.ok_or_else(|| anyhow!("fixer needs a file"))?;
        let (content, fails) = match self.fix {
            LintFix::Rewrites(content) => (content, false),
            LintFix::RewritesThenFails(content) => (content, true),
        };
        std::fs::write(self.root.join(file), content)?;
        if fails {
            return Err(anyhow!("npx eslint --fix timed out after 180s"));
        }
        Ok(ToolOutput {
            exit_code: Some(0),
            ..ToolOutput::default()
        })
    }
}

/// `eslint --format json` with one message per `(rule, message, line)`.
pub fn eslint_report(file: &str, messages: &[(&str, &str, u32)]) -> ToolOutput {
    let messages: Vec<_> = messages
        .iter()
        .map(|(rule, message, line)| {
            serde_json::json!({
                "ruleId": rule,
                "severity": 2,
                "message": message,
                "line": line,
                "column": 1,
            })
        })
        .collect();
    let clean = messages.is_empty();
    ToolOutput {
        stdout: serde_json::json!([{ "filePath": file, "messages": messages }]).to_string(),
        stderr: String::new(),
        exit_code: Some(if clean { 0 } else { 1 }),
    }
}

pub fn tsc_report(lines: &[&str]) -> ToolOutput {
    ToolOutput {
        stdout: lines.join("\n"),
        stderr: String::new(),
        exit_code: Some(if lines.is_empty() { 0 } else { 2 }),
    }
}

#[derive(Default)]
pub struct FakeVcs {
    pub dirty: bool,
    pub discard_fails: bool,
    commits: Mutex<Vec<String>>,
    discarded: Mutex<Vec<PathBuf>>,
}

impl FakeVcs {
    pub fn dirty() -> Self {
        Self {
            dirty: true,
            ..Self::default()
        }
    }

    pub fn without_discard() -> Self {
        Self {
            discard_fails: true,
            ..Self::default()
        }
    }

    pub fn commits(&self) -> Vec<String> {
        self.commits.lock().unwrap().clone()
    }
}

impl VersionControl for FakeVcs {
    fn stage_all(&self) -> Result<()> {
        Ok(())
    }

    fn commit(&self, message: &str) -> Result<String> {
        let mut commits = self.commits.lock().unwrap();
        commits.push(message.to_string());
        Ok(format!("{:040x}", commits.len()))
    }

    fn head_revision(&self) -> Result<Option<String>> {
        Ok(None)
    }

    fn discard_file(&self, file: &Path) -> Result<()> {
        if self.discard_fails {
            return Err(anyhow!("cannot discard {}", file.display()));
        }
        self.discarded.lock().unwrap().push(file.to_path_buf());
        Ok(())
    }

    fn is_dirty(&self) -> Result<bool> {
        Ok(self.dirty)
    }
}

pub struct Harness {
    pub dir: tempfile::TempDir,
    pub config: AgentConfig,
    pub oracle: Arc<ScriptedOracle>,
    pub tools: Arc<dyn Toolchain>,
    pub vcs: Arc<FakeVcs>,
    pub store: Arc<MemoryStore>,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().unwrap(),
            config: AgentConfig::default(),
            oracle: Arc::new(ScriptedOracle::default()),
            tools: Arc::new(QueuedTools::new()),
            vcs: Arc::new(FakeVcs::default()),
            store: Arc::new(MemoryStore::new()),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn write(&self, relative: &str, content: impl AsRef<[u8]>) {
        let path = self.root().join(relative);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    pub fn read(&self, relative: &str) -> Vec<u8> {
        std::fs::read(self.root().join(relative)).unwrap()
    }

    pub fn context(&self) -> AgentContext {
        AgentContext::new(
            self.root().to_path_buf(),
            self.config.clone(),
            self.oracle.clone(),
            self.tools.clone(),
            self.vcs.clone(),
            self.store.clone(),
            self.store.clone(),
        )
    }

    pub fn agent(&self) -> Agent {
        Agent::new(self.context())
    }
}

/// A reply carrying one exact replacement.
pub fn edit_reply(old: &str, new: &str, reasoning: &str) -> String {
    serde_json::json!({
        "status": "fixed",
        "reasoning": reasoning,
        "edits": [{ "old_string": old, "new_string": new }],
    })
    .to_string()
}
