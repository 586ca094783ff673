//! Persistence under `.mender/v1/`.
//!
//! Runs, issues and attempts are append-only JSONL audit logs; a run row is
//! re-appended whenever it changes and the newest row per id wins on read.
//! Learning records are a single JSON map rewritten atomically.
//!
//! Every read takes a shared lock and every write an exclusive one, so two
//! agents pointed at the same repository cannot interleave partial lines.

use anyhow::{anyhow, Context, Result};
use fs2::FileExt;
use mender_core::{FixAttempt, Issue, LearningBackend, LearningRecord, Run, RunStore};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use uuid::Uuid;

pub const STORE_DIR: &str = ".mender";
const STORE_LAYOUT_DIR: &str = "v1";
const RUNS_FILE: &str = "runs.jsonl";
const ISSUES_FILE: &str = "issues.jsonl";
const ATTEMPTS_FILE: &str = "attempts.jsonl";
const LEARNING_FILE: &str = "learning.json";
const LOCK_FILE: &str = ".lock";
const LOCK_TIMEOUT_SECS: u64 = 5;
const LOCK_RETRY_MS: u64 = 50;

/// An issue row tagged with the run that found it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IssueRow {
    pub run_id: Uuid,
    #[serde(flatten)]
    pub issue: Issue,
}

#[derive(Debug, Clone)]
pub struct Store {
    root: PathBuf,
    dir: PathBuf,
}

struct StoreLock {
    file: File,
}

impl Drop for StoreLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl Store {
    pub fn new(project_root: &Path) -> Self {
        let root = project_root.join(STORE_DIR);
        let dir = root.join(STORE_LAYOUT_DIR);
        Self { root, dir }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir)
                .with_context(|| format!("Failed to create {}", self.dir.display()))?;
        }
        self.ensure_ignored()
    }

    /// Prefer the repository's `info/exclude` so the tracked tree stays
    /// untouched. The repository is discovered upwards from the project root,
    /// which may be a subdirectory or a worktree whose `.git` is a file.
    fn ensure_ignored(&self) -> Result<()> {
        let Some(repo_root) = self.root.parent() else {
            return Ok(());
        };
        let entry = format!("{}/", STORE_DIR);

        if let Ok(repo) = crate::git_ops::open_repo_discover(repo_root) {
            let exclude = repo.commondir().join("info").join("exclude");
            if let Some(parent) = exclude.parent() {
                if fs::create_dir_all(parent).is_ok()
                    && append_ignore_entry(&exclude, &entry).is_ok()
                {
                    return Ok(());
                }
            }
        }
        append_ignore_entry(&repo_root.join(".gitignore"), &entry)
    }

    fn lock(&self, exclusive: bool) -> Result<StoreLock> {
        if exclusive {
            self.ensure_dir()?;
        } else if !self.dir.exists() {
            return Err(anyhow!("Store directory missing"));
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(self.dir.join(LOCK_FILE))?;

        let start = Instant::now();
        loop {
            let result = if exclusive {
                FileExt::try_lock_exclusive(&file)
            } else {
                FileExt::try_lock_shared(&file)
            };
            match result {
                Ok(()) => return Ok(StoreLock { file }),
                Err(err) if err.kind() != ErrorKind::WouldBlock => return Err(err.into()),
                Err(_) if start.elapsed() >= Duration::from_secs(LOCK_TIMEOUT_SECS) => {
                    return Err(anyhow!(
                        "Timed out waiting for store lock ({}s)",
                        LOCK_TIMEOUT_SECS
                    ));
                }
                Err(_) => std::thread::sleep(Duration::from_millis(LOCK_RETRY_MS)),
            }
        }
    }

    fn append_rows<T: Serialize>(&self, file_name: &str, rows: &[T]) -> Result<()> {
        if rows.is_empty() {
            return Ok(());
        }
        let _lock = self.lock(true)?;
        let path = self.dir.join(file_name);
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("Failed to open {}", path.display()))?;
        let mut buf = String::new();
        for row in rows {
            buf.push_str(&serde_json::to_string(row)?);
            buf.push('\n');
        }
        file.write_all(buf.as_bytes())?;
        Ok(())
    }

    /// Rows that fail to parse are skipped.
    fn read_rows<T: DeserializeOwned>(&self, file_name: &str) -> Result<Vec<T>> {
        let path = self.dir.join(file_name);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let _lock = self.lock(false)?;
        let content = fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| serde_json::from_str::<T>(line).ok())
            .collect())
    }

    /// Latest state of the `limit` most recently started runs, newest first.
    pub fn load_recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let rows: Vec<Run> = self.read_rows(RUNS_FILE)?;
        let mut latest: HashMap<Uuid, Run> = HashMap::new();
        for run in rows {
            latest.insert(run.id, run);
        }
        let mut runs: Vec<Run> = latest.into_values().collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }

    pub fn load_issues_for_run(&self, run_id: Uuid) -> Result<Vec<Issue>> {
        let rows: Vec<IssueRow> = self.read_rows(ISSUES_FILE)?;
        Ok(rows
            .into_iter()
            .filter(|row| row.run_id == run_id)
            .map(|row| row.issue)
            .collect())
    }

    pub fn load_attempts_for_run(&self, run_id: Uuid) -> Result<Vec<FixAttempt>> {
        let rows: Vec<FixAttempt> = self.read_rows(ATTEMPTS_FILE)?;
        Ok(rows.into_iter().filter(|a| a.run_id == run_id).collect())
    }
}

impl RunStore for Store {
    fn upsert_run(&self, run: &Run) -> Result<()> {
        self.append_rows(RUNS_FILE, std::slice::from_ref(run))
    }

    fn insert_issues(&self, run_id: Uuid, issues: &[Issue]) -> Result<()> {
        let rows: Vec<IssueRow> = issues
            .iter()
            .map(|issue| IssueRow {
                run_id,
                issue: issue.clone(),
            })
            .collect();
        self.append_rows(ISSUES_FILE, &rows)
    }

    fn insert_attempt(&self, attempt: &FixAttempt) -> Result<()> {
        self.append_rows(ATTEMPTS_FILE, std::slice::from_ref(attempt))
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        self.load_recent_runs(limit)
    }
}

impl LearningBackend for Store {
    fn load_learning(&self) -> Result<HashMap<String, LearningRecord>> {
        let path = self.dir.join(LEARNING_FILE);
        if !path.exists() {
            return Ok(HashMap::new());
        }
        let _lock = self.lock(false)?;
        let content = fs::read_to_string(&path)?;
        match serde_json::from_str(&content) {
            Ok(records) => Ok(records),
            Err(err) => {
                // Keep the unreadable file around for inspection and start over.
                let backup = path.with_extension("json.corrupt");
                let _ = fs::copy(&path, &backup);
                tracing::warn!(
                    error = %err,
                    backup = %backup.display(),
                    "learning store unreadable, starting empty"
                );
                Ok(HashMap::new())
            }
        }
    }

    fn save_learning(&self, records: &HashMap<String, LearningRecord>) -> Result<()> {
        let _lock = self.lock(true)?;
        let content = serde_json::to_string_pretty(records)?;
        write_atomic(&self.dir.join(LEARNING_FILE), &content)
    }
}

fn append_ignore_entry(path: &Path, entry: &str) -> Result<()> {
    let content = fs::read_to_string(path).unwrap_or_default();
    let bare = entry.trim_end_matches('/');
    let already_present = content.lines().any(|line| {
        let trimmed = line.trim();
        trimmed == entry || trimmed == bare || trimmed == format!("/{}", entry)
    });
    if already_present {
        return Ok(());
    }

    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    if !content.trim().is_empty() && !content.ends_with('\n') {
        writeln!(file)?;
    }
    writeln!(file, "# mender state")?;
    writeln!(file, "{}", entry)?;
    Ok(())
}

/// Write through a temp file and rename over the target.
pub fn write_atomic(path: &Path, content: &str) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, content)
        .with_context(|| format!("Failed to write {}", tmp_path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let _ = fs::set_permissions(&tmp_path, fs::Permissions::from_mode(0o600));
    }

    #[cfg(windows)]
    {
        // rename does not replace an existing file here
        if path.exists() {
            let _ = fs::remove_file(path);
        }
    }

    if let Err(err) = fs::rename(&tmp_path, path) {
        let _ = fs::remove_file(&tmp_path);
        return Err(err.into());
    }
    Ok(())
}
