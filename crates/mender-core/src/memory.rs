//! In-memory persistence for tests and embedders that bring no storage.

use crate::issue::Issue;
use crate::learning::LearningRecord;
use crate::protocol::{LearningBackend, RunStore};
use crate::run::{FixAttempt, Run};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Tables {
    runs: Vec<Run>,
    issues: Vec<(Uuid, Issue)>,
    attempts: Vec<FixAttempt>,
    learning: HashMap<String, LearningRecord>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Tables>> {
        self.tables
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))
    }

    pub fn runs(&self) -> Vec<Run> {
        self.lock().map(|t| t.runs.clone()).unwrap_or_default()
    }

    pub fn issues(&self) -> Vec<Issue> {
        self.lock()
            .map(|t| t.issues.iter().map(|(_, i)| i.clone()).collect())
            .unwrap_or_default()
    }

    pub fn attempts(&self) -> Vec<FixAttempt> {
        self.lock().map(|t| t.attempts.clone()).unwrap_or_default()
    }

    pub fn learning(&self) -> HashMap<String, LearningRecord> {
        self.lock().map(|t| t.learning.clone()).unwrap_or_default()
    }
}

impl RunStore for MemoryStore {
    fn upsert_run(&self, run: &Run) -> Result<()> {
        let mut tables = self.lock()?;
        match tables.runs.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => tables.runs.push(run.clone()),
        }
        Ok(())
    }

    fn insert_issues(&self, run_id: Uuid, issues: &[Issue]) -> Result<()> {
        let mut tables = self.lock()?;
        tables
            .issues
            .extend(issues.iter().map(|i| (run_id, i.clone())));
        Ok(())
    }

    fn insert_attempt(&self, attempt: &FixAttempt) -> Result<()> {
        self.lock()?.attempts.push(attempt.clone());
        Ok(())
    }

    fn recent_runs(&self, limit: usize) -> Result<Vec<Run>> {
        let tables = self.lock()?;
        let mut runs = tables.runs.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        runs.truncate(limit);
        Ok(runs)
    }
}

impl LearningBackend for MemoryStore {
    fn load_learning(&self) -> Result<HashMap<String, LearningRecord>> {
        Ok(self.lock()?.learning.clone())
    }

    fn save_learning(&self, records: &HashMap<String, LearningRecord>) -> Result<()> {
        self.lock()?.learning = records.clone();
        Ok(())
    }
}
