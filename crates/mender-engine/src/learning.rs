//! Cross-run memory of which fingerprints get fixed and which never do.

use mender_core::{Issue, LearningBackend, LearningRecord, Strategy};
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Bump when prompts or the strategy ladder change enough that old failures
/// no longer predict new ones. Records from an older revision stop skipping.
pub const FIXER_REVISION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LearningPolicy {
    pub skip_after_failures: u32,
    pub min_success_rate: f64,
}

impl Default for LearningPolicy {
    fn default() -> Self {
        Self {
            skip_after_failures: 3,
            min_success_rate: 0.5,
        }
    }
}

pub struct LearningStore {
    backend: Arc<dyn LearningBackend>,
    records: HashMap<String, LearningRecord>,
    policy: LearningPolicy,
    revision: u32,
}

impl LearningStore {
    /// Load existing records. Unreadable storage starts an empty memory.
    pub fn open(backend: Arc<dyn LearningBackend>, policy: LearningPolicy) -> Self {
        let records = match backend.load_learning() {
            Ok(records) => records,
            Err(err) => {
                tracing::warn!(error = %err, "learning store unreadable, starting empty");
                HashMap::new()
            }
        };
        Self {
            backend,
            records,
            policy,
            revision: FIXER_REVISION,
        }
    }

    pub fn with_revision(mut self, revision: u32) -> Self {
        self.revision = revision;
        self
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, fingerprint: &str) -> Option<&LearningRecord> {
        self.records.get(fingerprint)
    }

    pub fn should_skip(&self, issue: &Issue) -> bool {
        self.records
            .get(&issue.fingerprint)
            .is_some_and(|r| r.is_hopeless(self.policy.skip_after_failures, self.revision))
    }

    pub fn recommend(&self, issue: &Issue) -> Option<Strategy> {
        self.records
            .get(&issue.fingerprint)
            .and_then(|r| r.recommend(self.policy.min_success_rate))
    }

    /// Count every scanned issue once per run, whether or not it is fixed.
    pub fn mark_seen(&mut self, issues: &[Issue], run_id: Uuid) {
        for issue in issues {
            self.entry(issue).mark_seen(run_id);
        }
        self.persist();
    }

    pub fn record_success(&mut self, issue: &Issue, strategy: Strategy, model: &str) {
        self.entry(issue).record_success(strategy, model);
        self.persist();
    }

    pub fn record_failure(&mut self, issue: &Issue, strategy: Strategy, run_id: Uuid) {
        self.entry(issue).record_failure(strategy, run_id);
        self.persist();
    }

    pub fn record_declined(&mut self, issue: &Issue, run_id: Uuid) {
        self.entry(issue).record_declined(run_id);
        self.persist();
    }

    fn entry(&mut self, issue: &Issue) -> &mut LearningRecord {
        let revision = self.revision;
        let record = self
            .records
            .entry(issue.fingerprint.clone())
            .or_insert_with(|| LearningRecord::new(issue.fingerprint.clone(), issue.kind, revision));
        record.rebase(revision);
        record
    }

    fn persist(&self) {
        if let Err(err) = self.backend.save_learning(&self.records) {
            tracing::warn!(error = %err, "failed to save learning store");
        }
    }
}
