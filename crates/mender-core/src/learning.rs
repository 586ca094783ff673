//! Per-fingerprint outcome history.
//!
//! Records are never deleted. The skip and recommendation rules live here so
//! they can be tested without any storage behind them.

use crate::issue::IssueType;
use crate::strategy::Strategy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Distinct run ids kept per record. Enough to answer "more than one run?".
const MAX_TRACKED_RUNS: usize = 8;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StrategyStats {
    pub successes: u32,
    pub failures: u32,
}

impl StrategyStats {
    pub fn success_rate(&self) -> Option<f64> {
        let total = self.successes + self.failures;
        if total == 0 {
            None
        } else {
            Some(self.successes as f64 / total as f64)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LearningRecord {
    pub fingerprint: String,
    pub issue_type: IssueType,
    pub times_seen: u32,
    pub times_failed: u32,
    #[serde(default)]
    pub times_declined: u32,
    #[serde(default)]
    pub runs_failed: Vec<Uuid>,
    #[serde(default)]
    pub runs_declined: Vec<Uuid>,
    #[serde(default)]
    pub strategies: BTreeMap<Strategy, StrategyStats>,
    #[serde(default)]
    pub successful_strategy: Option<Strategy>,
    #[serde(default)]
    pub success_rate: Option<f64>,
    #[serde(default)]
    pub last_model: Option<String>,
    #[serde(default)]
    pub last_seen_run: Option<Uuid>,
    pub last_seen: DateTime<Utc>,
    /// Fixer generation the failure tallies were collected under
    #[serde(default)]
    pub revision: u32,
}

impl LearningRecord {
    pub fn new(fingerprint: impl Into<String>, issue_type: IssueType, revision: u32) -> Self {
        Self {
            fingerprint: fingerprint.into(),
            issue_type,
            times_seen: 0,
            times_failed: 0,
            times_declined: 0,
            runs_failed: Vec::new(),
            runs_declined: Vec::new(),
            strategies: BTreeMap::new(),
            successful_strategy: None,
            success_rate: None,
            last_model: None,
            last_seen_run: None,
            last_seen: Utc::now(),
            revision,
        }
    }

    /// Counts at most once per run.
    pub fn mark_seen(&mut self, run_id: Uuid) {
        self.last_seen = Utc::now();
        if self.last_seen_run != Some(run_id) {
            self.last_seen_run = Some(run_id);
            self.times_seen += 1;
        }
    }

    /// A new fixer generation starts failure evidence from scratch.
    /// Success history is kept since it still says what worked.
    pub fn rebase(&mut self, revision: u32) {
        if self.revision == revision {
            return;
        }
        self.revision = revision;
        self.times_failed = 0;
        self.times_declined = 0;
        self.runs_failed.clear();
        self.runs_declined.clear();
    }

    pub fn total_successes(&self) -> u32 {
        self.strategies.values().map(|s| s.successes).sum()
    }

    pub fn record_success(&mut self, strategy: Strategy, model: &str) {
        self.strategies.entry(strategy).or_default().successes += 1;
        if !model.is_empty() {
            self.last_model = Some(model.to_string());
        }
        self.last_seen = Utc::now();
        self.refresh_best();
    }

    pub fn record_failure(&mut self, strategy: Strategy, run_id: Uuid) {
        self.strategies.entry(strategy).or_default().failures += 1;
        self.times_failed += 1;
        push_run(&mut self.runs_failed, run_id);
        self.last_seen = Utc::now();
        self.refresh_best();
    }

    pub fn record_declined(&mut self, run_id: Uuid) {
        self.times_declined += 1;
        push_run(&mut self.runs_declined, run_id);
        self.last_seen = Utc::now();
    }

    fn refresh_best(&mut self) {
        let best = self
            .strategies
            .iter()
            .filter(|(_, stats)| stats.successes > 0)
            .filter_map(|(strategy, stats)| stats.success_rate().map(|rate| (*strategy, rate)))
            .max_by(|a, b| a.1.total_cmp(&b.1));
        self.successful_strategy = best.map(|(s, _)| s);
        self.success_rate = best.map(|(_, r)| r);
    }

    /// Historically unfixable under the current fixer generation.
    pub fn is_hopeless(&self, skip_after_failures: u32, current_revision: u32) -> bool {
        if self.revision != current_revision || self.total_successes() > 0 {
            return false;
        }
        let failed_out =
            self.times_failed >= skip_after_failures.max(1) && self.runs_failed.len() >= 2;
        let declined_out = self.runs_declined.len() >= 2;
        failed_out || declined_out
    }

    pub fn recommend(&self, min_success_rate: f64) -> Option<Strategy> {
        match (self.successful_strategy, self.success_rate) {
            (Some(strategy), Some(rate)) if rate >= min_success_rate => Some(strategy),
            _ => None,
        }
    }
}

fn push_run(runs: &mut Vec<Uuid>, run_id: Uuid) {
    if runs.contains(&run_id) {
        return;
    }
    runs.push(run_id);
    if runs.len() > MAX_TRACKED_RUNS {
        let excess = runs.len() - MAX_TRACKED_RUNS;
        runs.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> LearningRecord {
        LearningRecord::new("abc", IssueType::TypeError, 1)
    }

    #[test]
    fn failures_in_one_run_never_skip() {
        let mut r = record();
        let run = Uuid::new_v4();
        for strategy in Strategy::LADDER {
            r.record_failure(strategy, run);
        }
        assert_eq!(r.times_failed, 3);
        assert!(!r.is_hopeless(3, 1));
    }

    #[test]
    fn failures_across_runs_skip_until_revision_changes() {
        let mut r = record();
        r.record_failure(Strategy::Minimal, Uuid::new_v4());
        r.record_failure(Strategy::Aggressive, Uuid::new_v4());
        assert!(!r.is_hopeless(3, 1));
        r.record_failure(Strategy::LastResort, Uuid::new_v4());
        assert!(r.is_hopeless(3, 1));
        assert!(!r.is_hopeless(3, 2));

        r.rebase(2);
        assert_eq!(r.times_failed, 0);
        assert!(!r.is_hopeless(3, 2));
    }

    #[test]
    fn any_success_prevents_skip() {
        let mut r = record();
        for _ in 0..4 {
            r.record_failure(Strategy::Minimal, Uuid::new_v4());
        }
        r.record_success(Strategy::LastResort, "model-x");
        assert!(!r.is_hopeless(3, 1));
        assert_eq!(r.last_model.as_deref(), Some("model-x"));
    }

    #[test]
    fn declines_in_two_runs_skip() {
        let mut r = record();
        let run = Uuid::new_v4();
        r.record_declined(run);
        r.record_declined(run);
        assert!(!r.is_hopeless(3, 1));
        r.record_declined(Uuid::new_v4());
        assert!(r.is_hopeless(3, 1));
        assert_eq!(r.times_failed, 0);
    }

    #[test]
    fn recommends_best_rate_above_threshold() {
        let mut r = record();
        let run = Uuid::new_v4();
        r.record_failure(Strategy::Minimal, run);
        r.record_success(Strategy::Minimal, "m");
        r.record_success(Strategy::Aggressive, "m");
        assert_eq!(r.successful_strategy, Some(Strategy::Aggressive));
        assert_eq!(r.recommend(0.5), Some(Strategy::Aggressive));

        let mut weak = record();
        weak.record_failure(Strategy::Minimal, run);
        weak.record_failure(Strategy::Minimal, run);
        weak.record_success(Strategy::Minimal, "m");
        assert_eq!(weak.recommend(0.5), None);
        assert_eq!(weak.recommend(0.3), Some(Strategy::Minimal));
    }

    #[test]
    fn seen_counts_once_per_run() {
        let mut r = record();
        let run = Uuid::new_v4();
        r.mark_seen(run);
        r.mark_seen(run);
        r.mark_seen(Uuid::new_v4());
        assert_eq!(r.times_seen, 2);
    }

    #[test]
    fn tracked_runs_are_bounded() {
        let mut r = record();
        for _ in 0..20 {
            r.record_failure(Strategy::Minimal, Uuid::new_v4());
        }
        assert_eq!(r.runs_failed.len(), MAX_TRACKED_RUNS);
        assert_eq!(r.times_failed, 20);
    }

    #[test]
    fn strategy_map_roundtrips_through_json() {
        let mut r = record();
        r.record_success(Strategy::LastResort, "m");
        let json = serde_json::to_string(&r).unwrap();
        assert!(json.contains("\"last_resort\""));
        let back: LearningRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back.successful_strategy, Some(Strategy::LastResort));
    }
}
