//! Run orchestrator.
//!
//! One run is: scan, drop what the learning store has given up on, take the
//! highest-priority issues up to the per-run cap, then fix them one at a time.
//! Every attempt writes its candidate, validates it, and on failure puts the
//! file back byte for byte before the next rung. Fixed issues go into a single
//! commit. Nothing escapes [`Agent::run`]: a fatal error fails the run but
//! leaves earlier fixes in place and still produces a summary.

use crate::context::AgentContext;
use crate::cost::CostGovernor;
use crate::fixers::autofix::{run_autofix, AUTOFIX_MODEL};
use crate::fixers::{FixContext, FixResult, Fixer};
use crate::learning::LearningStore;
use crate::report::{self, FixedIssue};
use crate::scan::Scanner;
use crate::validate::Validator;
use anyhow::{Context, Result};
use chrono::Utc;
use mender_core::fix_loop::{FixLoop, FixLoopState};
use mender_core::{
    FixAttempt, FixError, Issue, IssueStatus, IssueType, LearningOutcome, Run, RunStatus,
    Strategy, ToolKind,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::Instrument;
use uuid::Uuid;

/// What a run hands back: the run row plus the issues and attempts it produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run: Run,
    pub issues: Vec<Issue>,
    pub attempts: Vec<FixAttempt>,
}

#[derive(Default)]
struct Batch {
    issues: Vec<Issue>,
    attempts: Vec<FixAttempt>,
    fixed: Vec<FixedIssue>,
    /// Content each written file had before this run first touched it
    touched: HashMap<PathBuf, Vec<u8>>,
}

pub struct Agent {
    ctx: AgentContext,
}

impl Agent {
    pub fn new(ctx: AgentContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &AgentContext {
        &self.ctx
    }

    pub async fn run(&self) -> RunReport {
        let run = Run::start(self.ctx.config.dry_run);
        let span = tracing::info_span!("run", run_id = %run.id);
        self.drive(run).instrument(span).await
    }

    async fn drive(&self, mut run: Run) -> RunReport {
        tracing::info!(root = %self.ctx.root.display(), dry_run = run.dry_run, "run started");
        self.save_run(&run);

        let mut batch = Batch::default();
        let mut result = self.execute(&mut run, &mut batch).await;
        if run.dry_run {
            result = result.and(restore_touched(&batch.touched));
        }

        match result {
            Ok(()) => run.finish(RunStatus::Completed),
            Err(err) => {
                let message = format!("{:#}", err);
                tracing::error!(error = %message, "run failed");
                run.record_error(message);
                run.finish(RunStatus::Failed);
            }
        }
        run.hours_saved = report::hours_saved(&batch.fixed);
        run.summary = report::summary(&run);
        tracing::info!(
            status = run.status.as_str(),
            fixed = run.tasks_completed,
            failed = run.tasks_failed,
            cost_usd = run.total_cost_usd,
            "{}",
            run.summary
        );

        if let Err(err) = self.ctx.runs.insert_issues(run.id, &batch.issues) {
            tracing::warn!(error = %err, "failed to save issues");
        }
        self.save_run(&run);

        RunReport {
            run,
            issues: batch.issues,
            attempts: batch.attempts,
        }
    }

    async fn execute(&self, run: &mut Run, batch: &mut Batch) -> Result<()> {
        let ctx = &self.ctx;
        let scanner = Scanner::new(ctx.toolchain.as_ref(), &ctx.root, &ctx.config);
        let scan = scanner.scan();
        for warning in scan.warnings {
            run.record_error(format!("scan: {}", warning));
        }
        batch.issues = scan.issues;
        run.tasks_found = batch.issues.len();
        tracing::info!(found = run.tasks_found, "scan finished");

        let mut learning = LearningStore::open(ctx.learning.clone(), ctx.learning_policy());
        learning.mark_seen(&batch.issues, run.id);
        if batch.issues.is_empty() {
            return Ok(());
        }

        for issue in batch.issues.iter_mut() {
            if learning.should_skip(issue) {
                issue.transition(IssueStatus::Skipped)?;
                run.tasks_skipped += 1;
            }
        }
        if run.tasks_skipped > 0 {
            tracing::info!(
                skipped = run.tasks_skipped,
                "dropped issues that keep failing across runs"
            );
        }

        let mut queue: Vec<usize> = (0..batch.issues.len())
            .filter(|&i| batch.issues[i].status == IssueStatus::Pending)
            .collect();
        queue.sort_by(|&a, &b| batch.issues[b].priority.cmp(&batch.issues[a].priority));
        let cap = ctx.config.max_issues_per_run;
        if queue.len() > cap {
            tracing::info!(deferred = queue.len() - cap, cap, "per-run cap reached");
            queue.truncate(cap);
        }

        if !run.dry_run && ctx.config.commit && !queue.is_empty() {
            match ctx.vcs.is_dirty() {
                Ok(true) => tracing::warn!(
                    "working tree has uncommitted changes; they will be part of the fix commit"
                ),
                Ok(false) => {}
                Err(err) => tracing::warn!(error = %err, "could not check working tree state"),
            }
        }

        let mut governor =
            CostGovernor::new(ctx.config.budget_usd, ctx.prices.clone()).with_estimator(ctx.estimator);
        let mut validator = Validator::new(&scanner, &batch.issues);
        for idx in queue {
            if ctx.is_cancelled() {
                break;
            }
            let span = tracing::info_span!(
                "issue",
                fingerprint = %batch.issues[idx].fingerprint,
                location = %batch.issues[idx].location_label()
            );
            self.fix_issue(run, batch, idx, &mut learning, &mut governor, &mut validator)
                .instrument(span)
                .await?;
        }
        if ctx.is_cancelled() {
            tracing::warn!("run cancelled; remaining issues left pending");
            run.record_error("cancelled");
        }

        if batch.fixed.is_empty() || run.dry_run || !ctx.config.commit {
            return Ok(());
        }
        let message = report::commit_message(run.id, &batch.fixed);
        ctx.vcs.stage_all().context("failed to stage fixes")?;
        let revision = ctx.vcs.commit(&message).context("failed to commit fixes")?;
        tracing::info!(revision = %revision, fixed = batch.fixed.len(), "committed fixes");
        run.commit = Some(revision);
        Ok(())
    }

    /// Drive one issue through its fix loop. `Err` only when the working
    /// tree could not be put back after a failed attempt; the attempt is
    /// still recorded and the issue still ends `failed`.
    async fn fix_issue(
        &self,
        run: &mut Run,
        batch: &mut Batch,
        idx: usize,
        learning: &mut LearningStore,
        governor: &mut CostGovernor,
        validator: &mut Validator<'_>,
    ) -> Result<()> {
        let ctx = &self.ctx;
        batch.issues[idx].transition(IssueStatus::Fixing)?;
        let issue = batch.issues[idx].clone();

        let fixer = Fixer::select(&issue);
        let recommended = if fixer.escalates() {
            learning.recommend(&issue)
        } else {
            None
        };
        let autofix = fixer == Fixer::Generic
            && issue.kind == IssueType::Lint
            && ctx.toolchain.available(ToolKind::LinterFix);
        let mut fix_loop = FixLoop::new(
            fixer.max_attempts(ctx.config.max_retries),
            autofix,
            recommended,
        );
        tracing::info!(
            fixer = fixer.name(),
            kind = %issue.kind,
            priority = issue.priority,
            recommended = recommended.map(|s| s.as_str()),
            "fixing issue"
        );

        let path = ctx.root.join(&issue.file);
        let mut winning_reasoning = String::new();
        let mut rollback_failure = None;
        while let Some(plan) = fix_loop.next_attempt() {
            if ctx.is_cancelled() {
                fix_loop.stop(FixError::Cancelled);
                break;
            }
            let started = Instant::now();
            let snapshot = match std::fs::read(&path) {
                Ok(bytes) => bytes,
                Err(err) => {
                    fix_loop.stop(err.into());
                    break;
                }
            };

            let strategy = if plan.strategy == Strategy::Autofix {
                Strategy::Autofix
            } else {
                fixer.strategy_for(plan)
            };
            let result = match std::str::from_utf8(&snapshot) {
                Err(_) => FixResult::failed(
                    FixError::Io("file is not valid UTF-8".to_string()),
                    0.0,
                    "",
                ),
                Ok(original) if strategy == Strategy::Autofix => {
                    run_autofix(ctx.toolchain.as_ref(), &ctx.root, &issue, original)
                }
                Ok(original) => {
                    let mut fix_ctx = FixContext {
                        oracle: ctx.oracle.as_ref(),
                        governor: &mut *governor,
                        models: &ctx.models,
                        oracle_timeout: ctx.oracle_timeout(),
                        cancel: &ctx.cancel,
                    };
                    fixer.fix(&mut fix_ctx, &issue, original, plan).await
                }
            };
            run.total_cost_usd += result.cost_usd;

            let (outcome, fatal) = match self.apply_candidate(
                &path,
                &issue,
                &snapshot,
                &result,
                validator,
                &mut batch.touched,
            ) {
                Ok(outcome) => (outcome, None),
                Err(err) => (Err(FixError::Io(format!("{:#}", err))), Some(err)),
            };

            let attempt = FixAttempt {
                id: Uuid::new_v4(),
                run_id: run.id,
                issue_id: issue.id,
                fingerprint: issue.fingerprint.clone(),
                attempt: plan.number,
                strategy,
                fixer: if strategy == Strategy::Autofix {
                    AUTOFIX_MODEL.to_string()
                } else {
                    fixer.name().to_string()
                },
                model: result.model.clone(),
                success: outcome.is_ok(),
                cost_usd: result.cost_usd,
                duration_ms: started.elapsed().as_millis() as u64,
                reasoning: result.reasoning.clone(),
                error: outcome.as_ref().err().map(|e| e.to_string()),
                created_at: Utc::now(),
            };
            match &outcome {
                Ok(()) => tracing::info!(
                    attempt = plan.number,
                    strategy = strategy.as_str(),
                    model = %result.model,
                    cost_usd = result.cost_usd,
                    "attempt succeeded"
                ),
                Err(err) => tracing::info!(
                    attempt = plan.number,
                    strategy = strategy.as_str(),
                    model = %result.model,
                    cost_usd = result.cost_usd,
                    error = %err,
                    "attempt failed"
                ),
            }
            if let Err(err) = ctx.runs.insert_attempt(&attempt) {
                tracing::warn!(error = %err, "failed to save fix attempt");
            }
            batch.attempts.push(attempt);

            if let Some(err) = fatal {
                fix_loop.stop(FixError::Io(format!("{:#}", err)));
                rollback_failure = Some(err);
                break;
            }
            match outcome {
                Ok(()) => {
                    learning.record_success(&issue, strategy, &result.model);
                    winning_reasoning = result.reasoning;
                    fix_loop.succeed();
                }
                Err(err) => {
                    // A linter that cannot fix something says nothing about the oracle ladder.
                    if strategy != Strategy::Autofix {
                        match err.learning_outcome() {
                            LearningOutcome::Failed => learning.record_failure(&issue, strategy, run.id),
                            LearningOutcome::Declined => learning.record_declined(&issue, run.id),
                            LearningOutcome::Ignored => {}
                        }
                    }
                    fix_loop.fail(err);
                }
            }
        }

        let entry = &mut batch.issues[idx];
        match fix_loop.state() {
            FixLoopState::Fixed { attempt } => {
                entry.transition(IssueStatus::Fixed)?;
                run.tasks_completed += 1;
                tracing::info!(attempt, "issue fixed");
                batch.fixed.push(FixedIssue {
                    issue: entry.clone(),
                    reasoning: winning_reasoning,
                });
            }
            FixLoopState::Failed { attempts, error } => {
                entry.transition(IssueStatus::Failed)?;
                run.tasks_failed += 1;
                tracing::info!(attempts, error = %error, "issue not fixed");
            }
            state => {
                entry.transition(IssueStatus::Failed)?;
                run.tasks_failed += 1;
                tracing::warn!(?state, "fix loop ended without a verdict");
            }
        }
        match rollback_failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Write the candidate and validate it. The inner result is the
    /// attempt's outcome; the outer one fails only when rollback fails.
    fn apply_candidate(
        &self,
        path: &Path,
        issue: &Issue,
        snapshot: &[u8],
        result: &FixResult,
        validator: &mut Validator<'_>,
        touched: &mut HashMap<PathBuf, Vec<u8>>,
    ) -> Result<Result<(), FixError>> {
        let content = match (&result.error, &result.fixed_content) {
            (None, Some(content)) => content,
            (error, _) => {
                let err = error
                    .clone()
                    .unwrap_or_else(|| FixError::Declined("fixer returned no content".to_string()));
                // A fixer that failed part way may still have written the file.
                if std::fs::read(path).ok().as_deref() != Some(snapshot) {
                    tracing::warn!(
                        file = %issue.file.display(),
                        "failed attempt left changes behind, rolling back"
                    );
                    self.rollback(path, &issue.file, snapshot)?;
                }
                return Ok(Err(err));
            }
        };

        touched
            .entry(path.to_path_buf())
            .or_insert_with(|| snapshot.to_vec());
        if let Err(err) = std::fs::write(path, content) {
            self.rollback(path, &issue.file, snapshot)?;
            return Ok(Err(err.into()));
        }
        match validator.check(issue) {
            Ok(()) => Ok(Ok(())),
            Err(err) => {
                self.rollback(path, &issue.file, snapshot)?;
                Ok(Err(err))
            }
        }
    }

    fn rollback(&self, path: &Path, file: &Path, snapshot: &[u8]) -> Result<()> {
        match std::fs::write(path, snapshot) {
            Ok(()) => Ok(()),
            Err(err) => {
                tracing::warn!(error = %err, "snapshot restore failed, discarding through version control");
                self.ctx
                    .vcs
                    .discard_file(file)
                    .with_context(|| format!("failed to roll back {}", file.display()))
            }
        }
    }

    fn save_run(&self, run: &Run) {
        if let Err(err) = self.ctx.runs.upsert_run(run) {
            tracing::warn!(error = %err, "failed to save run");
        }
    }
}

/// Dry runs leave the tree as they found it.
fn restore_touched(touched: &HashMap<PathBuf, Vec<u8>>) -> Result<()> {
    for (path, original) in touched {
        std::fs::write(path, original)
            .with_context(|| format!("failed to restore {}", path.display()))?;
    }
    if !touched.is_empty() {
        tracing::info!(files = touched.len(), "dry run: restored touched files");
    }
    Ok(())
}
