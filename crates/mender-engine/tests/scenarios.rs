mod support;

use anyhow::Result;
use mender_core::{IssueStatus, IssueType, RunStatus, Strategy, ToolKind, ToolOutput, Toolchain};
use mender_engine::{Agent, ModelCatalog, ModelPrice, ModelTier, PriceTable};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use support::{
    edit_reply, eslint_report, tsc_report, FakeVcs, Harness, LintFix, LintFixTools, QueuedTools,
    ScriptedOracle,
};

const TOTAL_TS: &str = "export function total(values: number[]): number {\n  let sum: number = \"0\";\n  for (const v of values) {\n    sum += v;\n  }\n  return sum;\n}\n";
const TOTAL_ERROR: &str =
    "src/total.ts(2,7): error TS2322: Type 'string' is not assignable to type 'number'.";

fn unused_imports(count: usize) -> String {
    let mut source = String::new();
    for name in ["alpha", "beta", "gamma", "delta", "epsilon", "zeta"].iter().take(count) {
        source.push_str(&format!("import {{ {} }} from './{}';\n", name, name));
    }
    source.push_str("export const value = 1;\n");
    source
}

#[tokio::test]
async fn clean_tree_completes_with_clean_summary() {
    let h = Harness::new();
    h.write("src/ok.ts", "export const ok = true;\n");

    let report = h.agent().run().await;

    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.run.tasks_found, 0);
    assert_eq!(report.run.tasks_completed, 0);
    assert!(report.run.summary.contains("clean"));
    assert_eq!(h.oracle.calls(), 0);
    assert!(h.vcs.commits().is_empty());
    assert_eq!(h.store.runs()[0].status, RunStatus::Completed);
}

#[tokio::test]
async fn type_error_escalates_to_aggressive_and_commits() {
    let mut h = Harness::new();
    h.write("src/total.ts", TOTAL_TS);
    h.tools = Arc::new(QueuedTools::new().with(
        ToolKind::TypeChecker,
        &[
            tsc_report(&[TOTAL_ERROR]),
            tsc_report(&[TOTAL_ERROR]),
            tsc_report(&[]),
        ],
    ));
    h.oracle = Arc::new(ScriptedOracle::new([
        edit_reply("= \"0\";", "= Number(\"0\") as any;", "cast the literal"),
        edit_reply("= \"0\";", "= 0;", "initialise the sum with a number"),
    ]));

    let report = h.agent().run().await;

    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.run.tasks_completed, 1);
    assert_eq!(report.issues[0].status, IssueStatus::Fixed);
    assert_eq!(report.attempts.len(), 2);
    assert_eq!(report.attempts[0].strategy, Strategy::Minimal);
    assert!(!report.attempts[0].success);
    assert_eq!(report.attempts[1].strategy, Strategy::Aggressive);
    assert!(report.attempts[1].success);
    assert_eq!(h.store.attempts().len(), 2);

    let requests = h.oracle.requests();
    assert!(requests[0].temperature < requests[1].temperature);

    let learned = &h.store.learning()[&report.issues[0].fingerprint];
    assert_eq!(learned.successful_strategy, Some(Strategy::Aggressive));

    let on_disk = String::from_utf8(h.read("src/total.ts")).unwrap();
    assert!(on_disk.contains("let sum: number = 0;"));

    let commits = h.vcs.commits();
    assert_eq!(commits.len(), 1);
    assert!(commits[0].starts_with("fix(type_error): TS2322"));
    assert!(commits[0].contains(&format!("Mender-Run: {}", report.run.id)));
    assert!(commits[0].contains("initialise the sum with a number"));
    assert!(report.run.commit.is_some());
    assert!(report.run.total_cost_usd > 0.0);
}

#[tokio::test]
async fn security_issue_needing_review_fails_without_commit() {
    let mut h = Harness::new();
    let original = "export function render(el: HTMLElement, html: string): void {\n  el.innerHTML = html;\n}\n";
    h.write("src/render.ts", original);
    h.oracle = Arc::new(ScriptedOracle::new([
        "NEEDS_HUMAN_REVIEW: the markup may come from a trusted template",
    ]));

    let report = h.agent().run().await;

    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.issues.len(), 1);
    assert_eq!(report.issues[0].kind, IssueType::Security);
    assert_eq!(report.issues[0].status, IssueStatus::Failed);
    assert_eq!(report.attempts.len(), 1);
    assert_eq!(report.attempts[0].fixer, "security");
    assert!(report.attempts[0].reasoning.contains("requires manual review"));
    assert_eq!(h.oracle.calls(), 1);
    assert_eq!(h.oracle.requests()[0].temperature, 0.0);
    assert!(h.vcs.commits().is_empty());
    assert!(report.run.commit.is_none());
    assert_eq!(h.read("src/render.ts"), original.as_bytes());

    let learned = &h.store.learning()[&report.issues[0].fingerprint];
    assert_eq!(learned.times_declined, 1);
    assert_eq!(learned.times_failed, 0);
}

#[tokio::test]
async fn per_run_cap_leaves_the_rest_pending() {
    let mut h = Harness::new();
    h.write("src/imports.ts", unused_imports(6));
    h.config.max_retries = 1;

    let report = h.agent().run().await;

    assert_eq!(report.run.tasks_found, 6);
    assert_eq!(report.run.tasks_completed, 0);
    assert_eq!(report.run.tasks_failed, 5);
    let pending = report
        .issues
        .iter()
        .filter(|i| i.status == IssueStatus::Pending)
        .count();
    assert_eq!(pending, 1);
    let attempted: HashSet<_> = report.attempts.iter().map(|a| a.issue_id).collect();
    assert_eq!(attempted.len(), 5);
    assert_eq!(h.oracle.calls(), 5);
    assert_eq!(h.store.issues().len(), 6);
}

fn ten_thousand_tokens(_text: &str) -> u64 {
    10_000
}

#[tokio::test]
async fn budget_refusal_makes_no_oracle_call() {
    let mut h = Harness::new();
    h.write("src/imports.ts", unused_imports(1));
    h.config.budget_usd = 0.01;
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply("x", "y", "never used")]));

    let catalog = ModelCatalog::default();
    let prices = [ModelTier::Speed, ModelTier::Balanced, ModelTier::Smart]
        .into_iter()
        .fold(PriceTable::empty(), |table, tier| {
            table.with_price(catalog.id(tier), ModelPrice::new(1.0, 0.0))
        });
    let ctx = h
        .context()
        .with_prices(prices)
        .with_estimator(ten_thousand_tokens);

    let report = Agent::new(ctx).run().await;

    assert_eq!(h.oracle.calls(), 0);
    assert_eq!(report.attempts.len(), 1);
    let error = report.attempts[0].error.as_deref().unwrap();
    assert!(error.starts_with("budget exceeded"), "{}", error);
    assert_eq!(report.issues[0].status, IssueStatus::Failed);
    assert_eq!(report.run.total_cost_usd, 0.0);
    assert_eq!(report.run.status, RunStatus::Completed);
}

#[tokio::test]
async fn failed_validation_restores_the_file_byte_for_byte() {
    let mut h = Harness::new();
    let original = TOTAL_TS.replace('\n', "\r\n").trim_end().to_string() + "  ";
    h.write("src/total.ts", &original);
    h.tools = Arc::new(
        QueuedTools::new().with(ToolKind::TypeChecker, &[tsc_report(&[TOTAL_ERROR])]),
    );
    h.oracle = Arc::new(ScriptedOracle::new([
        edit_reply("= \"0\";", "= 0;", "one"),
        edit_reply("= \"0\";", "= +\"0\";", "two"),
        edit_reply("= \"0\";", "= \"0\" as any;", "three"),
    ]));

    let report = h.agent().run().await;

    assert_eq!(report.attempts.len(), 3);
    assert!(report.attempts.iter().all(|a| !a.success));
    assert_eq!(report.issues[0].status, IssueStatus::Failed);
    assert_eq!(h.read("src/total.ts"), original.as_bytes());
    assert!(h.vcs.commits().is_empty());
}

#[tokio::test]
async fn dry_run_validates_then_restores() {
    let mut h = Harness::new();
    h.write("src/total.ts", TOTAL_TS);
    h.config.dry_run = true;
    h.tools = Arc::new(QueuedTools::new().with(
        ToolKind::TypeChecker,
        &[tsc_report(&[TOTAL_ERROR]), tsc_report(&[])],
    ));
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply("= \"0\";", "= 0;", "number literal")]));

    let report = h.agent().run().await;

    assert_eq!(report.run.tasks_completed, 1);
    assert!(report.run.dry_run);
    assert_eq!(h.read("src/total.ts"), TOTAL_TS.as_bytes());
    assert!(h.vcs.commits().is_empty());
    assert!(report.run.summary.contains("Dry run"));
}

#[tokio::test]
async fn cancelled_run_leaves_issues_pending() {
    let h = Harness::new();
    h.write("src/imports.ts", unused_imports(2));
    let agent = h.agent();
    agent.context().cancel_handle().store(true, Ordering::SeqCst);

    let report = agent.run().await;

    assert_eq!(report.run.status, RunStatus::Completed);
    assert_eq!(report.run.tasks_found, 2);
    assert!(report.issues.iter().all(|i| i.status == IssueStatus::Pending));
    assert!(report.run.errors.iter().any(|e| e == "cancelled"));
    assert_eq!(h.oracle.calls(), 0);
}

#[tokio::test]
async fn repeatedly_failing_issue_is_skipped_on_the_third_run() {
    let h = Harness::new();
    h.write("src/imports.ts", unused_imports(1));

    for _ in 0..2 {
        let report = h.agent().run().await;
        assert_eq!(report.run.tasks_failed, 1);
    }
    assert_eq!(h.oracle.calls(), 6);

    let report = h.agent().run().await;
    assert_eq!(report.run.tasks_skipped, 1);
    assert_eq!(report.issues[0].status, IssueStatus::Skipped);
    assert!(report.attempts.is_empty());
    assert_eq!(h.oracle.calls(), 6);
}

#[tokio::test]
async fn dirty_tree_still_commits() {
    let mut h = Harness::new();
    h.write("src/total.ts", TOTAL_TS);
    h.vcs = Arc::new(FakeVcs::dirty());
    h.tools = Arc::new(QueuedTools::new().with(
        ToolKind::TypeChecker,
        &[tsc_report(&[TOTAL_ERROR]), tsc_report(&[])],
    ));
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply("= \"0\";", "= 0;", "number literal")]));

    let report = h.agent().run().await;

    assert_eq!(report.run.tasks_completed, 1);
    assert_eq!(h.vcs.commits().len(), 1);
}

const SEMI: (&str, &str, u32) = ("semi", "Missing semicolon.", 1);

#[tokio::test]
async fn lint_autofix_goes_first_then_the_ladder_starts_at_minimal() {
    let mut h = Harness::new();
    h.write("src/util.js", "let a = 1\n");
    let tools = Arc::new(LintFixTools::new(
        h.root(),
        LintFix::Rewrites("let a = 1 \n"),
        QueuedTools::new().with(
            ToolKind::Linter,
            &[
                eslint_report("src/util.js", &[SEMI]),
                eslint_report("src/util.js", &[SEMI]),
                eslint_report("src/util.js", &[]),
            ],
        ),
    ));
    h.tools = tools.clone();
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply(
        "let a = 1",
        "let a = 1;",
        "terminate the statement",
    )]));

    let report = h.agent().run().await;

    assert_eq!(tools.fix_runs(), 1);
    assert_eq!(h.oracle.calls(), 1);
    let strategies: Vec<_> = report.attempts.iter().map(|a| a.strategy).collect();
    assert_eq!(strategies, vec![Strategy::Autofix, Strategy::Minimal]);
    assert_eq!(report.attempts[0].fixer, "linter");
    assert_eq!(report.attempts[0].cost_usd, 0.0);
    assert!(!report.attempts[0].success);
    assert!(report.attempts[1].success);
    assert_eq!(report.issues[0].status, IssueStatus::Fixed);
    assert_eq!(h.read("src/util.js"), b"let a = 1;\n");

    let learned = &h.store.learning()[&report.issues[0].fingerprint];
    assert_eq!(learned.times_failed, 0);
    assert!(learned.runs_failed.is_empty());
    assert!(!learned.strategies.contains_key(&Strategy::Autofix));
    assert_eq!(learned.successful_strategy, Some(Strategy::Minimal));
    assert_eq!(h.vcs.commits().len(), 1);
}

#[tokio::test]
async fn linter_fixer_that_dies_mid_write_leaves_no_trace() {
    let mut h = Harness::new();
    h.write("src/util.js", "let a = 1\n");
    h.write("src/other.ts", TOTAL_TS);
    h.config.max_retries = 1;
    let other_error = TOTAL_ERROR.replace("total", "other");
    h.tools = Arc::new(LintFixTools::new(
        h.root(),
        LintFix::RewritesThenFails("PARTIAL WRITE"),
        QueuedTools::new()
            .with(ToolKind::Linter, &[eslint_report("src/util.js", &[SEMI])])
            .with(
                ToolKind::TypeChecker,
                &[
                    tsc_report(&[other_error.as_str()]),
                    tsc_report(&[]),
                ],
            ),
    ));
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply(
        "= \"0\";",
        "= 0;",
        "number literal",
    )]));

    let report = h.agent().run().await;

    let autofix = report
        .attempts
        .iter()
        .find(|a| a.strategy == Strategy::Autofix)
        .unwrap();
    assert!(!autofix.success);
    assert!(autofix.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(h.read("src/util.js"), b"let a = 1\n");

    // The other fix still commits, and must not carry the partial write.
    assert_eq!(report.run.tasks_completed, 1);
    assert_eq!(report.run.tasks_failed, 1);
    assert_eq!(h.vcs.commits().len(), 1);
}

/// Type checker that, once the fix is written, swaps the file for a
/// directory so nothing can be written back.
struct SwapsFileForDir {
    root: PathBuf,
    file: &'static str,
    runs: AtomicUsize,
}

impl Toolchain for SwapsFileForDir {
    fn available(&self, tool: ToolKind) -> bool {
        tool == ToolKind::TypeChecker
    }

    fn run(&self, _tool: ToolKind, _file: Option<&Path>) -> Result<ToolOutput> {
        if self.runs.fetch_add(1, Ordering::SeqCst) > 0 {
            let path = self.root.join(self.file);
            std::fs::remove_file(&path)?;
            std::fs::create_dir(&path)?;
        }
        Ok(tsc_report(&[TOTAL_ERROR]))
    }
}

#[tokio::test]
async fn unrecoverable_rollback_fails_the_run_but_keeps_the_audit_trail() {
    let mut h = Harness::new();
    h.write("src/total.ts", TOTAL_TS);
    h.vcs = Arc::new(FakeVcs::without_discard());
    h.tools = Arc::new(SwapsFileForDir {
        root: h.root().to_path_buf(),
        file: "src/total.ts",
        runs: AtomicUsize::new(0),
    });
    h.oracle = Arc::new(ScriptedOracle::new([edit_reply("= \"0\";", "= 0;", "number literal")]));

    let report = h.agent().run().await;

    assert_eq!(report.run.status, RunStatus::Failed);
    assert!(report.run.errors.iter().any(|e| e.contains("failed to roll back")));
    assert!(!report.run.summary.is_empty());

    assert_eq!(report.attempts.len(), 1);
    assert!(!report.attempts[0].success);
    assert!(report.attempts[0]
        .error
        .as_deref()
        .unwrap()
        .contains("failed to roll back"));
    assert_eq!(h.store.attempts().len(), 1);

    assert_eq!(report.issues[0].status, IssueStatus::Failed);
    assert_eq!(h.store.issues()[0].status, IssueStatus::Failed);
    assert_eq!(report.run.tasks_failed, 1);
    assert!(h.vcs.commits().is_empty());
}
