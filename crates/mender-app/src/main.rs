//! Mender - autonomous maintenance for JavaScript and TypeScript repositories
//!
//! Scans a repository with its own linter, type checker and package manager,
//! asks a code-repair model for small fixes, validates each one, and commits
//! the batch.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use mender_adapters::{AgentConfig, CommandToolchain, GitRepo, Store, UserConfig};
use mender_core::{Run, RunStatus};
use mender_engine::{Agent, AgentContext, OpenRouterOracle};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(
    name = "mender",
    about = "Find and fix small maintenance issues, then commit the result",
    version,
    args_conflicts_with_subcommands = true
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the repository (defaults to current directory)
    #[arg(default_value = ".")]
    path: PathBuf,

    /// Apply and validate fixes, then put every file back
    #[arg(long)]
    dry_run: bool,

    /// Most issues to attempt in this run
    #[arg(long, value_name = "N")]
    max_issues: Option<usize>,

    /// Attempts per issue for the escalating fixers
    #[arg(long, value_name = "N")]
    max_retries: Option<u32>,

    /// Oracle spend ceiling for this run, in USD
    #[arg(long, value_name = "USD")]
    budget: Option<f64>,

    /// Print the run as JSON instead of a sentence
    #[arg(long)]
    json: bool,

    /// Leave fixes in the working tree without committing
    #[arg(long)]
    no_commit: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show recent runs
    History {
        /// Path to the repository
        #[arg(default_value = ".")]
        path: PathBuf,

        #[arg(long, default_value_t = 10)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },
}

fn init_logging() {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_env("MENDER_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let args = Args::parse();
    init_logging();

    if let Some(Command::History { path, limit, json }) = &args.command {
        return show_history(path, *limit, *json);
    }

    let root = args
        .path
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", args.path.display()))?;
    let config = load_config(&root, &args)?;
    let agent = build_agent(root, config)?;

    let cancel = agent.context().cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, finishing the current attempt");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let report = agent.run().await;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report.run)?);
    } else {
        println!("{}", report.run.summary);
        for error in &report.run.errors {
            eprintln!("  ! {}", error);
        }
    }

    Ok(match report.run.status {
        RunStatus::Completed => ExitCode::SUCCESS,
        _ => ExitCode::FAILURE,
    })
}

/// File, then environment, then flags.
fn load_config(root: &Path, args: &Args) -> Result<AgentConfig> {
    let mut config = AgentConfig::load(root)?;
    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(max) = args.max_issues {
        config.max_issues_per_run = max;
    }
    if let Some(retries) = args.max_retries {
        config.max_retries = retries.max(1);
    }
    if let Some(budget) = args.budget {
        if !budget.is_finite() || budget < 0.0 {
            return Err(anyhow!("--budget must be a non-negative amount"));
        }
        config.budget_usd = budget;
    }
    if args.no_commit {
        config.commit = false;
    }
    Ok(config)
}

fn build_agent(root: PathBuf, config: AgentConfig) -> Result<Agent> {
    let mut user = UserConfig::load();
    let api_key = user.api_key().ok_or_else(|| {
        anyhow!(
            "No oracle API key. Set OPENROUTER_API_KEY or add openrouter_api_key to {}",
            UserConfig::config_location()
        )
    })?;
    let user_id = user.ensure_user_id();
    if let Err(err) = user.save() {
        tracing::debug!(error = %err, "could not persist user id");
    }

    let oracle = OpenRouterOracle::new(
        &config.oracle.base_url,
        &api_key,
        Some(user_id),
        Duration::from_secs(config.oracle_timeout_secs),
    )?;
    let toolchain = CommandToolchain::new(
        &root,
        &config.tools,
        Duration::from_secs(config.tool_timeout_secs),
    );
    let vcs = GitRepo::open(&root)?;
    let store = Arc::new(Store::new(&root));

    let ctx = AgentContext::new(
        root,
        config,
        Arc::new(oracle),
        Arc::new(toolchain),
        Arc::new(vcs),
        store.clone(),
        store,
    );
    Ok(Agent::new(ctx))
}

fn show_history(path: &Path, limit: usize, json: bool) -> Result<ExitCode> {
    let root = path
        .canonicalize()
        .with_context(|| format!("Repository not found: {}", path.display()))?;
    let runs = Store::new(&root).load_recent_runs(limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&runs)?);
        return Ok(ExitCode::SUCCESS);
    }
    if runs.is_empty() {
        println!("No runs recorded yet.");
    }
    for run in &runs {
        println!("{}", history_line(run));
    }
    Ok(ExitCode::SUCCESS)
}

fn history_line(run: &Run) -> String {
    let commit = run
        .commit
        .as_deref()
        .map(|c| c.get(..8).unwrap_or(c))
        .unwrap_or("-");
    format!(
        "{}  {:<9} found {:>3}  fixed {:>3}  failed {:>3}  ${:.4}  {}{}",
        run.started_at.format("%Y-%m-%d %H:%M"),
        run.status.as_str(),
        run.tasks_found,
        run.tasks_completed,
        run.tasks_failed,
        run.total_cost_usd,
        commit,
        if run.dry_run { "  (dry run)" } else { "" }
    )
}
