//! Everything a run needs, built once per process and handed to the agent.

use crate::learning::LearningPolicy;
use crate::oracle::{ModelCatalog, PriceTable};
use mender_adapters::AgentConfig;
use mender_core::estimate::{estimate_tokens, TokenEstimator};
use mender_core::{LearningBackend, Oracle, RunStore, Toolchain, VersionControl};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared collaborators for a run.
pub struct AgentContext {
    /// Repository root; issue paths are relative to it
    pub root: PathBuf,
    pub config: AgentConfig,
    pub oracle: Arc<dyn Oracle>,
    pub toolchain: Arc<dyn Toolchain>,
    pub vcs: Arc<dyn VersionControl>,
    pub runs: Arc<dyn RunStore>,
    pub learning: Arc<dyn LearningBackend>,
    pub prices: PriceTable,
    pub models: ModelCatalog,
    pub estimator: TokenEstimator,
    pub cancel: Arc<AtomicBool>,
}

impl AgentContext {
    pub fn new(
        root: PathBuf,
        config: AgentConfig,
        oracle: Arc<dyn Oracle>,
        toolchain: Arc<dyn Toolchain>,
        vcs: Arc<dyn VersionControl>,
        runs: Arc<dyn RunStore>,
        learning: Arc<dyn LearningBackend>,
    ) -> Self {
        let models = ModelCatalog::from_settings(&config.oracle);
        Self {
            root,
            config,
            oracle,
            toolchain,
            vcs,
            runs,
            learning,
            prices: PriceTable::default(),
            models,
            estimator: estimate_tokens,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_prices(mut self, prices: PriceTable) -> Self {
        self.prices = prices;
        self
    }

    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    /// A flag shared with whoever may cancel the run (a signal handler, a test).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }

    pub fn learning_policy(&self) -> LearningPolicy {
        LearningPolicy {
            skip_after_failures: self.config.skip_after_failures,
            min_success_rate: self.config.min_success_rate,
        }
    }

    pub fn oracle_timeout(&self) -> Duration {
        Duration::from_secs(self.config.oracle_timeout_secs.max(1))
    }
}
