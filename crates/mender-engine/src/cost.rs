//! Per-run spending ceiling on oracle calls.

use crate::oracle::PriceTable;
use mender_core::estimate::{estimate_tokens, TokenEstimator};
use mender_core::FixError;

/// Output is projected as this share of the input when checking the budget.
const OUTPUT_RATIO: f64 = 0.8;

#[derive(Debug, Clone)]
pub struct CostGovernor {
    ceiling_usd: f64,
    spent_usd: f64,
    calls: u32,
    prices: PriceTable,
    estimator: TokenEstimator,
}

impl CostGovernor {
    pub fn new(ceiling_usd: f64, prices: PriceTable) -> Self {
        Self {
            ceiling_usd: ceiling_usd.max(0.0),
            spent_usd: 0.0,
            calls: 0,
            prices,
            estimator: estimate_tokens,
        }
    }

    /// Swap the character-count heuristic for an exact tokenizer.
    pub fn with_estimator(mut self, estimator: TokenEstimator) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn estimate_tokens(&self, text: &str) -> u64 {
        (self.estimator)(text)
    }

    /// Worst-case cost of one call whose prompt is `estimated_tokens` long.
    pub fn projected_cost(&self, estimated_tokens: u64, model: &str) -> f64 {
        let output = (estimated_tokens as f64 * OUTPUT_RATIO).ceil() as u64;
        self.prices.cost(model, estimated_tokens, output)
    }

    pub fn can_afford(&self, estimated_tokens: u64, model: &str) -> bool {
        self.spent_usd + self.projected_cost(estimated_tokens, model) <= self.ceiling_usd
    }

    /// Like [`can_afford`](Self::can_afford) but returns the refusal as an error.
    pub fn check(&self, estimated_tokens: u64, model: &str) -> Result<f64, FixError> {
        let needed = self.projected_cost(estimated_tokens, model);
        if self.spent_usd + needed <= self.ceiling_usd {
            return Ok(needed);
        }
        Err(FixError::BudgetExceeded {
            needed,
            remaining: self.remaining(),
            ceiling: self.ceiling_usd,
        })
    }

    /// Add the actual cost of a completed call. Returns that cost.
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64, model: &str) -> f64 {
        let cost = self.prices.cost(model, input_tokens, output_tokens);
        self.spent_usd += cost;
        self.calls += 1;
        cost
    }

    pub fn spent(&self) -> f64 {
        self.spent_usd
    }

    pub fn remaining(&self) -> f64 {
        (self.ceiling_usd - self.spent_usd).max(0.0)
    }

    pub fn ceiling(&self) -> f64 {
        self.ceiling_usd
    }

    pub fn calls(&self) -> u32 {
        self.calls
    }
}
