//! Per-issue bounded fix loop.
//!
//! `pending → attempting(n) → fixed`, or `attempting(n) → rolled_back →
//! attempting(n+1)`, until either the attempt budget is spent or a
//! non-retryable error stops the loop. The attempt number and the ladder
//! position are tracked separately: a learned recommendation can move the
//! starting rung without changing how many attempts are allowed.

use crate::error::FixError;
use crate::strategy::Strategy;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttemptPlan {
    /// 1-based
    pub number: u32,
    pub strategy: Strategy,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FixLoopState {
    Pending,
    Attempting(AttemptPlan),
    RolledBack { attempt: u32 },
    Fixed { attempt: u32 },
    Failed { attempts: u32, error: FixError },
}

#[derive(Debug, Clone)]
pub struct FixLoop {
    max_attempts: u32,
    autofix_first: bool,
    ladder_offset: usize,
    attempts_made: u32,
    last_error: Option<FixError>,
    state: FixLoopState,
}

impl FixLoop {
    /// `autofix_first` reserves attempt 1 for the linter's own fixer. A
    /// recommended ladder rung replaces both the autofix and the default
    /// `minimal` start.
    pub fn new(max_attempts: u32, autofix_first: bool, recommended: Option<Strategy>) -> Self {
        let mut autofix_first = autofix_first;
        let mut ladder_offset = 0;
        if let Some(index) = recommended.and_then(|s| s.ladder_index()) {
            ladder_offset = index;
            autofix_first = false;
        }
        Self {
            max_attempts: max_attempts.max(1),
            autofix_first,
            ladder_offset,
            attempts_made: 0,
            last_error: None,
            state: FixLoopState::Pending,
        }
    }

    pub fn state(&self) -> &FixLoopState {
        &self.state
    }

    pub fn attempts_made(&self) -> u32 {
        self.attempts_made
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self.state,
            FixLoopState::Fixed { .. } | FixLoopState::Failed { .. }
        )
    }

    /// Plan the next attempt. Returns `None` once the loop has ended; an
    /// exhausted budget moves the loop to `Failed` carrying the last error.
    pub fn next_attempt(&mut self) -> Option<AttemptPlan> {
        match self.state {
            FixLoopState::Pending | FixLoopState::RolledBack { .. } => {}
            _ => return None,
        }
        if self.attempts_made >= self.max_attempts {
            let error = self
                .last_error
                .clone()
                .unwrap_or_else(|| FixError::ValidationFailed("no attempts left".to_string()));
            self.state = FixLoopState::Failed {
                attempts: self.attempts_made,
                error,
            };
            return None;
        }

        self.attempts_made += 1;
        let plan = AttemptPlan {
            number: self.attempts_made,
            strategy: self.strategy_for(self.attempts_made),
        };
        self.state = FixLoopState::Attempting(plan);
        Some(plan)
    }

    fn strategy_for(&self, number: u32) -> Strategy {
        let step = (number as usize).saturating_sub(1);
        if self.autofix_first {
            if step == 0 {
                return Strategy::Autofix;
            }
            return Strategy::for_ladder_step(step - 1 + self.ladder_offset);
        }
        Strategy::for_ladder_step(step + self.ladder_offset)
    }

    pub fn succeed(&mut self) {
        if let FixLoopState::Attempting(plan) = self.state {
            self.state = FixLoopState::Fixed {
                attempt: plan.number,
            };
        }
    }

    /// Record a failed attempt. Retryable errors leave room for the next
    /// rung; anything else ends the loop immediately.
    pub fn fail(&mut self, error: FixError) {
        let FixLoopState::Attempting(plan) = self.state else {
            return;
        };
        if error.is_retryable() {
            self.last_error = Some(error);
            self.state = FixLoopState::RolledBack {
                attempt: plan.number,
            };
        } else {
            self.state = FixLoopState::Failed {
                attempts: plan.number,
                error,
            };
        }
    }

    /// End the loop without another attempt (cancellation, or a fixer that
    /// only ever makes one try).
    pub fn stop(&mut self, error: FixError) {
        if self.is_finished() {
            return;
        }
        self.state = FixLoopState::Failed {
            attempts: self.attempts_made,
            error,
        };
    }
}
