use serde::{Deserialize, Serialize};
use std::fmt;

/// How a fix attempt was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// The linter's own fixer. Free, no oracle call.
    Autofix,
    Minimal,
    Aggressive,
    LastResort,
    /// A specialized fixer with its own single-shot prompt.
    Specialized,
}

impl Strategy {
    /// The generic escalation ladder, cheapest first.
    pub const LADDER: [Strategy; 3] = [Strategy::Minimal, Strategy::Aggressive, Strategy::LastResort];

    pub fn as_str(&self) -> &'static str {
        match self {
            Strategy::Autofix => "autofix",
            Strategy::Minimal => "minimal",
            Strategy::Aggressive => "aggressive",
            Strategy::LastResort => "last_resort",
            Strategy::Specialized => "specialized",
        }
    }

    pub fn ladder_index(&self) -> Option<usize> {
        Self::LADDER.iter().position(|s| s == self)
    }

    /// Rung for a zero-based ladder step; steps past the top stay on `last_resort`.
    pub fn for_ladder_step(step: usize) -> Strategy {
        Self::LADDER[step.min(Self::LADDER.len() - 1)]
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
