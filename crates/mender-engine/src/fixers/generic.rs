use super::OracleCall;
use crate::oracle::prompts::{
    fix_user_prompt, with_contract, GENERIC_AGGRESSIVE, GENERIC_LAST_RESORT, GENERIC_MINIMAL,
};
use crate::oracle::ModelTier;
use mender_core::{Issue, Strategy};

/// `minimal` on the cheapest tier, `aggressive` one tier up with more
/// randomness, `last_resort` on the strongest tier.
pub(super) fn call(issue: &Issue, content: &str, strategy: Strategy) -> OracleCall {
    let (tier, temperature, system) = match strategy {
        Strategy::Aggressive => (ModelTier::Balanced, 0.3, GENERIC_AGGRESSIVE),
        Strategy::LastResort => (ModelTier::Smart, 0.5, GENERIC_LAST_RESORT),
        _ => (ModelTier::Speed, 0.1, GENERIC_MINIMAL),
    };
    OracleCall {
        tier,
        temperature,
        system: with_contract(system),
        user: fix_user_prompt(issue, content, None),
        strict: false,
    }
}
