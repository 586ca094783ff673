/// Turns prompt text into a token count. Swappable so an exact tokenizer can
/// replace the heuristic without touching the budget logic.
pub type TokenEstimator = fn(&str) -> u64;

/// `ceil(chars / 4)`
pub fn estimate_tokens(text: &str) -> u64 {
    (text.chars().count() as u64).div_ceil(4)
}
