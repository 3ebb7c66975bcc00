//! Deterministic token counting and cost estimation.
//!
//! The count is the 4-characters-per-token rule of thumb. It is stable for
//! identical input, which is what accounting and cache keys require; it is
//! not a provider-exact tokenizer.

/// Approximate token count for a piece of text. Empty text counts 0.
pub fn count_tokens(text: &str) -> u64 {
    if text.is_empty() {
        return 0;
    }
    ((text.len() as u64) + 3) / 4
}

/// Estimated cost for a request: (total tokens / 1000) x per-1K rate,
/// rounded to 6 decimal places.
pub fn estimate_cost(total_tokens: u64, rate_per_1k: f64) -> f64 {
    let raw = (total_tokens as f64 / 1000.0) * rate_per_1k;
    (raw * 1_000_000.0).round() / 1_000_000.0
}
