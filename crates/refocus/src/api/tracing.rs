//! Run correlation ids and cost estimates.
//!
//! Sibling runs in a pool log into the same stream; the `trace_id` of a run
//! and the `span_id` of each step keep their lines apart.

use super::TokenUsage;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

/// A fresh `tr-<hex micros>-<seq>` id. The sequence number keeps ids unique
/// when two runs start within the same microsecond.
pub fn generate_trace_id() -> String {
    let micros = chrono::Utc::now().timestamp_micros().max(0);
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    format!("tr-{micros:x}-{seq:04x}")
}

/// Id of step `step` within `trace_id`.
pub fn generate_span_id(trace_id: &str, step: usize) -> String {
    format!("{trace_id}:s{step}")
}

/// List prices in USD per million tokens, `(name fragment, input, output)`.
/// First match wins, so more specific fragments come first.
const PRICES: &[(&str, f64, f64)] = &[
    ("haiku", 1.0, 5.0),
    ("sonnet", 3.0, 15.0),
    ("opus", 15.0, 75.0),
    ("gpt-4o-mini", 0.15, 0.6),
    ("gpt-4o", 2.5, 10.0),
    ("gemini-2.5-flash", 0.3, 2.5),
    ("gemini", 1.25, 10.0),
    ("deepseek", 0.27, 1.1),
];

/// Used for models missing from the table.
const FALLBACK_PRICE: (f64, f64) = (3.0, 15.0);

/// Estimated cost of `usage` on `model`.
///
/// Only the name after the provider prefix is matched, so
/// `"acme/opus-distill"` prices as opus but `"opus-labs/tiny"` does not.
/// Good enough to compare strategies, not for billing.
pub fn cost_usd(model: &str, usage: TokenUsage) -> f64 {
    let name = model.rsplit('/').next().unwrap_or(model).to_ascii_lowercase();
    let (input, output) = PRICES
        .iter()
        .find(|(fragment, ..)| name.contains(fragment))
        .map_or(FALLBACK_PRICE, |&(_, input, output)| (input, output));
    (usage.input_tokens as f64 * input + usage.output_tokens as f64 * output) / 1_000_000.0
}
