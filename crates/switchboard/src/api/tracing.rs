//! Request correlation ids and cumulative cost tracking.
//!
//! Each orchestrated request gets a unique id used as its log span field and
//! as the key of its stream deadline timer. Completed requests are priced
//! against the model catalog and accumulated in a [`CostTracker`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use crate::catalog::Model;

/// Generate a unique id for one orchestrated request.
pub fn generate_request_id() -> String {
    let ts = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    // Counter disambiguates calls within the same clock tick.
    static COUNTER: AtomicU64 = AtomicU64::new(0);
    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("req-{ts:x}-{count:04x}")
}

/// Cumulative token usage and estimated spend.
#[derive(Debug, Default, Clone)]
pub struct CostTracker {
    pub requests: u64,
    pub total_prompt_tokens: u64,
    pub total_completion_tokens: u64,
    pub estimated_cost_usd: f64,
}

impl CostTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one request and return its estimated cost.
    pub fn record(&mut self, model: &Model, prompt_tokens: u32, completion_tokens: u32) -> f64 {
        let cost = model.estimate_cost(prompt_tokens, completion_tokens);
        self.requests += 1;
        self.total_prompt_tokens += u64::from(prompt_tokens);
        self.total_completion_tokens += u64::from(completion_tokens);
        self.estimated_cost_usd += cost;
        cost
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_prompt_tokens + self.total_completion_tokens
    }

    pub fn summary(&self) -> String {
        format!(
            "{} request(s), tokens: {} prompt + {} completion = {} total, est. cost: ${:.4}",
            self.requests,
            self.total_prompt_tokens,
            self.total_completion_tokens,
            self.total_tokens(),
            self.estimated_cost_usd,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ModelRegistry;

    #[test]
    fn request_ids_unique() {
        let a = generate_request_id();
        let b = generate_request_id();
        assert_ne!(a, b);
        assert!(a.starts_with("req-"));
    }

    #[test]
    fn tracker_accumulates_against_catalog_prices() {
        let gpt4 = ModelRegistry::builtin().get_model_by_id("gpt-4").unwrap();
        let mut tracker = CostTracker::new();
        let first = tracker.record(gpt4, 1000, 500);
        tracker.record(gpt4, 2000, 1000);
        assert!((first - 0.045).abs() < 1e-9);
        assert_eq!(tracker.requests, 2);
        assert_eq!(tracker.total_tokens(), 4500);
        assert!((tracker.estimated_cost_usd - 0.135).abs() < 1e-9);
    }

    #[test]
    fn summary_format() {
        let tracker = CostTracker::new();
        let summary = tracker.summary();
        assert!(summary.contains("tokens:"));
        assert!(summary.contains("cost: $0.0000"));
    }
}
