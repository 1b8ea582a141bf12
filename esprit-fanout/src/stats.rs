use esprit_core::RequestStats;
use esprit_pricing::PricingDb;
use serde::Serialize;

/// The computed stats block attached to every delta/full-state payload,
/// combining the raw [`RequestStats`] counters with derived fields a UI
/// wants ready-made rather than recomputing client-side.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ComputedStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub uncached_input_tokens: u64,
    pub cache_hit_ratio: f64,
    pub cost: f64,
    pub requests: u64,
    pub tokens_per_second: f64,
    pub context_used: u64,
    pub context_limit: u64,
}

/// Derives [`ComputedStats`] from raw counters plus `model`'s catalog entry.
/// `elapsed_secs` should be the wall-clock time since the stats started
/// accumulating (a run's start, not the poll interval).
pub fn compute_stats(stats: &RequestStats, model: &str, elapsed_secs: f64, pricing: &PricingDb) -> ComputedStats {
    let uncached_input_tokens = stats.input_tokens.saturating_sub(stats.cached_tokens);
    let cache_hit_ratio = if stats.input_tokens == 0 {
        0.0
    } else {
        stats.cached_tokens as f64 / stats.input_tokens as f64
    };
    let context_limit = pricing.get_context_limit(model);

    ComputedStats {
        input_tokens: stats.input_tokens,
        output_tokens: stats.output_tokens,
        cached_tokens: stats.cached_tokens,
        uncached_input_tokens,
        cache_hit_ratio,
        cost: stats.cost,
        requests: stats.requests,
        tokens_per_second: stats.tokens_per_second(elapsed_secs),
        context_used: stats.last_input_tokens,
        context_limit,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_hit_ratio_is_zero_with_no_input_tokens() {
        let stats = RequestStats::default();
        let pricing = PricingDb::new();
        let computed = compute_stats(&stats, "anthropic/claude-sonnet-4-5", 1.0, &pricing);
        assert_eq!(computed.cache_hit_ratio, 0.0);
    }

    #[test]
    fn uncached_input_tokens_subtracts_cache_hits() {
        let mut stats = RequestStats::default();
        stats.record(1000, 100, 400, 0.02);
        let pricing = PricingDb::new();
        let computed = compute_stats(&stats, "anthropic/claude-sonnet-4-5", 2.0, &pricing);
        assert_eq!(computed.uncached_input_tokens, 600);
        assert!((computed.cache_hit_ratio - 0.4).abs() < 1e-9);
    }

    #[test]
    fn unknown_model_falls_back_to_default_context_limit() {
        let stats = RequestStats::default();
        let pricing = PricingDb::new();
        let computed = compute_stats(&stats, "totally-unknown-model", 1.0, &pricing);
        assert_eq!(computed.context_limit, 128_000);
    }
}
