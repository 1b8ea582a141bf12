use serde::{Deserialize, Serialize};

/// One model's pricing record, as published in the LiteLLM pricing table.
/// Fields line up with that table's JSON keys so the bundled baseline and
/// anything fetched remotely parse into the same shape.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelPricing {
    #[serde(default)]
    pub litellm_provider: Option<String>,
    pub input_cost_per_token: f64,
    pub output_cost_per_token: f64,
    #[serde(default)]
    pub cache_read_input_token_cost: Option<f64>,
    /// Tiered pricing kicks in once the prompt crosses the threshold.
    #[serde(default)]
    pub input_cost_per_token_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub output_cost_per_token_above_200k_tokens: Option<f64>,
    #[serde(default)]
    pub max_input_tokens: Option<u64>,
    #[serde(default)]
    pub max_tokens: Option<u64>,
}

/// Tokens crossing the 200k threshold. Mirrors LiteLLM's own published
/// tiering for long-context models (Gemini 2.5 Pro and similar) — above the
/// threshold both input and output per-token costs step up.
pub const TIERED_THRESHOLD: u64 = 200_000;

impl ModelPricing {
    /// Cost of one request given token counts, applying tiered pricing and
    /// treating cached tokens as a cost-reduced subset of input tokens.
    pub fn calculate_cost(&self, input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> f64 {
        let billable_input = input_tokens.saturating_sub(cached_tokens);
        let input_cost =
            Self::tiered_cost(billable_input, self.input_cost_per_token, self.input_cost_per_token_above_200k_tokens);
        let output_cost =
            Self::tiered_cost(output_tokens, self.output_cost_per_token, self.output_cost_per_token_above_200k_tokens);
        let cache_cost = cached_tokens as f64
            * self.cache_read_input_token_cost.unwrap_or(self.input_cost_per_token);
        input_cost + output_cost + cache_cost
    }

    /// Bracket-style tiering (spec §4.1): the first `TIERED_THRESHOLD`
    /// tokens are billed at `base_rate`, and only the remainder at
    /// `tiered_rate`. Tiering is skipped entirely — even below the
    /// threshold it would be a no-op, but also above it — when the
    /// provider has no "above" rate or it's zero.
    fn tiered_cost(billed_tokens: u64, base_rate: f64, tiered_rate: Option<f64>) -> f64 {
        match tiered_rate {
            Some(rate) if rate > 0.0 && billed_tokens > TIERED_THRESHOLD => {
                let base_portion = TIERED_THRESHOLD as f64 * base_rate;
                let above_portion = (billed_tokens - TIERED_THRESHOLD) as f64 * rate;
                base_portion + above_portion
            }
            _ => billed_tokens as f64 * base_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_pricing() -> ModelPricing {
        ModelPricing {
            litellm_provider: Some("openai".into()),
            input_cost_per_token: 0.000_001,
            output_cost_per_token: 0.000_002,
            cache_read_input_token_cost: Some(0.000_000_5),
            input_cost_per_token_above_200k_tokens: None,
            output_cost_per_token_above_200k_tokens: None,
            max_input_tokens: Some(128_000),
            max_tokens: None,
        }
    }

    #[test]
    fn cached_tokens_are_billed_at_the_cache_rate() {
        let pricing = flat_pricing();
        let cost = pricing.calculate_cost(1_000, 500, 400);
        let expected = 600.0 * 0.000_001 + 500.0 * 0.000_002 + 400.0 * 0.000_000_5;
        assert!((cost - expected).abs() < 1e-12);
    }

    #[test]
    fn tiered_rate_only_bills_the_remainder_above_threshold() {
        let mut pricing = flat_pricing();
        pricing.input_cost_per_token_above_200k_tokens = Some(0.000_002);
        pricing.output_cost_per_token_above_200k_tokens = Some(0.000_004);

        // Below the threshold, the "above" rate never kicks in.
        let under = pricing.calculate_cost(100_000, 100, 0);
        assert!((under - (100_000.0 * 0.000_001 + 100.0 * 0.000_002)).abs() < 1e-9);

        // Above it, only the remainder past 200k is billed at the tiered rate.
        let over = pricing.calculate_cost(250_000, 100, 0);
        let expected_input = TIERED_THRESHOLD as f64 * 0.000_001 + 50_000.0 * 0.000_002;
        let expected_output = 100.0 * 0.000_002; // output_tokens (100) never crosses its own threshold
        assert!((over - (expected_input + expected_output)).abs() < 1e-9);
    }

    #[test]
    fn zero_above_rate_skips_tiering_entirely() {
        let mut pricing = flat_pricing();
        pricing.input_cost_per_token_above_200k_tokens = Some(0.0);
        let cost = pricing.calculate_cost(250_000, 0, 0);
        assert!((cost - 250_000.0 * 0.000_001).abs() < 1e-9);
    }
}
