use serde::{Deserialize, Serialize};

/// Running totals for one dispatch session. Accumulated across every
/// retry/rotation so a caller can report "what did this conversation
/// actually cost" independent of how many attempts it took.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct RequestStats {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
    pub cost: f64,
    pub requests: u64,
    /// Input tokens on the most recently completed request, kept separate
    /// from the running `input_tokens` total so callers can report context
    /// usage ("87k / 200k") without re-deriving it from the cumulative sum.
    pub last_input_tokens: u64,
}

impl RequestStats {
    pub fn record(&mut self, input_tokens: u64, output_tokens: u64, cached_tokens: u64, cost: f64) {
        self.input_tokens += input_tokens;
        self.output_tokens += output_tokens;
        self.cached_tokens += cached_tokens;
        self.cost += cost;
        self.requests += 1;
        self.last_input_tokens = input_tokens;
    }

    pub fn tokens_per_second(&self, elapsed_secs: f64) -> f64 {
        if elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.output_tokens as f64 / elapsed_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_accumulates_and_tracks_last_input() {
        let mut stats = RequestStats::default();
        stats.record(100, 20, 0, 0.01);
        stats.record(50, 10, 10, 0.005);
        assert_eq!(stats.input_tokens, 150);
        assert_eq!(stats.output_tokens, 30);
        assert_eq!(stats.cached_tokens, 10);
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.last_input_tokens, 50);
        assert!((stats.cost - 0.015).abs() < 1e-9);
    }

    #[test]
    fn tokens_per_second_guards_zero_elapsed() {
        let mut stats = RequestStats::default();
        stats.record(10, 100, 0, 0.0);
        assert_eq!(stats.tokens_per_second(0.0), 0.0);
        assert!(stats.tokens_per_second(10.0) > 0.0);
    }
}
