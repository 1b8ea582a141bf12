/// Per-dispatch configuration: the model to target and the knobs that
/// shape the outgoing request. `model_name` is mutable across the
/// dispatcher's lifetime since a Mode B model fallback updates it sticky
/// for subsequent turns.
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    pub model_name: String,
    pub api_base: Option<String>,
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub thinking_budget: Option<u32>,
    pub supports_vision: bool,
    pub quick_scan: bool,
    pub max_retries: u32,
    pub stream_timeout_secs: u64,
}

impl DispatchConfig {
    pub fn new(model_name: impl Into<String>) -> Self {
        Self {
            model_name: model_name.into(),
            api_base: None,
            max_output_tokens: None,
            temperature: None,
            top_p: None,
            thinking_budget: None,
            supports_vision: true,
            quick_scan: false,
            max_retries: 5,
            stream_timeout_secs: 120,
        }
    }

    /// Resolves the reasoning-effort level per the precedence:
    /// `ESPRIT_REASONING_EFFORT` env var > `"medium"` in quick-scan mode >
    /// default `"high"`.
    pub fn reasoning_effort(&self) -> String {
        if let Ok(value) = std::env::var("ESPRIT_REASONING_EFFORT") {
            if !value.is_empty() {
                return value;
            }
        }
        if self.quick_scan {
            "medium".to_string()
        } else {
            "high".to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quick_scan_defaults_to_medium_effort() {
        std::env::remove_var("ESPRIT_REASONING_EFFORT");
        let mut config = DispatchConfig::new("gpt-5");
        config.quick_scan = true;
        assert_eq!(config.reasoning_effort(), "medium");
    }

    #[test]
    fn default_effort_is_high() {
        std::env::remove_var("ESPRIT_REASONING_EFFORT");
        let config = DispatchConfig::new("gpt-5");
        assert_eq!(config.reasoning_effort(), "high");
    }
}
