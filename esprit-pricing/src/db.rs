use crate::entry::ModelPricing;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const BUNDLED_PRICING_JSON: &str = include_str!("bundled_pricing.json");
const REMOTE_PRICING_URL: &str =
    "https://raw.githubusercontent.com/BerriAI/litellm/main/model_prices_and_context_window.json";
const DEFAULT_CONTEXT_LIMIT: u64 = 128_000;

/// Providers tried, in order, when a bare model name needs a prefix before
/// it can be looked up.
const PROVIDER_PREFIXES: &[&str] = &["anthropic", "google", "openai", "bedrock", "azure", "vertex_ai"];

/// Known aliases from a friendly/legacy name to the canonical catalog key.
/// Resolution follows the alias chain with a cycle guard, since an alias
/// can itself point at another alias.
fn model_aliases() -> &'static HashMap<&'static str, &'static str> {
    static ALIASES: std::sync::OnceLock<HashMap<&'static str, &'static str>> = std::sync::OnceLock::new();
    ALIASES.get_or_init(|| {
        HashMap::from([
            ("claude-opus-4", "anthropic/claude-opus-4-1"),
            ("claude-sonnet-4", "anthropic/claude-sonnet-4-5"),
            ("claude-haiku", "anthropic/claude-3-5-haiku-20241022"),
            ("gemini-pro", "google/gemini-2.5-pro"),
            ("gemini-flash", "google/gemini-2.5-flash"),
            ("gpt5", "openai/gpt-5"),
        ])
    })
}

/// The model pricing catalog. Seeded from a bundled snapshot at
/// construction and refreshed in the background from the upstream LiteLLM
/// pricing table — callers never block on the network for a price lookup.
pub struct PricingDb {
    entries: Arc<RwLock<HashMap<String, ModelPricing>>>,
}

impl PricingDb {
    pub fn new() -> Self {
        let bundled: HashMap<String, ModelPricing> =
            serde_json::from_str(BUNDLED_PRICING_JSON).expect("bundled pricing table is valid JSON");
        Self { entries: Arc::new(RwLock::new(bundled)) }
    }

    /// Kicks off a best-effort background refresh. Entries that fail to
    /// parse, or lack `input_cost_per_token`, are dropped rather than
    /// failing the whole refresh — the remote table carries providers we
    /// don't care about and the occasional malformed row.
    pub fn spawn_remote_refresh(self: &Arc<Self>) {
        let entries = self.entries.clone();
        tokio::spawn(async move {
            let client = match reqwest::Client::builder().timeout(Duration::from_secs(10)).build() {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(error = %e, "pricing refresh client build failed");
                    return;
                }
            };
            let resp = match client.get(REMOTE_PRICING_URL).send().await {
                Ok(r) => r,
                Err(e) => {
                    tracing::debug!(error = %e, "pricing refresh request failed");
                    return;
                }
            };
            let body: HashMap<String, serde_json::Value> = match resp.json().await {
                Ok(b) => b,
                Err(e) => {
                    tracing::debug!(error = %e, "pricing refresh body parse failed");
                    return;
                }
            };
            let mut fresh = HashMap::new();
            for (key, value) in body {
                if value.get("input_cost_per_token").is_none() {
                    continue;
                }
                if let Ok(pricing) = serde_json::from_value::<ModelPricing>(value) {
                    fresh.insert(key, pricing);
                }
            }
            if fresh.is_empty() {
                return;
            }
            let mut guard = entries.write();
            guard.extend(fresh);
            tracing::debug!(count = guard.len(), "pricing table refreshed from remote");
        });
    }

    /// Resolves a model name to its pricing entry, trying (in order):
    /// direct match, the bare name with a provider prefix stripped/applied,
    /// the alias table, and finally a fuzzy longest-prefix match on a
    /// `-`/`.`/`:`/digit boundary.
    pub fn get_pricing(&self, model: &str) -> Option<ModelPricing> {
        let entries = self.entries.read();
        if let Some(p) = entries.get(model) {
            return Some(p.clone());
        }

        let bare = model.split_once('/').map(|(_, b)| b).unwrap_or(model);
        if let Some(p) = entries.get(bare) {
            return Some(p.clone());
        }
        for prefix in PROVIDER_PREFIXES {
            let candidate = format!("{prefix}/{bare}");
            if let Some(p) = entries.get(&candidate) {
                return Some(p.clone());
            }
        }

        let mut seen_aliases = std::collections::HashSet::new();
        let mut current = bare;
        while let Some(target) = model_aliases().get(current) {
            if !seen_aliases.insert(*target) {
                break;
            }
            if let Some(p) = entries.get(*target) {
                return Some(p.clone());
            }
            current = target;
        }

        self.fuzzy_match(&entries, bare)
    }

    fn fuzzy_match(&self, entries: &HashMap<String, ModelPricing>, bare: &str) -> Option<ModelPricing> {
        let is_boundary = |c: char| matches!(c, '-' | '.' | ':') || c.is_ascii_digit();
        let mut best: Option<(usize, &ModelPricing)> = None;
        for (key, pricing) in entries.iter() {
            let key_bare = key.split_once('/').map(|(_, b)| b).unwrap_or(key.as_str());
            if !bare.starts_with(key_bare) || key_bare.is_empty() {
                continue;
            }
            let next_char = bare[key_bare.len()..].chars().next();
            let at_boundary = next_char.is_none() || next_char.map(is_boundary).unwrap_or(false);
            if !at_boundary {
                continue;
            }
            if best.map(|(len, _)| key_bare.len() > len).unwrap_or(true) {
                best = Some((key_bare.len(), pricing));
            }
        }
        best.map(|(_, p)| p.clone())
    }

    pub fn get_cost(&self, model: &str, input_tokens: u64, output_tokens: u64, cached_tokens: u64) -> Option<f64> {
        self.get_pricing(model).map(|p| p.calculate_cost(input_tokens, output_tokens, cached_tokens))
    }

    pub fn get_context_limit(&self, model: &str) -> u64 {
        self.get_pricing(model)
            .and_then(|p| p.max_input_tokens.or(p.max_tokens))
            .unwrap_or(DEFAULT_CONTEXT_LIMIT)
    }
}

impl Default for PricingDb {
    fn default() -> Self {
        Self::new()
    }
}
