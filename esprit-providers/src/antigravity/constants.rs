/// Host suffix for the Cloud-Code backend. Overridable via `ESPRIT_CLOUDCODE_HOST`
/// for staging/test deployments.
pub const DEFAULT_HOST: &str = "googleapis.com";

/// Ordered Cloud-Code endpoints, tried in sequence until one responds with
/// something other than a 404. Anthropic-family inner models skip the
/// production endpoint (the last entry).
pub fn endpoints(host: &str) -> Vec<String> {
    vec![
        format!("https://daily-cloudcode-pa.sandbox.{host}"),
        format!("https://autopush-cloudcode-pa.sandbox.{host}"),
        format!("https://cloudcode-pa.{host}"),
    ]
}

pub const STREAM_PATH: &str = "/v1internal:streamGenerateContent?alt=sse";
pub const DISCOVERY_PATH: &str = "/v1internal:loadCodeAssist";

/// Models Antigravity is known to serve, ordered by capability within each
/// family. Used both for validation and as the default fallback chain.
pub const ANTIGRAVITY_MODELS: &[&str] = &[
    "gemini-3-pro-high",
    "gemini-3-pro-low",
    "gemini-2.5-pro",
    "gemini-2.5-flash",
    "claude-opus-4-1",
    "claude-sonnet-4-5",
];

/// Capability-ordered fallback chains, keyed by the model family's first
/// (highest-capability) member. A persistently-failing model tries the
/// next entry in its chain before giving up.
pub fn fallback_chain(model: &str) -> &'static [&'static str] {
    if model.starts_with("gemini-3-pro") {
        &["gemini-3-pro-high", "gemini-3-pro-low"]
    } else if model.starts_with("gemini") {
        &["gemini-2.5-pro", "gemini-2.5-flash"]
    } else if model.starts_with("claude") {
        &["claude-opus-4-1", "claude-sonnet-4-5"]
    } else {
        &[]
    }
}

/// Returns the fallback models that come after `current` in its chain, in
/// order, excluding any already attempted this turn.
pub fn get_fallback_models(current: &str, already_tried: &[String]) -> Vec<String> {
    let chain = fallback_chain(current);
    let start = chain.iter().position(|m| *m == current).map(|i| i + 1).unwrap_or(0);
    chain[start..]
        .iter()
        .map(|s| s.to_string())
        .filter(|m| !already_tried.contains(m))
        .collect()
}
