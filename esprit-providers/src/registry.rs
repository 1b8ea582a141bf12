/// Providers whose models are never routed through the Cloud-Code/Antigravity
/// envelope, even when the underlying model family (Claude, Gemini) overlaps
/// with what Antigravity also serves.
const NON_ANTIGRAVITY_PREFIXES: &[&str] = &[
    "anthropic",
    "google",
    "openai",
    "bedrock",
    "github-copilot",
    "gemini",
    "azure",
    "vertex_ai",
];

/// Known provider names tried, in order, as the last-resort fallback when a
/// bare model name doesn't match any family heuristic.
const FALLBACK_CANDIDATE_PROVIDERS: &[&str] =
    &["anthropic", "openai", "google", "github-copilot", "openrouter", "groq", "deepseek"];

/// Resolves a model identifier (`provider/model` or bare) to the provider
/// name that should handle it, inferring from the bare model family when no
/// explicit prefix is present.
pub fn detect_provider(model: &str) -> String {
    detect_provider_with_fallback(model, |_| false)
}

/// Same resolution as [`detect_provider`], but when neither an explicit
/// prefix nor a name heuristic resolves the provider, falls back to
/// whichever known provider `has_credentials` reports as configured (spec
/// §3: "...with a fallback to checking which provider currently has stored
/// credentials"). `has_credentials` is checked in a fixed provider order, not
/// sorted by anything meaningful beyond stability.
///
/// A bare name matching a known Antigravity model (e.g. `gemini-3-pro-high`)
/// is claimed for `antigravity` ahead of the claude/gemini/gpt substring
/// heuristics below, but only when an Antigravity account is actually
/// configured — otherwise a directly-supported provider should still serve
/// it (spec §4.3: "known Antigravity bare model name, if that provider has
/// stored accounts").
pub fn detect_provider_with_fallback(model: &str, has_credentials: impl Fn(&str) -> bool) -> String {
    if let Some((prefix, _)) = model.split_once('/') {
        return prefix.to_string();
    }
    if crate::antigravity::ANTIGRAVITY_MODELS.contains(&model) && has_credentials("antigravity") {
        return "antigravity".to_string();
    }
    if let Some(provider) = esprit_core::ModelId::parse(model).infer_provider() {
        return provider.to_string();
    }
    FALLBACK_CANDIDATE_PROVIDERS
        .iter()
        .find(|p| has_credentials(p))
        .map(|p| p.to_string())
        .unwrap_or_else(|| "openai".to_string())
}

/// An Antigravity (Cloud-Code) request is only used when the resolved
/// provider isn't one of the directly-supported API providers and an
/// Antigravity account is actually configured for it.
pub fn is_antigravity(provider: &str, has_antigravity_account: bool) -> bool {
    has_antigravity_account && !NON_ANTIGRAVITY_PREFIXES.contains(&provider)
}

/// Anthropic's prompt-caching `cache_control` blocks only apply to
/// Anthropic-shaped requests, whether direct or by inference from the model
/// name.
pub fn is_anthropic(provider: &str, model: &str) -> bool {
    provider == "anthropic" || model.to_lowercase().contains("claude")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_prefix_wins() {
        assert_eq!(detect_provider("anthropic/claude-sonnet-4-5"), "anthropic");
    }

    #[test]
    fn bare_model_infers_family() {
        assert_eq!(detect_provider("gemini-2.5-pro"), "google");
        assert_eq!(detect_provider("gpt-5"), "openai");
    }

    #[test]
    fn antigravity_excluded_for_direct_providers() {
        assert!(!is_antigravity("anthropic", true));
        assert!(is_antigravity("some-custom-provider", true));
        assert!(!is_antigravity("some-custom-provider", false));
    }

    #[test]
    fn anthropic_detected_by_model_name_too() {
        assert!(is_anthropic("openrouter", "anthropic/claude-3-5-sonnet"));
        assert!(!is_anthropic("openai", "gpt-5"));
    }

    #[test]
    fn unresolvable_bare_name_falls_back_to_whichever_provider_has_credentials() {
        let resolved = detect_provider_with_fallback("mystery-model-9000", |p| p == "groq");
        assert_eq!(resolved, "groq");
    }

    #[test]
    fn unresolvable_bare_name_with_no_credentials_anywhere_defaults_to_openai() {
        let resolved = detect_provider_with_fallback("mystery-model-9000", |_| false);
        assert_eq!(resolved, "openai");
    }

    #[test]
    fn fallback_never_overrides_an_explicit_prefix_or_heuristic() {
        assert_eq!(detect_provider_with_fallback("anthropic/claude-sonnet-4-5", |_| true), "anthropic");
        assert_eq!(detect_provider_with_fallback("gpt-5", |p| p == "anthropic"), "openai");
    }

    #[test]
    fn known_antigravity_bare_name_wins_over_substring_heuristic_when_configured() {
        assert_eq!(detect_provider_with_fallback("gemini-3-pro-high", |p| p == "antigravity"), "antigravity");
        assert_eq!(detect_provider_with_fallback("claude-opus-4-1", |p| p == "antigravity"), "antigravity");
    }

    #[test]
    fn known_antigravity_bare_name_falls_through_without_a_configured_account() {
        assert_eq!(detect_provider_with_fallback("gemini-3-pro-high", |_| false), "google");
        assert_eq!(detect_provider_with_fallback("claude-opus-4-1", |_| false), "anthropic");
    }
}
