/// A model identifier of the form `<provider>/<bare>`, or a bare name with
/// the provider left to be inferred by the caller.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelId {
    pub provider: Option<String>,
    pub bare: String,
}

impl ModelId {
    pub fn parse(raw: &str) -> Self {
        match raw.split_once('/') {
            Some((provider, bare)) => {
                Self { provider: Some(provider.to_string()), bare: bare.to_string() }
            }
            None => Self { provider: None, bare: raw.to_string() },
        }
    }

    pub fn full(&self) -> String {
        match &self.provider {
            Some(p) => format!("{p}/{}", self.bare),
            None => self.bare.clone(),
        }
    }

    /// Heuristic provider inference from the bare model name, used when no
    /// explicit prefix is present. Mirrors the precedence used throughout
    /// Esprit's provider detection: Claude family, then Gemini family, then
    /// the GPT/Codex family.
    pub fn infer_provider(&self) -> Option<&'static str> {
        if self.provider.is_some() {
            return None;
        }
        let lower = self.bare.to_lowercase();
        if lower.contains("claude") {
            Some("anthropic")
        } else if lower.contains("gemini") {
            Some("google")
        } else if lower.contains("gpt") || lower.contains("o1") || lower.contains("o3") || lower.contains("codex") {
            Some("openai")
        } else {
            None
        }
    }
}

impl std::fmt::Display for ModelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_prefixed_model() {
        let m = ModelId::parse("anthropic/claude-sonnet-4-5");
        assert_eq!(m.provider.as_deref(), Some("anthropic"));
        assert_eq!(m.bare, "claude-sonnet-4-5");
    }

    #[test]
    fn parses_bare_model() {
        let m = ModelId::parse("gpt-5");
        assert_eq!(m.provider, None);
        assert_eq!(m.bare, "gpt-5");
        assert_eq!(m.infer_provider(), Some("openai"));
    }

    #[test]
    fn infer_is_noop_when_prefixed() {
        let m = ModelId::parse("google/gemini-3-pro");
        assert_eq!(m.infer_provider(), None);
    }

    #[test]
    fn full_roundtrip() {
        assert_eq!(ModelId::parse("openai/gpt-5").full(), "openai/gpt-5");
        assert_eq!(ModelId::parse("gpt-5").full(), "gpt-5");
    }
}
