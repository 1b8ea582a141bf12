use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A parsed tool invocation — either extracted from the provider's native
/// `tool_calls` field or recovered from the `<function=...>` text grammar.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ToolInvocation {
    pub name: String,
    pub params: HashMap<String, String>,
}

impl ToolInvocation {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), params: HashMap::new() }
    }

    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }
}

/// A reasoning/thinking block surfaced by models that expose one, kept
/// separate from ordinary text content so callers can choose to render or
/// discard it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ThinkingBlock {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub signature: Option<String>,
}

/// The fully assembled result of one dispatch call: the model's text,
/// any tool invocations parsed out of it, and any thinking blocks it
/// surfaced along the way.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct LlmResponse {
    pub content: String,
    #[serde(default)]
    pub tool_invocations: Vec<ToolInvocation>,
    #[serde(default)]
    pub thinking_blocks: Vec<ThinkingBlock>,
}

impl LlmResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self { content: content.into(), tool_invocations: Vec::new(), thinking_blocks: Vec::new() }
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_invocations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_invocation_builder_collects_params() {
        let inv = ToolInvocation::new("read_file").with_param("path", "/tmp/x");
        assert_eq!(inv.name, "read_file");
        assert_eq!(inv.params.get("path").map(String::as_str), Some("/tmp/x"));
    }

    #[test]
    fn default_response_has_no_tool_calls() {
        let resp = LlmResponse::text("hi");
        assert!(!resp.has_tool_calls());
    }
}
