use serde::{Deserialize, Serialize};

/// One message in a conversation, OpenAI-chat-completions shaped — this is
/// the wire shape every provider adapter ultimately converts to or from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Message {
    pub role: Role,
    pub parts: Vec<MessagePart>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub tool_call_id: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessagePart {
    Text { text: String },
    Image { mime_type: String, data: String },
    ToolCall { id: String, name: String, arguments: serde_json::Value },
    ToolResult { tool_call_id: String, name: String, content: serde_json::Value },
}

impl Message {
    pub fn system(text: impl Into<String>) -> Self {
        Self { role: Role::System, parts: vec![MessagePart::Text { text: text.into() }], tool_call_id: None }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { role: Role::User, parts: vec![MessagePart::Text { text: text.into() }], tool_call_id: None }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self { role: Role::Assistant, parts: vec![MessagePart::Text { text: text.into() }], tool_call_id: None }
    }

    /// Concatenated text of all `Text` parts, ignoring images/tool parts.
    pub fn text(&self) -> String {
        self.parts
            .iter()
            .filter_map(|p| match p {
                MessagePart::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("")
    }

    pub fn has_images(&self) -> bool {
        self.parts.iter().any(|p| matches!(p, MessagePart::Image { .. }))
    }

    /// Replace image parts with a text placeholder, in place, for models
    /// that don't support vision input.
    pub fn strip_images(&mut self) {
        for part in &mut self.parts {
            if matches!(part, MessagePart::Image { .. }) {
                *part = MessagePart::Text {
                    text: "[Image removed - model doesn't support vision]".to_string(),
                };
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strip_images_replaces_in_place() {
        let mut msg = Message {
            role: Role::User,
            parts: vec![
                MessagePart::Text { text: "look:".into() },
                MessagePart::Image { mime_type: "image/png".into(), data: "abc".into() },
            ],
            tool_call_id: None,
        };
        assert!(msg.has_images());
        msg.strip_images();
        assert!(!msg.has_images());
        assert!(msg.text().contains("look:"));
    }
}
