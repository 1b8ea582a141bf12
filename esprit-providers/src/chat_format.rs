use esprit_core::{Message, MessagePart, Role};
use serde_json::{json, Value};

use crate::antigravity::format::ParsedUsage;

/// Converts the shared `Message` model to the OpenAI chat-completions wire
/// shape: `{role, content}`, with `content` a plain string when the message
/// is text-only or an array of typed parts when it carries images/tool
/// calls/tool results.
pub fn to_chat_messages(messages: &[Message]) -> Vec<Value> {
    messages.iter().map(message_to_json).collect()
}

fn message_to_json(message: &Message) -> Value {
    let role = match message.role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
        Role::Tool => "tool",
    };

    let mut obj = serde_json::Map::new();
    obj.insert("role".to_string(), json!(role));

    let is_plain_text = message.parts.len() == 1 && matches!(message.parts[0], MessagePart::Text { .. });
    if is_plain_text {
        obj.insert("content".to_string(), json!(message.text()));
    } else {
        let parts: Vec<Value> = message.parts.iter().map(part_to_json).collect();
        obj.insert("content".to_string(), json!(parts));
    }

    if let Some(id) = &message.tool_call_id {
        obj.insert("tool_call_id".to_string(), json!(id));
    }

    Value::Object(obj)
}

fn part_to_json(part: &MessagePart) -> Value {
    match part {
        MessagePart::Text { text } => json!({ "type": "text", "text": text }),
        MessagePart::Image { mime_type, data } => {
            json!({ "type": "image_url", "image_url": { "url": format!("data:{mime_type};base64,{data}") } })
        }
        MessagePart::ToolCall { id, name, arguments } => {
            json!({ "type": "tool_call", "id": id, "name": name, "arguments": arguments })
        }
        MessagePart::ToolResult { tool_call_id, name, content } => {
            json!({ "type": "tool_result", "tool_call_id": tool_call_id, "name": name, "content": content })
        }
    }
}

/// Wraps the system message's content in an Anthropic `cache_control:
/// {type: "ephemeral"}` block, turning the leading string content into the
/// array-of-parts shape Anthropic's prompt caching requires. No-op if the
/// first message isn't a system message, or its content is already an array.
pub fn apply_cache_control(mut messages: Vec<Value>) -> Vec<Value> {
    let Some(first) = messages.first_mut() else { return messages };
    let Some(obj) = first.as_object_mut() else { return messages };
    if obj.get("role").and_then(|r| r.as_str()) != Some("system") {
        return messages;
    }
    let Some(Value::String(text)) = obj.get("content").cloned() else { return messages };
    obj.insert(
        "content".to_string(),
        json!([{ "type": "text", "text": text, "cache_control": { "type": "ephemeral" } }]),
    );
    messages
}

/// Default chat-completions endpoint per provider, used when the caller
/// hasn't supplied an explicit `api_base`.
pub fn default_api_base(provider: &str) -> &'static str {
    match provider {
        "anthropic" => "https://api.anthropic.com/v1/messages",
        "openai" => "https://api.openai.com/v1/chat/completions",
        "github-copilot" => "https://api.githubcopilot.com/chat/completions",
        "openrouter" => "https://openrouter.ai/api/v1/chat/completions",
        "groq" => "https://api.groq.com/openai/v1/chat/completions",
        "deepseek" => "https://api.deepseek.com/chat/completions",
        _ => "https://api.openai.com/v1/chat/completions",
    }
}

/// Builds the headers a standard OpenAI-compatible chat-completions call
/// needs for `provider`, given a bearer token.
pub fn build_headers(provider: &str, token: &str) -> Vec<(String, String)> {
    let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];
    if provider == "anthropic" {
        headers.push(("x-api-key".to_string(), token.to_string()));
        headers.push(("anthropic-version".to_string(), "2023-06-01".to_string()));
    } else {
        headers.push(("Authorization".to_string(), format!("Bearer {token}")));
    }
    headers
}

/// Extracts `delta.content` from one chat-completions streaming chunk, if
/// present.
pub fn parse_delta_content(chunk: &Value) -> Option<String> {
    chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("content"))
        .and_then(|c| c.as_str())
        .map(|s| s.to_string())
}

/// Extracts a native `tool_calls` delta, when the provider reports one
/// instead of (or alongside) the `<function=...>` text grammar.
pub fn parse_delta_tool_calls(chunk: &Value) -> Vec<Value> {
    chunk
        .get("choices")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("delta"))
        .and_then(|d| d.get("tool_calls"))
        .and_then(|tc| tc.as_array())
        .cloned()
        .unwrap_or_default()
}

/// Pulls token usage off the trailing usage chunk
/// (`stream_options.include_usage=true`), mapping
/// `prompt_tokens_details.cached_tokens` into the shared [`ParsedUsage`]
/// shape used by every provider adapter. `input_tokens` is the full
/// `prompt_tokens` count — cached tokens are a subset of it, not additional
/// to it — so `get_cost`/`RequestStats`, which subtract `cached_tokens` from
/// `input_tokens` themselves (spec §4.1, §4.5), see each token counted once.
pub fn parse_usage_chunk(chunk: &Value) -> Option<ParsedUsage> {
    let usage = chunk.get("usage")?;
    let prompt = usage.get("prompt_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let completion = usage.get("completion_tokens").and_then(|v| v.as_u64()).unwrap_or(0);
    let cached = usage
        .get("prompt_tokens_details")
        .and_then(|d| d.get("cached_tokens"))
        .and_then(|v| v.as_u64())
        .unwrap_or(0);
    Some(ParsedUsage { input_tokens: prompt, output_tokens: completion, cached_tokens: cached })
}

/// `true` once the accumulated content ends with the closing tag of the
/// tool-invocation grammar, signaling the stream loop should start
/// tolerating a few more chunks for a trailing usage report before
/// stopping.
pub fn ends_with_function_close(accumulated: &str) -> bool {
    accumulated.trim_end().ends_with("</function>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_delta_content() {
        let chunk = json!({ "choices": [{ "delta": { "content": "hi" } }] });
        assert_eq!(parse_delta_content(&chunk).as_deref(), Some("hi"));
    }

    #[test]
    fn parses_usage_chunk_with_cached_as_a_subset_of_input() {
        let chunk = json!({ "usage": { "prompt_tokens": 1000, "completion_tokens": 200, "prompt_tokens_details": { "cached_tokens": 400 } } });
        let usage = parse_usage_chunk(&chunk).unwrap();
        assert_eq!(usage.input_tokens, 1000);
        assert_eq!(usage.cached_tokens, 400);
        assert_eq!(usage.output_tokens, 200);
    }

    #[test]
    fn detects_function_close_marker() {
        assert!(ends_with_function_close("...</function>"));
        assert!(!ends_with_function_close("...</function> trailing junk"));
    }

    #[test]
    fn anthropic_headers_use_x_api_key() {
        let headers = build_headers("anthropic", "tok");
        assert!(headers.iter().any(|(k, v)| k == "x-api-key" && v == "tok"));
    }

    #[test]
    fn plain_text_message_serializes_to_string_content() {
        let msg = Message::user("hello");
        let json = to_chat_messages(&[msg]);
        assert_eq!(json[0]["content"], "hello");
    }

    #[test]
    fn multi_part_message_serializes_to_array_content() {
        let msg = Message {
            role: Role::User,
            parts: vec![
                MessagePart::Text { text: "look:".into() },
                MessagePart::Image { mime_type: "image/png".into(), data: "abc".into() },
            ],
            tool_call_id: None,
        };
        let json = to_chat_messages(&[msg]);
        assert!(json[0]["content"].is_array());
    }

    #[test]
    fn cache_control_wraps_system_message() {
        let messages = to_chat_messages(&[Message::system("be helpful")]);
        let wrapped = apply_cache_control(messages);
        assert_eq!(wrapped[0]["content"][0]["cache_control"]["type"], "ephemeral");
    }

    #[test]
    fn cache_control_is_noop_for_non_system_first_message() {
        let messages = to_chat_messages(&[Message::user("hi")]);
        let wrapped = apply_cache_control(messages.clone());
        assert_eq!(wrapped, messages);
    }
}
