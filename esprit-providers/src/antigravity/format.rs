use esprit_core::{Message, MessagePart, Role};
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};

/// Keywords the Cloud-Code schema validator rejects outright; stripped
/// before a tool's JSON Schema is sent.
const UNSUPPORTED_KEYWORDS: &[&str] =
    &["additionalProperties", "default", "$ref", "format", "minLength", "pattern", "anyOf", "oneOf"];

/// Converts a standard JSON Schema `type` value to the uppercase primitive
/// name the Cloud-Code envelope expects.
fn sanitize_type(t: &str) -> &'static str {
    match t {
        "string" => "STRING",
        "number" => "NUMBER",
        "integer" => "INTEGER",
        "boolean" => "BOOLEAN",
        "array" => "ARRAY",
        "object" => "OBJECT",
        _ => "STRING",
    }
}

/// Recursively sanitizes a JSON Schema fragment into the shape Cloud-Code's
/// tool declarations accept: uppercase primitive types, `anyOf`/`oneOf`
/// resolved to their first non-null member, unsupported keywords dropped,
/// and `required` filtered down to fields that survive in `properties`.
pub fn sanitize_schema(schema: &Value) -> Value {
    let Some(obj) = schema.as_object() else {
        return json!({ "type": "STRING" });
    };

    if let Some(variants) = obj.get("anyOf").or_else(|| obj.get("oneOf")).and_then(|v| v.as_array()) {
        let chosen = variants
            .iter()
            .find(|v| v.get("type").and_then(|t| t.as_str()) != Some("null"))
            .or_else(|| variants.first());
        if let Some(chosen) = chosen {
            return sanitize_schema(chosen);
        }
    }

    let mut out = Map::new();

    let properties = obj.get("properties").and_then(|p| p.as_object());
    let inferred_type = match obj.get("type").and_then(|t| t.as_str()) {
        Some(t) => sanitize_type(t),
        None if properties.is_some() => "OBJECT",
        None => "STRING",
    };
    out.insert("type".to_string(), json!(inferred_type));

    if let Some(desc) = obj.get("description") {
        out.insert("description".to_string(), desc.clone());
    }

    if let Some(props) = properties {
        let mut sanitized_props = Map::new();
        for (key, value) in props {
            sanitized_props.insert(key.clone(), sanitize_schema(value));
        }
        if let Some(required) = obj.get("required").and_then(|r| r.as_array()) {
            let filtered: Vec<Value> = required
                .iter()
                .filter(|r| r.as_str().map(|s| sanitized_props.contains_key(s)).unwrap_or(false))
                .cloned()
                .collect();
            if !filtered.is_empty() {
                out.insert("required".to_string(), json!(filtered));
            }
        }
        out.insert("properties".to_string(), Value::Object(sanitized_props));
    }

    if let Some(items) = obj.get("items") {
        out.insert("items".to_string(), sanitize_schema(items));
    }

    if let Some(values) = obj.get("enum") {
        out.insert("enum".to_string(), values.clone());
    }

    let _ = UNSUPPORTED_KEYWORDS; // documents the keywords we deliberately never copy over
    Value::Object(out)
}

/// One Cloud-Code tool declaration, sanitized from a `{name, description,
/// parameters}` tool spec.
pub fn convert_tools(tools: &[Value]) -> Option<Value> {
    if tools.is_empty() {
        return None;
    }
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            json!({
                "name": tool.get("name").cloned().unwrap_or(Value::Null),
                "description": tool.get("description").cloned().unwrap_or(Value::Null),
                "parameters": tool.get("parameters").map(sanitize_schema).unwrap_or(json!({"type": "OBJECT"})),
            })
        })
        .collect();
    Some(json!([{ "functionDeclarations": declarations }]))
}

fn part_to_cloudcode(part: &MessagePart) -> Value {
    match part {
        MessagePart::Text { text } => json!({ "text": text }),
        MessagePart::Image { mime_type, data } => json!({ "inlineData": { "mimeType": mime_type, "data": data } }),
        MessagePart::ToolCall { id, name, arguments } => {
            json!({ "functionCall": { "name": name, "args": arguments, "id": id } })
        }
        MessagePart::ToolResult { tool_call_id, name, content } => {
            json!({ "functionResponse": { "name": name, "response": content, "id": tool_call_id } })
        }
    }
}

/// Splits messages into the Cloud-Code envelope's `systemInstruction` and
/// `contents` list, mapping `assistant` to Gemini's `"model"` role.
pub fn convert_messages(messages: &[Message]) -> (Option<Value>, Vec<Value>) {
    let mut system_parts = Vec::new();
    let mut contents = Vec::new();

    for message in messages {
        match message.role {
            Role::System => {
                system_parts.push(json!({ "text": message.text() }));
            }
            Role::User | Role::Tool => {
                let parts: Vec<Value> = message.parts.iter().map(part_to_cloudcode).collect();
                contents.push(json!({ "role": "user", "parts": parts }));
            }
            Role::Assistant => {
                let parts: Vec<Value> = message.parts.iter().map(part_to_cloudcode).collect();
                contents.push(json!({ "role": "model", "parts": parts }));
            }
        }
    }

    let system_instruction =
        if system_parts.is_empty() { None } else { Some(json!({ "role": "user", "parts": system_parts })) };
    (system_instruction, contents)
}

/// First 32 hex characters of the SHA-256 digest of `text`, used as a
/// stable per-conversation `sessionId`.
pub fn session_id(first_user_text: &str) -> String {
    let digest = Sha256::digest(first_user_text.as_bytes());
    let hex = format!("{digest:x}");
    hex[..32].to_string()
}

pub struct CloudCodeRequestArgs<'a> {
    pub project: &'a str,
    pub model: &'a str,
    pub messages: &'a [Message],
    pub tools: &'a [Value],
    pub max_output_tokens: Option<u32>,
    pub temperature: Option<f32>,
    pub top_p: Option<f32>,
    pub is_anthropic_inner: bool,
    pub thinking_budget: Option<u32>,
}

/// Builds the full Cloud-Code request envelope: `{project, model, request,
/// requestType, userAgent, requestId}`.
pub fn build_cloudcode_request(args: &CloudCodeRequestArgs) -> Value {
    let (system_instruction, contents) = convert_messages(args.messages);
    let first_user_text =
        args.messages.iter().find(|m| m.role == Role::User).map(|m| m.text()).unwrap_or_default();

    let mut generation_config = Map::new();
    if let Some(v) = args.max_output_tokens {
        generation_config.insert("maxOutputTokens".to_string(), json!(v));
    }
    if let Some(v) = args.temperature {
        generation_config.insert("temperature".to_string(), json!(v));
    }
    if let Some(v) = args.top_p {
        generation_config.insert("topP".to_string(), json!(v));
    }
    if let Some(budget) = args.thinking_budget {
        let thinking_config = if args.is_anthropic_inner {
            json!({ "thinking_budget": budget })
        } else {
            json!({ "thinkingBudget": budget })
        };
        generation_config.insert("thinkingConfig".to_string(), thinking_config);
    }

    let mut request = Map::new();
    request.insert("contents".to_string(), json!(contents));
    if let Some(si) = system_instruction {
        request.insert("systemInstruction".to_string(), si);
    }
    if !generation_config.is_empty() {
        request.insert("generationConfig".to_string(), Value::Object(generation_config));
    }
    if let Some(tools) = convert_tools(args.tools) {
        request.insert("tools".to_string(), tools);
    }
    if args.is_anthropic_inner {
        request.insert(
            "toolConfig".to_string(),
            json!({ "functionCallingConfig": { "mode": "VALIDATED" } }),
        );
    }
    request.insert("sessionId".to_string(), json!(session_id(&first_user_text)));

    json!({
        "project": args.project,
        "model": args.model,
        "request": Value::Object(request),
        "requestType": "AGENT",
        "userAgent": "esprit-cli",
        "requestId": uuid_like(&first_user_text, args.model),
    })
}

fn uuid_like(seed_a: &str, seed_b: &str) -> String {
    let digest = Sha256::digest(format!("{seed_a}:{seed_b}").as_bytes());
    format!("{digest:x}")[..36].to_string()
}

/// Headers sent with every Cloud-Code request. The interleaved-thinking
/// beta header is only meaningful for Claude inner models but is harmless
/// to include otherwise.
pub fn build_request_headers(access_token: &str) -> Vec<(String, String)> {
    vec![
        ("Authorization".to_string(), format!("Bearer {access_token}")),
        ("Content-Type".to_string(), "application/json".to_string()),
        ("anthropic-beta".to_string(), "interleaved-thinking-2025-05-14".to_string()),
    ]
}

#[derive(Debug, Default, Clone)]
pub struct ParsedUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cached_tokens: u64,
}

/// `input_tokens` carries the full `promptTokenCount` (cached tokens are a
/// subset of it, not on top of it) so downstream cost/stats math — which
/// subtracts `cached_tokens` from `input_tokens` itself (spec §4.1, §4.5) —
/// doesn't double-count the cache discount.
pub fn parse_usage(usage_metadata: &Value) -> ParsedUsage {
    let prompt = usage_metadata.get("promptTokenCount").and_then(|v| v.as_u64()).unwrap_or(0);
    let cached = usage_metadata.get("cachedContentTokenCount").and_then(|v| v.as_u64()).unwrap_or(0);
    let candidates = usage_metadata.get("candidatesTokenCount").and_then(|v| v.as_u64()).unwrap_or(0);
    ParsedUsage { input_tokens: prompt, output_tokens: candidates, cached_tokens: cached }
}

pub fn parse_finish_reason(reason: &str) -> &'static str {
    match reason {
        "STOP" => "end_turn",
        "MAX_TOKENS" => "max_tokens",
        "TOOL_USE" => "tool_use",
        _ => "end_turn",
    }
}

/// One event parsed out of a Cloud-Code SSE chunk: accumulated text,
/// accumulated thinking text, a function call, or a usage update. A single
/// chunk's `candidates[0].content.parts` can yield more than one of these.
#[derive(Debug, Clone)]
pub enum SseEvent {
    Text(String),
    Thought(String),
    FunctionCall { name: String, args: Value },
    Usage(ParsedUsage),
}

/// Parses one `data:` line's JSON payload into zero or more [`SseEvent`]s.
/// Tolerates both `{response: {...}}` and a bare top-level body, since
/// Cloud-Code has shipped both shapes historically.
pub fn parse_sse_chunk(chunk: &Value) -> Vec<SseEvent> {
    let body = chunk.get("response").unwrap_or(chunk);
    let mut events = Vec::new();

    if let Some(usage) = body.get("usageMetadata") {
        events.push(SseEvent::Usage(parse_usage(usage)));
    }

    let parts = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .and_then(|c| c.get("content"))
        .and_then(|c| c.get("parts"))
        .and_then(|p| p.as_array());

    if let Some(parts) = parts {
        for part in parts {
            if let Some(text) = part.get("text").and_then(|t| t.as_str()) {
                if part.get("thought").and_then(|t| t.as_bool()).unwrap_or(false) {
                    events.push(SseEvent::Thought(text.to_string()));
                } else {
                    events.push(SseEvent::Text(text.to_string()));
                }
            } else if let Some(fc) = part.get("functionCall") {
                let name = fc.get("name").and_then(|n| n.as_str()).unwrap_or_default().to_string();
                let args = fc.get("args").cloned().unwrap_or(json!({}));
                events.push(SseEvent::FunctionCall { name, args });
            }
        }
    }

    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_uppercases_primitive_types() {
        let schema = json!({ "type": "string", "description": "a name" });
        assert_eq!(sanitize_schema(&schema)["type"], "STRING");
    }

    #[test]
    fn sanitize_resolves_anyof_to_first_non_null() {
        let schema = json!({ "anyOf": [ { "type": "null" }, { "type": "integer" } ] });
        assert_eq!(sanitize_schema(&schema)["type"], "INTEGER");
    }

    #[test]
    fn sanitize_filters_required_to_surviving_properties() {
        let schema = json!({
            "type": "object",
            "properties": { "command": { "type": "string" } },
            "required": ["command", "ghost_field"],
        });
        let sanitized = sanitize_schema(&schema);
        assert_eq!(sanitized["required"], json!(["command"]));
    }

    #[test]
    fn sanitize_infers_object_type_from_properties() {
        let schema = json!({ "properties": { "x": { "type": "string" } } });
        assert_eq!(sanitize_schema(&schema)["type"], "OBJECT");
    }

    #[test]
    fn parse_usage_keeps_cached_as_a_subset_of_input() {
        let usage = json!({ "promptTokenCount": 1000, "cachedContentTokenCount": 400, "candidatesTokenCount": 200 });
        let parsed = parse_usage(&usage);
        assert_eq!(parsed.input_tokens, 1000);
        assert_eq!(parsed.cached_tokens, 400);
        assert_eq!(parsed.output_tokens, 200);
    }

    #[test]
    fn finish_reason_mapping() {
        assert_eq!(parse_finish_reason("STOP"), "end_turn");
        assert_eq!(parse_finish_reason("MAX_TOKENS"), "max_tokens");
        assert_eq!(parse_finish_reason("TOOL_USE"), "tool_use");
    }

    #[test]
    fn session_id_is_32_hex_chars() {
        let id = session_id("hello world");
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn parse_sse_chunk_extracts_text_thought_and_function_call() {
        let chunk = json!({
            "candidates": [{
                "content": { "parts": [
                    { "text": "thinking..." , "thought": true },
                    { "text": "hello" },
                    { "functionCall": { "name": "terminal", "args": { "command": "ls" } } }
                ]}
            }]
        });
        let events = parse_sse_chunk(&chunk);
        assert_eq!(events.len(), 3);
        assert!(matches!(events[0], SseEvent::Thought(_)));
        assert!(matches!(events[1], SseEvent::Text(_)));
        assert!(matches!(events[2], SseEvent::FunctionCall { .. }));
    }
}
