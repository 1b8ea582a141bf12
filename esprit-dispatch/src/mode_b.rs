//! Mode B — Cloud-Code envelope streaming (spec §4.4, §6). Tries an ordered
//! list of endpoints until one accepts the request, consuming
//! `functionCall`/`text`/`thought`/`usageMetadata` parts out of each SSE
//! chunk.

use crate::outcome::StreamOutcome;
use esprit_core::{EspritError, LlmResponse, ThinkingBlock, ToolInvocation};
use esprit_providers::antigravity::format::{parse_sse_chunk, ParsedUsage, SseEvent};
use esprit_providers::SseBuffer;
use futures::StreamExt;
use std::time::Duration;
use tokio::sync::mpsc::Sender;

/// How many times a single endpoint retries a 400 before being abandoned,
/// and how long it sleeps before each retry — a known Cloud-Code transient
/// bug rather than a real rejection.
const BAD_REQUEST_RETRY_SLEEPS_S: &[u64] = &[2, 4];

pub async fn run(
    client: &reqwest::Client,
    endpoints: &[String],
    stream_path: &str,
    headers: &[(String, String)],
    body: &serde_json::Value,
    partial_tx: &Sender<LlmResponse>,
) -> StreamOutcome<(LlmResponse, ParsedUsage)> {
    let mut last_diagnostic: Option<EspritError> = None;

    for endpoint in endpoints {
        let url = format!("{endpoint}{stream_path}");

        let mut bad_request_attempts = 0usize;
        loop {
            let mut request = client.post(&url).json(body);
            for (key, value) in headers {
                request = request.header(key, value);
            }

            let response = match request.send().await {
                Ok(r) => r,
                Err(e) if e.is_connect() || e.is_timeout() => {
                    // Don't clobber a more informative diagnostic from an
                    // earlier endpoint with this connect failure's generic one.
                    if last_diagnostic.is_none() {
                        last_diagnostic = Some(EspritError::provider_unreachable(format!("{endpoint} unreachable")).with_details(e.to_string()));
                    }
                    break;
                }
                Err(e) => return StreamOutcome::Fatal(EspritError::provider_unreachable("request failed").with_details(e.to_string())),
            };

            let status = response.status();
            match status.as_u16() {
                404 => break,
                401 | 403 => return StreamOutcome::Fatal(EspritError::auth_expired(format!("{endpoint} rejected credentials"))),
                429 => {
                    let retry_after_s = response
                        .headers()
                        .get("retry-after")
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .unwrap_or(60);
                    return StreamOutcome::RateLimited { retry_after_s };
                }
                400 if bad_request_attempts < BAD_REQUEST_RETRY_SLEEPS_S.len() => {
                    tokio::time::sleep(Duration::from_secs(BAD_REQUEST_RETRY_SLEEPS_S[bad_request_attempts])).await;
                    bad_request_attempts += 1;
                    continue;
                }
                400 => {
                    last_diagnostic = Some(EspritError::protocol(format!("{endpoint} returned 400 after retries")));
                    break;
                }
                s if (500..600).contains(&s) => {
                    last_diagnostic = Some(EspritError::provider_unreachable(format!("{endpoint} returned {s}")));
                    break;
                }
                s if s >= 400 => {
                    return StreamOutcome::Fallback;
                }
                _ => {}
            }

            return consume_stream(response, partial_tx).await;
        }
    }

    match last_diagnostic {
        Some(err) => StreamOutcome::Fatal(err),
        None => StreamOutcome::Fatal(EspritError::provider_unreachable("no Cloud-Code endpoint responded")),
    }
}

async fn consume_stream(response: reqwest::Response, partial_tx: &Sender<LlmResponse>) -> StreamOutcome<(LlmResponse, ParsedUsage)> {
    let mut byte_stream = response.bytes_stream();
    let mut buffer = SseBuffer::new();
    let mut accumulated_text = String::new();
    let mut thinking_blocks: Vec<ThinkingBlock> = Vec::new();
    let mut function_calls: Vec<ToolInvocation> = Vec::new();
    let mut usage = ParsedUsage::default();

    while let Some(chunk) = byte_stream.next().await {
        let bytes = match chunk {
            Ok(b) => b,
            Err(e) => return StreamOutcome::Fatal(EspritError::provider_unreachable("stream read failed").with_details(e.to_string())),
        };

        for payload in buffer.push(&bytes) {
            let parsed: serde_json::Value = match serde_json::from_str(&payload) {
                Ok(v) => v,
                Err(_) => continue,
            };

            for event in parse_sse_chunk(&parsed) {
                match event {
                    SseEvent::Text(text) => {
                        accumulated_text.push_str(&text);
                        let _ = partial_tx.send(LlmResponse::text(accumulated_text.clone())).await;
                    }
                    SseEvent::Thought(text) => {
                        thinking_blocks.push(ThinkingBlock { text, signature: None });
                    }
                    SseEvent::FunctionCall { name, args } => {
                        let mut invocation = ToolInvocation::new(name);
                        if let Some(obj) = args.as_object() {
                            for (key, value) in obj {
                                let value_str = match value {
                                    serde_json::Value::String(s) => s.clone(),
                                    other => other.to_string(),
                                };
                                invocation.params.insert(key.clone(), value_str);
                            }
                        }
                        function_calls.push(invocation);
                    }
                    SseEvent::Usage(parsed_usage) => usage = parsed_usage,
                }
            }
        }
    }

    StreamOutcome::Ok((
        LlmResponse { content: accumulated_text, tool_invocations: function_calls, thinking_blocks },
        usage,
    ))
}

/// Builds the Cloud-Code generation-config thinking block in the correct
/// key casing for `model`'s inner family (spec §4.4: snake_case for
/// Anthropic-family inner models on Cloud-Code, camelCase for Gemini).
pub fn is_anthropic_inner(model: &str) -> bool {
    model.to_lowercase().contains("claude")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn every_endpoint_unreachable_yields_fatal_with_diagnostic() {
        let client = reqwest::Client::new();
        let endpoints = vec!["http://127.0.0.1:1".to_string(), "http://127.0.0.1:2".to_string()];
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let outcome = run(&client, &endpoints, "/stream", &[], &serde_json::json!({}), &tx).await;
        assert!(matches!(outcome, StreamOutcome::Fatal(_)));
    }

    #[test]
    fn inner_family_detection_matches_claude_substring() {
        assert!(is_anthropic_inner("claude-opus-4-1"));
        assert!(!is_anthropic_inner("gemini-2.5-pro"));
    }
}
