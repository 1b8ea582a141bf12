//! Mode A — standard streaming chat completions (spec §4.4). A single POST
//! with `stream=true, stream_options.include_usage=true`; SSE frames carry
//! `delta.content` (accumulated into a growing buffer) and a trailing usage
//! chunk.

use crate::outcome::StreamOutcome;
use esprit_core::{EspritError, LlmResponse};
use esprit_providers::antigravity::format::ParsedUsage;
use esprit_providers::{chat_format, extract_native_tool_calls, fix_incomplete_tool_call, parse_tool_invocations, truncate_to_first_function, SseBuffer};
use futures::StreamExt;
use tokio::sync::mpsc::Sender;

/// Extra chunks tolerated after the accumulated content hits `</function>`,
/// waiting for a trailing usage report before the stream loop gives up on
/// it.
const POST_FUNCTION_CLOSE_GRACE_CHUNKS: u32 = 5;

/// Drives one Mode A attempt to completion, pushing cumulative partial
/// [`LlmResponse`] snapshots to `partial_tx` as content arrives. Returns the
/// terminal outcome: `Ok` carries the final response plus parsed usage,
/// anything else tags how the outer retry loop should react.
pub async fn run(
    client: &reqwest::Client,
    url: &str,
    headers: &[(String, String)],
    body: serde_json::Value,
    partial_tx: &Sender<LlmResponse>,
) -> StreamOutcome<(LlmResponse, ParsedUsage)> {
    let mut request = client.post(url).json(&body);
    for (key, value) in headers {
        request = request.header(key, value);
    }

    let response = match request.send().await {
        Ok(r) => r,
        Err(e) if e.is_connect() || e.is_timeout() => return StreamOutcome::Retryable,
        Err(e) => return StreamOutcome::Fatal(EspritError::provider_unreachable("request failed").with_details(e.to_string())),
    };

    let status = response.status();
    if status.as_u16() == 429 {
        let retry_after_s = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(60);
        return StreamOutcome::RateLimited { retry_after_s };
    }
    if status.as_u16() == 401 || status.as_u16() == 403 {
        return StreamOutcome::Fatal(EspritError::auth_expired(format!("provider rejected credentials ({status})")));
    }
    if status.is_server_error() {
        return StreamOutcome::Retryable;
    }
    if !status.is_success() {
        return StreamOutcome::Fallback;
    }

    let mut byte_stream = response.bytes_stream();
    let mut buffer = SseBuffer::new();
    let mut accumulated = String::new();
    let mut native_tool_calls: Vec<serde_json::Value> = Vec::new();
    let mut usage = ParsedUsage::default();
    let mut grace_remaining: Option<u32> = None;

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

            // Once the boundary's been hit, the grace period is only for a
            // trailing usage chunk — any further content deltas are trailing
            // junk (spec §8 scenario 5) and must not grow `accumulated`
            // past the snapshot already sent, or a later partial could
            // exceed the terminal response.
            if grace_remaining.is_none() {
                if let Some(delta) = chat_format::parse_delta_content(&parsed) {
                    if !delta.is_empty() {
                        accumulated.push_str(&delta);
                        let _ = partial_tx.send(LlmResponse::text(accumulated.clone())).await;
                    }
                }
            }
            native_tool_calls.extend(chat_format::parse_delta_tool_calls(&parsed));
            if let Some(parsed_usage) = chat_format::parse_usage_chunk(&parsed) {
                usage = parsed_usage;
            }

            if grace_remaining.is_none() && chat_format::ends_with_function_close(&accumulated) {
                tracing::debug!("accumulated content reached a literal </function> boundary");
                accumulated = truncate_to_first_function(&fix_incomplete_tool_call(&accumulated));
                let _ = partial_tx.send(LlmResponse::text(accumulated.clone())).await;
                grace_remaining = Some(POST_FUNCTION_CLOSE_GRACE_CHUNKS);
            }
        }

        if let Some(remaining) = grace_remaining.as_mut() {
            if *remaining == 0 {
                break;
            }
            *remaining -= 1;
        }
    }

    let content = truncate_to_first_function(&fix_incomplete_tool_call(&accumulated));
    let tool_invocations = if !native_tool_calls.is_empty() {
        extract_native_tool_calls(&native_tool_calls)
    } else {
        parse_tool_invocations(&content)
    };

    StreamOutcome::Ok((LlmResponse { content, tool_invocations, thinking_blocks: Vec::new() }, usage))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unreachable_host_is_retryable() {
        let client = reqwest::Client::new();
        let (tx, _rx) = tokio::sync::mpsc::channel(8);
        let outcome = run(&client, "http://127.0.0.1:1", &[], serde_json::json!({}), &tx).await;
        assert!(matches!(outcome, StreamOutcome::Retryable));
    }
}
