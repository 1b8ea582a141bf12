//! Parser for the `<function=NAME><parameter=KEY>VALUE</parameter>...</function>`
//! text grammar that models trained on the tool-use prompt emit in lieu of
//! (or alongside) a provider's native `tool_calls` field.

use esprit_core::ToolInvocation;

/// Truncates `content` to end immediately after the first `</function>`
/// closing tag, discarding anything the model emitted past the first tool
/// call (speculative follow-up turns, trailing commentary).
pub fn truncate_to_first_function(content: &str) -> String {
    match content.find("</function>") {
        Some(idx) => content[..idx + "</function>".len()].to_string(),
        None => content.to_string(),
    }
}

/// Repairs an obviously-incomplete tool call left dangling by a stream that
/// was cut off mid-parameter — e.g. a trailing `<parameter=path` with no
/// closing tag at all. Closes the parameter and the function block so the
/// grammar parser below can still recover whatever was sent.
pub fn fix_incomplete_tool_call(content: &str) -> String {
    if !content.contains("<function=") {
        return content.to_string();
    }
    let mut out = content.to_string();
    if out.contains("</function>") {
        return out;
    }

    // A dangling `<parameter=KEY>` with no closing tag: close the parameter,
    // then close the function.
    if let Some(last_param_start) = out.rfind("<parameter=") {
        let after_open = &out[last_param_start..];
        if !after_open.contains('>') {
            // Not even the opening tag is complete; drop the fragment.
            out.truncate(last_param_start);
        } else if !after_open.contains("</parameter>") {
            out.push_str("</parameter>");
        }
    }
    out.push_str("</function>");
    out
}

/// Parses every `<function=NAME>...</function>` block out of `content`.
/// Only the first block is retained per the stream-closing truncation
/// heuristic above, but this parses generally in case a caller passes
/// already-truncated multi-block content.
pub fn parse_tool_invocations(content: &str) -> Vec<ToolInvocation> {
    let mut invocations = Vec::new();
    let mut rest = content;

    while let Some(open_start) = rest.find("<function=") {
        let after_open = &rest[open_start + "<function=".len()..];
        let Some(name_end) = after_open.find('>') else { break };
        let name = after_open[..name_end].trim().to_string();
        let body_start = name_end + 1;
        let Some(close_rel) = after_open.find("</function>") else { break };
        if close_rel < body_start {
            break;
        }
        let body = &after_open[body_start..close_rel];

        let mut invocation = ToolInvocation::new(name);
        let mut body_rest = body;
        while let Some(p_start) = body_rest.find("<parameter=") {
            let after_p = &body_rest[p_start + "<parameter=".len()..];
            let Some(key_end) = after_p.find('>') else { break };
            let key = after_p[..key_end].trim().to_string();
            let value_start = key_end + 1;
            let Some(p_close_rel) = after_p.find("</parameter>") else { break };
            if p_close_rel < value_start {
                break;
            }
            let value = after_p[value_start..p_close_rel].to_string();
            invocation.params.insert(key, value);
            body_rest = &after_p[p_close_rel + "</parameter>".len()..];
        }
        invocations.push(invocation);

        rest = &after_open[close_rel + "</function>".len()..];
    }

    invocations
}

/// Extracts native `tool_calls`-shaped invocations from a chat-completions
/// response message, when the provider reports them directly instead of (or
/// alongside) the `<function=>` text grammar. Checked first by the dispatch
/// core; the text grammar is only a fallback.
pub fn extract_native_tool_calls(tool_calls: &[serde_json::Value]) -> Vec<ToolInvocation> {
    tool_calls
        .iter()
        .filter_map(|call| {
            let function = call.get("function")?;
            let name = function.get("name")?.as_str()?.to_string();
            let arguments = function.get("arguments").and_then(|a| a.as_str()).unwrap_or("{}");
            let parsed: serde_json::Value = serde_json::from_str(arguments).unwrap_or_default();
            let mut invocation = ToolInvocation::new(name);
            if let Some(obj) = parsed.as_object() {
                for (key, value) in obj {
                    let value_str = match value {
                        serde_json::Value::String(s) => s.clone(),
                        other => other.to_string(),
                    };
                    invocation.params.insert(key.clone(), value_str);
                }
            }
            Some(invocation)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_tool_call_with_params() {
        let content = "<function=terminal>\n<parameter=command>ls -la</parameter>\n</function> trailing junk";
        let invocations = parse_tool_invocations(&truncate_to_first_function(content));
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].name, "terminal");
        assert_eq!(invocations[0].params.get("command").map(String::as_str), Some("ls -la"));
    }

    #[test]
    fn truncation_drops_trailing_text() {
        let content = "before <function=a><parameter=k>v</parameter></function> after";
        assert_eq!(
            truncate_to_first_function(content),
            "before <function=a><parameter=k>v</parameter></function>"
        );
    }

    #[test]
    fn fix_incomplete_closes_dangling_parameter() {
        let content = "<function=terminal>\n<parameter=command>ls -la";
        let fixed = fix_incomplete_tool_call(content);
        assert!(fixed.ends_with("</function>"));
        let invocations = parse_tool_invocations(&fixed);
        assert_eq!(invocations[0].params.get("command").map(String::as_str), Some("ls -la"));
    }

    #[test]
    fn fix_incomplete_drops_dangling_key_with_no_close_angle() {
        let content = "<function=terminal>\n<parameter=comm";
        let fixed = fix_incomplete_tool_call(content);
        assert_eq!(fixed, "<function=terminal>\n</function>");
    }

    #[test]
    fn multiple_blocks_all_parse_when_not_pre_truncated() {
        let content = "<function=a><parameter=x>1</parameter></function><function=b><parameter=y>2</parameter></function>";
        let invocations = parse_tool_invocations(content);
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[1].name, "b");
    }

    #[test]
    fn native_tool_calls_parse_json_arguments() {
        let calls = vec![serde_json::json!({
            "function": { "name": "read_file", "arguments": "{\"path\": \"/tmp/x\"}" }
        })];
        let invocations = extract_native_tool_calls(&calls);
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].params.get("path").map(String::as_str), Some("/tmp/x"));
    }
}
