use serde_json::Value;

/// Result of a successful `loadCodeAssist` discovery call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveredProject {
    pub project_id: String,
}

/// Extracts the project id from a `loadCodeAssist` response body. The
/// upstream API has shipped `project_id` as both a bare string and as a
/// nested `{id: "..."}` object across versions; both are accepted.
pub fn parse_discovery_response(body: &Value) -> Option<DiscoveredProject> {
    let raw = body.get("cloudaicompanionProject").or_else(|| body.get("project_id"))?;
    let project_id = match raw {
        Value::String(s) => s.clone(),
        Value::Object(_) => raw.get("id")?.as_str()?.to_string(),
        _ => return None,
    };
    Some(DiscoveredProject { project_id })
}
