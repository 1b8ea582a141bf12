use esprit_core::RequestStats;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// One entry in the agent arena. The LLM dispatcher only ever holds an
/// `agent_id`, never a reference to this record or the tracer itself —
/// see REDESIGN FLAGS §9 ("cyclic/weak references").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AgentRecord {
    pub name: String,
    pub task: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub parent_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
}

/// One recorded tool call. `result` is left as a free-form JSON value since
/// tool outputs (including screenshots) are produced by the out-of-scope
/// tool-invocation runtime.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolExecutionRecord {
    pub agent_id: String,
    pub tool_name: String,
    pub status: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub completed_at: Option<String>,
    #[serde(default)]
    pub args: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub result: Option<serde_json::Value>,
}

impl ToolExecutionRecord {
    /// `true` when the result carries a non-placeholder screenshot string,
    /// the same test `tracer_bridge.py::get_screenshot` applies.
    pub fn has_screenshot(&self) -> bool {
        self.result
            .as_ref()
            .and_then(|r| r.get("screenshot"))
            .and_then(|s| s.as_str())
            .map(|s| s != "[rendered]")
            .unwrap_or(false)
    }

    /// Strips the `screenshot` key from `args`/`result` and clips any result
    /// string to 500 chars, matching the fan-out's "screenshots stripped,
    /// strings clipped" payload rule (§4.5).
    pub fn for_wire(&self) -> serde_json::Value {
        let mut args = self.args.clone();
        if let Some(obj) = args.as_object_mut() {
            obj.remove("screenshot");
        }
        let result_summary = self.result.as_ref().map(|r| match r {
            serde_json::Value::String(s) if s.len() > 500 => serde_json::json!(s[..500].to_string()),
            serde_json::Value::Object(obj) => {
                let mut stripped = obj.clone();
                stripped.remove("screenshot");
                serde_json::Value::Object(stripped)
            }
            other => other.clone(),
        });
        serde_json::json!({
            "agent_id": self.agent_id,
            "tool_name": self.tool_name,
            "status": self.status,
            "timestamp": self.timestamp,
            "completed_at": self.completed_at,
            "args": args,
            "result_summary": result_summary,
            "has_screenshot": self.has_screenshot(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RunMetadata {
    #[serde(default)]
    pub run_id: String,
    #[serde(default)]
    pub run_name: String,
    #[serde(default)]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub start_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub end_time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub model: Option<String>,
}

/// The shared-mutable external collaborator described in spec §3: written by
/// the (out-of-scope) agent runtime and the dispatch core's stats updater,
/// read by the fan-out. Modeled as an explicit context object per REDESIGN
/// FLAGS rather than a process singleton; `global_tracer()` in `lib.rs` is
/// the thin convenience holder for callers that want one anyway.
#[derive(Debug, Default)]
pub struct TracerState {
    pub agents: HashMap<String, AgentRecord>,
    pub tool_executions: HashMap<i64, ToolExecutionRecord>,
    next_exec_id: i64,
    pub chat_messages: Vec<serde_json::Value>,
    pub vulnerability_reports: Vec<serde_json::Value>,
    pub streaming_content: HashMap<String, String>,
    pub compacting_agents: HashSet<String>,
    pub latest_browser_screenshots: HashMap<String, i64>,
    pub run_metadata: RunMetadata,
    pub scan_config: Option<serde_json::Value>,
    pub final_scan_result: Option<serde_json::Value>,
    per_agent_stats: HashMap<String, RequestStats>,
}

impl TracerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_agent(&mut self, agent_id: impl Into<String>, name: impl Into<String>, task: impl Into<String>, parent_id: Option<String>, now: &str) {
        self.agents.insert(
            agent_id.into(),
            AgentRecord {
                name: name.into(),
                task: task.into(),
                status: "running".to_string(),
                parent_id,
                created_at: now.to_string(),
                updated_at: now.to_string(),
                model: None,
            },
        );
    }

    pub fn set_agent_status(&mut self, agent_id: &str, status: impl Into<String>, now: &str) {
        if let Some(agent) = self.agents.get_mut(agent_id) {
            agent.status = status.into();
            agent.updated_at = now.to_string();
        }
    }

    /// Records a new tool execution and returns its `exec_id`, an
    /// ever-increasing counter used both as the map key and, by the
    /// fan-out's count-only delta heuristic, as the "new since" offset.
    pub fn start_tool_execution(&mut self, record: ToolExecutionRecord) -> i64 {
        let exec_id = self.next_exec_id;
        self.next_exec_id += 1;
        self.tool_executions.insert(exec_id, record);
        exec_id
    }

    pub fn complete_tool_execution(&mut self, exec_id: i64, result: serde_json::Value, now: &str) {
        if let Some(record) = self.tool_executions.get_mut(&exec_id) {
            record.result = Some(result);
            record.status = "completed".to_string();
            record.completed_at = Some(now.to_string());
        }
    }

    pub fn set_streaming_content(&mut self, agent_id: impl Into<String>, content: impl Into<String>) {
        self.streaming_content.insert(agent_id.into(), content.into());
    }

    pub fn clear_streaming_content(&mut self, agent_id: &str) {
        self.streaming_content.remove(agent_id);
    }

    pub fn set_latest_screenshot(&mut self, agent_id: impl Into<String>, exec_id: i64) {
        self.latest_browser_screenshots.insert(agent_id.into(), exec_id);
    }

    /// Two-step screenshot lookup mirroring `tracer_bridge.py::get_screenshot`:
    /// first the direct latest-execution pointer, then a fallback scan over
    /// every `browser_action` execution for this agent, newest wins.
    pub fn get_screenshot(&self, agent_id: &str) -> (Option<String>, String) {
        if let Some(exec_id) = self.latest_browser_screenshots.get(agent_id) {
            if let Some(record) = self.tool_executions.get(exec_id) {
                if record.has_screenshot() {
                    let screenshot = record.result.as_ref().and_then(|r| r.get("screenshot")).and_then(|s| s.as_str());
                    let url = record
                        .result
                        .as_ref()
                        .and_then(|r| r.get("url"))
                        .and_then(|u| u.as_str())
                        .or_else(|| record.args.get("url").and_then(|u| u.as_str()))
                        .unwrap_or("");
                    if let Some(screenshot) = screenshot {
                        return (Some(screenshot.to_string()), url.to_string());
                    }
                }
            }
        }

        let mut best: Option<(i64, String, String)> = None;
        for (exec_id, record) in &self.tool_executions {
            if record.tool_name != "browser_action" || record.agent_id != agent_id || !record.has_screenshot() {
                continue;
            }
            let Some(screenshot) = record.result.as_ref().and_then(|r| r.get("screenshot")).and_then(|s| s.as_str())
            else {
                continue;
            };
            let url = record
                .result
                .as_ref()
                .and_then(|r| r.get("url"))
                .and_then(|u| u.as_str())
                .or_else(|| record.args.get("url").and_then(|u| u.as_str()))
                .unwrap_or("");
            if best.as_ref().map(|(best_id, ..)| *exec_id > *best_id).unwrap_or(true) {
                best = Some((*exec_id, screenshot.to_string(), url.to_string()));
            }
        }
        match best {
            Some((_, screenshot, url)) => (Some(screenshot), url),
            None => (None, String::new()),
        }
    }

    pub fn record_stats(&mut self, agent_id: &str, input_tokens: u64, output_tokens: u64, cached_tokens: u64, cost: f64) {
        self.per_agent_stats.entry(agent_id.to_string()).or_default().record(
            input_tokens,
            output_tokens,
            cached_tokens,
            cost,
        );
    }

    /// Sums every agent's `RequestStats` into one process-wide total. `cost`
    /// and the token counters are straightforward sums; `last_input_tokens`
    /// takes the max across agents as a rough "largest active context" proxy
    /// since there's no single "most recent" turn across an arena.
    pub fn aggregate_stats(&self) -> RequestStats {
        let mut total = RequestStats::default();
        for stats in self.per_agent_stats.values() {
            total.input_tokens += stats.input_tokens;
            total.output_tokens += stats.output_tokens;
            total.cached_tokens += stats.cached_tokens;
            total.cost += stats.cost;
            total.requests += stats.requests;
            total.last_input_tokens = total.last_input_tokens.max(stats.last_input_tokens);
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_execution_ids_increase_monotonically() {
        let mut tracer = TracerState::new();
        let a = tracer.start_tool_execution(ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "terminal".into(),
            status: "running".into(),
            timestamp: "t0".into(),
            completed_at: None,
            args: serde_json::json!({}),
            result: None,
        });
        let b = tracer.start_tool_execution(ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "terminal".into(),
            status: "running".into(),
            timestamp: "t1".into(),
            completed_at: None,
            args: serde_json::json!({}),
            result: None,
        });
        assert!(b > a);
    }

    #[test]
    fn for_wire_strips_screenshot_and_clips_long_strings() {
        let record = ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "browser_action".into(),
            status: "completed".into(),
            timestamp: "t0".into(),
            completed_at: Some("t1".into()),
            args: serde_json::json!({ "url": "https://x", "screenshot": "ignored" }),
            result: Some(serde_json::json!({ "screenshot": "base64data", "url": "https://x" })),
        };
        let wire = record.for_wire();
        assert!(wire["args"].get("screenshot").is_none());
        assert!(wire["result_summary"].get("screenshot").is_none());
        assert_eq!(wire["has_screenshot"], true);
    }

    #[test]
    fn get_screenshot_falls_back_to_scanning_tool_executions() {
        let mut tracer = TracerState::new();
        let exec_id = tracer.start_tool_execution(ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "browser_action".into(),
            status: "completed".into(),
            timestamp: "t0".into(),
            completed_at: Some("t0".into()),
            args: serde_json::json!({}),
            result: Some(serde_json::json!({ "screenshot": "abc", "url": "https://x" })),
        });
        let _ = exec_id;
        let (screenshot, url) = tracer.get_screenshot("a1");
        assert_eq!(screenshot.as_deref(), Some("abc"));
        assert_eq!(url, "https://x");
    }

    #[test]
    fn aggregate_stats_sums_across_agents() {
        let mut tracer = TracerState::new();
        tracer.record_stats("a1", 100, 20, 0, 0.01);
        tracer.record_stats("a2", 50, 10, 5, 0.005);
        let total = tracer.aggregate_stats();
        assert_eq!(total.input_tokens, 150);
        assert_eq!(total.requests, 2);
    }
}
