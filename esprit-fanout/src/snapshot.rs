use crate::stats::ComputedStats;
use crate::tracer::{AgentRecord, RunMetadata, TracerState};
use serde::Serialize;
use std::collections::HashMap;

/// The complete picture sent to a subscriber the moment it connects, so it
/// never has to reconstruct state from a stream of deltas it didn't see the
/// start of.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FullState {
    pub agents: HashMap<String, AgentRecord>,
    pub tool_executions: Vec<serde_json::Value>,
    pub chat_messages: Vec<serde_json::Value>,
    pub vulnerability_reports: Vec<serde_json::Value>,
    pub streaming_content: HashMap<String, String>,
    pub compacting_agents: Vec<String>,
    /// Agent ids that currently have a latest screenshot on file. The
    /// client fetches the image itself via the screenshot REST endpoint
    /// (spec §4.5) rather than receiving it inline.
    pub screenshot_agents: Vec<String>,
    /// `agent_id -> latest_screenshot_exec_id`, kept only to detect when an
    /// agent's screenshot pointer changes between polls; never sent to
    /// clients.
    #[serde(skip)]
    pub latest_screenshots: HashMap<String, i64>,
    pub scan_config: Option<serde_json::Value>,
    pub final_report: Option<serde_json::Value>,
    pub run_metadata: RunMetadata,
    pub stats: ComputedStats,
}

/// Builds a [`FullState`] snapshot from the tracer plus a precomputed stats
/// block (kept separate since computing it needs a model name + elapsed
/// time the tracer itself doesn't track).
pub fn build_full_state(tracer: &TracerState, stats: ComputedStats) -> FullState {
    let mut tool_executions: Vec<(i64, serde_json::Value)> =
        tracer.tool_executions.iter().map(|(id, record)| (*id, record.for_wire())).collect();
    tool_executions.sort_by_key(|(id, _)| *id);

    let mut screenshot_agents: Vec<String> = tracer.latest_browser_screenshots.keys().cloned().collect();
    screenshot_agents.sort();

    FullState {
        agents: tracer.agents.clone(),
        tool_executions: tool_executions.into_iter().map(|(_, v)| v).collect(),
        chat_messages: tracer.chat_messages.clone(),
        vulnerability_reports: tracer.vulnerability_reports.clone(),
        streaming_content: tracer.streaming_content.clone(),
        compacting_agents: tracer.compacting_agents.iter().cloned().collect(),
        screenshot_agents,
        latest_screenshots: tracer.latest_browser_screenshots.clone(),
        scan_config: tracer.scan_config.clone(),
        final_report: tracer.final_scan_result.clone(),
        run_metadata: tracer.run_metadata.clone(),
        stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracer::ToolExecutionRecord;

    #[test]
    fn tool_executions_are_ordered_by_exec_id() {
        let mut tracer = TracerState::new();
        tracer.start_tool_execution(ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "terminal".into(),
            status: "running".into(),
            timestamp: "t0".into(),
            completed_at: None,
            args: serde_json::json!({}),
            result: None,
        });
        tracer.start_tool_execution(ToolExecutionRecord {
            agent_id: "a1".into(),
            tool_name: "read_file".into(),
            status: "running".into(),
            timestamp: "t1".into(),
            completed_at: None,
            args: serde_json::json!({}),
            result: None,
        });
        let stats = ComputedStats {
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            uncached_input_tokens: 0,
            cache_hit_ratio: 0.0,
            cost: 0.0,
            requests: 0,
            tokens_per_second: 0.0,
            context_used: 0,
            context_limit: 128_000,
        };
        let full = build_full_state(&tracer, stats);
        assert_eq!(full.tool_executions[0]["tool_name"], "terminal");
        assert_eq!(full.tool_executions[1]["tool_name"], "read_file");
    }

    #[test]
    fn screenshot_agents_lists_agents_with_a_latest_pointer() {
        let mut tracer = TracerState::new();
        tracer.set_latest_screenshot("a1", 3);
        let stats = ComputedStats {
            input_tokens: 0,
            output_tokens: 0,
            cached_tokens: 0,
            uncached_input_tokens: 0,
            cache_hit_ratio: 0.0,
            cost: 0.0,
            requests: 0,
            tokens_per_second: 0.0,
            context_used: 0,
            context_limit: 128_000,
        };
        let full = build_full_state(&tracer, stats);
        assert_eq!(full.screenshot_agents, vec!["a1".to_string()]);
    }
}
