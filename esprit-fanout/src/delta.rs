use crate::snapshot::FullState;
use serde::Serialize;

/// One unit of change between two successive polls. Variants are emitted in
/// a fixed order — agents, tools, chat, vulns, streaming, screenshots,
/// stats, scan_config, final_report — so a subscriber that only cares about
///, say, `FinalReport` can always find it last in a batch.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Delta {
    Agents { agents: std::collections::HashMap<String, serde_json::Value> },
    Tools { tools: Vec<serde_json::Value> },
    Chat { messages: Vec<serde_json::Value> },
    Vulnerabilities { reports: Vec<serde_json::Value> },
    Streaming { agent_id: String, content: String },
    /// Carries no screenshot payload (spec §4.5) — the client re-requests
    /// the image via the screenshot REST endpoint once it sees this.
    ScreenshotUpdate { agent_id: String },
    Stats { stats: serde_json::Value },
    ScanConfig { config: serde_json::Value },
    FinalReport { report: serde_json::Value },
}

#[derive(Debug, Clone, Serialize, Default, PartialEq)]
pub struct DeltaBatch {
    pub deltas: Vec<Delta>,
}

impl DeltaBatch {
    pub fn is_empty(&self) -> bool {
        self.deltas.is_empty()
    }
}

/// Field-by-field diff between two consecutive [`FullState`] snapshots.
/// Each field is compared independently rather than diffing the whole
/// struct at once, since an agent-only update shouldn't force a resend of
/// unrelated chat history.
pub fn diff(prev: &FullState, curr: &FullState) -> DeltaBatch {
    let mut deltas = Vec::new();

    let changed_agents: std::collections::HashMap<String, serde_json::Value> = curr
        .agents
        .iter()
        .filter(|(id, record)| prev.agents.get(*id) != Some(record))
        .map(|(id, record)| (id.clone(), serde_json::to_value(record).unwrap_or(serde_json::Value::Null)))
        .collect();
    if !changed_agents.is_empty() {
        deltas.push(Delta::Agents { agents: changed_agents });
    }

    if curr.tool_executions.len() > prev.tool_executions.len() {
        let new_tools: Vec<serde_json::Value> = curr
            .tool_executions
            .iter()
            .filter(|t| !prev.tool_executions.contains(t))
            .cloned()
            .collect();
        if !new_tools.is_empty() {
            deltas.push(Delta::Tools { tools: new_tools });
        }
    }

    if curr.chat_messages.len() > prev.chat_messages.len() {
        let new_messages = curr.chat_messages[prev.chat_messages.len()..].to_vec();
        deltas.push(Delta::Chat { messages: new_messages });
    }

    if curr.vulnerability_reports.len() > prev.vulnerability_reports.len() {
        let new_reports = curr.vulnerability_reports[prev.vulnerability_reports.len()..].to_vec();
        deltas.push(Delta::Vulnerabilities { reports: new_reports });
    }

    for (agent_id, content) in &curr.streaming_content {
        if prev.streaming_content.get(agent_id) != Some(content) {
            deltas.push(Delta::Streaming { agent_id: agent_id.clone(), content: content.clone() });
        }
    }

    let mut changed_screenshot_agents: Vec<&String> = curr
        .latest_screenshots
        .iter()
        .filter(|(agent_id, exec_id)| prev.latest_screenshots.get(*agent_id) != Some(*exec_id))
        .map(|(agent_id, _)| agent_id)
        .collect();
    changed_screenshot_agents.sort();
    for agent_id in changed_screenshot_agents {
        deltas.push(Delta::ScreenshotUpdate { agent_id: agent_id.clone() });
    }

    if curr.stats != prev.stats {
        deltas.push(Delta::Stats { stats: serde_json::to_value(&curr.stats).unwrap_or(serde_json::Value::Null) });
    }

    if curr.scan_config != prev.scan_config {
        if let Some(config) = &curr.scan_config {
            deltas.push(Delta::ScanConfig { config: config.clone() });
        }
    }

    if curr.final_report != prev.final_report {
        if let Some(report) = &curr.final_report {
            deltas.push(Delta::FinalReport { report: report.clone() });
        }
    }

    DeltaBatch { deltas }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::ComputedStats;
    use crate::tracer::RunMetadata;
    use std::collections::HashMap;

    fn empty_stats() -> ComputedStats {
        ComputedStats {
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
        }
    }

    fn empty_state(stats: ComputedStats) -> FullState {
        FullState {
            agents: HashMap::new(),
            tool_executions: Vec::new(),
            chat_messages: Vec::new(),
            vulnerability_reports: Vec::new(),
            streaming_content: HashMap::new(),
            compacting_agents: Vec::new(),
            screenshot_agents: Vec::new(),
            latest_screenshots: HashMap::new(),
            scan_config: None,
            final_report: None,
            run_metadata: RunMetadata::default(),
            stats,
        }
    }

    #[test]
    fn no_changes_produce_empty_batch() {
        let prev = empty_state(empty_stats());
        let curr = prev.clone();
        assert!(diff(&prev, &curr).is_empty());
    }

    #[test]
    fn new_chat_message_is_appended_only() {
        let prev = empty_state(empty_stats());
        let mut curr = prev.clone();
        curr.chat_messages.push(serde_json::json!({"role": "user", "content": "hi"}));
        let batch = diff(&prev, &curr);
        assert_eq!(batch.deltas.len(), 1);
        assert!(matches!(&batch.deltas[0], Delta::Chat { messages } if messages.len() == 1));
    }

    #[test]
    fn streaming_content_change_is_detected() {
        let prev = empty_state(empty_stats());
        let mut curr = prev.clone();
        curr.streaming_content.insert("a1".into(), "partial...".into());
        let batch = diff(&prev, &curr);
        assert!(matches!(&batch.deltas[0], Delta::Streaming { agent_id, .. } if agent_id == "a1"));
    }

    #[test]
    fn stats_change_emits_stats_delta() {
        let prev = empty_state(empty_stats());
        let mut stats2 = empty_stats();
        stats2.cost = 0.05;
        let curr = empty_state(stats2);
        let batch = diff(&prev, &curr);
        assert!(matches!(&batch.deltas[0], Delta::Stats { .. }));
    }

    #[test]
    fn screenshot_change_emits_update_with_no_payload() {
        let prev = empty_state(empty_stats());
        let mut curr = prev.clone();
        curr.latest_screenshots.insert("a1".into(), 7);
        curr.screenshot_agents.push("a1".into());
        let batch = diff(&prev, &curr);
        assert!(matches!(&batch.deltas[0], Delta::ScreenshotUpdate { agent_id } if agent_id == "a1"));
        let json = serde_json::to_value(&batch.deltas[0]).unwrap();
        assert!(json.get("screenshot").is_none());
        assert!(json.get("url").is_none());
    }

    #[test]
    fn final_report_only_emitted_once_present() {
        let prev = empty_state(empty_stats());
        let mut curr = prev.clone();
        curr.final_report = Some(serde_json::json!({"summary": "done"}));
        let batch = diff(&prev, &curr);
        assert!(matches!(batch.deltas.last(), Some(Delta::FinalReport { .. })));
    }
}
