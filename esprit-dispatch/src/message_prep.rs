use crate::memory::MemoryCompressor;
use esprit_core::Message;
use std::sync::Arc;

/// Agent identity attached as a metadata-only user message, never part of
/// the actual conversation content the model is asked to act on.
#[derive(Debug, Clone)]
pub struct AgentIdentity {
    pub agent_id: String,
    pub agent_name: String,
}

/// Runs request preparation per spec §4.4 step 1-3: prepend the system
/// prompt, optionally append an agent-identity marker, run the external
/// memory compressor over the mutable history, then strip images if the
/// target model can't see them. Returns the prepared message list; the
/// caller's `history` is left compressed in place (the compressor mutates
/// it, matching the "replace history in-place" wording of the spec).
pub async fn prepare_messages(
    history: &mut Vec<Message>,
    system_prompt: &str,
    identity: Option<&AgentIdentity>,
    compressor: &Arc<dyn MemoryCompressor>,
    supports_vision: bool,
) -> Vec<Message> {
    compressor.compress(history).await;

    let mut prepared = Vec::with_capacity(history.len() + 2);
    prepared.push(Message::system(system_prompt));
    if let Some(identity) = identity {
        prepared.push(Message::user(format!(
            "[agent: {} ({})]",
            identity.agent_name, identity.agent_id
        )));
    }
    prepared.extend(history.iter().cloned());

    if !supports_vision {
        for message in &mut prepared {
            message.strip_images();
        }
    }

    prepared
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::NoopMemoryCompressor;
    use esprit_core::MessagePart;

    #[tokio::test]
    async fn system_prompt_is_prepended() {
        let mut history = vec![Message::user("hello")];
        let compressor: Arc<dyn MemoryCompressor> = Arc::new(NoopMemoryCompressor);
        let prepared = prepare_messages(&mut history, "be helpful", None, &compressor, true).await;
        assert_eq!(prepared[0].text(), "be helpful");
        assert_eq!(prepared[1].text(), "hello");
    }

    #[tokio::test]
    async fn identity_block_is_inserted_after_system_prompt() {
        let mut history = vec![Message::user("hello")];
        let compressor: Arc<dyn MemoryCompressor> = Arc::new(NoopMemoryCompressor);
        let identity = AgentIdentity { agent_id: "a1".into(), agent_name: "scout".into() };
        let prepared = prepare_messages(&mut history, "be helpful", Some(&identity), &compressor, true).await;
        assert!(prepared[1].text().contains("scout"));
        assert_eq!(prepared[2].text(), "hello");
    }

    #[tokio::test]
    async fn images_are_stripped_when_model_lacks_vision() {
        let mut history = vec![Message {
            role: esprit_core::Role::User,
            parts: vec![MessagePart::Image { mime_type: "image/png".into(), data: "abc".into() }],
            tool_call_id: None,
        }];
        let compressor: Arc<dyn MemoryCompressor> = Arc::new(NoopMemoryCompressor);
        let prepared = prepare_messages(&mut history, "be helpful", None, &compressor, false).await;
        assert!(!prepared.iter().any(|m| m.has_images()));
    }
}
