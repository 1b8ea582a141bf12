use async_trait::async_trait;
use esprit_core::Message;

/// The external memory compressor (summarizes/truncates conversation
/// history once it grows too large). Out of scope per spec §1 — modeled as
/// a trait object so the dispatcher stays testable without the real
/// summarizer.
#[async_trait]
pub trait MemoryCompressor: Send + Sync {
    async fn compress(&self, history: &mut Vec<Message>);
}

/// Never compresses. The default for tests and for callers that haven't
/// wired a real compressor.
pub struct NoopMemoryCompressor;

#[async_trait]
impl MemoryCompressor for NoopMemoryCompressor {
    async fn compress(&self, _history: &mut Vec<Message>) {}
}
