use async_trait::async_trait;
use esprit_fanout::Subscriber;
use tokio::sync::mpsc::UnboundedSender;

/// Bridges a [`TracerBridge`](esprit_fanout::TracerBridge) subscriber to a
/// single WebSocket connection's outgoing channel. `send` only fails once
/// the connection's receiving half has dropped, at which point the bridge
/// prunes this entry on its next poll.
pub struct WsSubscriber {
    tx: UnboundedSender<serde_json::Value>,
}

impl WsSubscriber {
    pub fn new(tx: UnboundedSender<serde_json::Value>) -> Self {
        Self { tx }
    }
}

#[async_trait]
impl Subscriber for WsSubscriber {
    async fn send(&self, payload: serde_json::Value) -> Result<(), ()> {
        self.tx.send(payload).map_err(|_| ())
    }
}
