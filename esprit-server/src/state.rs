use esprit_fanout::TracerBridge;
use std::sync::Arc;

/// Shared application state handed to every axum handler.
pub struct AppState {
    pub bridge: Arc<TracerBridge>,
}

impl AppState {
    pub fn new(bridge: Arc<TracerBridge>) -> Self {
        Self { bridge }
    }
}
