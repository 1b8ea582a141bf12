pub mod bridge;
pub mod delta;
pub mod snapshot;
pub mod stats;
pub mod tracer;

pub use bridge::{Subscriber, TracerBridge};
pub use delta::{diff, Delta, DeltaBatch};
pub use snapshot::{build_full_state, FullState};
pub use stats::{compute_stats, ComputedStats};
pub use tracer::{AgentRecord, RunMetadata, ToolExecutionRecord, TracerState};

use parking_lot::Mutex;
use std::sync::{Arc, OnceLock};

static GLOBAL_TRACER: OnceLock<Arc<Mutex<TracerState>>> = OnceLock::new();

/// Process-wide convenience holder for callers that don't want to thread a
/// tracer handle through every call site. Prefer passing `Arc<Mutex<TracerState>>`
/// explicitly at startup; this exists for the same reason
/// `get_global_tracer()` does in the original source.
pub fn global_tracer() -> Arc<Mutex<TracerState>> {
    GLOBAL_TRACER.get_or_init(|| Arc::new(Mutex::new(TracerState::new()))).clone()
}

#[cfg(test)]
mod global_tracer_tests {
    use super::*;

    #[test]
    fn global_tracer_is_a_singleton_handle() {
        let a = global_tracer();
        let b = global_tracer();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
