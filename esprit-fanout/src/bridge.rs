use crate::delta::{diff, DeltaBatch};
use crate::snapshot::{build_full_state, FullState};
use crate::stats::compute_stats;
use crate::tracer::TracerState;
use async_trait::async_trait;
use esprit_pricing::PricingDb;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;

/// Poll cadence for the fan-out loop. 500ms balances perceived liveness
/// against redundant diffing of a fast-moving tracer.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// A transport-agnostic sink for fan-out payloads. `esprit-server` wires
/// this to a WebSocket connection; tests wire it to an in-memory buffer.
/// `send` returning `Err` marks the subscriber dead and prunes it on the
/// next poll, mirroring a WebSocket write failing after the peer vanishes.
#[async_trait]
pub trait Subscriber: Send + Sync {
    async fn send(&self, payload: serde_json::Value) -> Result<(), ()>;
}

struct SubscriberEntry {
    id: u64,
    subscriber: Arc<dyn Subscriber>,
}

/// Bridges a shared [`TracerState`] to any number of live subscribers,
/// polling at a fixed cadence and pushing only what changed since the last
/// poll. New subscribers receive a `full_state` payload immediately on
/// subscribe so they never have to reconstruct history from deltas alone.
pub struct TracerBridge {
    tracer: Arc<Mutex<TracerState>>,
    pricing: Arc<PricingDb>,
    model: Mutex<String>,
    started_at: std::time::Instant,
    subscribers: Mutex<Vec<SubscriberEntry>>,
    next_subscriber_id: Mutex<u64>,
    last_snapshot: Mutex<Option<FullState>>,
}

impl TracerBridge {
    pub fn new(tracer: Arc<Mutex<TracerState>>, pricing: Arc<PricingDb>, model: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            tracer,
            pricing,
            model: Mutex::new(model.into()),
            started_at: std::time::Instant::now(),
            subscribers: Mutex::new(Vec::new()),
            next_subscriber_id: Mutex::new(0),
            last_snapshot: Mutex::new(None),
        })
    }

    pub fn set_model(&self, model: impl Into<String>) {
        *self.model.lock() = model.into();
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> u64 {
        let mut next_id = self.next_subscriber_id.lock();
        let id = *next_id;
        *next_id += 1;
        self.subscribers.lock().push(SubscriberEntry { id, subscriber });
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        self.subscribers.lock().retain(|entry| entry.id != id);
    }

    pub fn full_state(&self) -> FullState {
        let tracer = self.tracer.lock();
        let model = self.model.lock().clone();
        let elapsed = self.started_at.elapsed().as_secs_f64();
        let stats = compute_stats(&tracer.aggregate_stats(), &model, elapsed, &self.pricing);
        build_full_state(&tracer, stats)
    }

    pub fn get_screenshot(&self, agent_id: &str) -> (Option<String>, String) {
        self.tracer.lock().get_screenshot(agent_id)
    }

    /// Computes the current snapshot, diffs it against the last poll, and
    /// fans the resulting batch out to every live subscriber. Returns the
    /// batch so callers (and tests) can inspect what was sent without a
    /// subscriber round-trip. A no-op (spec §4.5: "while at least one client
    /// is subscribed") when nobody is listening, so an idle server doesn't
    /// pay for tracer snapshots and diffs nobody will see.
    pub async fn poll_once(&self) -> DeltaBatch {
        if self.subscribers.lock().is_empty() {
            return DeltaBatch { deltas: Vec::new() };
        }
        let current = self.full_state();
        let batch = {
            let mut last = self.last_snapshot.lock();
            let batch = match last.as_ref() {
                Some(prev) => diff(prev, &current),
                None => DeltaBatch { deltas: Vec::new() },
            };
            *last = Some(current);
            batch
        };

        if !batch.is_empty() {
            self.broadcast(serde_json::json!({ "type": "delta_batch", "deltas": batch.deltas })).await;
        }
        batch
    }

    async fn broadcast(&self, payload: serde_json::Value) {
        let targets: Vec<SubscriberEntry> = {
            let subs = self.subscribers.lock();
            subs.iter().map(|e| SubscriberEntry { id: e.id, subscriber: e.subscriber.clone() }).collect()
        };
        let mut dead = Vec::new();
        for entry in targets {
            if entry.subscriber.send(payload.clone()).await.is_err() {
                dead.push(entry.id);
            }
        }
        if !dead.is_empty() {
            self.subscribers.lock().retain(|e| !dead.contains(&e.id));
        }
    }

    /// Sends the current full state to one subscriber, used when it first
    /// connects so it doesn't need to wait for the next delta poll.
    pub async fn send_full_state_to(&self, subscriber: &Arc<dyn Subscriber>) {
        let state = self.full_state();
        let _ = subscriber
            .send(serde_json::json!({ "type": "full_state", "state": state }))
            .await;
    }

    /// Spawns the background poll loop. Runs until the returned handle is
    /// dropped/aborted; `esprit-server` owns the handle's lifetime.
    pub fn spawn_poll_loop(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let bridge = self.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(POLL_INTERVAL);
            loop {
                interval.tick().await;
                bridge.poll_once().await;
            }
        })
    }
}
