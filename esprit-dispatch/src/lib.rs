//! Dispatch and stream core: prepares messages, picks a provider and mode,
//! drives a streaming completion, and owns the outer retry/rotate/fallback
//! loop that turns individual provider faults into one resilient call.

pub mod config;
pub mod dispatcher;
pub mod memory;
pub mod message_prep;
pub mod mode_a;
pub mod mode_b;
pub mod outcome;
pub mod retry;

pub use config::DispatchConfig;
pub use dispatcher::Dispatcher;
pub use memory::{MemoryCompressor, NoopMemoryCompressor};
pub use message_prep::{prepare_messages, AgentIdentity};
pub use outcome::StreamOutcome;
