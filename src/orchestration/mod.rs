//! Orchestration layer: the subagent registry, signal relay, and the
//! dependency-batched parallel executor.

mod events;
mod orchestrator;
mod relay;

pub use events::{OrchestratorEvent, EVENT_CHANNEL_CAPACITY};
pub use orchestrator::{Orchestrator, OrchestratorStats, OrchestratorStatus};
