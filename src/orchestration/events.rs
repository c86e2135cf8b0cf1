//! Events published on the orchestrator's subscription surface.

use crate::core::Role;
use crate::subagent::{Signal, SubagentId};
use serde::Serialize;

/// Capacity of the broadcast channel; slow receivers observe `Lagged`.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Everything the orchestrator tells its subscribers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum OrchestratorEvent {
    /// A subagent was registered.
    Spawned { id: SubagentId, role: Role },
    /// A relayed subagent signal, tagged with the emitting subagent.
    Signal { id: SubagentId, signal: Signal },
    /// A subagent was removed from the registry.
    Terminated { id: SubagentId },
    AllTerminated,
    /// A dependency batch is about to run.
    BatchStarted { index: usize, task_ids: Vec<String> },
}

impl OrchestratorEvent {
    pub fn name(&self) -> &'static str {
        match self {
            OrchestratorEvent::Spawned { .. } => "spawn",
            OrchestratorEvent::Signal { signal, .. } => signal.kind().as_str(),
            OrchestratorEvent::Terminated { .. } => "terminate",
            OrchestratorEvent::AllTerminated => "all-terminated",
            OrchestratorEvent::BatchStarted { .. } => "batch-started",
        }
    }

    /// The subagent this event concerns, if any.
    pub fn subagent_id(&self) -> Option<SubagentId> {
        match self {
            OrchestratorEvent::Spawned { id, .. }
            | OrchestratorEvent::Signal { id, .. }
            | OrchestratorEvent::Terminated { id } => Some(*id),
            OrchestratorEvent::AllTerminated | OrchestratorEvent::BatchStarted { .. } => None,
        }
    }
}
