//! Subagents: the workers that execute one task each.
//!
//! The orchestrator only depends on the [`Subagent`] contract. The concrete
//! worker shipped with crew is [`SpecialistSubagent`], whose behaviour is chosen
//! per [`Role`] and whose actual reasoning is delegated to a [`TaskBackend`].

mod backend;
mod claude;
mod signal;
mod specialist;

pub use backend::{TaskBackend, TaskContext, TaskRequest};
pub use claude::{ClaudeBackend, ClaudeResponse, ResultType};
pub use signal::{Signal, SignalHandler, SignalHub, SignalKind, Subscription, SubscriptionId};
pub use specialist::{RoleProfile, SpecialistFactory, SpecialistSubagent};

use crate::config::SubagentConfig;
use crate::core::{Role, Task};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Unique identifier for a spawned subagent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubagentId(pub Uuid);

impl SubagentId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return first 8 characters of the UUID for display.
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for SubagentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SubagentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for SubagentId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

/// Lifecycle state of a subagent.
///
/// `Idle -> Running -> {Completed | Failed}`; `Terminated` is reachable from
/// every state and is final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubagentState {
    #[default]
    Idle,
    Running,
    Completed,
    Failed,
    Terminated,
}

impl SubagentState {
    pub fn can_transition_to(&self, next: SubagentState) -> bool {
        use SubagentState::*;
        matches!(
            (self, next),
            (Idle, Running)
                | (Running, Completed)
                | (Running, Failed)
                | (Idle | Running | Completed | Failed, Terminated)
        )
    }

    pub fn is_finished(&self) -> bool {
        matches!(
            self,
            SubagentState::Completed | SubagentState::Failed | SubagentState::Terminated
        )
    }
}

impl std::fmt::Display for SubagentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubagentState::Idle => write!(f, "idle"),
            SubagentState::Running => write!(f, "running"),
            SubagentState::Completed => write!(f, "completed"),
            SubagentState::Failed => write!(f, "failed"),
            SubagentState::Terminated => write!(f, "terminated"),
        }
    }
}

/// Snapshot of one subagent's current task execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentStatus {
    pub id: SubagentId,
    pub task_id: Option<String>,
    pub role: Role,
    pub state: SubagentState,
    /// Fraction in `0.0..=1.0`.
    pub progress: f32,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SubagentStatus {
    pub fn new(id: SubagentId, role: Role) -> Self {
        Self {
            id,
            task_id: None,
            role,
            state: SubagentState::Idle,
            progress: 0.0,
            start_time: None,
            end_time: None,
            error: None,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

/// The outcome of one task. Produced for every submitted task, success or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubagentResult {
    /// The subagent that ran the task; `None` if no subagent could be spawned.
    pub id: Option<SubagentId>,
    pub task_id: String,
    pub role: Role,
    pub success: bool,
    pub output: String,
    pub error: Option<String>,
    #[serde(rename = "execution_time_ms", with = "duration_ms")]
    pub execution_time: Duration,
    /// Final status snapshot; `None` when no subagent was spawned.
    pub status: Option<SubagentStatus>,
}

impl SubagentResult {
    pub fn success(
        task_id: &str,
        output: String,
        execution_time: Duration,
        status: SubagentStatus,
    ) -> Self {
        Self {
            id: Some(status.id),
            task_id: task_id.to_string(),
            role: status.role,
            success: true,
            output,
            error: None,
            execution_time,
            status: Some(status),
        }
    }

    /// A failed outcome. Elapsed time is measured the same way as for successes.
    pub fn failure(
        task_id: &str,
        role: Role,
        error: impl Into<String>,
        execution_time: Duration,
        status: Option<SubagentStatus>,
    ) -> Self {
        Self {
            id: status.as_ref().map(|s| s.id),
            task_id: task_id.to_string(),
            role,
            success: false,
            output: String::new(),
            error: Some(error.into()),
            execution_time,
            status,
        }
    }
}

/// The worker contract the orchestrator drives.
#[async_trait]
pub trait Subagent: Send + Sync {
    fn id(&self) -> SubagentId;

    fn role(&self) -> Role;

    /// Run one task. Emits `started`, any number of `progress`/`tool-*` signals,
    /// then exactly one of `completed` or `failed`.
    async fn execute_task(&self, task: &Task) -> Result<SubagentResult>;

    /// Stop in-flight work and release resources. Idempotent; safe in every state.
    async fn terminate(&self) -> Result<()>;

    fn status(&self) -> SubagentStatus;

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription;

    fn unsubscribe(&self, subscription: &Subscription) -> bool;
}

/// Builds the subagent for a role. The returned subagent must report `id`.
pub trait SubagentFactory: Send + Sync {
    fn create(&self, id: SubagentId, role: Role, config: &SubagentConfig) -> Arc<dyn Subagent>;
}
