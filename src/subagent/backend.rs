//! The seam between a subagent and the reasoning loop that does its work.

use crate::core::Role;
use crate::error::Result;
use crate::subagent::{Signal, SignalHub, SubagentStatus};
use crate::util::lock;
use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Everything a backend needs to carry out one task.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskRequest {
    pub task_id: String,
    pub description: String,
    pub role: Role,
    /// Role-framed prompt built from the description.
    pub prompt: String,
    pub system_prompt: String,
    pub allowed_tools: Vec<String>,
    pub model: Option<String>,
    pub max_turns: Option<u32>,
    pub timeout: Option<Duration>,
}

/// Executes a task and returns its textual output.
///
/// Implementations report intermediate progress through the [`TaskContext`].
/// The future may be dropped at any await point when the subagent is terminated.
#[async_trait]
pub trait TaskBackend: Send + Sync {
    async fn run(&self, request: TaskRequest, ctx: TaskContext) -> Result<String>;

    fn name(&self) -> &str {
        "backend"
    }
}

/// Reporting handle given to a backend for one task.
#[derive(Clone)]
pub struct TaskContext {
    task_id: String,
    hub: Arc<SignalHub>,
    status: Arc<Mutex<SubagentStatus>>,
}

impl TaskContext {
    pub(crate) fn new(
        task_id: String,
        hub: Arc<SignalHub>,
        status: Arc<Mutex<SubagentStatus>>,
    ) -> Self {
        Self {
            task_id,
            hub,
            status,
        }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Report progress; values are clamped to `0.0..=1.0`.
    pub fn progress(&self, progress: f32, message: Option<&str>) {
        let progress = if progress.is_nan() {
            0.0
        } else {
            progress.clamp(0.0, 1.0)
        };
        lock(&self.status).progress = progress;
        self.hub.emit(&Signal::Progress {
            task_id: self.task_id.clone(),
            progress,
            message: message.map(str::to_string),
        });
    }

    pub fn tool_call(&self, tool: &str, input: serde_json::Value) {
        self.hub.emit(&Signal::ToolCall {
            task_id: self.task_id.clone(),
            tool: tool.to_string(),
            input,
        });
    }

    pub fn tool_result(&self, tool: &str, output: serde_json::Value) {
        self.hub.emit(&Signal::ToolResult {
            task_id: self.task_id.clone(),
            tool: tool.to_string(),
            output,
        });
    }
}

impl std::fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskContext")
            .field("task_id", &self.task_id)
            .finish()
    }
}
