use thiserror::Error;

use crate::subagent::SubagentId;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("No home directory")]
    NoHomeDir,

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Task join error: {0}")]
    TaskJoin(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Claude binary not found in PATH")]
    ClaudeBinaryNotFound,

    #[error("Maximum concurrent agents ({max}) reached")]
    CapacityExceeded { max: usize },

    #[error("Circular dependency detected: {}", path.join(" -> "))]
    CircularDependency { path: Vec<String> },

    #[error("Task {task_id} references unknown task {reference}")]
    UnknownTaskReference { task_id: String, reference: String },

    #[error("Task {task_id} failed: {message}")]
    TaskExecution { task_id: String, message: String },

    #[error("Failed to terminate subagent {id}: {message}")]
    Termination { id: SubagentId, message: String },

    #[error("Subagent not found: {id}")]
    SubagentNotFound { id: SubagentId },

    #[error("Invalid subagent state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },
}

pub type Result<T> = std::result::Result<T, Error>;
