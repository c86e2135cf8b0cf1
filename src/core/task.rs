//! Task data model.
//!
//! A task is the caller-supplied unit of work. Tasks are immutable once
//! submitted; the orchestrator only reads them.

use crate::core::role::{infer_role, Role};
use crate::error::Result;
use serde::{Deserialize, Deserializer, Serialize};
use std::path::Path;

/// A single unit of work submitted to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Identifier, unique within one submission.
    pub id: String,
    /// Free-text description. Also drives role inference.
    pub description: String,
    /// Ids of tasks in the same submission that must settle before this one starts.
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Explicit role. Inferred from the description when absent.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "deserialize_role_lossy"
    )]
    pub role: Option<Role>,
}

/// Unrecognized role names become `General` instead of rejecting the task file.
fn deserialize_role_lossy<'de, D>(deserializer: D) -> std::result::Result<Option<Role>, D::Error>
where
    D: Deserializer<'de>,
{
    let name: Option<String> = Option::deserialize(deserializer)?;
    Ok(name.map(|n| Role::parse_lossy(&n)))
}

impl Task {
    pub fn new(id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            dependencies: Vec::new(),
            role: None,
        }
    }

    pub fn depends_on<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies.extend(ids.into_iter().map(Into::into));
        self
    }

    pub fn with_role(mut self, role: Role) -> Self {
        self.role = Some(role);
        self
    }

    /// The explicit role, or the one inferred from the description.
    pub fn effective_role(&self) -> Role {
        self.role.unwrap_or_else(|| infer_role(&self.description))
    }

    pub fn has_dependencies(&self) -> bool {
        !self.dependencies.is_empty()
    }
}

/// Accepted shapes of a task file.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskFile {
    List(Vec<Task>),
    Wrapped { tasks: Vec<Task> },
}

/// Parse a task list from JSON: either a bare array or `{"tasks": [...]}`.
pub fn parse_tasks(json: &str) -> Result<Vec<Task>> {
    Ok(match serde_json::from_str(json)? {
        TaskFile::List(tasks) | TaskFile::Wrapped { tasks } => tasks,
    })
}

pub fn load_tasks(path: &Path) -> Result<Vec<Task>> {
    parse_tasks(&std::fs::read_to_string(path)?)
}
