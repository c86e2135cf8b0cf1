//! Core domain models: tasks, roles, and the dependency graph.

pub mod dag;
pub mod role;
pub mod task;

pub use dag::{check_dependencies, resolve_dependencies, validate_dependencies, TaskGraph};
pub use role::{infer_role, Role};
pub use task::{load_tasks, parse_tasks, Task};
