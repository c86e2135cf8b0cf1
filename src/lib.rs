pub mod config;
pub mod core;
pub mod error;
pub mod log;
pub mod orchestration;
pub mod subagent;
pub mod util;

pub use config::{Config, OrchestratorConfig, SubagentConfig};
pub use core::{
    check_dependencies, infer_role, resolve_dependencies, validate_dependencies, Role, Task,
};
pub use error::{Error, Result};
pub use orchestration::{Orchestrator, OrchestratorEvent, OrchestratorStats, OrchestratorStatus};
pub use subagent::{
    Subagent, SubagentFactory, SubagentId, SubagentResult, SubagentState, SubagentStatus,
};
