//! Role-specialised subagents.
//!
//! Each [`Role`] maps to exactly one [`RoleProfile`] in a closed dispatch table.
//! The profile frames the prompt and restricts the tools handed to the backend;
//! the lifecycle itself is shared by every role.

use crate::config::SubagentConfig;
use crate::core::{Role, Task};
use crate::error::{Error, Result};
use crate::subagent::{
    Signal, SignalHandler, SignalHub, SignalKind, Subagent, SubagentFactory, SubagentId,
    SubagentResult, SubagentState, SubagentStatus, Subscription, TaskBackend, TaskContext,
    TaskRequest,
};
use crate::util::{lock, with_optional_timeout};
use crate::{zlog_debug, zlog_warn};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio_util::sync::CancellationToken;

const READ_TOOLS: &[&str] = &["Read", "Glob", "Grep"];
const WRITE_TOOLS: &[&str] = &["Read", "Glob", "Grep", "Edit", "Write"];
const ALL_TOOLS: &[&str] = &["Read", "Glob", "Grep", "Edit", "Write", "Bash"];

/// Static behaviour of one role.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RoleProfile {
    pub role: Role,
    pub name: &'static str,
    pub system_prompt: &'static str,
    pub allowed_tools: &'static [&'static str],
}

static GENERAL: RoleProfile = RoleProfile {
    role: Role::General,
    name: "general-purpose agent",
    system_prompt: "You are a general-purpose software engineering agent. Complete the task \
                    end to end and summarise what you changed.",
    allowed_tools: ALL_TOOLS,
};

static TESTING: RoleProfile = RoleProfile {
    role: Role::Testing,
    name: "testing specialist",
    system_prompt: "You are a testing specialist. Write focused, deterministic tests, run \
                    them, and report coverage gaps you could not close.",
    allowed_tools: ALL_TOOLS,
};

static DOCUMENTATION: RoleProfile = RoleProfile {
    role: Role::Documentation,
    name: "documentation specialist",
    system_prompt: "You are a documentation specialist. Write accurate docs that match the \
                    code as it is, not as it was intended.",
    allowed_tools: WRITE_TOOLS,
};

static REFACTORING: RoleProfile = RoleProfile {
    role: Role::Refactoring,
    name: "refactoring specialist",
    system_prompt: "You are a refactoring specialist. Improve structure without changing \
                    behaviour; keep every existing test passing.",
    allowed_tools: ALL_TOOLS,
};

static ANALYSIS: RoleProfile = RoleProfile {
    role: Role::Analysis,
    name: "code analyst",
    system_prompt: "You are a code analyst. Read the code, do not modify it, and report \
                    findings with file and line references.",
    allowed_tools: READ_TOOLS,
};

static DEBUG: RoleProfile = RoleProfile {
    role: Role::Debug,
    name: "debugging specialist",
    system_prompt: "You are a debugging specialist. Reproduce the problem, find the root \
                    cause, fix it, and explain the cause.",
    allowed_tools: ALL_TOOLS,
};

static PERFORMANCE: RoleProfile = RoleProfile {
    role: Role::Performance,
    name: "performance specialist",
    system_prompt: "You are a performance specialist. Measure before and after every change \
                    and report the numbers.",
    allowed_tools: ALL_TOOLS,
};

impl RoleProfile {
    pub fn for_role(role: Role) -> &'static RoleProfile {
        match role {
            Role::General => &GENERAL,
            Role::Testing => &TESTING,
            Role::Documentation => &DOCUMENTATION,
            Role::Refactoring => &REFACTORING,
            Role::Analysis => &ANALYSIS,
            Role::Debug => &DEBUG,
            Role::Performance => &PERFORMANCE,
        }
    }

    pub fn build_prompt(&self, task: &Task) -> String {
        format!(
            "As the {}, complete task `{}`:\n\n{}",
            self.name, task.id, task.description
        )
    }

    pub fn request_for(&self, task: &Task, config: &SubagentConfig) -> TaskRequest {
        TaskRequest {
            task_id: task.id.clone(),
            description: task.description.clone(),
            role: self.role,
            prompt: self.build_prompt(task),
            system_prompt: self.system_prompt.to_string(),
            allowed_tools: self.allowed_tools.iter().map(|t| t.to_string()).collect(),
            model: config.model.clone(),
            max_turns: config.max_turns,
            timeout: config.timeout,
        }
    }
}

/// The concrete subagent: a role profile driving a [`TaskBackend`].
pub struct SpecialistSubagent {
    id: SubagentId,
    profile: &'static RoleProfile,
    config: SubagentConfig,
    backend: Arc<dyn TaskBackend>,
    hub: Arc<SignalHub>,
    status: Arc<Mutex<SubagentStatus>>,
    cancel: CancellationToken,
}

impl SpecialistSubagent {
    pub fn new(
        id: SubagentId,
        role: Role,
        config: SubagentConfig,
        backend: Arc<dyn TaskBackend>,
    ) -> Self {
        Self {
            id,
            profile: RoleProfile::for_role(role),
            config,
            backend,
            hub: Arc::new(SignalHub::new()),
            status: Arc::new(Mutex::new(SubagentStatus::new(id, role))),
            cancel: CancellationToken::new(),
        }
    }

    pub fn profile(&self) -> &'static RoleProfile {
        self.profile
    }

    /// Move to `next` if the state machine allows it.
    fn transition(&self, next: SubagentState) -> Result<()> {
        let mut status = lock(&self.status);
        if !status.state.can_transition_to(next) {
            return Err(Error::InvalidStateTransition {
                from: status.state.to_string(),
                to: next.to_string(),
            });
        }
        status.state = next;
        zlog_debug!("Subagent {} -> {}", self.id.short(), next);
        Ok(())
    }

    fn begin(&self, task: &Task) -> Result<()> {
        self.transition(SubagentState::Running)?;
        let mut status = lock(&self.status);
        status.task_id = Some(task.id.clone());
        status.progress = 0.0;
        status.start_time = Some(Utc::now());
        status.end_time = None;
        status.error = None;
        Ok(())
    }

    /// Record the end of a task. A subagent terminated mid-run stays terminated.
    fn finish(&self, outcome: &std::result::Result<String, String>) -> SubagentStatus {
        let next = match outcome {
            Ok(_) => SubagentState::Completed,
            Err(_) => SubagentState::Failed,
        };
        let _ = self.transition(next);

        let mut status = lock(&self.status);
        status.end_time = Some(Utc::now());
        match outcome {
            Ok(_) => status.progress = 1.0,
            Err(message) => status.error = Some(message.clone()),
        }
        status.clone()
    }
}

#[async_trait]
impl Subagent for SpecialistSubagent {
    fn id(&self) -> SubagentId {
        self.id
    }

    fn role(&self) -> Role {
        self.profile.role
    }

    async fn execute_task(&self, task: &Task) -> Result<SubagentResult> {
        self.begin(task)?;
        let started = Instant::now();
        self.hub.emit(&Signal::Started {
            task_id: task.id.clone(),
        });

        let request = self.profile.request_for(task, &self.config);
        let ctx = TaskContext::new(
            task.id.clone(),
            Arc::clone(&self.hub),
            Arc::clone(&self.status),
        );
        let timeout = self.config.timeout;

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err("subagent terminated".to_string()),
            run = with_optional_timeout(timeout, self.backend.run(request, ctx)) => {
                run.map_err(|e| e.to_string())
            }
        };

        let status = self.finish(&outcome);
        match outcome {
            Ok(output) => {
                let result =
                    SubagentResult::success(&task.id, output, started.elapsed(), status);
                self.hub.emit(&Signal::Completed {
                    result: Box::new(result.clone()),
                });
                Ok(result)
            }
            Err(message) => {
                zlog_warn!(
                    "Subagent {} ({}) failed task {}: {}",
                    self.id.short(),
                    self.profile.role,
                    task.id,
                    message
                );
                self.hub.emit(&Signal::Failed {
                    task_id: task.id.clone(),
                    error: message.clone(),
                });
                Err(Error::TaskExecution {
                    task_id: task.id.clone(),
                    message,
                })
            }
        }
    }

    async fn terminate(&self) -> Result<()> {
        if lock(&self.status).state == SubagentState::Terminated {
            return Ok(());
        }
        self.cancel.cancel();
        let mut status = lock(&self.status);
        status.state = SubagentState::Terminated;
        if status.end_time.is_none() && status.start_time.is_some() {
            status.end_time = Some(Utc::now());
        }
        zlog_debug!("Subagent {} terminated", self.id.short());
        Ok(())
    }

    fn status(&self) -> SubagentStatus {
        lock(&self.status).clone()
    }

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription {
        self.hub.subscribe(kind, handler)
    }

    fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.hub.unsubscribe(subscription)
    }
}

/// Default factory: role dispatch over a shared backend.
#[derive(Clone)]
pub struct SpecialistFactory {
    backend: Arc<dyn TaskBackend>,
}

impl SpecialistFactory {
    pub fn new(backend: Arc<dyn TaskBackend>) -> Self {
        Self { backend }
    }
}

impl SubagentFactory for SpecialistFactory {
    fn create(&self, id: SubagentId, role: Role, config: &SubagentConfig) -> Arc<dyn Subagent> {
        Arc::new(SpecialistSubagent::new(
            id,
            role,
            config.clone(),
            Arc::clone(&self.backend),
        ))
    }
}
