//! Test fixtures for integration tests.
//!
//! Provides:
//! - `ScriptedBackend`: a `TaskBackend` whose outcome is driven by the task description
//! - `FakeSubagent` / `FakeFactory`: subagents with scripted termination behaviour
//! - Predefined task sets

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;

use crew::config::{OrchestratorConfig, SubagentConfig};
use crew::core::{Role, Task};
use crew::orchestration::Orchestrator;
use crew::subagent::{
    Signal, SignalHandler, SignalHub, SignalKind, Subagent, SubagentFactory, SubagentId,
    SubagentResult, SubagentState, SubagentStatus, Subscription, TaskBackend, TaskContext,
    TaskRequest,
};
use crew::{Error, Result};

/// Backend whose behaviour is scripted by keywords in the description.
///
/// - `fail` returns an error after the delay
/// - `panic` panics
/// - anything else succeeds with `"<task_id> as <role>"`
///
/// It also records start/finish order and the peak number of concurrent runs.
pub struct ScriptedBackend {
    delay: Duration,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    timeline: Mutex<Vec<(String, &'static str)>>,
}

impl ScriptedBackend {
    pub fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            timeline: Mutex::new(Vec::new()),
        })
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// `(task_id, "start" | "end")` in the order they happened.
    pub fn timeline(&self) -> Vec<(String, &'static str)> {
        self.timeline.lock().unwrap().clone()
    }

    fn mark(&self, task_id: &str, what: &'static str) {
        self.timeline
            .lock()
            .unwrap()
            .push((task_id.to_string(), what));
    }
}

#[async_trait]
impl TaskBackend for ScriptedBackend {
    async fn run(&self, request: TaskRequest, ctx: TaskContext) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        self.mark(&request.task_id, "start");

        ctx.tool_call("sleep", serde_json::json!({ "ms": self.delay.as_millis() as u64 }));
        tokio::time::sleep(self.delay).await;
        ctx.progress(0.9, Some("almost"));

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.mark(&request.task_id, "end");

        if request.description.contains("panic") {
            panic!("scripted panic in {}", request.task_id);
        }
        if request.description.contains("fail") {
            return Err(Error::Backend(format!("{} was told to fail", request.task_id)));
        }
        Ok(format!("{} as {}", request.task_id, request.role))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Orchestrator over a [`ScriptedBackend`].
pub fn scripted_orchestrator(max: usize, delay: Duration) -> (Orchestrator, Arc<ScriptedBackend>) {
    let backend = ScriptedBackend::new(delay);
    let config = OrchestratorConfig::default().with_max_concurrent_agents(max);
    (Orchestrator::with_backend(config, backend.clone()), backend)
}

/// How a [`FakeSubagent`] responds to `terminate()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateBehaviour {
    Succeed,
    Fail,
    Hang,
}

/// A subagent that completes immediately and terminates as scripted.
pub struct FakeSubagent {
    id: SubagentId,
    role: Role,
    hub: SignalHub,
    status: Mutex<SubagentStatus>,
    behaviour: TerminateBehaviour,
    pub terminate_calls: AtomicUsize,
}

impl FakeSubagent {
    pub fn new(id: SubagentId, role: Role, behaviour: TerminateBehaviour) -> Self {
        Self {
            id,
            role,
            hub: SignalHub::new(),
            status: Mutex::new(SubagentStatus::new(id, role)),
            behaviour,
            terminate_calls: AtomicUsize::new(0),
        }
    }

    pub fn handler_count(&self) -> usize {
        self.hub.total_handlers()
    }

    /// Emit a signal as if the subagent produced it.
    pub fn emit(&self, signal: &Signal) {
        self.hub.emit(signal);
    }
}

#[async_trait]
impl Subagent for FakeSubagent {
    fn id(&self) -> SubagentId {
        self.id
    }

    fn role(&self) -> Role {
        self.role
    }

    async fn execute_task(&self, task: &Task) -> Result<SubagentResult> {
        let started = Instant::now();
        {
            let mut status = self.status.lock().unwrap();
            status.state = SubagentState::Running;
            status.task_id = Some(task.id.clone());
            status.start_time = Some(Utc::now());
        }
        self.hub.emit(&Signal::Started {
            task_id: task.id.clone(),
        });

        let status = {
            let mut status = self.status.lock().unwrap();
            status.state = SubagentState::Completed;
            status.progress = 1.0;
            status.end_time = Some(Utc::now());
            status.clone()
        };
        let result = SubagentResult::success(&task.id, "fake".to_string(), started.elapsed(), status);
        self.hub.emit(&Signal::Completed {
            result: Box::new(result.clone()),
        });
        Ok(result)
    }

    async fn terminate(&self) -> Result<()> {
        self.terminate_calls.fetch_add(1, Ordering::SeqCst);
        match self.behaviour {
            TerminateBehaviour::Succeed => {
                self.status.lock().unwrap().state = SubagentState::Terminated;
                Ok(())
            }
            TerminateBehaviour::Fail => Err(Error::Backend("teardown refused".to_string())),
            TerminateBehaviour::Hang => {
                std::future::pending::<()>().await;
                Ok(())
            }
        }
    }

    fn status(&self) -> SubagentStatus {
        self.status.lock().unwrap().clone()
    }

    fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription {
        self.hub.subscribe(kind, handler)
    }

    fn unsubscribe(&self, subscription: &Subscription) -> bool {
        self.hub.unsubscribe(subscription)
    }
}

/// Factory handing out [`FakeSubagent`]s, with per-spawn termination behaviour.
#[derive(Default)]
pub struct FakeFactory {
    script: Mutex<VecDeque<TerminateBehaviour>>,
    created: Mutex<Vec<Arc<FakeSubagent>>>,
}

impl FakeFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The n-th spawned subagent gets `script[n]`; later ones succeed.
    pub fn scripted(script: impl IntoIterator<Item = TerminateBehaviour>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into_iter().collect()),
            created: Mutex::new(Vec::new()),
        })
    }

    pub fn created(&self) -> Vec<Arc<FakeSubagent>> {
        self.created.lock().unwrap().clone()
    }
}

impl SubagentFactory for FakeFactory {
    fn create(&self, id: SubagentId, role: Role, _config: &SubagentConfig) -> Arc<dyn Subagent> {
        let behaviour = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(TerminateBehaviour::Succeed);
        let agent = Arc::new(FakeSubagent::new(id, role, behaviour));
        self.created.lock().unwrap().push(Arc::clone(&agent));
        agent
    }
}

/// Orchestrator over a [`FakeFactory`].
pub fn fake_orchestrator(config: OrchestratorConfig, factory: &Arc<FakeFactory>) -> Orchestrator {
    Orchestrator::new(config, factory.clone())
}

/// `A` (analysis), then `B` (testing) and `C` (documentation), both depending on `A`.
pub fn fan_out_tasks() -> Vec<Task> {
    vec![
        Task::new("A", "analyze code"),
        Task::new("B", "write tests").depends_on(["A"]),
        Task::new("C", "write docs").depends_on(["A"]),
    ]
}

pub fn independent_tasks(count: usize) -> Vec<Task> {
    (0..count)
        .map(|n| Task::new(format!("T{n}"), format!("task number {n}")))
        .collect()
}

/// `[{A deps [B]}, {B deps [A]}]`
pub fn two_cycle() -> Vec<Task> {
    vec![
        Task::new("A", "a").depends_on(["B"]),
        Task::new("B", "b").depends_on(["A"]),
    ]
}
