//! The orchestrator: a capacity-gated subagent registry that executes
//! dependency-ordered task batches in parallel.
//!
//! One `Orchestrator` is created by the composition root and torn down with
//! [`Orchestrator::terminate_all`]. Clones share the same registry.

use crate::config::{OrchestratorConfig, SubagentConfig};
use crate::core::{check_dependencies, resolve_dependencies, Role, Task};
use crate::error::{Error, Result};
use crate::orchestration::relay::{Relay, RelayState};
use crate::orchestration::{OrchestratorEvent, EVENT_CHANNEL_CAPACITY};
use crate::subagent::{
    SpecialistFactory, Subagent, SubagentFactory, SubagentId, SubagentResult, SubagentState,
    SubagentStatus, TaskBackend,
};
use crate::util::{lock, with_optional_timeout};
use crate::{zlog, zlog_debug, zlog_warn};
use futures::future::join_all;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::{broadcast, Semaphore};

/// Aggregate counts over the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct OrchestratorStatus {
    /// Registered subagents.
    pub total: usize,
    /// Subagents between `started` and `completed`/`failed`.
    pub active: usize,
    pub idle: usize,
    pub completed: usize,
    pub failed: usize,
    pub max_concurrent: usize,
}

/// Success/failure counts over the accumulated results.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct OrchestratorStats {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// `successful / total`, or `0.0` with no results.
    pub success_rate: f64,
    pub average_execution_time: Duration,
}

struct Inner {
    config: OrchestratorConfig,
    factory: Arc<dyn SubagentFactory>,
    subagents: Mutex<HashMap<SubagentId, Arc<dyn Subagent>>>,
    relays: Mutex<HashMap<SubagentId, Relay>>,
    relay: Arc<RelayState>,
    /// Throttles `execute_parallel` to the registry capacity.
    admission: Arc<Semaphore>,
}

/// Spawns, relays, and tears down subagents.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(config: OrchestratorConfig, factory: Arc<dyn SubagentFactory>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let permits = config.max_concurrent_agents.max(1);
        Self {
            inner: Arc::new(Inner {
                config,
                factory,
                subagents: Mutex::new(HashMap::new()),
                relays: Mutex::new(HashMap::new()),
                relay: Arc::new(RelayState::new(events)),
                admission: Arc::new(Semaphore::new(permits)),
            }),
        }
    }

    /// Orchestrator whose subagents are role specialists over `backend`.
    pub fn with_backend(config: OrchestratorConfig, backend: Arc<dyn TaskBackend>) -> Self {
        Self::new(config, Arc::new(SpecialistFactory::new(backend)))
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.inner.config
    }

    /// Register a new subagent for `role`.
    ///
    /// Fails with [`Error::CapacityExceeded`] when the registry is full.
    pub fn spawn(&self, role: Role, config: SubagentConfig) -> Result<Arc<dyn Subagent>> {
        let max = self.inner.config.max_concurrent_agents;
        let config = config.resolve(&self.inner.config);
        let agent = {
            let mut subagents = lock(&self.inner.subagents);
            if subagents.len() >= max {
                return Err(Error::CapacityExceeded { max });
            }
            let id = SubagentId::new();
            let agent = self.inner.factory.create(id, role, &config);
            subagents.insert(id, Arc::clone(&agent));
            self.attach_relay(&agent);
            agent
        };
        let id = agent.id();

        zlog_debug!("Spawned subagent {} role={}", id.short(), role);
        self.inner
            .relay
            .publish(OrchestratorEvent::Spawned { id, role });
        Ok(agent)
    }

    fn attach_relay(&self, agent: &Arc<dyn Subagent>) {
        let mut relays = lock(&self.inner.relays);
        if relays.contains_key(&agent.id()) {
            return;
        }
        let relay = self.inner.relay.attach(agent.as_ref());
        relays.insert(agent.id(), relay);
    }

    fn detach_relay(&self, agent: &dyn Subagent) {
        let relay = lock(&self.inner.relays).remove(&agent.id());
        if let Some(relay) = relay {
            self.inner.relay.detach(agent, relay);
        }
    }

    /// Await `agent.terminate()`, bounded by the configured termination timeout.
    async fn await_termination(&self, agent: &Arc<dyn Subagent>) -> Result<()> {
        let timeout = self.inner.config.termination_timeout();
        with_optional_timeout(timeout, agent.terminate())
            .await
            .map_err(|e| Error::Termination {
                id: agent.id(),
                message: e.to_string(),
            })
    }

    /// Detach, terminate, and deregister one subagent. Unknown ids are a no-op.
    ///
    /// The subagent is removed even when its termination fails or times out;
    /// the failure is still returned.
    pub async fn terminate_subagent(&self, id: SubagentId) -> Result<()> {
        let Some(agent) = self.subagent(id) else {
            return Ok(());
        };
        self.detach_relay(agent.as_ref());

        let outcome = self.await_termination(&agent).await;
        if let Err(e) = &outcome {
            zlog_warn!("{}; removing it anyway", e);
        }

        if lock(&self.inner.subagents).remove(&id).is_some() {
            zlog_debug!("Terminated subagent {}", id.short());
            self.inner
                .relay
                .publish(OrchestratorEvent::Terminated { id });
        }
        outcome
    }

    /// Terminate every registered subagent concurrently.
    ///
    /// Individual failures are logged; the registry is always emptied.
    pub async fn terminate_all(&self) {
        let agents: Vec<Arc<dyn Subagent>> =
            lock(&self.inner.subagents).values().cloned().collect();
        for agent in &agents {
            self.detach_relay(agent.as_ref());
        }

        let outcomes = join_all(agents.iter().map(|agent| self.await_termination(agent))).await;
        let failures = outcomes
            .into_iter()
            .filter_map(|outcome| outcome.err())
            .inspect(|e| zlog_warn!("{}", e))
            .count();

        lock(&self.inner.subagents).clear();
        lock(&self.inner.relays).clear();
        self.inner.relay.reset_active();
        zlog_debug!(
            "Terminated all subagents ({} total, {} failed)",
            agents.len(),
            failures
        );
        self.inner.relay.publish(OrchestratorEvent::AllTerminated);
    }

    /// Run `tasks` in dependency order. Tasks in one batch run concurrently.
    ///
    /// Fails before spawning anything if the dependency graph is invalid.
    /// Otherwise returns one result per task, in batch order, whether or not the
    /// task succeeded.
    pub async fn execute_parallel(&self, tasks: &[Task]) -> Result<Vec<SubagentResult>> {
        check_dependencies(tasks)?;
        let batches = resolve_dependencies(tasks);
        let by_id: HashMap<&str, &Task> = tasks.iter().map(|t| (t.id.as_str(), t)).collect();

        let mut results = Vec::with_capacity(tasks.len());
        for (index, batch) in batches.into_iter().enumerate() {
            let mut runnable = Vec::with_capacity(batch.len());
            for id in batch {
                match by_id.get(id.as_str()) {
                    Some(task) => runnable.push((*task).clone()),
                    None => zlog_warn!(
                        "{}; skipping",
                        Error::UnknownTaskReference {
                            task_id: format!("batch {}", index),
                            reference: id,
                        }
                    ),
                }
            }

            let task_ids: Vec<String> = runnable.iter().map(|t| t.id.clone()).collect();
            zlog!("Batch {} starting: {:?}", index, task_ids);
            self.inner
                .relay
                .publish(OrchestratorEvent::BatchStarted { index, task_ids });

            let outcomes = join_all(runnable.into_iter().map(|task| self.run_task(task))).await;
            results.extend(outcomes);
        }
        Ok(results)
    }

    /// Admit one task, then run it on its own tokio task. Never fails: errors
    /// become failed results.
    ///
    /// Once admitted, the task is detached from the caller, so dropping the
    /// `execute_parallel` future does not leave its subagent registered.
    async fn run_task(&self, task: Task) -> SubagentResult {
        let permit = Arc::clone(&self.inner.admission).acquire_owned().await.ok();
        let role = task.effective_role();
        let started = Instant::now();

        let this = self.clone();
        let job = task.clone();
        let handle = tokio::spawn(async move {
            let _permit = permit;
            this.spawn_execute_terminate(job, role, started).await
        });
        match handle.await {
            Ok(result) => result,
            Err(e) => {
                let error = Error::TaskJoin(e.to_string()).to_string();
                self.fail(&task, role, error, started, None)
            }
        }
    }

    /// Spawn, execute, and always terminate.
    async fn spawn_execute_terminate(
        &self,
        task: Task,
        role: Role,
        started: Instant,
    ) -> SubagentResult {
        let agent = match self.spawn(role, SubagentConfig::default()) {
            Ok(agent) => agent,
            Err(e) => return self.fail(&task, role, e.to_string(), started, None),
        };
        let id = agent.id();

        let runner = Arc::clone(&agent);
        let job = task.clone();
        let outcome = tokio::spawn(async move { runner.execute_task(&job).await })
            .await
            .map_err(|e| Error::TaskJoin(e.to_string()))
            .and_then(|inner| inner);

        let result = match outcome {
            Ok(result) => result,
            Err(e) => self.fail(&task, role, e.to_string(), started, Some(agent.status())),
        };

        if let Err(e) = self.terminate_subagent(id).await {
            zlog_warn!("Cleanup after task {}: {}", task.id, e);
        }
        result
    }

    fn fail(
        &self,
        task: &Task,
        role: Role,
        error: String,
        started: Instant,
        status: Option<SubagentStatus>,
    ) -> SubagentResult {
        zlog_warn!("Task {} failed: {}", task.id, error);
        let result = SubagentResult::failure(&task.id, role, error, started.elapsed(), status);
        self.inner.relay.record(result.clone());
        result
    }

    pub fn subagent(&self, id: SubagentId) -> Option<Arc<dyn Subagent>> {
        lock(&self.inner.subagents).get(&id).cloned()
    }

    pub fn subagent_count(&self) -> usize {
        lock(&self.inner.subagents).len()
    }

    pub fn active_count(&self) -> usize {
        self.inner.relay.active()
    }

    pub fn get_status(&self) -> OrchestratorStatus {
        let mut status = OrchestratorStatus {
            active: self.active_count(),
            max_concurrent: self.inner.config.max_concurrent_agents,
            ..Default::default()
        };
        for agent in lock(&self.inner.subagents).values() {
            status.total += 1;
            match agent.status().state {
                SubagentState::Idle => status.idle += 1,
                SubagentState::Completed => status.completed += 1,
                SubagentState::Failed => status.failed += 1,
                SubagentState::Running | SubagentState::Terminated => {}
            }
        }
        status
    }

    pub fn get_stats(&self) -> OrchestratorStats {
        let results = self.inner.relay.results();
        let total = results.len();
        if total == 0 {
            return OrchestratorStats::default();
        }
        let successful = results.iter().filter(|r| r.success).count();
        let elapsed: Duration = results.iter().map(|r| r.execution_time).sum();
        OrchestratorStats {
            total,
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64,
            average_execution_time: elapsed / total as u32,
        }
    }

    /// Statuses of registered subagents currently running a task.
    pub fn get_active_subagents(&self) -> Vec<SubagentStatus> {
        lock(&self.inner.subagents)
            .values()
            .map(|agent| agent.status())
            .filter(|status| status.state == SubagentState::Running)
            .collect()
    }

    pub fn monitor(&self, id: SubagentId) -> Option<SubagentStatus> {
        self.subagent(id).map(|agent| agent.status())
    }

    pub fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.inner.relay.subscribe()
    }

    pub fn result(&self, task_id: &str) -> Option<SubagentResult> {
        self.inner.relay.result(task_id)
    }

    pub fn results(&self) -> Vec<SubagentResult> {
        self.inner.relay.results()
    }

    pub fn clear_results(&self) {
        self.inner.relay.clear_results();
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("config", &self.inner.config)
            .field("subagents", &self.subagent_count())
            .field("active", &self.active_count())
            .finish()
    }
}
