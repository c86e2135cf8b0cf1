//! Republishes subagent signals on the orchestrator's event channel.
//!
//! The relay owns the shared bookkeeping every handler touches: the
//! task-id to result map and the active counter. Each attached subagent gets
//! a [`Relay`] holding the exact subscription tokens this orchestrator
//! registered, so detaching never disturbs anyone else's handlers.

use crate::orchestration::OrchestratorEvent;
use crate::subagent::{Signal, SignalKind, Subagent, SubagentId, SubagentResult, Subscription};
use crate::util::lock;
use crate::zlog_trace;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

/// Handlers attached to one subagent.
#[derive(Debug)]
pub(crate) struct Relay {
    subscriptions: Vec<Subscription>,
    /// Set between this subagent's `started` and its `completed`/`failed`.
    running: Arc<AtomicBool>,
}

#[cfg(test)]
impl Relay {
    fn subscriptions(&self) -> &[Subscription] {
        &self.subscriptions
    }
}

/// State shared by every relay handler of one orchestrator.
#[derive(Debug)]
pub(crate) struct RelayState {
    results: Mutex<HashMap<String, SubagentResult>>,
    active: AtomicUsize,
    events: broadcast::Sender<OrchestratorEvent>,
}

impl RelayState {
    pub(crate) fn new(events: broadcast::Sender<OrchestratorEvent>) -> Self {
        Self {
            results: Mutex::new(HashMap::new()),
            active: AtomicUsize::new(0),
            events,
        }
    }

    /// Attach one handler per signal kind to `agent`.
    pub(crate) fn attach(self: &Arc<Self>, agent: &dyn Subagent) -> Relay {
        let id = agent.id();
        let running = Arc::new(AtomicBool::new(false));
        let subscriptions = SignalKind::ALL
            .iter()
            .map(|&kind| {
                let state = Arc::clone(self);
                let running = Arc::clone(&running);
                agent.subscribe(
                    kind,
                    Arc::new(move |signal: &Signal| state.on_signal(id, &running, signal)),
                )
            })
            .collect();
        Relay {
            subscriptions,
            running,
        }
    }

    /// Remove exactly the handlers in `relay`. Returns how many were still attached.
    ///
    /// A subagent detached mid-task will never report its end to us, so its
    /// contribution to the active count is withdrawn here.
    pub(crate) fn detach(&self, agent: &dyn Subagent, relay: Relay) -> usize {
        let removed = relay
            .subscriptions
            .iter()
            .filter(|sub| agent.unsubscribe(sub))
            .count();
        if relay.running.swap(false, Ordering::SeqCst) {
            self.decrement_active();
        }
        removed
    }

    fn on_signal(&self, id: SubagentId, running: &AtomicBool, signal: &Signal) {
        zlog_trace!("Relay {} {} task={}", id.short(), signal.kind(), signal.task_id());
        match signal {
            Signal::Started { .. } => {
                if !running.swap(true, Ordering::SeqCst) {
                    self.active.fetch_add(1, Ordering::SeqCst);
                }
            }
            Signal::Completed { result } => {
                if running.swap(false, Ordering::SeqCst) {
                    self.decrement_active();
                }
                self.record(result.as_ref().clone());
            }
            Signal::Failed { .. } => {
                if running.swap(false, Ordering::SeqCst) {
                    self.decrement_active();
                }
            }
            Signal::Progress { .. } | Signal::ToolCall { .. } | Signal::ToolResult { .. } => {}
        }
        self.publish(OrchestratorEvent::Signal {
            id,
            signal: signal.clone(),
        });
    }

    fn decrement_active(&self) {
        let _ = self
            .active
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    pub(crate) fn active(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn reset_active(&self) {
        self.active.store(0, Ordering::SeqCst);
    }

    pub(crate) fn record(&self, result: SubagentResult) {
        lock(&self.results).insert(result.task_id.clone(), result);
    }

    pub(crate) fn result(&self, task_id: &str) -> Option<SubagentResult> {
        lock(&self.results).get(task_id).cloned()
    }

    pub(crate) fn results(&self) -> Vec<SubagentResult> {
        lock(&self.results).values().cloned().collect()
    }

    pub(crate) fn clear_results(&self) {
        lock(&self.results).clear();
    }

    /// Send to subscribers. Having none is not an error.
    pub(crate) fn publish(&self, event: OrchestratorEvent) {
        let _ = self.events.send(event);
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<OrchestratorEvent> {
        self.events.subscribe()
    }
}
