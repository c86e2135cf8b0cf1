//! Per-subagent lifecycle signals and their subscription registry.
//!
//! Every subagent owns a [`SignalHub`]. Subscribers register one handler per
//! [`SignalKind`] and receive a [`Subscription`] token; handing the token back to
//! [`SignalHub::unsubscribe`] removes exactly that handler and nothing else.

use crate::subagent::SubagentResult;
use crate::util::lock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// The signal kinds a subagent emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SignalKind {
    Started,
    Completed,
    Failed,
    Progress,
    ToolCall,
    ToolResult,
}

impl SignalKind {
    pub const ALL: [SignalKind; 6] = [
        SignalKind::Started,
        SignalKind::Completed,
        SignalKind::Failed,
        SignalKind::Progress,
        SignalKind::ToolCall,
        SignalKind::ToolResult,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalKind::Started => "started",
            SignalKind::Completed => "completed",
            SignalKind::Failed => "failed",
            SignalKind::Progress => "progress",
            SignalKind::ToolCall => "tool-call",
            SignalKind::ToolResult => "tool-result",
        }
    }
}

impl std::fmt::Display for SignalKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A signal emitted by a subagent while it works on a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Signal {
    Started {
        task_id: String,
    },
    Completed {
        result: Box<SubagentResult>,
    },
    Failed {
        task_id: String,
        error: String,
    },
    Progress {
        task_id: String,
        /// Fraction in `0.0..=1.0`.
        progress: f32,
        message: Option<String>,
    },
    ToolCall {
        task_id: String,
        tool: String,
        input: serde_json::Value,
    },
    ToolResult {
        task_id: String,
        tool: String,
        output: serde_json::Value,
    },
}

impl Signal {
    pub fn kind(&self) -> SignalKind {
        match self {
            Signal::Started { .. } => SignalKind::Started,
            Signal::Completed { .. } => SignalKind::Completed,
            Signal::Failed { .. } => SignalKind::Failed,
            Signal::Progress { .. } => SignalKind::Progress,
            Signal::ToolCall { .. } => SignalKind::ToolCall,
            Signal::ToolResult { .. } => SignalKind::ToolResult,
        }
    }

    pub fn task_id(&self) -> &str {
        match self {
            Signal::Completed { result } => &result.task_id,
            Signal::Started { task_id }
            | Signal::Failed { task_id, .. }
            | Signal::Progress { task_id, .. }
            | Signal::ToolCall { task_id, .. }
            | Signal::ToolResult { task_id, .. } => task_id,
        }
    }
}

/// Callback invoked synchronously for every matching signal.
pub type SignalHandler = Arc<dyn Fn(&Signal) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Token returned by `subscribe`; the only way to remove that handler again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Subscription {
    pub kind: SignalKind,
    pub id: SubscriptionId,
}

/// Handler registry for a single subagent.
#[derive(Default)]
pub struct SignalHub {
    next_id: AtomicU64,
    handlers: Mutex<HashMap<SignalKind, Vec<(SubscriptionId, SignalHandler)>>>,
}

impl SignalHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, kind: SignalKind, handler: SignalHandler) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.handlers)
            .entry(kind)
            .or_default()
            .push((id, handler));
        Subscription { kind, id }
    }

    /// Remove the handler behind `subscription`. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, subscription: &Subscription) -> bool {
        let mut handlers = lock(&self.handlers);
        let Some(list) = handlers.get_mut(&subscription.kind) else {
            return false;
        };
        let before = list.len();
        list.retain(|(id, _)| *id != subscription.id);
        before != list.len()
    }

    /// Deliver `signal` to its handlers in subscription order.
    ///
    /// Handlers run outside the registry lock, so a handler may unsubscribe itself.
    pub fn emit(&self, signal: &Signal) {
        let handlers: Vec<SignalHandler> = lock(&self.handlers)
            .get(&signal.kind())
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        for handler in handlers {
            handler(signal);
        }
    }

    pub fn handler_count(&self, kind: SignalKind) -> usize {
        lock(&self.handlers).get(&kind).map_or(0, Vec::len)
    }

    pub fn total_handlers(&self) -> usize {
        lock(&self.handlers).values().map(Vec::len).sum()
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("handlers", &self.total_handlers())
            .finish()
    }
}
