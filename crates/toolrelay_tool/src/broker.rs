//! Invocation broker for tool calls that cross the process boundary.
//!
//! Each call parks a oneshot sender in the pending table under a fresh
//! correlation id, emits an event, and waits. Whichever path removes the id
//! from the table first (reply, timeout, cancellation) resolves the call;
//! every later attempt finds the id gone and does nothing.

use crate::boundary::{BoundarySink, ToolInvocationEvent, ToolResultPayload};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;
use toolrelay_core::{InvocationId, PlainMap};
use tracing::{debug, info, warn};

/// Default time a tool call may stay pending
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_millis(30_000);

/// Result text used when a successful reply carries no result
pub const NO_RESULT: &str = "No result";

/// Error text used when a failed reply carries no error
pub const UNKNOWN_FAILURE: &str = "unknown";

/// Terminal failure of a tool call
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ToolError {
    /// The other side ran the tool and reported failure
    #[error("Tool execution failed: {message}")]
    ExecutionFailed {
        /// Failure text from the other side
        message: String,
    },

    /// No reply arrived in time
    #[error("Tool execution timeout")]
    Timeout,

    /// The owning session was torn down
    #[error("Module reference lost")]
    ModuleGone,
}

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerConfig {
    /// How long a call may stay pending
    pub timeout: Duration,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }
}

/// One in-flight call
#[derive(Debug)]
struct PendingInvocation {
    name: String,
    created_at: Instant,
    resolve: oneshot::Sender<Result<String, ToolError>>,
}

/// Diagnostic view of a pending call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSnapshot {
    /// Correlation id
    pub id: InvocationId,
    /// Tool name
    pub name: String,
    /// Time spent pending so far
    pub age: Duration,
}

#[derive(Debug, Default)]
struct PendingTable {
    entries: HashMap<InvocationId, PendingInvocation>,
    closed: bool,
}

/// Correlates outbound tool requests with their replies
pub struct InvocationBroker {
    sink: Arc<dyn BoundarySink>,
    pending: Mutex<PendingTable>,
    timeout_ms: AtomicU64,
}

impl InvocationBroker {
    /// Create a broker with the default configuration
    #[must_use]
    pub fn new(sink: Arc<dyn BoundarySink>) -> Self {
        Self::with_config(sink, BrokerConfig::default())
    }

    /// Create a broker with an explicit configuration
    #[must_use]
    pub fn with_config(sink: Arc<dyn BoundarySink>, config: BrokerConfig) -> Self {
        Self {
            sink,
            pending: Mutex::new(PendingTable::default()),
            timeout_ms: AtomicU64::new(duration_millis(config.timeout)),
        }
    }

    /// Current per-call timeout
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.load(Ordering::Relaxed))
    }

    /// Change the timeout for calls started from now on
    pub fn set_timeout(&self, timeout: Duration) {
        self.timeout_ms
            .store(duration_millis(timeout), Ordering::Relaxed);
    }

    fn table(&self) -> MutexGuard<'_, PendingTable> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn take(&self, id: &InvocationId) -> Option<PendingInvocation> {
        self.table().entries.remove(id)
    }

    /// Invoke a tool on the other side of the boundary and wait for it.
    ///
    /// Resolves exactly once: with the reply, with [`ToolError::Timeout`]
    /// once the timeout elapses, or with [`ToolError::ModuleGone`] when the
    /// broker is cancelled or closed. Dropping the returned future forgets
    /// the pending entry.
    ///
    /// # Errors
    ///
    /// Returns the [`ToolError`] the call resolved with
    pub async fn invoke(&self, name: &str, parameters: PlainMap) -> Result<String, ToolError> {
        let id = InvocationId::new();
        let (tx, mut rx) = oneshot::channel();

        // The entry must exist before the event leaves, or a fast reply
        // would find nothing to resolve.
        {
            let mut table = self.table();
            if table.closed {
                return Err(ToolError::ModuleGone);
            }
            table.entries.insert(
                id,
                PendingInvocation {
                    name: name.to_string(),
                    created_at: Instant::now(),
                    resolve: tx,
                },
            );
        }
        let _guard = PendingGuard { broker: self, id };

        debug!(tool = %name, id = %id, "emitting tool invocation");
        self.sink.emit(ToolInvocationEvent {
            name: name.to_string(),
            id: id.to_string(),
            parameters,
        });

        let timeout = self.timeout();
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(ToolError::ModuleGone),
            Err(_elapsed) => {
                if let Some(entry) = self.take(&id) {
                    warn!(
                        tool = %entry.name,
                        id = %id,
                        timeout_ms = duration_millis(timeout),
                        "tool invocation timed out"
                    );
                    Err(ToolError::Timeout)
                } else {
                    // Another path removed the entry first and owns the
                    // outcome; it is already sent or about to be.
                    rx.await.unwrap_or(Err(ToolError::ModuleGone))
                }
            }
        }
    }

    /// Deliver a reply from the other side.
    ///
    /// Returns `false` when no call with this id is pending, e.g. because it
    /// already timed out; such replies are dropped.
    pub fn deliver_result(&self, id: &str, payload: ToolResultPayload) -> bool {
        let Ok(parsed) = InvocationId::parse(id) else {
            warn!(id = %id, "dropping reply with malformed invocation id");
            return false;
        };
        let Some(entry) = self.take(&parsed) else {
            debug!(id = %id, "dropping reply for unknown or resolved invocation");
            return false;
        };

        let outcome = if payload.success {
            Ok(payload.result.unwrap_or_else(|| NO_RESULT.to_string()))
        } else {
            Err(ToolError::ExecutionFailed {
                message: payload.error.unwrap_or_else(|| UNKNOWN_FAILURE.to_string()),
            })
        };
        debug!(
            tool = %entry.name,
            id = %id,
            success = outcome.is_ok(),
            elapsed_ms = duration_millis(entry.created_at.elapsed()),
            "tool invocation resolved"
        );
        // The waiter may have been dropped; the reply is then moot.
        let _ = entry.resolve.send(outcome);
        true
    }

    /// Resolve every pending call with [`ToolError::ModuleGone`].
    ///
    /// Returns how many calls were cancelled.
    pub fn cancel_all(&self) -> usize {
        let drained: Vec<_> = self.table().entries.drain().collect();
        let count = drained.len();
        for (id, entry) in drained {
            debug!(tool = %entry.name, id = %id, "cancelling tool invocation");
            let _ = entry.resolve.send(Err(ToolError::ModuleGone));
        }
        if count > 0 {
            info!(count, "cancelled pending tool invocations");
        }
        count
    }

    /// Cancel everything and refuse new calls
    pub fn close(&self) -> usize {
        self.table().closed = true;
        self.cancel_all()
    }

    /// Check if the broker was closed
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.table().closed
    }

    /// Number of pending calls
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.table().entries.len()
    }

    /// Check if a call is pending
    #[must_use]
    pub fn is_pending(&self, id: &InvocationId) -> bool {
        self.table().entries.contains_key(id)
    }

    /// Snapshot of pending calls, oldest first
    #[must_use]
    pub fn pending(&self) -> Vec<PendingSnapshot> {
        let mut snapshot: Vec<_> = self
            .table()
            .entries
            .iter()
            .map(|(id, entry)| PendingSnapshot {
                id: *id,
                name: entry.name.clone(),
                age: entry.created_at.elapsed(),
            })
            .collect();
        snapshot.sort_by(|a, b| b.age.cmp(&a.age));
        snapshot
    }
}

impl std::fmt::Debug for InvocationBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InvocationBroker")
            .field("pending", &self.pending_count())
            .field("timeout", &self.timeout())
            .finish_non_exhaustive()
    }
}

/// Removes the entry if the waiting future goes away early
struct PendingGuard<'a> {
    broker: &'a InvocationBroker,
    id: InvocationId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.broker.take(&self.id);
    }
}

fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
