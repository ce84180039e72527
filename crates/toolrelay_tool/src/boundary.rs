//! Wire types and sinks for the process boundary.
//!
//! Outbound, the broker emits one [`ToolInvocationEvent`] per call. Inbound,
//! the other side answers with a [`ToolResultMessage`] carrying the same id.

use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use tokio::sync::mpsc;
use toolrelay_core::PlainMap;
use tracing::warn;

/// Name of the outbound event
pub const TOOL_INVOCATION_EVENT: &str = "ToolInvocation";

/// Outbound request to run a tool on the other side of the boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationEvent {
    /// Tool name
    pub name: String,
    /// Correlation id, echoed back in the result
    pub id: String,
    /// Tool arguments
    pub parameters: PlainMap,
}

/// Outcome reported by the other side for one invocation
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ToolResultPayload {
    /// Whether the tool ran successfully; absent means it did not
    #[serde(default)]
    pub success: bool,
    /// Tool output on success
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    /// Error text on failure
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ToolResultPayload {
    /// Successful result
    #[must_use]
    pub fn success(result: impl Into<String>) -> Self {
        Self {
            success: true,
            result: Some(result.into()),
            error: None,
        }
    }

    /// Failed result
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Inbound result as it arrives on the wire
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResultMessage {
    /// Correlation id of the invocation being answered
    pub id: String,
    /// The outcome
    #[serde(flatten)]
    pub payload: ToolResultPayload,
}

/// Destination for outbound events.
///
/// `emit` must not block: the broker calls it while a caller is about to
/// suspend, and delivery is the transport's concern.
pub trait BoundarySink: Send + Sync {
    /// Hand an event to the transport
    fn emit(&self, event: ToolInvocationEvent);
}

/// Sink backed by an unbounded tokio channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ToolInvocationEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport drains
    #[must_use]
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<ToolInvocationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl BoundarySink for ChannelSink {
    fn emit(&self, event: ToolInvocationEvent) {
        if let Err(err) = self.tx.send(event) {
            warn!(tool = %err.0.name, id = %err.0.id, "boundary receiver closed, event dropped");
        }
    }
}

/// Sink that keeps every event in memory
#[derive(Debug, Default)]
pub struct RecordingSink {
    events: Mutex<Vec<ToolInvocationEvent>>,
}

impl RecordingSink {
    /// Create an empty recording sink
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of recorded events, oldest first
    #[must_use]
    pub fn events(&self) -> Vec<ToolInvocationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Most recent event
    #[must_use]
    pub fn last(&self) -> Option<ToolInvocationEvent> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .last()
            .cloned()
    }
}

impl BoundarySink for RecordingSink {
    fn emit(&self, event: ToolInvocationEvent) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
