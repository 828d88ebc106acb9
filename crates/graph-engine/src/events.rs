//! Events emitted while a graph runs
//!
//! The runtime reports node progress and feedback messages to an
//! [`EventSink`]. The sink abstracts over the transport (channel, UI bridge,
//! log) so the engine never depends on its observers.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Trait for receiving execution events
pub trait EventSink: Send + Sync {
    /// Send an event
    ///
    /// Returns an error if the event could not be delivered (e.g., channel closed)
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError>;
}

/// Error when sending events fails
#[derive(Debug, Clone, thiserror::Error)]
#[error("Event error: {message}")]
pub struct EventError {
    pub message: String,
}

impl EventError {
    pub fn channel_closed() -> Self {
        Self {
            message: "Channel closed".to_string(),
        }
    }
}

/// Severity of a feedback message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackLevel {
    Debug,
    Info,
    Warning,
    Error,
}

/// Events emitted during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ExecutionEvent {
    /// The run started
    #[serde(rename_all = "camelCase")]
    RunStarted { run_id: String, node_count: usize },

    /// A node started executing
    #[serde(rename_all = "camelCase")]
    NodeStarted {
        run_id: String,
        node_id: String,
        definition_id: String,
    },

    /// A node finished executing
    #[serde(rename_all = "camelCase")]
    NodeCompleted {
        run_id: String,
        node_id: String,
        definition_id: String,
    },

    /// A node body failed
    #[serde(rename_all = "camelCase")]
    NodeFailed {
        run_id: String,
        node_id: String,
        definition_id: String,
        error: String,
    },

    /// Side-channel message from a node (debug print, warnings)
    #[serde(rename_all = "camelCase")]
    Feedback {
        run_id: String,
        node_id: String,
        level: FeedbackLevel,
        message: String,
    },

    /// The run finished successfully
    #[serde(rename_all = "camelCase")]
    RunCompleted { run_id: String, duration_ms: u64 },

    /// The run finished with at least one failure
    #[serde(rename_all = "camelCase")]
    RunFailed {
        run_id: String,
        node_id: Option<String>,
        error: String,
    },

    /// The run was cancelled
    #[serde(rename_all = "camelCase")]
    RunCancelled { run_id: String },
}

impl ExecutionEvent {
    /// Create a feedback event
    pub fn feedback(run_id: &str, node_id: &str, level: FeedbackLevel, message: impl Into<String>) -> Self {
        Self::Feedback {
            run_id: run_id.to_string(),
            node_id: node_id.to_string(),
            level,
            message: message.into(),
        }
    }

    /// The node this event refers to, if any
    pub fn node_id(&self) -> Option<&str> {
        match self {
            Self::NodeStarted { node_id, .. }
            | Self::NodeCompleted { node_id, .. }
            | Self::NodeFailed { node_id, .. }
            | Self::Feedback { node_id, .. } => Some(node_id),
            Self::RunFailed { node_id, .. } => node_id.as_deref(),
            _ => None,
        }
    }
}

/// A no-op event sink that discards all events
pub struct NullEventSink;

impl EventSink for NullEventSink {
    fn send(&self, _event: ExecutionEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// A vector-based event sink that collects events
///
/// Useful for testing to verify events were emitted correctly.
#[derive(Default)]
pub struct VecEventSink {
    events: Mutex<Vec<ExecutionEvent>>,
}

impl VecEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all collected events
    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().clone()
    }

    /// Feedback messages in emission order
    pub fn feedback_messages(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .filter_map(|e| match e {
                ExecutionEvent::Feedback { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }

    /// Clear all collected events
    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl EventSink for VecEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Forwards events into an unbounded tokio channel
pub struct ChannelEventSink {
    sender: mpsc::UnboundedSender<ExecutionEvent>,
}

impl ChannelEventSink {
    /// Create a sink and the receiver observers read from
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ExecutionEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl EventSink for ChannelEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        self.sender
            .send(event)
            .map_err(|_| EventError::channel_closed())
    }
}

/// Writes events to the `log` facade
pub struct LogEventSink;

impl EventSink for LogEventSink {
    fn send(&self, event: ExecutionEvent) -> Result<(), EventError> {
        match &event {
            ExecutionEvent::NodeFailed { node_id, error, .. } => {
                log::warn!("Node '{}' failed: {}", node_id, error)
            }
            ExecutionEvent::RunFailed { error, .. } => log::error!("Run failed: {}", error),
            ExecutionEvent::Feedback {
                node_id,
                level,
                message,
                ..
            } => match level {
                FeedbackLevel::Debug => log::debug!("[{}] {}", node_id, message),
                FeedbackLevel::Info => log::info!("[{}] {}", node_id, message),
                FeedbackLevel::Warning => log::warn!("[{}] {}", node_id, message),
                FeedbackLevel::Error => log::error!("[{}] {}", node_id, message),
            },
            other => log::debug!("{:?}", other),
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vec_event_sink() {
        let sink = VecEventSink::new();

        sink.send(ExecutionEvent::feedback("run1", "print-1", FeedbackLevel::Info, "hello"))
            .unwrap();

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].node_id(), Some("print-1"));
        assert_eq!(sink.feedback_messages(), vec!["hello".to_string()]);

        sink.clear();
        assert!(sink.events().is_empty());
    }

    #[test]
    fn test_null_event_sink() {
        let sink = NullEventSink;
        sink.send(ExecutionEvent::RunCancelled {
            run_id: "run1".to_string(),
        })
        .unwrap();
    }

    #[tokio::test]
    async fn test_channel_event_sink() {
        let (sink, mut receiver) = ChannelEventSink::new();
        sink.send(ExecutionEvent::RunStarted {
            run_id: "run1".to_string(),
            node_count: 2,
        })
        .unwrap();

        let event = receiver.recv().await.unwrap();
        assert!(matches!(event, ExecutionEvent::RunStarted { node_count: 2, .. }));

        drop(receiver);
        assert!(sink
            .send(ExecutionEvent::RunCancelled {
                run_id: "run1".to_string()
            })
            .is_err());
    }

    #[test]
    fn test_event_serialization() {
        let event = ExecutionEvent::NodeFailed {
            run_id: "r".to_string(),
            node_id: "n".to_string(),
            definition_id: "d".to_string(),
            error: "boom".to_string(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"nodeFailed\""));
        assert!(json.contains("definitionId"));
    }
}
