//! Error types for the graph engine

use thiserror::Error;

/// Result type alias using EngineError
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while building or executing a graph
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node instance references a definition that is not registered
    #[error("Definition '{definition_id}' not found for node '{node_id}'")]
    DefinitionNotFound {
        node_id: String,
        definition_id: String,
    },

    /// A definition with this id is already registered
    #[error("Definition '{0}' is already registered")]
    DuplicateDefinition(String),

    /// The builder rejected a definition
    #[error("Invalid definition '{definition_id}': {reason}")]
    InvalidDefinition {
        definition_id: String,
        reason: String,
    },

    /// A node does not declare the requested socket
    #[error("Node '{node_id}' has no socket '{socket}'")]
    UnknownSocket { node_id: String, socket: String },

    /// A connection violates the graph invariants
    #[error("Invalid connection: {0}")]
    InvalidConnection(String),

    /// The graph structure is malformed (duplicate or unknown node ids)
    #[error("Invalid graph: {0}")]
    InvalidGraph(String),

    /// No stored value, no connection and no default for a reference-typed input
    #[error("Input '{socket}' of node '{node_id}' could not be resolved")]
    UnresolvableInput { node_id: String, socket: String },

    /// A value could not be converted to the requested type
    #[error("Value for '{socket}' of node '{node_id}' is not a valid {expected}")]
    TypeMismatch {
        node_id: String,
        socket: String,
        expected: String,
    },

    /// A node body failed; carries the identity of the failing node
    #[error("Node '{node_id}' ({definition_id}) failed: {message}")]
    NodeFailed {
        node_id: String,
        definition_id: String,
        message: String,
    },

    /// Trigger propagation nested deeper than the configured maximum
    #[error("Maximum call depth {max_depth} exceeded at node '{node_id}'")]
    CallDepthExceeded { node_id: String, max_depth: usize },

    /// The run was cancelled
    #[error("Execution cancelled")]
    Cancelled,

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic failure raised by a node body
    #[error("{0}")]
    Execution(String),
}

impl EngineError {
    /// Create an execution failure with a message
    pub fn failed(msg: impl Into<String>) -> Self {
        Self::Execution(msg.into())
    }

    /// Whether this error represents cancellation rather than failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// The node identity carried by this error, if it is a node failure
    pub fn failed_node(&self) -> Option<(&str, &str)> {
        match self {
            Self::NodeFailed {
                node_id,
                definition_id,
                ..
            } => Some((node_id, definition_id)),
            _ => None,
        }
    }

    /// Whether this error already identifies where the run broke.
    ///
    /// Such errors travel up through triggering nodes without being wrapped
    /// again, so the report names the node that actually failed.
    pub(crate) fn is_attributed(&self) -> bool {
        matches!(
            self,
            Self::NodeFailed { .. }
                | Self::CallDepthExceeded { .. }
                | Self::DefinitionNotFound { .. }
                | Self::Cancelled
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_node_identity() {
        let err = EngineError::NodeFailed {
            node_id: "print-1".to_string(),
            definition_id: "debug.print".to_string(),
            message: "boom".to_string(),
        };
        assert_eq!(err.failed_node(), Some(("print-1", "debug.print")));
        assert!(err.to_string().contains("print-1"));
        assert!(EngineError::failed("x").failed_node().is_none());
    }

    #[test]
    fn test_attribution() {
        assert!(EngineError::Cancelled.is_attributed());
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::failed("plain").is_attributed());
    }
}
