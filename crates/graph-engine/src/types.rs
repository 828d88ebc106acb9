//! Core types for node graphs
//!
//! These types define the immutable shapes the engine executes: sockets,
//! node instance data, connections and graph variables.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Unique identifier for a node instance within a graph
pub type NodeId = String;

/// Identifier of a node definition (e.g. "flow.branch")
pub type DefinitionId = String;

/// Name of the paired execution input added by `callable()`
pub const ENTER: &str = "Enter";
/// Name of the execution output added by `callable()` and `execution_initiator()`
pub const EXIT: &str = "Exit";

/// The type identifier of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    /// Control flow; reserved, never carries a value
    Execution,
    /// Accepts any value
    Any,
    /// Boolean value
    Boolean,
    /// Whole number
    Integer,
    /// Floating point number
    Number,
    /// Text string
    String,
    /// Ordered list of values
    List,
    /// JSON object
    Object,
}

impl DataType {
    /// Check if a data connection from `self` into `other` is allowed
    pub fn is_compatible_with(&self, other: &DataType) -> bool {
        match (self, other) {
            (DataType::Execution, DataType::Execution) => true,
            (DataType::Execution, _) | (_, DataType::Execution) => false,
            (DataType::Any, _) | (_, DataType::Any) => true,
            // Numbers widen and narrow losslessly through coercion
            (DataType::Integer, DataType::Number) | (DataType::Number, DataType::Integer) => true,
            // Every scalar can be rendered as text
            (DataType::Boolean | DataType::Integer | DataType::Number, DataType::String) => true,
            _ => self == other,
        }
    }

    /// Whether an unresolved input of this type falls back to [`DataType::default_value`]
    pub fn is_value_type(&self) -> bool {
        matches!(
            self,
            DataType::Boolean
                | DataType::Integer
                | DataType::Number
                | DataType::String
                | DataType::List
        )
    }

    /// The type default used for unresolved value-typed inputs
    pub fn default_value(&self) -> Option<Value> {
        match self {
            DataType::Boolean => Some(Value::Bool(false)),
            DataType::Integer => Some(Value::from(0i64)),
            DataType::Number => Some(Value::from(0.0f64)),
            DataType::String => Some(Value::String(String::new())),
            DataType::List => Some(Value::Array(Vec::new())),
            DataType::Execution | DataType::Any | DataType::Object => None,
        }
    }
}

/// Direction of a socket
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SocketDirection {
    Input,
    Output,
}

/// A named, typed connection point on a node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Socket {
    /// Socket name, unique per direction on a node
    pub name: String,
    /// Type identifier
    pub data_type: DataType,
    /// Input or output
    pub direction: SocketDirection,
    /// Default value for unconnected inputs
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_value: Option<Value>,
    /// Hint for the editor widget (e.g. "multiline", "slider")
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor_hint: Option<String>,
}

impl Socket {
    /// Create an execution socket
    pub fn execution(name: impl Into<String>, direction: SocketDirection) -> Self {
        Self {
            name: name.into(),
            data_type: DataType::Execution,
            direction,
            default_value: None,
            editor_hint: None,
        }
    }

    /// Create a data socket
    pub fn data(name: impl Into<String>, data_type: DataType, direction: SocketDirection) -> Self {
        Self {
            name: name.into(),
            data_type,
            direction,
            default_value: None,
            editor_hint: None,
        }
    }

    /// Set a default value for this socket
    pub fn with_default(mut self, value: Value) -> Self {
        self.default_value = Some(value);
        self
    }

    /// Whether this socket carries control flow
    pub fn is_execution(&self) -> bool {
        self.data_type == DataType::Execution
    }
}

/// Immutable per-instance data of a node in a graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    /// Unique identifier for this node instance
    pub id: NodeId,
    /// Definition this node was created from
    pub definition_id: DefinitionId,
    /// Whether the node has execution sockets
    pub callable: bool,
    /// Whether the engine starts this node directly at run start
    pub is_execution_initiator: bool,
    /// Input sockets, defaults possibly edited per instance
    pub inputs: Vec<Socket>,
    /// Output sockets
    pub outputs: Vec<Socket>,
}

impl NodeData {
    /// Find an input socket by name
    pub fn input(&self, name: &str) -> Option<&Socket> {
        self.inputs.iter().find(|s| s.name == name)
    }

    /// Find an input socket by name (mutable)
    pub fn input_mut(&mut self, name: &str) -> Option<&mut Socket> {
        self.inputs.iter_mut().find(|s| s.name == name)
    }

    /// Find an output socket by name
    pub fn output(&self, name: &str) -> Option<&Socket> {
        self.outputs.iter().find(|s| s.name == name)
    }

    /// Whether this node only produces data and runs lazily
    pub fn is_data_only(&self) -> bool {
        !self.callable
    }
}

/// A connection between an output socket and an input socket
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub source_node: NodeId,
    pub source_socket: String,
    pub target_node: NodeId,
    pub target_socket: String,
    /// Whether this connection carries control flow
    pub is_execution: bool,
}

impl Connection {
    /// Create an execution connection
    pub fn execution(
        source_node: impl Into<String>,
        source_socket: impl Into<String>,
        target_node: impl Into<String>,
        target_socket: impl Into<String>,
    ) -> Self {
        Self {
            source_node: source_node.into(),
            source_socket: source_socket.into(),
            target_node: target_node.into(),
            target_socket: target_socket.into(),
            is_execution: true,
        }
    }

    /// Create a data connection
    pub fn data(
        source_node: impl Into<String>,
        source_socket: impl Into<String>,
        target_node: impl Into<String>,
        target_socket: impl Into<String>,
    ) -> Self {
        Self {
            is_execution: false,
            ..Self::execution(source_node, source_socket, target_node, target_socket)
        }
    }
}

/// A graph-scoped variable
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphVariable {
    pub id: String,
    pub name: String,
    pub data_type: DataType,
    pub default_value: Value,
}

impl GraphVariable {
    /// Create a variable whose id equals its name
    pub fn new(name: impl Into<String>, data_type: DataType, default_value: Value) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            data_type,
            default_value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_data_type_compatibility() {
        assert!(DataType::Any.is_compatible_with(&DataType::String));
        assert!(DataType::Integer.is_compatible_with(&DataType::Number));
        assert!(DataType::Number.is_compatible_with(&DataType::String));
        assert!(!DataType::String.is_compatible_with(&DataType::Number));
        assert!(!DataType::Execution.is_compatible_with(&DataType::Any));
        assert!(!DataType::Any.is_compatible_with(&DataType::Execution));
        assert!(DataType::Execution.is_compatible_with(&DataType::Execution));
    }

    #[test]
    fn test_value_type_defaults() {
        assert_eq!(DataType::Boolean.default_value(), Some(Value::Bool(false)));
        assert_eq!(DataType::List.default_value(), Some(Value::Array(vec![])));
        assert!(DataType::Object.default_value().is_none());
        assert!(!DataType::Any.is_value_type());
    }

    #[test]
    fn test_connection_constructors() {
        let exec = Connection::execution("a", EXIT, "b", ENTER);
        assert!(exec.is_execution);
        let data = Connection::data("a", "Value", "b", "Value");
        assert!(!data.is_execution);
        assert_eq!(data.target_node, "b");
    }

    #[test]
    fn test_node_data_serialization() {
        let node = NodeData {
            id: "n1".to_string(),
            definition_id: "flow.start".to_string(),
            callable: true,
            is_execution_initiator: true,
            inputs: vec![],
            outputs: vec![Socket::execution(EXIT, SocketDirection::Output)],
        };
        let json = serde_json::to_string(&node).unwrap();
        assert!(json.contains("definitionId"));
        assert!(json.contains("isExecutionInitiator"));
    }
}
