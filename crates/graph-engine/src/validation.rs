//! Graph validation
//!
//! Checks a graph snapshot against the registry before it runs: every node
//! resolves to an executable definition, every connection joins an existing
//! output to an existing input of a matching kind and compatible type, and
//! no input is fed twice. All problems are collected, not just the first.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use crate::error::EngineError;
use crate::graph::GraphSnapshot;
use crate::registry::NodeRegistry;
use crate::types::{Connection, DataType, NodeData};

/// A single validation problem
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Two nodes share an id
    DuplicateNodeId { node_id: String },
    /// A node's definition id is not registered
    UnknownDefinition {
        node_id: String,
        definition_id: String,
    },
    /// A definition has neither a backing type nor an inline executor
    NotExecutable {
        node_id: String,
        definition_id: String,
    },
    /// A connection references a node that is not in the graph
    UnknownNode { connection: String, node_id: String },
    /// A connection references a socket the node does not declare
    UnknownSocket {
        connection: String,
        node_id: String,
        socket: String,
    },
    /// A connection starts at an input or ends at an output
    WrongDirection {
        connection: String,
        node_id: String,
        socket: String,
    },
    /// Execution and data sockets are mixed, or the flag disagrees with the sockets
    ExecutionMismatch { connection: String },
    /// The data types cannot be connected
    IncompatibleTypes {
        connection: String,
        source_type: DataType,
        target_type: DataType,
    },
    /// More than one connection ends at the same input
    MultipleInputConnections { node_id: String, socket: String },
    /// Data-only nodes feed each other in a loop
    DataCycle { node_ids: Vec<String> },
    /// Two graph variables share a name
    DuplicateVariable { name: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateNodeId { node_id } => write!(f, "Duplicate node id '{}'", node_id),
            Self::UnknownDefinition {
                node_id,
                definition_id,
            } => write!(
                f,
                "Unknown definition '{}' for node '{}'",
                definition_id, node_id
            ),
            Self::NotExecutable {
                node_id,
                definition_id,
            } => write!(
                f,
                "Definition '{}' of node '{}' has no executor",
                definition_id, node_id
            ),
            Self::UnknownNode {
                connection,
                node_id,
            } => write!(
                f,
                "Connection '{}' references unknown node '{}'",
                connection, node_id
            ),
            Self::UnknownSocket {
                connection,
                node_id,
                socket,
            } => write!(
                f,
                "Connection '{}' references unknown socket '{}' on node '{}'",
                connection, socket, node_id
            ),
            Self::WrongDirection {
                connection,
                node_id,
                socket,
            } => write!(
                f,
                "Connection '{}' uses socket '{}' of node '{}' in the wrong direction",
                connection, socket, node_id
            ),
            Self::ExecutionMismatch { connection } => write!(
                f,
                "Connection '{}' mixes execution and data sockets",
                connection
            ),
            Self::IncompatibleTypes {
                connection,
                source_type,
                target_type,
            } => write!(
                f,
                "Connection '{}' joins incompatible types: {:?} -> {:?}",
                connection, source_type, target_type
            ),
            Self::MultipleInputConnections { node_id, socket } => write!(
                f,
                "Input '{}' of node '{}' has more than one incoming connection",
                socket, node_id
            ),
            Self::DataCycle { node_ids } => {
                write!(f, "Data nodes form a cycle: {}", node_ids.join(", "))
            }
            Self::DuplicateVariable { name } => {
                write!(f, "Variable '{}' is declared more than once", name)
            }
        }
    }
}

impl std::error::Error for ValidationError {}

impl From<ValidationError> for EngineError {
    fn from(error: ValidationError) -> Self {
        match error {
            ValidationError::UnknownDefinition {
                node_id,
                definition_id,
            } => EngineError::DefinitionNotFound {
                node_id,
                definition_id,
            },
            ValidationError::NotExecutable { definition_id, .. } => {
                EngineError::InvalidDefinition {
                    definition_id,
                    reason: "definition has no executor".to_string(),
                }
            }
            ValidationError::UnknownSocket {
                node_id, socket, ..
            } => EngineError::UnknownSocket { node_id, socket },
            ValidationError::DuplicateNodeId { .. }
            | ValidationError::DataCycle { .. }
            | ValidationError::DuplicateVariable { .. } => {
                EngineError::InvalidGraph(error.to_string())
            }
            other => EngineError::InvalidConnection(other.to_string()),
        }
    }
}

/// Validate a snapshot against a registry
///
/// Returns all validation errors found (not just the first).
pub fn validate(snapshot: &GraphSnapshot, registry: &NodeRegistry) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    let nodes = index_nodes(&snapshot.nodes, &mut errors);
    validate_definitions(&snapshot.nodes, registry, &mut errors);
    validate_connections(&nodes, &snapshot.connections, &mut errors);
    detect_data_cycles(&nodes, &snapshot.connections, &mut errors);
    validate_variables(snapshot, &mut errors);

    errors
}

/// Check one connection against the nodes it joins
pub fn validate_connection(
    source: Option<&NodeData>,
    target: Option<&NodeData>,
    connection: &Connection,
) -> Result<(), ValidationError> {
    let name = describe(connection);
    let source = source.ok_or_else(|| ValidationError::UnknownNode {
        connection: name.clone(),
        node_id: connection.source_node.clone(),
    })?;
    let target = target.ok_or_else(|| ValidationError::UnknownNode {
        connection: name.clone(),
        node_id: connection.target_node.clone(),
    })?;

    let source_socket = match source.output(&connection.source_socket) {
        Some(socket) => socket,
        None if source.input(&connection.source_socket).is_some() => {
            return Err(ValidationError::WrongDirection {
                connection: name,
                node_id: source.id.clone(),
                socket: connection.source_socket.clone(),
            })
        }
        None => {
            return Err(ValidationError::UnknownSocket {
                connection: name,
                node_id: source.id.clone(),
                socket: connection.source_socket.clone(),
            })
        }
    };
    let target_socket = match target.input(&connection.target_socket) {
        Some(socket) => socket,
        None if target.output(&connection.target_socket).is_some() => {
            return Err(ValidationError::WrongDirection {
                connection: name,
                node_id: target.id.clone(),
                socket: connection.target_socket.clone(),
            })
        }
        None => {
            return Err(ValidationError::UnknownSocket {
                connection: name,
                node_id: target.id.clone(),
                socket: connection.target_socket.clone(),
            })
        }
    };

    if source_socket.is_execution() != connection.is_execution
        || target_socket.is_execution() != connection.is_execution
    {
        return Err(ValidationError::ExecutionMismatch { connection: name });
    }
    if !source_socket
        .data_type
        .is_compatible_with(&target_socket.data_type)
    {
        return Err(ValidationError::IncompatibleTypes {
            connection: name,
            source_type: source_socket.data_type,
            target_type: target_socket.data_type,
        });
    }
    Ok(())
}

/// Human-readable form of a connection, e.g. `start.Exit -> print.Enter`
pub fn describe(connection: &Connection) -> String {
    format!(
        "{}.{} -> {}.{}",
        connection.source_node,
        connection.source_socket,
        connection.target_node,
        connection.target_socket
    )
}

fn index_nodes<'a>(
    nodes: &'a [NodeData],
    errors: &mut Vec<ValidationError>,
) -> HashMap<&'a str, &'a NodeData> {
    let mut index = HashMap::with_capacity(nodes.len());
    for node in nodes {
        if index.insert(node.id.as_str(), node).is_some() {
            errors.push(ValidationError::DuplicateNodeId {
                node_id: node.id.clone(),
            });
        }
    }
    index
}

/// Check that every node resolves to an executable definition
fn validate_definitions(
    nodes: &[NodeData],
    registry: &NodeRegistry,
    errors: &mut Vec<ValidationError>,
) {
    for node in nodes {
        match registry.get(&node.definition_id) {
            None => errors.push(ValidationError::UnknownDefinition {
                node_id: node.id.clone(),
                definition_id: node.definition_id.clone(),
            }),
            Some(definition) if !definition.is_executable() => {
                errors.push(ValidationError::NotExecutable {
                    node_id: node.id.clone(),
                    definition_id: node.definition_id.clone(),
                })
            }
            Some(_) => {}
        }
    }
}

fn validate_connections(
    nodes: &HashMap<&str, &NodeData>,
    connections: &[Connection],
    errors: &mut Vec<ValidationError>,
) {
    let mut fed_inputs: HashSet<(&str, &str)> = HashSet::new();
    for connection in connections {
        if let Err(e) = validate_connection(
            nodes.get(connection.source_node.as_str()).copied(),
            nodes.get(connection.target_node.as_str()).copied(),
            connection,
        ) {
            errors.push(e);
        }
        let input = (
            connection.target_node.as_str(),
            connection.target_socket.as_str(),
        );
        if !fed_inputs.insert(input) {
            errors.push(ValidationError::MultipleInputConnections {
                node_id: connection.target_node.clone(),
                socket: connection.target_socket.clone(),
            });
        }
    }
}

/// Detect cycles among data-only nodes using Kahn's algorithm.
///
/// A cycle through a callable node is fine: callable nodes are never pulled.
fn detect_data_cycles(
    nodes: &HashMap<&str, &NodeData>,
    connections: &[Connection],
    errors: &mut Vec<ValidationError>,
) {
    let is_data_node = |id: &str| nodes.get(id).is_some_and(|n| n.is_data_only());

    let mut in_degree: HashMap<&str, usize> = nodes
        .iter()
        .filter(|(_, n)| n.is_data_only())
        .map(|(&id, _)| (id, 0))
        .collect();
    let edges: Vec<(&str, &str)> = connections
        .iter()
        .filter(|c| !c.is_execution)
        .filter(|c| is_data_node(&c.source_node) && is_data_node(&c.target_node))
        .map(|c| (c.source_node.as_str(), c.target_node.as_str()))
        .collect();
    for (_, target) in &edges {
        *in_degree.entry(*target).or_insert(0) += 1;
    }

    let mut queue: VecDeque<&str> = in_degree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&id, _)| id)
        .collect();

    while let Some(node_id) = queue.pop_front() {
        in_degree.remove(node_id);
        for (source, target) in &edges {
            if *source == node_id {
                if let Some(deg) = in_degree.get_mut(target) {
                    *deg -= 1;
                    if *deg == 0 {
                        queue.push_back(*target);
                    }
                }
            }
        }
    }

    if !in_degree.is_empty() {
        let mut node_ids: Vec<String> = in_degree.keys().map(|id| id.to_string()).collect();
        node_ids.sort();
        errors.push(ValidationError::DataCycle { node_ids });
    }
}

fn validate_variables(snapshot: &GraphSnapshot, errors: &mut Vec<ValidationError>) {
    let mut seen = HashSet::new();
    for variable in snapshot.variables.iter() {
        if !seen.insert(variable.name.as_str()) {
            errors.push(ValidationError::DuplicateVariable {
                name: variable.name.clone(),
            });
        }
    }
}
