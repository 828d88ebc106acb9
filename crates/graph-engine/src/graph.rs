//! Editable graphs and their immutable run snapshots
//!
//! A [`Graph`] is what a host edits: nodes instantiated from definitions,
//! connections checked as they are added, and graph variables. A run never
//! sees the live graph; it works on a [`GraphSnapshot`] taken at start.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::definition::NodeDefinition;
use crate::error::{EngineError, Result};
use crate::registry::NodeRegistry;
use crate::types::{Connection, GraphVariable, NodeData};
use crate::validation::{self, ValidationError};

/// Immutable node, connection and variable lists shared by one run
#[derive(Debug, Clone)]
pub struct GraphSnapshot {
    pub nodes: Arc<[NodeData]>,
    pub connections: Arc<[Connection]>,
    pub variables: Arc<[GraphVariable]>,
}

impl GraphSnapshot {
    pub fn new(nodes: Vec<NodeData>, connections: Vec<Connection>) -> Self {
        Self {
            nodes: nodes.into(),
            connections: connections.into(),
            variables: Arc::from(Vec::new()),
        }
    }

    pub fn with_variables(mut self, variables: Vec<GraphVariable>) -> Self {
        self.variables = variables.into();
        self
    }

    pub fn node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.id == id)
    }
}

/// A live, editable graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Graph {
    pub id: String,
    pub name: String,
    nodes: Vec<NodeData>,
    connections: Vec<Connection>,
    variables: Vec<GraphVariable>,
}

impl Graph {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn nodes(&self) -> &[NodeData] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn variables(&self) -> &[GraphVariable] {
        &self.variables
    }

    pub fn node(&self, id: &str) -> Option<&NodeData> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Add a node instantiated from a definition
    pub fn add_node(
        &mut self,
        definition: &NodeDefinition,
        id: impl Into<String>,
    ) -> Result<&NodeData> {
        let id = id.into();
        if self.node(&id).is_some() {
            return Err(EngineError::InvalidGraph(format!(
                "node id '{}' is already used",
                id
            )));
        }
        self.nodes.push(definition.instantiate(id));
        let index = self.nodes.len() - 1;
        Ok(&self.nodes[index])
    }

    /// Remove a node and every connection touching it
    pub fn remove_node(&mut self, id: &str) -> Option<NodeData> {
        let index = self.nodes.iter().position(|n| n.id == id)?;
        self.connections
            .retain(|c| c.source_node != id && c.target_node != id);
        Some(self.nodes.remove(index))
    }

    /// Edit the per-instance default of a data input
    pub fn set_default(&mut self, node_id: &str, socket: &str, value: Value) -> Result<()> {
        let node = self
            .nodes
            .iter_mut()
            .find(|n| n.id == node_id)
            .ok_or_else(|| EngineError::InvalidGraph(format!("unknown node '{}'", node_id)))?;
        match node.input_mut(socket) {
            Some(input) if !input.is_execution() => {
                input.default_value = Some(value);
                Ok(())
            }
            _ => Err(EngineError::UnknownSocket {
                node_id: node_id.to_string(),
                socket: socket.to_string(),
            }),
        }
    }

    /// Connect an output to an input.
    ///
    /// Whether the connection carries control flow follows from the source
    /// socket.
    pub fn connect(
        &mut self,
        source_node: &str,
        source_socket: &str,
        target_node: &str,
        target_socket: &str,
    ) -> Result<&Connection> {
        let source = self.node(source_node);
        let is_execution = source
            .and_then(|n| n.output(source_socket))
            .is_some_and(|s| s.is_execution());
        let connection = if is_execution {
            Connection::execution(source_node, source_socket, target_node, target_socket)
        } else {
            Connection::data(source_node, source_socket, target_node, target_socket)
        };

        validation::validate_connection(source, self.node(target_node), &connection)
            .map_err(EngineError::from)?;
        if self
            .connections
            .iter()
            .any(|c| c.target_node == target_node && c.target_socket == target_socket)
        {
            return Err(ValidationError::MultipleInputConnections {
                node_id: target_node.to_string(),
                socket: target_socket.to_string(),
            }
            .into());
        }

        self.connections.push(connection);
        let index = self.connections.len() - 1;
        Ok(&self.connections[index])
    }

    /// Remove the connection feeding an input
    pub fn disconnect(&mut self, target_node: &str, target_socket: &str) -> Option<Connection> {
        let index = self
            .connections
            .iter()
            .position(|c| c.target_node == target_node && c.target_socket == target_socket)?;
        Some(self.connections.remove(index))
    }

    /// Declare a graph variable, replacing one with the same name
    pub fn declare_variable(&mut self, variable: GraphVariable) {
        self.variables.retain(|v| v.name != variable.name);
        self.variables.push(variable);
    }

    pub fn remove_variable(&mut self, name: &str) -> Option<GraphVariable> {
        let index = self.variables.iter().position(|v| v.name == name)?;
        Some(self.variables.remove(index))
    }

    /// Take an immutable snapshot for a run
    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot::new(self.nodes.clone(), self.connections.clone())
            .with_variables(self.variables.clone())
    }
}

/// Fluent builder for graphs
///
/// Errors are deferred to [`GraphBuilder::build`].
///
/// # Example
///
/// ```ignore
/// let graph = GraphBuilder::new(&registry, "g-1", "Countdown")
///     .add_node("start", "flow.start")
///     .add_node("loop", "loops.for")
///     .with_default("Count", json!(3))
///     .connect("start", "Exit", "loop", "Enter")
///     .build()?;
/// ```
pub struct GraphBuilder<'a> {
    registry: &'a NodeRegistry,
    graph: Graph,
    last_node: Option<String>,
    error: Option<EngineError>,
}

impl<'a> GraphBuilder<'a> {
    pub fn new(registry: &'a NodeRegistry, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            registry,
            graph: Graph::new(id, name),
            last_node: None,
            error: None,
        }
    }

    /// Add a node of a registered definition
    pub fn add_node(mut self, id: impl Into<String>, definition_id: &str) -> Self {
        if self.error.is_some() {
            return self;
        }
        let id = id.into();
        let result = match self.registry.get(definition_id) {
            Some(definition) => self.graph.add_node(&definition, id.clone()).map(|_| ()),
            None => Err(EngineError::DefinitionNotFound {
                node_id: id.clone(),
                definition_id: definition_id.to_string(),
            }),
        };
        self.last_node = Some(id);
        self.record(result)
    }

    /// Set an input default on the most recently added node
    ///
    /// Must be called after `add_node`.
    pub fn with_default(mut self, socket: &str, value: Value) -> Self {
        if self.error.is_some() {
            return self;
        }
        let result = match self.last_node.clone() {
            Some(node_id) => self.graph.set_default(&node_id, socket, value),
            None => Err(EngineError::InvalidGraph(
                "with_default called before add_node".to_string(),
            )),
        };
        self.record(result)
    }

    pub fn connect(
        mut self,
        source_node: &str,
        source_socket: &str,
        target_node: &str,
        target_socket: &str,
    ) -> Self {
        if self.error.is_some() {
            return self;
        }
        let result = self
            .graph
            .connect(source_node, source_socket, target_node, target_socket)
            .map(|_| ());
        self.record(result)
    }

    pub fn variable(mut self, variable: GraphVariable) -> Self {
        self.graph.declare_variable(variable);
        self
    }

    /// Finish the graph, returning the first error encountered
    pub fn build(self) -> Result<Graph> {
        match self.error {
            Some(error) => Err(error),
            None => Ok(self.graph),
        }
    }

    fn record(mut self, result: Result<()>) -> Self {
        if let Err(error) = result {
            self.error = Some(error);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::definition::InlineOutputs;
    use crate::types::{DataType, ENTER, EXIT};
    use serde_json::json;

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        for (id, callable) in [("test.step", true), ("test.value", false)] {
            let mut builder = NodeBuilder::new(id);
            if callable {
                builder.callable().input_default::<i64>("Count", 1);
            } else {
                builder
                    .output::<i64>("Value")
                    .inline(|_| Ok(InlineOutputs::new()));
            }
            // Metadata-only definitions are fine for graph editing
            registry.register(builder.build().unwrap()).unwrap();
        }
        registry
    }

    #[test]
    fn test_builder_creates_graph() {
        let registry = registry();
        let graph = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.step")
            .add_node("b", "test.step")
            .with_default("Count", json!(5))
            .add_node("v", "test.value")
            .connect("a", EXIT, "b", ENTER)
            .connect("v", "Value", "a", "Count")
            .build()
            .unwrap();

        assert_eq!(graph.nodes().len(), 3);
        assert!(graph.connections()[0].is_execution);
        assert!(!graph.connections()[1].is_execution);
        assert_eq!(
            graph.node("b").unwrap().input("Count").unwrap().default_value,
            Some(json!(5))
        );
    }

    #[test]
    fn test_builder_defers_errors() {
        let registry = registry();
        let result = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.missing")
            .add_node("b", "test.step")
            .build();
        assert!(matches!(result, Err(EngineError::DefinitionNotFound { .. })));
    }

    #[test]
    fn test_connect_rejects_second_feed() {
        let registry = registry();
        let mut graph = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.step")
            .add_node("b", "test.step")
            .add_node("c", "test.step")
            .connect("a", EXIT, "c", ENTER)
            .build()
            .unwrap();

        let err = graph.connect("b", EXIT, "c", ENTER).unwrap_err();
        assert!(matches!(err, EngineError::InvalidConnection(_)));

        graph.disconnect("c", ENTER).unwrap();
        assert!(graph.connect("b", EXIT, "c", ENTER).is_ok());
    }

    #[test]
    fn test_connect_rejects_exec_to_data() {
        let registry = registry();
        let mut graph = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.step")
            .add_node("b", "test.step")
            .build()
            .unwrap();
        assert!(graph.connect("a", EXIT, "b", "Count").is_err());
        assert!(graph.connect("a", "Missing", "b", ENTER).is_err());
    }

    #[test]
    fn test_duplicate_node_id() {
        let registry = registry();
        let mut graph = Graph::new("g", "Test");
        let def = registry.get("test.step").unwrap();
        graph.add_node(&def, "a").unwrap();
        assert!(graph.add_node(&def, "a").is_err());
    }

    #[test]
    fn test_remove_node_drops_connections() {
        let registry = registry();
        let mut graph = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.step")
            .add_node("b", "test.step")
            .connect("a", EXIT, "b", ENTER)
            .build()
            .unwrap();

        graph.remove_node("b").unwrap();
        assert!(graph.connections().is_empty());
    }

    #[test]
    fn test_snapshot_is_independent_of_later_edits() {
        let registry = registry();
        let mut graph = GraphBuilder::new(&registry, "g", "Test")
            .add_node("a", "test.step")
            .variable(GraphVariable::new("score", DataType::Integer, json!(1)))
            .build()
            .unwrap();

        let snapshot = graph.snapshot();
        graph.set_default("a", "Count", json!(9)).unwrap();
        graph.declare_variable(GraphVariable::new("score", DataType::Integer, json!(2)));

        assert_eq!(snapshot.node("a").unwrap().input("Count").unwrap().default_value, Some(json!(1)));
        assert_eq!(snapshot.variables[0].default_value, json!(1));
        assert_eq!(graph.variables().len(), 1);
    }
}
