//! Node definitions
//!
//! A [`NodeDefinition`] is created once per node type at discovery or
//! registration time and shared by every instance of that type. It carries
//! serializable [`NodeMetadata`] for catalogs and editors, plus the means to
//! execute: a constructor for a backing [`Node`] type or an inline executor
//! for pure data nodes.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::Result;
use crate::node::{Node, StreamMode};
use crate::types::{NodeData, Socket};

/// Creates a fresh node instance
pub type NodeConstructor = Arc<dyn Fn() -> Box<dyn Node> + Send + Sync>;

/// Resolved inputs handed to an inline executor, keyed by socket name
pub type InlineInputs = HashMap<String, Value>;

/// Outputs produced by an inline executor, keyed by socket name
pub type InlineOutputs = HashMap<String, Value>;

/// Synchronous executor for definitions built without a backing type
pub type InlineExecutor = Arc<dyn Fn(&InlineInputs) -> Result<InlineOutputs> + Send + Sync>;

/// A stream group declared with `stream_output`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamGroup {
    /// Data output that holds the current item
    pub item: String,
    /// Execution output triggered for every emitted item
    pub item_emitted: String,
    /// Execution output triggered once the stream completes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed: Option<String>,
}

/// Serializable description of a node type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeMetadata {
    /// Stable, unique identifier (e.g. "flow.branch")
    pub id: String,
    /// Human-readable name
    pub name: String,
    /// Category for catalog grouping
    pub category: String,
    /// What the node does
    pub description: String,
    pub inputs: Vec<Socket>,
    pub outputs: Vec<Socket>,
    /// Whether the node has execution sockets
    pub callable: bool,
    /// Whether the node is a run entry point
    pub execution_initiator: bool,
    /// Whether the node is started by named graph events
    #[serde(default)]
    pub event_listener: bool,
    /// Data-only node that re-executes on every read instead of being memoized
    #[serde(default)]
    pub volatile: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub streams: Vec<StreamGroup>,
    /// Declared stream mode; the run default applies when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stream_mode: Option<StreamMode>,
    /// Rust type backing this definition, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backing_type: Option<String>,
}

impl NodeMetadata {
    /// Find the stream group whose item socket is `item`
    pub fn stream(&self, item: &str) -> Option<&StreamGroup> {
        self.streams.iter().find(|s| s.item == item)
    }
}

/// Immutable definition of a node type
#[derive(Clone)]
pub struct NodeDefinition {
    pub metadata: NodeMetadata,
    constructor: Option<NodeConstructor>,
    inline: Option<InlineExecutor>,
}

impl NodeDefinition {
    pub(crate) fn new(
        metadata: NodeMetadata,
        constructor: Option<NodeConstructor>,
        inline: Option<InlineExecutor>,
    ) -> Self {
        Self {
            metadata,
            constructor,
            inline,
        }
    }

    pub fn id(&self) -> &str {
        &self.metadata.id
    }

    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    pub fn category(&self) -> &str {
        &self.metadata.category
    }

    /// Produce fresh instance data for a node with the given id
    pub fn instantiate(&self, node_id: impl Into<String>) -> NodeData {
        NodeData {
            id: node_id.into(),
            definition_id: self.metadata.id.clone(),
            callable: self.metadata.callable,
            is_execution_initiator: self.metadata.execution_initiator,
            inputs: self.metadata.inputs.clone(),
            outputs: self.metadata.outputs.clone(),
        }
    }

    /// Create a new instance of the backing node type
    pub fn create_node(&self) -> Option<Box<dyn Node>> {
        self.constructor.as_ref().map(|c| c())
    }

    /// The inline executor, for definitions without a backing type
    pub fn inline_executor(&self) -> Option<&InlineExecutor> {
        self.inline.as_ref()
    }

    /// Whether the definition can be executed at all
    pub fn is_executable(&self) -> bool {
        self.constructor.is_some() || self.inline.is_some()
    }
}

impl fmt::Debug for NodeDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeDefinition")
            .field("metadata", &self.metadata)
            .field("backed", &self.constructor.is_some())
            .field("inline", &self.inline.is_some())
            .finish()
    }
}
