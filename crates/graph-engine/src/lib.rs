//! Graph Engine - execution runtime for visual-programming node graphs
//!
//! Graphs are made of typed nodes wired through two kinds of connections:
//!
//! - **Execution** connections carry control flow. Triggering an execution
//!   output runs every node connected to it, in connection order.
//! - **Data** connections carry values. Data-only nodes run lazily when a
//!   downstream node reads one of their outputs, and are memoized until an
//!   upstream value changes.
//!
//! # Architecture
//!
//! - [`NodeBuilder`] / [`NodeDescriptor`]: declare node types and their sockets
//! - [`NodeRegistry`]: definitions by id, filled by link-time discovery
//! - [`Graph`] / [`GraphBuilder`]: mutable graph editing with validation
//! - [`ExecutionService`]: runs a graph snapshot to a [`RunReport`]
//! - [`ExecutionContext`]: what a node body sees while it runs
//! - [`RuntimeStorage`]: scoped values, memoization markers and variables
//! - [`EventSink`]: observation of run progress (not tied to any UI)
//!
//! # Example
//!
//! ```ignore
//! use graph_engine::{ExecutionService, GraphBuilder, NodeRegistry, RunOptions};
//!
//! let registry = Arc::new(NodeRegistry::with_discovered(&["graph_nodes"])?);
//! let graph = GraphBuilder::new(&registry, "hello", "Hello")
//!     .add_node("start", "flow.start")
//!     .add_node("print", "debug.print")
//!     .with_default("Value", json!("hello"))
//!     .connect("start", "Exit", "print", "Enter")
//!     .build()?;
//!
//! let report = ExecutionService::new(registry)
//!     .run(&graph, RunOptions::default(), CancellationToken::new())
//!     .await;
//! ```

pub mod builder;
pub mod context;
pub mod definition;
pub mod error;
pub mod events;
pub mod gate;
pub mod graph;
pub mod node;
pub mod options;
pub mod registry;
pub mod runtime;
pub mod service;
pub mod services;
pub mod storage;
pub mod types;
pub mod validation;
pub mod value;
pub mod variables;

// Re-export key types
pub use builder::{NodeBuilder, EVENT_NAME};
pub use context::ExecutionContext;
pub use definition::{InlineInputs, InlineOutputs, NodeDefinition, NodeMetadata, StreamGroup};
pub use error::{EngineError, Result};
pub use events::{
    ChannelEventSink, EventSink, ExecutionEvent, FeedbackLevel, LogEventSink, NullEventSink,
    VecEventSink,
};
pub use gate::{ExecutionGate, GateMode};
pub use graph::{Graph, GraphBuilder, GraphSnapshot};
pub use node::{Node, NodeDescriptor, StreamMode};
pub use options::{ExecutionMode, RunOptions};
pub use registry::{NodeRegistration, NodeRegistry};
pub use runtime::{ExecutionRuntime, RuntimeConfig};
pub use service::{ExecutionService, RunFailure, RunOutcome, RunReport};
pub use services::NodeServices;
pub use storage::RuntimeStorage;
pub use types::{Connection, DataType, GraphVariable, NodeData, Socket, SocketDirection, ENTER, EXIT};
pub use validation::ValidationError;
pub use value::SocketValue;

// Used by `register_node!` and by node crates implementing `Node`
pub use async_trait::async_trait;
pub use inventory;
pub use tokio_util::sync::CancellationToken;

/// Submit node types for link-time discovery.
///
/// Each type must implement [`NodeDescriptor`]. Registrations carry the
/// calling module path so [`NodeRegistry::with_discovered`] can filter them.
///
/// ```ignore
/// graph_engine::register_node!(Branch, Sequence);
/// ```
#[macro_export]
macro_rules! register_node {
    ($($node:ty),+ $(,)?) => {
        $(
            $crate::inventory::submit! {
                $crate::NodeRegistration::new(
                    module_path!(),
                    <$node as $crate::NodeDescriptor>::definition,
                )
            }
        )+
    };
}
