//! The node contract
//!
//! Every executable node type implements [`Node`] for its runtime behavior
//! and [`NodeDescriptor`] to declare its sockets. The engine creates one
//! instance per node id per run, calls [`Node::on_created`] once, runs
//! [`Node::execute`] whenever the node is triggered (or pulled, for data-only
//! nodes), and calls [`Node::on_disposed`] after the run.
//!
//! # Example
//!
//! ```ignore
//! #[derive(Default)]
//! struct Negate;
//!
//! impl NodeDescriptor for Negate {
//!     fn configure(builder: &mut NodeBuilder) {
//!         builder
//!             .id("math.negate")
//!             .name("Negate")
//!             .category("Math")
//!             .input::<f64>("Value")
//!             .output::<f64>("Result");
//!     }
//! }
//!
//! #[async_trait]
//! impl Node for Negate {
//!     async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
//!         let value: f64 = ctx.input("Value").await?;
//!         ctx.set_output("Result", -value)
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::builder::NodeBuilder;
use crate::context::ExecutionContext;
use crate::definition::NodeDefinition;
use crate::error::Result;
use crate::services::NodeServices;

/// Runtime behavior of a node type.
///
/// Bodies take `&self`: the engine holds no lock on an instance, so a node
/// that keeps state across invocations within a run uses interior mutability.
/// Triggering the same node id concurrently from two independent branches is
/// the graph author's responsibility.
#[async_trait]
pub trait Node: Send + Sync {
    /// Run the node body.
    ///
    /// Callable nodes run each time one of their execution inputs is
    /// triggered. Data-only nodes run lazily when a downstream node reads one
    /// of their outputs.
    async fn execute(&self, ctx: &ExecutionContext, cancel: &CancellationToken) -> Result<()>;

    /// Called once after the instance is created, before the run starts.
    fn on_created(&mut self, _services: &NodeServices) -> Result<()> {
        Ok(())
    }

    /// Called once after the run has finished.
    fn on_disposed(&self) {}
}

/// Static description of a node type
pub trait NodeDescriptor: Node + Default + 'static {
    /// Declare metadata and sockets.
    ///
    /// Called out of run, at discovery time. Must only build metadata.
    fn configure(builder: &mut NodeBuilder);

    /// Build the definition for this node type
    fn definition() -> Result<NodeDefinition>
    where
        Self: Sized,
    {
        let mut builder = NodeBuilder::for_type::<Self>();
        Self::configure(&mut builder);
        builder.build()
    }
}

/// How a stream emission schedules its downstream branch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamMode {
    /// Await each item's downstream branch before emitting the next
    #[default]
    Sequential,
    /// Spawn each item's downstream branch and continue immediately
    FireAndForget,
}
