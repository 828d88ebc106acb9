//! Standard Nodes
//!
//! The node library shipped with the graph engine. Every node here is an
//! ordinary [`graph_engine::Node`] implementation or inline definition,
//! discovered at link time.
//!
//! # Categories
//!
//! - **Flow**: run entry, branching, sequencing, delays
//! - **Loops**: counted, list-driven and condition-driven loops
//! - **Events**: graph-scoped named events
//! - **Streams**: item-by-item emission over a list
//! - **Debug**: feedback messages for observers
//! - **Math**, **String**, **List**, **Logic**: pure inline data nodes

use graph_engine::{NodeRegistry, Result};

/// Submit inline definition factories for link-time discovery
macro_rules! register_inline {
    ($($definition:path),+ $(,)?) => {
        $(
            inventory::submit! {
                graph_engine::NodeRegistration::new(module_path!(), $definition)
            }
        )+
    };
}

mod inline;
#[cfg(test)]
mod testing;

pub mod debug;
pub mod events;
pub mod flow;
pub mod list;
pub mod logic;
pub mod loops;
pub mod math;
pub mod streams;
pub mod string;

pub use debug::DebugPrint;
pub use events::{EventListener, TriggerEvent};
pub use flow::{Branch, Delay, Sequence, Start};
pub use loops::{DoWhileLoop, ForEachLoop, ForLoop, ForLoopStep, RepeatUntilLoop, WhileLoop};
pub use streams::{StreamList, StreamListParallel};

/// Module prefix of every node in this crate
pub const MODULE: &str = module_path!();

/// A registry holding every standard node
pub fn standard_registry() -> Result<NodeRegistry> {
    NodeRegistry::with_discovered(&[MODULE])
}
