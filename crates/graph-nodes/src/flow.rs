//! Flow nodes
//!
//! Run entry, branching, fixed sequencing and timed delays.

use std::time::Duration;

use async_trait::async_trait;
use graph_engine::{
    CancellationToken, EngineError, ExecutionContext, Node, NodeBuilder, NodeDescriptor, Result,
    ENTER, EXIT,
};

const CATEGORY: &str = "Flow";

/// Run entry point; triggers `Exit` once
#[derive(Default)]
pub struct Start;

impl NodeDescriptor for Start {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("flow.start")
            .name("Start")
            .category(CATEGORY)
            .description("Entry point of a run")
            .execution_initiator();
    }
}

#[async_trait]
impl Node for Start {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        ctx.trigger(EXIT).await
    }
}

/// Branch
///
/// Triggers exactly one of `True` / `False` depending on `Condition`.
///
/// # Inputs
/// - `Condition` (Boolean, default false)
#[derive(Default)]
pub struct Branch;

impl Branch {
    pub const PORT_CONDITION: &'static str = "Condition";
    pub const PORT_TRUE: &'static str = "True";
    pub const PORT_FALSE: &'static str = "False";
}

impl NodeDescriptor for Branch {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("flow.branch")
            .name("Branch")
            .category(CATEGORY)
            .description("Continues through True or False")
            .execution_input(ENTER)
            .execution_output(Self::PORT_TRUE)
            .execution_output(Self::PORT_FALSE)
            .input_default::<bool>(Self::PORT_CONDITION, false);
    }
}

#[async_trait]
impl Node for Branch {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let condition: bool = ctx.input(Self::PORT_CONDITION).await?;
        log::debug!("Branch '{}': condition={}", ctx.node_id(), condition);
        if condition {
            ctx.trigger(Self::PORT_TRUE).await
        } else {
            ctx.trigger(Self::PORT_FALSE).await
        }
    }
}

/// Sequence
///
/// Triggers `Then 0` through `Then 3` in order, each after the previous
/// subtree has finished.
#[derive(Default)]
pub struct Sequence;

impl Sequence {
    /// Number of `Then` outputs
    pub const OUTPUTS: usize = 4;

    pub fn port(index: usize) -> String {
        format!("Then {}", index)
    }
}

impl NodeDescriptor for Sequence {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("flow.sequence")
            .name("Sequence")
            .category(CATEGORY)
            .description("Runs each Then output in order")
            .execution_input(ENTER);
        for index in 0..Self::OUTPUTS {
            builder.execution_output(Self::port(index));
        }
    }
}

#[async_trait]
impl Node for Sequence {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        for index in 0..Self::OUTPUTS {
            ctx.trigger(&Self::port(index)).await?;
        }
        Ok(())
    }
}

/// Delay
///
/// Waits `Milliseconds` before triggering `Exit`. Cancelling the run ends the
/// wait early with a cancelled outcome.
#[derive(Default)]
pub struct Delay;

impl Delay {
    pub const PORT_MILLISECONDS: &'static str = "Milliseconds";
}

impl NodeDescriptor for Delay {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("flow.delay")
            .name("Delay")
            .category(CATEGORY)
            .description("Waits before continuing")
            .callable()
            .input_default::<u64>(Self::PORT_MILLISECONDS, 1000)
            .hint("milliseconds");
    }
}

#[async_trait]
impl Node for Delay {
    async fn execute(&self, ctx: &ExecutionContext, cancel: &CancellationToken) -> Result<()> {
        let millis: u64 = ctx.input(Self::PORT_MILLISECONDS).await?;
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(millis)) => {}
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
        }
        ctx.trigger(EXIT).await
    }
}

graph_engine::register_node!(Start, Branch, Sequence, Delay);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_branch_descriptor() {
        let definition = Branch::definition().unwrap();
        assert_eq!(definition.id(), "flow.branch");
        assert!(definition.metadata.outputs.iter().any(|s| s.name == "True"));
        assert!(definition.metadata.outputs.iter().any(|s| s.name == "False"));
        assert!(!definition.metadata.outputs.iter().any(|s| s.name == EXIT));
    }

    #[tokio::test]
    async fn test_branch_false_takes_false_path_only() {
        let registry = testing::registry();
        let graph = testing::graph(&registry)
            .add_node("start", "flow.start")
            .add_node("branch", "flow.branch")
            .with_default("Condition", json!(false))
            .add_node("yes", "debug.print")
            .with_default("Value", json!("yes"))
            .add_node("no", "debug.print")
            .with_default("Value", json!("no"))
            .connect("start", EXIT, "branch", ENTER)
            .connect("branch", "True", "yes", ENTER)
            .connect("branch", "False", "no", ENTER)
            .build()
            .unwrap();

        let (report, messages) = testing::run(registry, &graph).await;
        assert!(report.is_completed(), "{:?}", report);
        assert_eq!(messages, vec!["no"]);
    }

    #[tokio::test]
    async fn test_sequence_runs_outputs_in_order() {
        let registry = testing::registry();
        let graph = testing::graph(&registry)
            .add_node("start", "flow.start")
            .add_node("seq", "flow.sequence")
            .add_node("second", "debug.print")
            .with_default("Value", json!("second"))
            .add_node("first", "debug.print")
            .with_default("Value", json!("first"))
            .connect("start", EXIT, "seq", ENTER)
            .connect("seq", "Then 2", "second", ENTER)
            .connect("seq", "Then 0", "first", ENTER)
            .build()
            .unwrap();

        let (report, messages) = testing::run(registry, &graph).await;
        assert!(report.is_completed());
        assert_eq!(messages, vec!["first", "second"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_waits() {
        let registry = testing::registry();
        let graph = testing::graph(&registry)
            .add_node("start", "flow.start")
            .add_node("delay", "flow.delay")
            .with_default("Milliseconds", json!(250))
            .connect("start", EXIT, "delay", ENTER)
            .build()
            .unwrap();

        let started = tokio::time::Instant::now();
        let (report, _) = testing::run(registry, &graph).await;
        assert!(report.is_completed());
        assert!(started.elapsed() >= Duration::from_millis(250));
    }
}
