//! Loop nodes
//!
//! Every loop runs inside a single `execute` call. Each iteration triggers
//! `LoopPath` and waits for that subtree to finish before advancing, then the
//! loop triggers `Exit` once. Cancellation is checked between iterations.
//!
//! The condition-driven loops (While, Do While, Repeat Until) re-read their
//! `Condition` input every iteration and stop after
//! [`RunOptions::loop_iteration_limit`](graph_engine::RunOptions) iterations.

use async_trait::async_trait;
use graph_engine::{
    CancellationToken, ExecutionContext, Node, NodeBuilder, NodeDescriptor, Result, EXIT,
};
use serde_json::Value;

const CATEGORY: &str = "Loops";

pub const PORT_LOOP_PATH: &str = "LoopPath";
pub const PORT_INDEX: &str = "Index";
pub const PORT_CONDITION: &str = "Condition";

/// For Loop
///
/// # Inputs
/// - `Count` (Integer, default 0)
///
/// # Outputs
/// - `Index` - current iteration, from 0 to Count - 1
#[derive(Default)]
pub struct ForLoop;

impl ForLoop {
    pub const PORT_COUNT: &'static str = "Count";
}

impl NodeDescriptor for ForLoop {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("loops.for")
            .name("For Loop")
            .category(CATEGORY)
            .description("Runs LoopPath Count times")
            .callable()
            .execution_output(PORT_LOOP_PATH)
            .input_default::<i64>(Self::PORT_COUNT, 0)
            .output::<i64>(PORT_INDEX);
    }
}

#[async_trait]
impl Node for ForLoop {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let count: i64 = ctx.input(Self::PORT_COUNT).await?;
        for index in 0..count.max(0) {
            ctx.check_cancelled()?;
            ctx.set_output(PORT_INDEX, index)?;
            ctx.trigger(PORT_LOOP_PATH).await?;
        }
        ctx.trigger(EXIT).await
    }
}

/// For Loop Step
///
/// Counts from `Start` toward `End` (exclusive) by `Step`. A zero step exits
/// immediately.
#[derive(Default)]
pub struct ForLoopStep;

impl ForLoopStep {
    pub const PORT_START: &'static str = "Start";
    pub const PORT_END: &'static str = "End";
    pub const PORT_STEP: &'static str = "Step";
}

impl NodeDescriptor for ForLoopStep {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("loops.for_step")
            .name("For Loop Step")
            .category(CATEGORY)
            .description("Runs LoopPath from Start toward End by Step")
            .callable()
            .execution_output(PORT_LOOP_PATH)
            .input_default::<i64>(Self::PORT_START, 0)
            .input_default::<i64>(Self::PORT_END, 0)
            .input_default::<i64>(Self::PORT_STEP, 1)
            .output::<i64>(PORT_INDEX);
    }
}

#[async_trait]
impl Node for ForLoopStep {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let start: i64 = ctx.input(Self::PORT_START).await?;
        let end: i64 = ctx.input(Self::PORT_END).await?;
        let step: i64 = ctx.input(Self::PORT_STEP).await?;

        if step == 0 {
            log::warn!("For Loop Step '{}' has a zero step; exiting", ctx.node_id());
            return ctx.trigger(EXIT).await;
        }

        let mut index = start;
        while (step > 0 && index < end) || (step < 0 && index > end) {
            ctx.check_cancelled()?;
            ctx.set_output(PORT_INDEX, index)?;
            ctx.trigger(PORT_LOOP_PATH).await?;
            match index.checked_add(step) {
                Some(next) => index = next,
                None => break,
            }
        }
        ctx.trigger(EXIT).await
    }
}

/// For Each
///
/// Runs `LoopPath` once per element of `List`, in order, with `Obj` holding
/// the element and `Index` its position.
#[derive(Default)]
pub struct ForEachLoop;

impl ForEachLoop {
    pub const PORT_LIST: &'static str = "List";
    pub const PORT_OBJ: &'static str = "Obj";
}

impl NodeDescriptor for ForEachLoop {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("loops.for_each")
            .name("For Each")
            .category(CATEGORY)
            .description("Runs LoopPath for every list element")
            .callable()
            .execution_output(PORT_LOOP_PATH)
            .input::<Vec<Value>>(Self::PORT_LIST)
            .output::<Value>(Self::PORT_OBJ)
            .output::<i64>(PORT_INDEX);
    }
}

#[async_trait]
impl Node for ForEachLoop {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let items: Vec<Value> = ctx.input(Self::PORT_LIST).await?;
        for (index, item) in items.into_iter().enumerate() {
            ctx.check_cancelled()?;
            ctx.set_output_value(Self::PORT_OBJ, item)?;
            ctx.set_output(PORT_INDEX, index)?;
            ctx.trigger(PORT_LOOP_PATH).await?;
        }
        ctx.trigger(EXIT).await
    }
}

/// When a condition-driven loop tests its condition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Test {
    /// Before each iteration; continue while true
    While,
    /// After each iteration; continue while true
    DoWhile,
    /// After each iteration; continue until true
    RepeatUntil,
}

/// Shared body of the condition-driven loops
async fn run_conditional(ctx: &ExecutionContext, test: Test) -> Result<()> {
    let limit = ctx.options().loop_iteration_limit;
    let mut iterations: usize = 0;

    loop {
        ctx.check_cancelled()?;
        if iterations >= limit {
            log::warn!(
                "Loop '{}' reached the iteration limit of {}; exiting",
                ctx.node_id(),
                limit
            );
            break;
        }
        ctx.set_output(PORT_INDEX, iterations)?;

        if test == Test::While && !ctx.input::<bool>(PORT_CONDITION).await? {
            break;
        }
        ctx.trigger(PORT_LOOP_PATH).await?;
        iterations += 1;

        let proceed = match test {
            Test::While => true,
            Test::DoWhile => ctx.input::<bool>(PORT_CONDITION).await?,
            Test::RepeatUntil => !ctx.input::<bool>(PORT_CONDITION).await?,
        };
        if !proceed {
            break;
        }
    }

    log::debug!("Loop '{}' finished after {} iterations", ctx.node_id(), iterations);
    ctx.trigger(EXIT).await
}

fn conditional(builder: &mut NodeBuilder, id: &str, name: &str, description: &str) {
    builder
        .id(id)
        .name(name)
        .category(CATEGORY)
        .description(description)
        .callable()
        .execution_output(PORT_LOOP_PATH)
        .input_default::<bool>(PORT_CONDITION, false)
        .output::<i64>(PORT_INDEX);
}

/// While: tests `Condition` before every iteration
#[derive(Default)]
pub struct WhileLoop;

impl NodeDescriptor for WhileLoop {
    fn configure(builder: &mut NodeBuilder) {
        conditional(builder, "loops.while", "While", "Runs LoopPath while Condition holds");
    }
}

#[async_trait]
impl Node for WhileLoop {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        run_conditional(ctx, Test::While).await
    }
}

/// Do While: runs the body once, then continues while `Condition` holds
#[derive(Default)]
pub struct DoWhileLoop;

impl NodeDescriptor for DoWhileLoop {
    fn configure(builder: &mut NodeBuilder) {
        conditional(
            builder,
            "loops.do_while",
            "Do While",
            "Runs LoopPath once, then again while Condition holds",
        );
    }
}

#[async_trait]
impl Node for DoWhileLoop {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        run_conditional(ctx, Test::DoWhile).await
    }
}

/// Repeat Until: runs the body until `Condition` becomes true
#[derive(Default)]
pub struct RepeatUntilLoop;

impl NodeDescriptor for RepeatUntilLoop {
    fn configure(builder: &mut NodeBuilder) {
        conditional(
            builder,
            "loops.repeat_until",
            "Repeat Until",
            "Runs LoopPath until Condition holds",
        );
    }
}

#[async_trait]
impl Node for RepeatUntilLoop {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        run_conditional(ctx, Test::RepeatUntil).await
    }
}

graph_engine::register_node!(
    ForLoop,
    ForLoopStep,
    ForEachLoop,
    WhileLoop,
    DoWhileLoop,
    RepeatUntilLoop,
);
