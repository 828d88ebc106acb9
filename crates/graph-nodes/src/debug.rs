//! Debug nodes

use async_trait::async_trait;
use graph_engine::{
    CancellationToken, ExecutionContext, FeedbackLevel, Node, NodeBuilder, NodeDescriptor, Result,
    EXIT,
};
use serde_json::Value;

use crate::inline::display;

/// Debug Print
///
/// Sends `Value` to observers as an info feedback message, then continues
/// through `Exit`. Strings are printed as-is, other values as JSON.
#[derive(Default)]
pub struct DebugPrint;

impl DebugPrint {
    pub const PORT_VALUE: &'static str = "Value";
}

impl NodeDescriptor for DebugPrint {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("debug.print")
            .name("Debug Print")
            .category("Debug")
            .description("Prints a value to the run's feedback channel")
            .callable()
            .input_default::<Value>(Self::PORT_VALUE, Value::Null);
    }
}

#[async_trait]
impl Node for DebugPrint {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let value = ctx.input_value(Self::PORT_VALUE).await?;
        let message = display(&value);
        log::info!("[{}] {}", ctx.node_id(), message);
        ctx.feedback(FeedbackLevel::Info, message);
        ctx.trigger(EXIT).await
    }
}

graph_engine::register_node!(DebugPrint);
