//! Stream nodes
//!
//! Emit the elements of a list one at a time through a stream group:
//! `Item` holds the element, `OnItem` runs per element and `Completed` runs
//! once every element's branch has finished.

use async_trait::async_trait;
use graph_engine::{
    CancellationToken, ExecutionContext, Node, NodeBuilder, NodeDescriptor, Result, StreamMode,
    ENTER,
};
use serde_json::Value;

const CATEGORY: &str = "Streams";

pub const PORT_LIST: &str = "List";
pub const PORT_ITEM: &str = "Item";
pub const PORT_ON_ITEM: &str = "OnItem";
pub const PORT_COMPLETED: &str = "Completed";

fn stream_list(builder: &mut NodeBuilder, mode: StreamMode) {
    builder
        .category(CATEGORY)
        .execution_input(ENTER)
        .input::<Vec<Value>>(PORT_LIST)
        .stream_output::<Value>(PORT_ITEM, PORT_ON_ITEM, Some(PORT_COMPLETED))
        .stream_mode(mode);
}

async fn emit_all(ctx: &ExecutionContext) -> Result<()> {
    let items: Vec<Value> = ctx.input(PORT_LIST).await?;
    log::debug!("Streaming {} items from '{}'", items.len(), ctx.node_id());
    for item in items {
        ctx.emit(PORT_ITEM, item).await?;
    }
    ctx.complete_stream(PORT_ITEM).await
}

/// Stream List: each item's branch finishes before the next is emitted
#[derive(Default)]
pub struct StreamList;

impl NodeDescriptor for StreamList {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("streams.list")
            .name("Stream List")
            .description("Emits list elements one after another");
        stream_list(builder, StreamMode::Sequential);
    }
}

#[async_trait]
impl Node for StreamList {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        emit_all(ctx).await
    }
}

/// Stream List Parallel: item branches run concurrently in isolated scopes
#[derive(Default)]
pub struct StreamListParallel;

impl NodeDescriptor for StreamListParallel {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("streams.list_parallel")
            .name("Stream List Parallel")
            .description("Emits list elements without waiting for their branches");
        stream_list(builder, StreamMode::FireAndForget);
    }
}

#[async_trait]
impl Node for StreamListParallel {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        emit_all(ctx).await
    }
}

graph_engine::register_node!(StreamList, StreamListParallel);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use serde_json::json;

    #[test]
    fn test_stream_group_declared() {
        let definition = StreamListParallel::definition().unwrap();
        let group = definition.metadata.stream(PORT_ITEM).unwrap();
        assert_eq!(group.item_emitted, PORT_ON_ITEM);
        assert_eq!(group.completed.as_deref(), Some(PORT_COMPLETED));
        assert_eq!(definition.metadata.stream_mode, Some(StreamMode::FireAndForget));
    }

    #[tokio::test]
    async fn test_sequential_stream_preserves_order() {
        let registry = testing::registry();
        let graph = testing::graph(&registry)
            .add_node("start", "flow.start")
            .add_node("stream", "streams.list")
            .with_default("List", json!([1, 2, 3]))
            .add_node("print", "debug.print")
            .add_node("done", "debug.print")
            .with_default("Value", json!("done"))
            .connect("start", "Exit", "stream", ENTER)
            .connect("stream", PORT_ON_ITEM, "print", ENTER)
            .connect("stream", PORT_ITEM, "print", "Value")
            .connect("stream", PORT_COMPLETED, "done", ENTER)
            .build()
            .unwrap();

        let (report, messages) = testing::run(registry, &graph).await;
        assert!(report.is_completed(), "{:?}", report);
        assert_eq!(messages, vec!["1", "2", "3", "done"]);
    }

    #[tokio::test]
    async fn test_parallel_stream_items_see_their_own_value() {
        let registry = testing::registry();
        let graph = testing::graph(&registry)
            .add_node("start", "flow.start")
            .add_node("stream", "streams.list_parallel")
            .with_default("List", json!(["a", "b", "c"]))
            .add_node("print", "debug.print")
            .add_node("done", "debug.print")
            .with_default("Value", json!("done"))
            .connect("start", "Exit", "stream", ENTER)
            .connect("stream", PORT_ON_ITEM, "print", ENTER)
            .connect("stream", PORT_ITEM, "print", "Value")
            .connect("stream", PORT_COMPLETED, "done", ENTER)
            .build()
            .unwrap();

        let (report, mut messages) = testing::run(registry, &graph).await;
        assert!(report.is_completed(), "{:?}", report);
        assert_eq!(messages.pop().as_deref(), Some("done"));
        messages.sort();
        assert_eq!(messages, vec!["a", "b", "c"]);
    }
}
