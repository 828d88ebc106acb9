//! Graph-scoped named events
//!
//! A Trigger Event node fires an event by name; every Event Listener whose
//! `Event` input names it runs before the trigger continues through `Exit`.

use async_trait::async_trait;
use graph_engine::{
    CancellationToken, EngineError, ExecutionContext, Node, NodeBuilder, NodeDescriptor, Result,
    EVENT_NAME, EXIT,
};

const CATEGORY: &str = "Events";

/// Trigger Event
///
/// # Inputs
/// - `Event` (String) - name of the event to fire
#[derive(Default)]
pub struct TriggerEvent;

impl NodeDescriptor for TriggerEvent {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("events.trigger")
            .name("Trigger Event")
            .category(CATEGORY)
            .description("Fires a named graph event")
            .callable()
            .input::<String>(EVENT_NAME)
            .hint("event-name");
    }
}

#[async_trait]
impl Node for TriggerEvent {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let event: String = ctx.input(EVENT_NAME).await?;
        if event.trim().is_empty() {
            return Err(EngineError::failed("event name is empty"));
        }
        log::debug!("'{}' firing event '{}'", ctx.node_id(), event);
        ctx.fire_event(&event).await?;
        ctx.trigger(EXIT).await
    }
}

/// Event Listener
///
/// Runs whenever the event named by its `Event` input fires.
#[derive(Default)]
pub struct EventListener;

impl NodeDescriptor for EventListener {
    fn configure(builder: &mut NodeBuilder) {
        builder
            .id("events.listener")
            .name("Event Listener")
            .category(CATEGORY)
            .description("Continues when a named graph event fires")
            .event_listener();
    }
}

#[async_trait]
impl Node for EventListener {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        ctx.trigger(EXIT).await
    }
}

graph_engine::register_node!(TriggerEvent, EventListener);
