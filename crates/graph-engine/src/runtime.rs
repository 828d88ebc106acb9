//! Execution runtime
//!
//! The runtime owns everything that stays fixed for one run: the resolved
//! definitions, the connection lookup maps, the node instances and the event
//! listeners. Node bodies reach it through their [`ExecutionContext`].
//!
//! # Propagation
//!
//! Triggering an execution output runs each connected target node in
//! connection order, depth-first: [`ExecutionRuntime::trigger`] only returns
//! once every downstream subtree has finished. Every propagation passes the
//! [`ExecutionGate`] first. Deep chains continue on a new task at fixed depth
//! intervals so the configured call depth is reachable on a normal thread stack.
//!
//! # Lazy data
//!
//! Data-only nodes never run on their own. When an input is read, the
//! upstream data node is brought up to date first: it re-executes only if it
//! never ran in the current scope chain or one of its inputs was written after
//! it last started. Callable upstream nodes are never pulled; their last
//! output is read as-is.

use std::collections::HashMap;
use std::sync::Arc;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures_util::future::BoxFuture;
use parking_lot::RwLock;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::context::ExecutionContext;
use crate::definition::{InlineExecutor, InlineInputs, NodeDefinition};
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ExecutionEvent, NullEventSink};
use crate::gate::ExecutionGate;
use crate::graph::GraphSnapshot;
use crate::node::Node;
use crate::options::RunOptions;
use crate::registry::NodeRegistry;
use crate::services::NodeServices;
use crate::storage::RuntimeStorage;
use crate::types::{NodeData, NodeId};
use crate::validation;

type SocketKey = (NodeId, String);

/// Nesting levels polled on one task before propagation moves to a new one
const STACK_HOP_DEPTH: usize = 32;

/// Collaborators of a runtime that are chosen by the caller
#[derive(Clone)]
pub struct RuntimeConfig {
    pub run_id: String,
    pub options: RunOptions,
    pub events: Arc<dyn EventSink>,
    pub gate: Arc<ExecutionGate>,
    pub services: Arc<NodeServices>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            run_id: uuid::Uuid::new_v4().to_string(),
            options: RunOptions::default(),
            events: Arc::new(NullEventSink),
            gate: Arc::new(ExecutionGate::new()),
            services: Arc::new(NodeServices::new()),
        }
    }
}

struct ResolvedNode {
    data: Arc<NodeData>,
    definition: Arc<NodeDefinition>,
}

struct RuntimeInner {
    run_id: String,
    options: RunOptions,
    /// Node ids in declaration order
    order: Vec<NodeId>,
    nodes: HashMap<NodeId, ResolvedNode>,
    /// (node, execution output) -> targets in connection order
    exec_fanout: HashMap<SocketKey, Vec<SocketKey>>,
    /// (node, data input) -> upstream (node, output)
    data_inputs: HashMap<SocketKey, SocketKey>,
    instances: DashMap<NodeId, Arc<dyn Node>>,
    listeners: RwLock<HashMap<String, Vec<NodeId>>>,
    gate: Arc<ExecutionGate>,
    events: Arc<dyn EventSink>,
    services: Arc<NodeServices>,
    background: TaskTracker,
}

/// Orchestrates one run over an immutable graph snapshot.
///
/// Cheap to clone; clones share the same run.
#[derive(Clone)]
pub struct ExecutionRuntime {
    inner: Arc<RuntimeInner>,
}

impl ExecutionRuntime {
    /// Resolve every node's definition and build the connection maps.
    ///
    /// Fails fast on unknown definitions, definitions that cannot execute
    /// and malformed connections.
    pub fn new(
        snapshot: &GraphSnapshot,
        registry: &NodeRegistry,
        config: RuntimeConfig,
    ) -> Result<Self> {
        if let Some(error) = validation::validate(snapshot, registry).into_iter().next() {
            return Err(error.into());
        }

        let mut order = Vec::with_capacity(snapshot.nodes.len());
        let mut nodes = HashMap::with_capacity(snapshot.nodes.len());
        for node in snapshot.nodes.iter() {
            let definition =
                registry
                    .get(&node.definition_id)
                    .ok_or_else(|| EngineError::DefinitionNotFound {
                        node_id: node.id.clone(),
                        definition_id: node.definition_id.clone(),
                    })?;
            order.push(node.id.clone());
            nodes.insert(
                node.id.clone(),
                ResolvedNode {
                    data: Arc::new(node.clone()),
                    definition,
                },
            );
        }

        let mut exec_fanout: HashMap<SocketKey, Vec<SocketKey>> = HashMap::new();
        let mut data_inputs = HashMap::new();
        for connection in snapshot.connections.iter() {
            let source = (connection.source_node.clone(), connection.source_socket.clone());
            let target = (connection.target_node.clone(), connection.target_socket.clone());
            if connection.is_execution {
                exec_fanout.entry(source).or_default().push(target);
            } else {
                data_inputs.insert(target, source);
            }
        }

        log::debug!(
            "Runtime '{}' prepared: {} nodes, {} execution outputs, {} data inputs",
            config.run_id,
            order.len(),
            exec_fanout.len(),
            data_inputs.len()
        );

        Ok(Self {
            inner: Arc::new(RuntimeInner {
                run_id: config.run_id,
                options: config.options,
                order,
                nodes,
                exec_fanout,
                data_inputs,
                instances: DashMap::new(),
                listeners: RwLock::new(HashMap::new()),
                gate: config.gate,
                events: config.events,
                services: config.services,
                background: TaskTracker::new(),
            }),
        })
    }

    pub fn run_id(&self) -> &str {
        &self.inner.run_id
    }

    pub fn options(&self) -> &RunOptions {
        &self.inner.options
    }

    pub fn services(&self) -> &NodeServices {
        &self.inner.services
    }

    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.inner.gate
    }

    /// Number of nodes in the snapshot
    pub fn node_count(&self) -> usize {
        self.inner.order.len()
    }

    /// Instance data of a node
    pub fn node(&self, node_id: &str) -> Option<&NodeData> {
        self.inner.nodes.get(node_id).map(|n| n.data.as_ref())
    }

    /// Resolved definition of a node
    pub fn definition(&self, node_id: &str) -> Option<&Arc<NodeDefinition>> {
        self.inner.nodes.get(node_id).map(|n| &n.definition)
    }

    /// Initiator node ids in declaration order
    pub fn initiators(&self) -> Vec<NodeId> {
        self.inner
            .order
            .iter()
            .filter(|id| {
                self.inner
                    .nodes
                    .get(*id)
                    .is_some_and(|n| n.data.is_execution_initiator)
            })
            .cloned()
            .collect()
    }

    /// Event-listener node ids in declaration order
    pub fn event_listener_nodes(&self) -> Vec<NodeId> {
        self.inner
            .order
            .iter()
            .filter(|id| {
                self.inner
                    .nodes
                    .get(*id)
                    .is_some_and(|n| n.definition.metadata.event_listener)
            })
            .cloned()
            .collect()
    }

    /// Subscribe a node to a named graph event
    pub fn register_listener(&self, event: &str, node_id: &str) {
        log::debug!("Node '{}' listens for event '{}'", node_id, event);
        self.inner
            .listeners
            .write()
            .entry(event.to_string())
            .or_default()
            .push(node_id.to_string());
    }

    /// Nodes subscribed to a named event
    pub fn listeners(&self, event: &str) -> Vec<NodeId> {
        self.inner
            .listeners
            .read()
            .get(event)
            .cloned()
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Instances
    // ------------------------------------------------------------------

    /// Create the instance of every backed node, calling `on_created`
    pub fn create_instances(&self) -> Result<()> {
        for node_id in &self.inner.order {
            if let Some(resolved) = self.inner.nodes.get(node_id) {
                if resolved.definition.inline_executor().is_none() {
                    self.instance(resolved)?;
                }
            }
        }
        log::debug!(
            "Created {} node instances for run '{}'",
            self.inner.instances.len(),
            self.inner.run_id
        );
        Ok(())
    }

    /// Call `on_disposed` on every created instance and drop it
    pub fn dispose(&self) {
        for node_id in &self.inner.order {
            if let Some((_, instance)) = self.inner.instances.remove(node_id) {
                instance.on_disposed();
            }
        }
    }

    /// Number of live node instances
    pub fn instance_count(&self) -> usize {
        self.inner.instances.len()
    }

    fn instance(&self, resolved: &ResolvedNode) -> Result<Arc<dyn Node>> {
        match self.inner.instances.entry(resolved.data.id.clone()) {
            Entry::Occupied(entry) => Ok(entry.get().clone()),
            Entry::Vacant(entry) => {
                let mut node = resolved.definition.create_node().ok_or_else(|| {
                    EngineError::InvalidDefinition {
                        definition_id: resolved.definition.id().to_string(),
                        reason: "definition has no backing node type".to_string(),
                    }
                })?;
                node.on_created(&self.inner.services)?;
                let node: Arc<dyn Node> = Arc::from(node);
                Ok(entry.insert(node).clone())
            }
        }
    }

    // ------------------------------------------------------------------
    // Propagation
    // ------------------------------------------------------------------

    /// Start an initiator node at depth zero
    pub async fn run_initiator(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: &str,
        cancel: CancellationToken,
    ) -> Result<()> {
        log::debug!("Starting initiator '{}'", node_id);
        self.execute_node(storage, node_id.to_string(), None, 0, cancel)
            .await
    }

    /// Run every target connected to an execution output, in connection order
    pub fn trigger(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: NodeId,
        socket: String,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let runtime = self.clone();
        Box::pin(async move {
            runtime.inner.gate.wait(&cancel).await?;

            let key = (node_id, socket);
            let Some(targets) = runtime.inner.exec_fanout.get(&key) else {
                return Ok(());
            };
            for (target, target_socket) in targets {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                runtime
                    .execute_node(
                        storage.clone(),
                        target.clone(),
                        Some(target_socket.clone()),
                        depth + 1,
                        cancel.clone(),
                    )
                    .await?;
            }
            Ok(())
        })
    }

    /// Run every listener of a named event
    pub fn fire_event(
        &self,
        storage: Arc<RuntimeStorage>,
        event: String,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let runtime = self.clone();
        Box::pin(async move {
            runtime.inner.gate.wait(&cancel).await?;

            let listeners = runtime.listeners(&event);
            if listeners.is_empty() {
                log::debug!("Event '{}' has no listeners", event);
            }
            for listener in listeners {
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                runtime
                    .execute_node(storage.clone(), listener, None, depth + 1, cancel.clone())
                    .await?;
            }
            Ok(())
        })
    }

    /// Run one node body in the given storage scope
    pub(crate) fn execute_node(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: NodeId,
        entered_via: Option<String>,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let body = self.run_node(storage, node_id, entered_via, depth, cancel);
        self.on_fresh_stack(depth, body)
    }

    /// Poll deep propagation from a new task every [`STACK_HOP_DEPTH`] levels.
    ///
    /// Nested node bodies are polled inside each other, so without a hop the
    /// thread stack grows with the call depth.
    fn on_fresh_stack(
        &self,
        depth: usize,
        future: BoxFuture<'static, Result<()>>,
    ) -> BoxFuture<'static, Result<()>> {
        if depth == 0 || depth % STACK_HOP_DEPTH != 0 {
            return future;
        }
        let tracker = self.inner.background.clone();
        Box::pin(async move {
            log::trace!("Continuing propagation on a new task at depth {}", depth);
            match tracker.spawn(future).await {
                Ok(result) => result,
                Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
                Err(_) => Err(EngineError::Cancelled),
            }
        })
    }

    fn run_node(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: NodeId,
        entered_via: Option<String>,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let runtime = self.clone();
        Box::pin(async move {
            let resolved = runtime.resolved(&node_id)?;
            let node = resolved.data.clone();
            let definition = resolved.definition.clone();

            if depth > runtime.inner.options.max_call_depth {
                let error = EngineError::CallDepthExceeded {
                    node_id: node.id.clone(),
                    max_depth: runtime.inner.options.max_call_depth,
                };
                log::error!("{}", error);
                runtime.emit(ExecutionEvent::NodeFailed {
                    run_id: runtime.inner.run_id.clone(),
                    node_id: node.id.clone(),
                    definition_id: node.definition_id.clone(),
                    error: error.to_string(),
                });
                return Err(error);
            }
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            let started_at = storage.generation();
            log::debug!(
                "Executing '{}' ({}) depth={} scope={}",
                node.id,
                node.definition_id,
                depth,
                storage.scope_path()
            );
            runtime.emit(ExecutionEvent::NodeStarted {
                run_id: runtime.inner.run_id.clone(),
                node_id: node.id.clone(),
                definition_id: node.definition_id.clone(),
            });

            let ctx = ExecutionContext::new(
                runtime.clone(),
                storage.clone(),
                node.clone(),
                definition.clone(),
                entered_via,
                depth,
                cancel.clone(),
            );
            let body = match definition.inline_executor().cloned() {
                Some(inline) => run_inline(&ctx, &inline).await,
                None => match runtime.instance(resolved) {
                    Ok(instance) => instance.execute(&ctx, &cancel).await,
                    Err(e) => Err(e),
                },
            };
            let result = match (body, ctx.finish().await) {
                (Err(e), streams) => {
                    if let Err(stream_error) = streams {
                        log::warn!("Stream branch of '{}' also failed: {}", node.id, stream_error);
                    }
                    Err(e)
                }
                (Ok(()), streams) => streams,
            };

            match result {
                Ok(()) => {
                    storage.mark_executed(&node.id, started_at);
                    runtime.emit(ExecutionEvent::NodeCompleted {
                        run_id: runtime.inner.run_id.clone(),
                        node_id: node.id.clone(),
                        definition_id: node.definition_id.clone(),
                    });
                    Ok(())
                }
                Err(e) => Err(runtime.attribute(e, &node)),
            }
        })
    }

    /// Bring a data-only node up to date in the given scope
    fn ensure_fresh(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: NodeId,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let refresh = self.refresh(storage, node_id, depth, cancel);
        self.on_fresh_stack(depth, refresh)
    }

    fn refresh(
        &self,
        storage: Arc<RuntimeStorage>,
        node_id: NodeId,
        depth: usize,
        cancel: CancellationToken,
    ) -> BoxFuture<'static, Result<()>> {
        let runtime = self.clone();
        Box::pin(async move {
            let resolved = runtime.resolved(&node_id)?;
            let node = resolved.data.clone();
            let volatile = resolved.definition.metadata.volatile;
            if node.callable {
                return Ok(());
            }
            if depth > runtime.inner.options.max_call_depth {
                return Err(EngineError::CallDepthExceeded {
                    node_id,
                    max_depth: runtime.inner.options.max_call_depth,
                });
            }

            let mut newest = 0;
            for socket in node.inputs.iter().filter(|s| !s.is_execution()) {
                if let Some(seeded) = storage.value_generation(&node.id, &socket.name) {
                    newest = newest.max(seeded);
                    continue;
                }
                let key = (node.id.clone(), socket.name.clone());
                if let Some((source, source_socket)) = runtime.inner.data_inputs.get(&key) {
                    runtime
                        .ensure_fresh(storage.clone(), source.clone(), depth + 1, cancel.clone())
                        .await?;
                    if let Some(stamp) = storage.value_generation(source, source_socket) {
                        newest = newest.max(stamp);
                    }
                }
            }

            if let Some(executed_at) = storage.executed_at(&node.id) {
                if executed_at >= newest && !volatile {
                    return Ok(());
                }
                log::debug!("Data node '{}' is stale, re-executing", node.id);
            }
            runtime
                .execute_node(storage, node_id, None, depth + 1, cancel)
                .await
        })
    }

    /// Resolve a data input: seeded value, upstream output, then socket default
    pub(crate) async fn resolve_input(
        &self,
        storage: &Arc<RuntimeStorage>,
        node: &NodeData,
        socket: &str,
        depth: usize,
        cancel: &CancellationToken,
    ) -> Result<Option<Value>> {
        if let Some(value) = storage.get_value(&node.id, socket) {
            return Ok(Some(value));
        }

        let key = (node.id.clone(), socket.to_string());
        if let Some((source, source_socket)) = self.inner.data_inputs.get(&key) {
            self.ensure_fresh(storage.clone(), source.clone(), depth, cancel.clone())
                .await?;
            if let Some(value) = storage.get_value(source, source_socket) {
                return Ok(Some(value));
            }
        }

        Ok(node.input(socket).and_then(|s| s.default_value.clone()))
    }

    // ------------------------------------------------------------------
    // Background work and events
    // ------------------------------------------------------------------

    /// Spawn run-scoped background work, awaited by [`ExecutionRuntime::shutdown`]
    pub(crate) fn spawn_background<F>(&self, future: F) -> JoinHandle<Result<()>>
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        self.inner.background.spawn(future)
    }

    /// Wait for all background work spawned during the run
    pub async fn shutdown(&self) {
        self.inner.background.close();
        self.inner.background.wait().await;
    }

    pub(crate) fn emit(&self, event: ExecutionEvent) {
        if let Err(e) = self.inner.events.send(event) {
            log::debug!("Dropped execution event: {}", e);
        }
    }

    fn resolved(&self, node_id: &str) -> Result<&ResolvedNode> {
        self.inner
            .nodes
            .get(node_id)
            .ok_or_else(|| EngineError::InvalidGraph(format!("unknown node '{}'", node_id)))
    }

    /// Wrap a body error into [`EngineError::NodeFailed`] unless it already
    /// names where the run broke
    fn attribute(&self, error: EngineError, node: &NodeData) -> EngineError {
        if error.is_attributed() {
            return error;
        }
        let message = error.to_string();
        log::warn!("Node '{}' ({}) failed: {}", node.id, node.definition_id, message);
        self.emit(ExecutionEvent::NodeFailed {
            run_id: self.inner.run_id.clone(),
            node_id: node.id.clone(),
            definition_id: node.definition_id.clone(),
            error: message.clone(),
        });
        EngineError::NodeFailed {
            node_id: node.id.clone(),
            definition_id: node.definition_id.clone(),
            message,
        }
    }
}

/// Resolve every data input, call the inline executor and store its outputs
async fn run_inline(ctx: &ExecutionContext, executor: &InlineExecutor) -> Result<()> {
    let mut inputs = InlineInputs::new();
    for socket in ctx.node().inputs.iter().filter(|s| !s.is_execution()) {
        let value = ctx.input_value(&socket.name).await?;
        inputs.insert(socket.name.clone(), value);
    }
    for (socket, value) in executor(&inputs)? {
        ctx.set_output_value(&socket, value)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::NodeBuilder;
    use crate::events::VecEventSink;
    use crate::node::NodeDescriptor;
    use crate::types::{Connection, EXIT};
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    static CONSTANT_RUNS: AtomicUsize = AtomicUsize::new(0);

    #[derive(Default)]
    struct Start;

    impl NodeDescriptor for Start {
        fn configure(builder: &mut NodeBuilder) {
            builder.id("test.start").execution_initiator();
        }
    }

    #[async_trait]
    impl Node for Start {
        async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
            ctx.trigger(EXIT).await
        }
    }

    #[derive(Default)]
    struct Record;

    impl NodeDescriptor for Record {
        fn configure(builder: &mut NodeBuilder) {
            builder
                .id("test.record")
                .callable()
                .input_of("Value", crate::types::DataType::Any)
                .default_value(json!(null));
        }
    }

    #[async_trait]
    impl Node for Record {
        async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
            let value = ctx.input_value("Value").await?;
            ctx.feedback(crate::events::FeedbackLevel::Info, value.to_string());
            ctx.trigger(EXIT).await
        }
    }

    #[derive(Default)]
    struct Fail;

    impl NodeDescriptor for Fail {
        fn configure(builder: &mut NodeBuilder) {
            builder.id("test.fail").callable();
        }
    }

    #[async_trait]
    impl Node for Fail {
        async fn execute(&self, _ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
            Err(EngineError::failed("boom"))
        }
    }

    /// Callable node with a second execution input, used to close cycles
    #[derive(Default)]
    struct Rejoin;

    impl NodeDescriptor for Rejoin {
        fn configure(builder: &mut NodeBuilder) {
            builder.id("test.rejoin").callable().execution_input("Again");
        }
    }

    #[async_trait]
    impl Node for Rejoin {
        async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
            ctx.trigger(EXIT).await
        }
    }

    /// Emits one fire-and-forget item from a child scope and never completes
    #[derive(Default)]
    struct ChildEmitter;

    impl NodeDescriptor for ChildEmitter {
        fn configure(builder: &mut NodeBuilder) {
            builder
                .id("test.child_emitter")
                .execution_initiator()
                .stream_output::<i64>("Item", "OnItem", None)
                .stream_mode(crate::node::StreamMode::FireAndForget);
        }
    }

    #[async_trait]
    impl Node for ChildEmitter {
        async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
            let child = ctx.create_child("child", true);
            child.emit("Item", 1).await
        }
    }

    fn registry() -> NodeRegistry {
        let mut registry = NodeRegistry::new();
        registry.register(Start::definition().unwrap()).unwrap();
        registry.register(Rejoin::definition().unwrap()).unwrap();
        registry.register(ChildEmitter::definition().unwrap()).unwrap();
        registry.register(Record::definition().unwrap()).unwrap();
        registry.register(Fail::definition().unwrap()).unwrap();
        registry
            .register(
                NodeBuilder::new("test.constant")
                    .output::<i64>("Value")
                    .inline(|_| {
                        CONSTANT_RUNS.fetch_add(1, Ordering::SeqCst);
                        Ok(InlineInputs::from([("Value".to_string(), json!(42))]))
                    })
                    .build()
                    .unwrap(),
            )
            .unwrap();
        registry
    }

    fn node(registry: &NodeRegistry, id: &str, definition: &str) -> NodeData {
        registry.get(definition).unwrap().instantiate(id)
    }

    fn runtime_with_sink(snapshot: &GraphSnapshot, registry: &NodeRegistry) -> (ExecutionRuntime, Arc<VecEventSink>) {
        let sink = Arc::new(VecEventSink::new());
        let config = RuntimeConfig {
            events: sink.clone(),
            ..RuntimeConfig::default()
        };
        (ExecutionRuntime::new(snapshot, registry, config).unwrap(), sink)
    }

    #[tokio::test]
    async fn test_trigger_runs_targets_in_connection_order() {
        let registry = registry();
        let mut first = node(&registry, "first", "test.record");
        first.input_mut("Value").unwrap().default_value = Some(json!("first"));
        let mut second = node(&registry, "second", "test.record");
        second.input_mut("Value").unwrap().default_value = Some(json!("second"));

        let snapshot = GraphSnapshot::new(
            vec![node(&registry, "start", "test.start"), first, second],
            vec![
                Connection::execution("start", EXIT, "first", "Enter"),
                Connection::execution("first", EXIT, "second", "Enter"),
            ],
        );
        let (runtime, sink) = runtime_with_sink(&snapshot, &registry);
        let storage = Arc::new(RuntimeStorage::new());

        runtime
            .run_initiator(storage.clone(), "start", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(sink.feedback_messages(), vec!["\"first\"", "\"second\""]);
        assert!(storage.is_executed("second"));
    }

    #[tokio::test]
    async fn test_data_node_memoized_across_readers() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "start", "test.start"),
                node(&registry, "constant", "test.constant"),
                node(&registry, "a", "test.record"),
                node(&registry, "b", "test.record"),
            ],
            vec![
                Connection::execution("start", EXIT, "a", "Enter"),
                Connection::execution("a", EXIT, "b", "Enter"),
                Connection::data("constant", "Value", "a", "Value"),
                Connection::data("constant", "Value", "b", "Value"),
            ],
        );
        let (runtime, sink) = runtime_with_sink(&snapshot, &registry);

        let before = CONSTANT_RUNS.load(Ordering::SeqCst);
        runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "start", CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(CONSTANT_RUNS.load(Ordering::SeqCst) - before, 1);
        assert_eq!(sink.feedback_messages(), vec!["42", "42"]);
    }

    #[tokio::test]
    async fn test_failure_is_attributed_once() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "start", "test.start"),
                node(&registry, "record", "test.record"),
                node(&registry, "fail", "test.fail"),
            ],
            vec![
                Connection::execution("start", EXIT, "record", "Enter"),
                Connection::execution("record", EXIT, "fail", "Enter"),
            ],
        );
        let (runtime, sink) = runtime_with_sink(&snapshot, &registry);

        let err = runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "start", CancellationToken::new())
            .await
            .unwrap_err();

        assert_eq!(err.failed_node(), Some(("fail", "test.fail")));
        let failures = sink
            .events()
            .into_iter()
            .filter(|e| matches!(e, ExecutionEvent::NodeFailed { .. }))
            .count();
        assert_eq!(failures, 1);
    }

    #[tokio::test]
    async fn test_call_depth_limit() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "start", "test.start"),
                node(&registry, "a", "test.record"),
                node(&registry, "b", "test.record"),
            ],
            vec![
                Connection::execution("start", EXIT, "a", "Enter"),
                Connection::execution("a", EXIT, "b", "Enter"),
            ],
        );
        let config = RuntimeConfig {
            options: RunOptions::default().with_max_call_depth(1),
            ..RuntimeConfig::default()
        };
        let runtime = ExecutionRuntime::new(&snapshot, &registry, config).unwrap();

        let err = runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "start", CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::CallDepthExceeded { ref node_id, max_depth: 1 } if node_id == "b"));
    }

    #[tokio::test]
    async fn test_execution_cycle_stops_at_default_depth() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "start", "test.start"),
                node(&registry, "join", "test.rejoin"),
                node(&registry, "record", "test.record"),
            ],
            vec![
                Connection::execution("start", EXIT, "join", "Enter"),
                Connection::execution("join", EXIT, "record", "Enter"),
                Connection::execution("record", EXIT, "join", "Again"),
            ],
        );
        let (runtime, sink) = runtime_with_sink(&snapshot, &registry);

        let err = runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "start", CancellationToken::new())
            .await
            .unwrap_err();
        runtime.shutdown().await;

        let max_depth = RunOptions::default().max_call_depth;
        assert!(matches!(err, EngineError::CallDepthExceeded { max_depth: m, .. } if m == max_depth));
        // Every level up to the limit ran; record sits on even depths
        assert_eq!(sink.feedback_messages().len(), max_depth / 2);
    }

    #[tokio::test]
    async fn test_branch_failure_from_child_context_is_reported() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "emitter", "test.child_emitter"),
                node(&registry, "fail", "test.fail"),
            ],
            vec![Connection::execution("emitter", "OnItem", "fail", "Enter")],
        );
        let runtime = ExecutionRuntime::new(&snapshot, &registry, RuntimeConfig::default()).unwrap();

        let err = runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "emitter", CancellationToken::new())
            .await
            .unwrap_err();
        runtime.shutdown().await;

        assert_eq!(err.failed_node(), Some(("fail", "test.fail")));
    }

    #[test]
    fn test_unknown_definition_fails_fast() {
        let registry = registry();
        let mut orphan = node(&registry, "orphan", "test.record");
        orphan.definition_id = "test.missing".to_string();
        let snapshot = GraphSnapshot::new(vec![orphan], vec![]);

        let result = ExecutionRuntime::new(&snapshot, &registry, RuntimeConfig::default());
        assert!(matches!(result, Err(EngineError::DefinitionNotFound { .. })));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(vec![node(&registry, "start", "test.start")], vec![]);
        let runtime = ExecutionRuntime::new(&snapshot, &registry, RuntimeConfig::default()).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = runtime
            .run_initiator(Arc::new(RuntimeStorage::new()), "start", cancel)
            .await
            .unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn test_instances_created_and_disposed() {
        let registry = registry();
        let snapshot = GraphSnapshot::new(
            vec![
                node(&registry, "start", "test.start"),
                node(&registry, "constant", "test.constant"),
            ],
            vec![],
        );
        let runtime = ExecutionRuntime::new(&snapshot, &registry, RuntimeConfig::default()).unwrap();

        runtime.create_instances().unwrap();
        // Inline definitions have no instance
        assert_eq!(runtime.instance_count(), 1);
        runtime.dispose();
        assert_eq!(runtime.instance_count(), 0);
    }
}
