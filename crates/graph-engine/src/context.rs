//! Per-invocation API handed to node bodies
//!
//! An [`ExecutionContext`] is created every time the runtime runs a node. It
//! reads inputs (pulling upstream data nodes on demand), writes outputs,
//! propagates triggers, emits stream items and reaches graph variables. All
//! reads and writes go through the storage scope the invocation runs in.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::definition::{NodeDefinition, StreamGroup};
use crate::error::{EngineError, Result};
use crate::events::{ExecutionEvent, FeedbackLevel};
use crate::node::StreamMode;
use crate::options::RunOptions;
use crate::runtime::ExecutionRuntime;
use crate::services::NodeServices;
use crate::storage::RuntimeStorage;
use crate::types::{NodeData, Socket};
use crate::value::{coerce, SocketValue};

/// A fire-and-forget item branch still owned by this invocation
struct PendingBranch {
    item: String,
    handle: JoinHandle<Result<()>>,
}

/// Runtime façade for one node invocation
pub struct ExecutionContext {
    runtime: ExecutionRuntime,
    storage: Arc<RuntimeStorage>,
    node: Arc<NodeData>,
    definition: Arc<NodeDefinition>,
    entered_via: Option<String>,
    depth: usize,
    cancel: CancellationToken,
    /// Shared with child contexts so the invocation awaits their branches too
    pending: Arc<Mutex<Vec<PendingBranch>>>,
    emitted: AtomicUsize,
}

impl ExecutionContext {
    pub(crate) fn new(
        runtime: ExecutionRuntime,
        storage: Arc<RuntimeStorage>,
        node: Arc<NodeData>,
        definition: Arc<NodeDefinition>,
        entered_via: Option<String>,
        depth: usize,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            runtime,
            storage,
            node,
            definition,
            entered_via,
            depth,
            cancel,
            pending: Arc::new(Mutex::new(Vec::new())),
            emitted: AtomicUsize::new(0),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node.id
    }

    pub fn definition_id(&self) -> &str {
        &self.node.definition_id
    }

    /// Instance data of the running node
    pub fn node(&self) -> &NodeData {
        &self.node
    }

    /// The execution input that started this invocation.
    ///
    /// `None` for initiators, event listeners and lazily pulled data nodes.
    pub fn entered_via(&self) -> Option<&str> {
        self.entered_via.as_deref()
    }

    /// Trigger nesting depth of this invocation
    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn run_id(&self) -> &str {
        self.runtime.run_id()
    }

    /// The storage scope this invocation reads and writes
    pub fn storage(&self) -> &Arc<RuntimeStorage> {
        &self.storage
    }

    pub fn options(&self) -> &RunOptions {
        self.runtime.options()
    }

    pub fn services(&self) -> &NodeServices {
        self.runtime.services()
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fail with [`EngineError::Cancelled`] if the run was cancelled
    pub fn check_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            Err(EngineError::Cancelled)
        } else {
            Ok(())
        }
    }

    // ------------------------------------------------------------------
    // Inputs and outputs
    // ------------------------------------------------------------------

    /// Read an input, converted to `T`.
    ///
    /// Resolves a seeded value, then the upstream connection (pulling data
    /// nodes as needed), then the socket default, then the type default.
    pub async fn input<T: SocketValue>(&self, socket: &str) -> Result<T> {
        let value = self.input_value(socket).await?;
        self.convert(socket, value)
    }

    /// Read an input, or `None` when nothing provides a value.
    ///
    /// Unlike [`ExecutionContext::input`] no type default is substituted.
    pub async fn input_opt<T: SocketValue>(&self, socket: &str) -> Result<Option<T>> {
        let declared = self.data_input(socket)?;
        match self.resolve(socket).await? {
            Some(value) => {
                let value = self.coerce_declared(declared, value)?;
                self.convert(socket, value).map(Some)
            }
            None => Ok(None),
        }
    }

    /// Read an input as a raw value, coerced to the socket's declared type
    pub async fn input_value(&self, socket: &str) -> Result<Value> {
        let declared = self.data_input(socket)?;
        match self.resolve(socket).await? {
            Some(value) => self.coerce_declared(declared, value),
            None => declared
                .data_type
                .default_value()
                .ok_or_else(|| EngineError::UnresolvableInput {
                    node_id: self.node.id.clone(),
                    socket: socket.to_string(),
                }),
        }
    }

    /// Write a data output
    pub fn set_output<T: Serialize>(&self, socket: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.set_output_value(socket, value)
    }

    /// Write a data output from a raw value
    pub fn set_output_value(&self, socket: &str, value: Value) -> Result<()> {
        match self.node.output(socket) {
            Some(s) if !s.is_execution() => {
                self.storage.set_value(&self.node.id, socket, value);
                Ok(())
            }
            _ => Err(self.unknown_socket(socket)),
        }
    }

    /// Read the current value of one of this node's outputs
    pub fn output_value(&self, socket: &str) -> Option<Value> {
        self.storage.get_value(&self.node.id, socket)
    }

    async fn resolve(&self, socket: &str) -> Result<Option<Value>> {
        self.runtime
            .resolve_input(&self.storage, &self.node, socket, self.depth, &self.cancel)
            .await
    }

    fn data_input(&self, socket: &str) -> Result<&Socket> {
        match self.node.input(socket) {
            Some(s) if !s.is_execution() => Ok(s),
            _ => Err(self.unknown_socket(socket)),
        }
    }

    fn coerce_declared(&self, declared: &Socket, value: Value) -> Result<Value> {
        coerce(value, declared.data_type).ok_or_else(|| EngineError::TypeMismatch {
            node_id: self.node.id.clone(),
            socket: declared.name.clone(),
            expected: format!("{:?}", declared.data_type),
        })
    }

    fn convert<T: SocketValue>(&self, socket: &str, value: Value) -> Result<T> {
        let value = match coerce(value.clone(), T::data_type()) {
            Some(coerced) => coerced,
            None => value,
        };
        serde_json::from_value(value).map_err(|_| EngineError::TypeMismatch {
            node_id: self.node.id.clone(),
            socket: socket.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
    }

    fn unknown_socket(&self, socket: &str) -> EngineError {
        EngineError::UnknownSocket {
            node_id: self.node.id.clone(),
            socket: socket.to_string(),
        }
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    /// Run everything connected to an execution output.
    ///
    /// Returns once the whole downstream subtree has finished.
    pub async fn trigger(&self, socket: &str) -> Result<()> {
        match self.node.output(socket) {
            Some(s) if s.is_execution() => {}
            _ => return Err(self.unknown_socket(socket)),
        }
        self.runtime
            .trigger(
                self.storage.clone(),
                self.node.id.clone(),
                socket.to_string(),
                self.depth,
                self.cancel.clone(),
            )
            .await
    }

    /// Fire a named graph event; every listener for it runs before this returns
    pub async fn fire_event(&self, name: &str) -> Result<()> {
        self.runtime
            .fire_event(
                self.storage.clone(),
                name.to_string(),
                self.depth,
                self.cancel.clone(),
            )
            .await
    }

    // ------------------------------------------------------------------
    // Streams
    // ------------------------------------------------------------------

    /// Emit one item through the stream group whose item socket is `item_socket`
    pub async fn emit<T: Serialize>(&self, item_socket: &str, item: T) -> Result<()> {
        self.check_cancelled()?;
        let group = self.stream_group(item_socket)?;
        let value = serde_json::to_value(item)?;

        match self.stream_mode() {
            StreamMode::Sequential => {
                self.set_output_value(item_socket, value)?;
                self.trigger(&group.item_emitted).await
            }
            StreamMode::FireAndForget => {
                let index = self.emitted.fetch_add(1, Ordering::SeqCst);
                let scope = format!("stream:{}:{}:{}", self.node.id, item_socket, index);
                let branch_storage = self.storage.create_child(&scope, true);
                branch_storage.set_value(&self.node.id, item_socket, value);

                let branch = self.runtime.trigger(
                    branch_storage,
                    self.node.id.clone(),
                    group.item_emitted,
                    self.depth,
                    self.cancel.clone(),
                );
                let handle = self.runtime.spawn_background(branch);
                self.pending.lock().push(PendingBranch {
                    item: item_socket.to_string(),
                    handle,
                });
                Ok(())
            }
        }
    }

    /// Finish a stream: wait for its outstanding item branches, then trigger
    /// its completed socket if it declares one
    pub async fn complete_stream(&self, item_socket: &str) -> Result<()> {
        let group = self.stream_group(item_socket)?;
        let branches: Vec<_> = {
            let mut pending = self.pending.lock();
            let (ours, rest): (Vec<_>, Vec<_>) =
                pending.drain(..).partition(|b| b.item == item_socket);
            *pending = rest;
            ours
        };
        join_branches(branches).await?;

        match group.completed {
            Some(completed) => self.trigger(&completed).await,
            None => Ok(()),
        }
    }

    /// Await every branch this invocation spawned and did not complete
    pub(crate) async fn finish(&self) -> Result<()> {
        let branches: Vec<_> = self.pending.lock().drain(..).collect();
        join_branches(branches).await
    }

    fn stream_group(&self, item_socket: &str) -> Result<StreamGroup> {
        self.definition
            .metadata
            .stream(item_socket)
            .cloned()
            .ok_or_else(|| self.unknown_socket(item_socket))
    }

    fn stream_mode(&self) -> StreamMode {
        self.definition
            .metadata
            .stream_mode
            .unwrap_or(self.runtime.options().stream_mode)
    }

    // ------------------------------------------------------------------
    // Variables and feedback
    // ------------------------------------------------------------------

    /// Read a graph variable
    pub fn variable<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.storage.get_variable(name) {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub fn variable_value(&self, name: &str) -> Option<Value> {
        self.storage.get_variable(name)
    }

    /// Write a graph variable
    pub fn set_variable<T: Serialize>(&self, name: &str, value: T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.storage.set_variable(name, value);
        Ok(())
    }

    /// Send a side-channel message to observers
    pub fn feedback(&self, level: FeedbackLevel, message: impl Into<String>) {
        let message = message.into();
        log::debug!("[{}] {:?}: {}", self.node.id, level, message);
        self.runtime.emit(ExecutionEvent::feedback(
            self.runtime.run_id(),
            &self.node.id,
            level,
            message,
        ));
    }

    /// A context for the same node running in an isolated child scope.
    ///
    /// Stream branches emitted through the child belong to the same
    /// invocation and are awaited when it finishes.
    pub fn create_child(&self, scope_name: &str, inherit_variables: bool) -> ExecutionContext {
        let mut child = ExecutionContext::new(
            self.runtime.clone(),
            self.storage.create_child(scope_name, inherit_variables),
            self.node.clone(),
            self.definition.clone(),
            self.entered_via.clone(),
            self.depth,
            self.cancel.clone(),
        );
        child.pending = self.pending.clone();
        child
    }
}

/// Await branches in spawn order, returning the first error after all finish
async fn join_branches(branches: Vec<PendingBranch>) -> Result<()> {
    let mut first_error = None;
    for branch in branches {
        let outcome = match branch.handle.await {
            Ok(result) => result,
            Err(e) => Err(EngineError::failed(format!("stream branch aborted: {}", e))),
        };
        if let Err(e) = outcome {
            if first_error.is_none() {
                first_error = Some(e);
            } else {
                log::warn!("Additional stream branch failure: {}", e);
            }
        }
    }
    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}
