//! Execution service: the entry point for running a graph
//!
//! A run goes through these stages:
//!
//! 1. snapshot the graph and resolve it against the registry
//! 2. seed graph variables into storage
//! 3. subscribe event-listener nodes to their event names
//! 4. create every node instance (`on_created`)
//! 5. start the initiators, concurrently or in declaration order
//! 6. wait for background stream branches, then dispose the instances
//!
//! The run always ends in a [`RunReport`]; failures and cancellation are
//! reported, never raised past the service.

use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::builder::EVENT_NAME;
use crate::error::{EngineError, Result};
use crate::events::{EventSink, ExecutionEvent, NullEventSink};
use crate::gate::ExecutionGate;
use crate::graph::{Graph, GraphSnapshot};
use crate::options::RunOptions;
use crate::registry::NodeRegistry;
use crate::runtime::{ExecutionRuntime, RuntimeConfig};
use crate::services::NodeServices;
use crate::storage::RuntimeStorage;

/// A failure recorded during a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunFailure {
    /// Node that failed, when the error names one
    pub node_id: Option<String>,
    pub definition_id: Option<String>,
    pub message: String,
}

impl RunFailure {
    fn from_error(error: &EngineError, snapshot: &GraphSnapshot) -> Self {
        let node_id = match error {
            EngineError::NodeFailed { node_id, .. }
            | EngineError::CallDepthExceeded { node_id, .. }
            | EngineError::DefinitionNotFound { node_id, .. }
            | EngineError::UnresolvableInput { node_id, .. }
            | EngineError::TypeMismatch { node_id, .. }
            | EngineError::UnknownSocket { node_id, .. } => Some(node_id.clone()),
            _ => None,
        };
        let definition_id = match error {
            EngineError::NodeFailed { definition_id, .. }
            | EngineError::DefinitionNotFound { definition_id, .. } => Some(definition_id.clone()),
            _ => node_id
                .as_deref()
                .and_then(|id| snapshot.node(id))
                .map(|n| n.definition_id.clone()),
        };
        let message = match error {
            EngineError::NodeFailed { message, .. } => message.clone(),
            other => other.to_string(),
        };
        Self {
            node_id,
            definition_id,
            message,
        }
    }
}

/// Terminal state of a run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "camelCase")]
pub enum RunOutcome {
    Completed,
    /// The first recorded failure
    #[serde(rename_all = "camelCase")]
    Failed {
        node_id: Option<String>,
        definition_id: Option<String>,
        message: String,
    },
    Cancelled,
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Summary of a finished run
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    pub outcome: RunOutcome,
    /// Every failure, in the order it was observed
    pub failures: Vec<RunFailure>,
    pub duration: Duration,
}

impl RunReport {
    pub fn is_completed(&self) -> bool {
        self.outcome.is_completed()
    }
}

/// Runs graphs against a registry
pub struct ExecutionService {
    registry: Arc<NodeRegistry>,
    events: Arc<dyn EventSink>,
    gate: Arc<ExecutionGate>,
    services: Arc<NodeServices>,
}

impl ExecutionService {
    pub fn new(registry: Arc<NodeRegistry>) -> Self {
        Self {
            registry,
            events: Arc::new(NullEventSink),
            gate: Arc::new(ExecutionGate::new()),
            services: Arc::new(NodeServices::new()),
        }
    }

    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Share a gate so a debugger can pause and step runs
    pub fn with_gate(mut self, gate: Arc<ExecutionGate>) -> Self {
        self.gate = gate;
        self
    }

    pub fn with_services(mut self, services: NodeServices) -> Self {
        self.services = Arc::new(services);
        self
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn gate(&self) -> &Arc<ExecutionGate> {
        &self.gate
    }

    /// Snapshot a live graph and run it with fresh storage
    pub async fn run(&self, graph: &Graph, options: RunOptions, cancel: CancellationToken) -> RunReport {
        self.execute(
            &graph.snapshot(),
            Arc::new(RuntimeStorage::new()),
            options,
            cancel,
        )
        .await
    }

    /// Run a snapshot in the given storage
    pub async fn execute(
        &self,
        snapshot: &GraphSnapshot,
        storage: Arc<RuntimeStorage>,
        options: RunOptions,
        cancel: CancellationToken,
    ) -> RunReport {
        let started = Instant::now();
        let run_id = uuid::Uuid::new_v4().to_string();
        log::info!(
            "Run '{}' starting: {} nodes, {} connections, mode {:?}",
            run_id,
            snapshot.nodes.len(),
            snapshot.connections.len(),
            options.mode
        );

        let config = RuntimeConfig {
            run_id: run_id.clone(),
            options,
            events: self.events.clone(),
            gate: self.gate.clone(),
            services: self.services.clone(),
        };
        let runtime = match self
            .registry_for(snapshot)
            .and_then(|registry| ExecutionRuntime::new(snapshot, &registry, config))
        {
            Ok(runtime) => runtime,
            Err(error) => {
                let failures = vec![RunFailure::from_error(&error, snapshot)];
                return self.finish(run_id, started, &cancel, failures);
            }
        };
        self.emit(ExecutionEvent::RunStarted {
            run_id: run_id.clone(),
            node_count: runtime.node_count(),
        });

        seed_variables(snapshot, &storage);
        register_listeners(&runtime, &storage);

        let mut errors = Vec::new();
        match runtime.create_instances() {
            Ok(()) => {
                errors = run_initiators(&runtime, &storage, &cancel).await;
            }
            Err(error) => {
                log::error!("Run '{}' could not create node instances: {}", run_id, error);
                errors.push(error);
            }
        }

        runtime.shutdown().await;
        runtime.dispose();

        let failures = errors
            .iter()
            .filter(|e| !e.is_cancelled())
            .map(|e| RunFailure::from_error(e, snapshot))
            .collect();
        self.finish(run_id, started, &cancel, failures)
    }

    /// Add variable getters and setters for the snapshot's variables
    fn registry_for(&self, snapshot: &GraphSnapshot) -> Result<Cow<'_, NodeRegistry>> {
        if snapshot.variables.is_empty() {
            return Ok(Cow::Borrowed(self.registry.as_ref()));
        }
        let mut registry = self.registry.as_ref().clone();
        for variable in snapshot.variables.iter() {
            registry.declare_variable(variable)?;
        }
        Ok(Cow::Owned(registry))
    }

    fn finish(
        &self,
        run_id: String,
        started: Instant,
        cancel: &CancellationToken,
        failures: Vec<RunFailure>,
    ) -> RunReport {
        let duration = started.elapsed();
        let outcome = if cancel.is_cancelled() {
            log::info!("Run '{}' cancelled after {:?}", run_id, duration);
            self.emit(ExecutionEvent::RunCancelled {
                run_id: run_id.clone(),
            });
            RunOutcome::Cancelled
        } else if let Some(first) = failures.first() {
            log::error!(
                "Run '{}' failed at {:?}: {}",
                run_id,
                first.node_id,
                first.message
            );
            self.emit(ExecutionEvent::RunFailed {
                run_id: run_id.clone(),
                node_id: first.node_id.clone(),
                error: first.message.clone(),
            });
            RunOutcome::Failed {
                node_id: first.node_id.clone(),
                definition_id: first.definition_id.clone(),
                message: first.message.clone(),
            }
        } else {
            log::info!("Run '{}' completed in {:?}", run_id, duration);
            self.emit(ExecutionEvent::RunCompleted {
                run_id: run_id.clone(),
                duration_ms: duration.as_millis() as u64,
            });
            RunOutcome::Completed
        };

        RunReport {
            run_id,
            outcome,
            failures,
            duration,
        }
    }

    fn emit(&self, event: ExecutionEvent) {
        if let Err(e) = self.events.send(event) {
            log::debug!("Dropped execution event: {}", e);
        }
    }
}

/// Seed declared defaults for variables the storage does not hold yet
fn seed_variables(snapshot: &GraphSnapshot, storage: &RuntimeStorage) {
    for variable in snapshot.variables.iter() {
        if !storage.has_variable(&variable.name) {
            storage.set_variable(&variable.name, variable.default_value.clone());
        }
    }
}

fn register_listeners(runtime: &ExecutionRuntime, storage: &RuntimeStorage) {
    for node_id in runtime.event_listener_nodes() {
        let name = storage.get_value(&node_id, EVENT_NAME).or_else(|| {
            runtime
                .node(&node_id)
                .and_then(|n| n.input(EVENT_NAME))
                .and_then(|s| s.default_value.clone())
        });
        match name.as_ref().and_then(Value::as_str) {
            Some(event) if !event.is_empty() => runtime.register_listener(event, &node_id),
            _ => log::warn!("Event listener '{}' has no event name", node_id),
        }
    }
}

/// Start every initiator; returns the errors they ended with
async fn run_initiators(
    runtime: &ExecutionRuntime,
    storage: &Arc<RuntimeStorage>,
    cancel: &CancellationToken,
) -> Vec<EngineError> {
    let initiators = runtime.initiators();
    let mut errors = Vec::new();

    if runtime.options().runs_in_parallel() && initiators.len() > 1 {
        let semaphore = Arc::new(Semaphore::new(runtime.options().max_parallelism));
        let mut join_set = JoinSet::new();
        for node_id in initiators {
            let runtime = runtime.clone();
            let storage = storage.clone();
            let cancel = cancel.clone();
            let semaphore = semaphore.clone();
            join_set.spawn(async move {
                let _permit = semaphore
                    .acquire_owned()
                    .await
                    .map_err(|_| EngineError::failed("initiator semaphore closed"))?;
                if cancel.is_cancelled() {
                    return Err(EngineError::Cancelled);
                }
                runtime.run_initiator(storage, &node_id, cancel).await
            });
        }
        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(error)) => errors.push(error),
                Err(join_error) => {
                    log::error!("Initiator task aborted: {}", join_error);
                    errors.push(EngineError::failed(format!(
                        "initiator task aborted: {}",
                        join_error
                    )));
                }
            }
        }
    } else {
        for node_id in initiators {
            if cancel.is_cancelled() {
                log::debug!("Run cancelled; not starting initiator '{}'", node_id);
                break;
            }
            if let Err(error) = runtime.run_initiator(storage.clone(), &node_id, cancel.clone()).await {
                if !error.is_cancelled() {
                    log::warn!("Initiator '{}' ended with failure: {}", node_id, error);
                }
                errors.push(error);
            }
        }
    }

    errors
}
