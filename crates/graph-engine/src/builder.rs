//! Fluent builder for node definitions
//!
//! # Example
//!
//! ```ignore
//! let definition = NodeBuilder::new("math.add")
//!     .name("Add")
//!     .category("Math")
//!     .input_default::<f64>("A", 0.0)
//!     .input_default::<f64>("B", 0.0)
//!     .output::<f64>("Result")
//!     .inline(|inputs| {
//!         let a = inputs["A"].as_f64().unwrap_or_default();
//!         let b = inputs["B"].as_f64().unwrap_or_default();
//!         Ok(HashMap::from([("Result".to_string(), json!(a + b))]))
//!     })
//!     .build()?;
//! ```

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;

use crate::definition::{
    InlineExecutor, InlineInputs, InlineOutputs, NodeConstructor, NodeDefinition, NodeMetadata,
    StreamGroup,
};
use crate::error::{EngineError, Result};
use crate::node::{Node, StreamMode};
use crate::types::{DataType, Socket, SocketDirection, ENTER, EXIT};
use crate::value::SocketValue;

/// Input socket holding the event name of an event listener
pub const EVENT_NAME: &str = "Event";

/// Fluent builder producing an immutable [`NodeDefinition`]
pub struct NodeBuilder {
    metadata: NodeMetadata,
    constructor: Option<NodeConstructor>,
    inline: Option<InlineExecutor>,
    /// Most recently declared data socket, for `hint`
    last_socket: Option<(SocketDirection, usize)>,
    errors: Vec<String>,
}

impl NodeBuilder {
    /// Create a builder for a definition id
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            metadata: NodeMetadata {
                name: id.clone(),
                id,
                category: "General".to_string(),
                description: String::new(),
                inputs: Vec::new(),
                outputs: Vec::new(),
                callable: false,
                execution_initiator: false,
                event_listener: false,
                volatile: false,
                streams: Vec::new(),
                stream_mode: None,
                backing_type: None,
            },
            constructor: None,
            inline: None,
            last_socket: None,
            errors: Vec::new(),
        }
    }

    /// Create a builder backed by a node type.
    ///
    /// The id defaults to the type path and the name to the bare type name,
    /// both usually overridden in `configure`.
    pub fn for_type<N: Node + Default + 'static>() -> Self {
        let type_name = std::any::type_name::<N>();
        let short = type_name.rsplit("::").next().unwrap_or(type_name);
        let mut builder = Self::new(type_name);
        builder.metadata.name = short.to_string();
        builder.backed_by::<N>();
        builder
    }

    pub fn id(&mut self, id: impl Into<String>) -> &mut Self {
        self.metadata.id = id.into();
        self
    }

    pub fn name(&mut self, name: impl Into<String>) -> &mut Self {
        self.metadata.name = name.into();
        self
    }

    pub fn category(&mut self, category: impl Into<String>) -> &mut Self {
        self.metadata.category = category.into();
        self
    }

    pub fn description(&mut self, description: impl Into<String>) -> &mut Self {
        self.metadata.description = description.into();
        self
    }

    /// Add the paired `Enter` input and `Exit` output
    pub fn callable(&mut self) -> &mut Self {
        self.execution_input(ENTER).execution_output(EXIT)
    }

    /// Mark the node as a run entry point with only an `Exit` output
    pub fn execution_initiator(&mut self) -> &mut Self {
        self.metadata.execution_initiator = true;
        self.execution_output(EXIT)
    }

    /// Mark the node as started by a named graph event.
    ///
    /// Adds an `Exit` output and the `Event` name input.
    pub fn event_listener(&mut self) -> &mut Self {
        self.metadata.event_listener = true;
        self.execution_output(EXIT)
            .input::<String>(EVENT_NAME)
            .hint("event-name")
    }

    /// Re-execute on every read instead of memoizing.
    ///
    /// For data-only nodes whose result depends on more than their inputs,
    /// such as variable getters.
    pub fn volatile(&mut self) -> &mut Self {
        self.metadata.volatile = true;
        self
    }

    /// Add a custom-named execution input
    pub fn execution_input(&mut self, name: impl Into<String>) -> &mut Self {
        self.metadata.callable = true;
        self.push_execution(name.into(), SocketDirection::Input);
        self
    }

    /// Add a custom-named execution output
    pub fn execution_output(&mut self, name: impl Into<String>) -> &mut Self {
        self.metadata.callable = true;
        self.push_execution(name.into(), SocketDirection::Output);
        self
    }

    /// Add a typed data input
    pub fn input<T: SocketValue>(&mut self, name: impl Into<String>) -> &mut Self {
        self.input_of(name, T::data_type())
    }

    /// Add a typed data input with a default value
    pub fn input_default<T: SocketValue>(&mut self, name: impl Into<String>, default: T) -> &mut Self {
        let name = name.into();
        match serde_json::to_value(default) {
            Ok(value) => {
                self.input_of(name, T::data_type());
                self.default_value(value)
            }
            Err(e) => {
                self.errors.push(format!("default for '{}': {}", name, e));
                self
            }
        }
    }

    /// Add a data input with an explicit type identifier
    pub fn input_of(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push_data(Socket::data(name, data_type, SocketDirection::Input))
    }

    /// Add a typed data output
    pub fn output<T: SocketValue>(&mut self, name: impl Into<String>) -> &mut Self {
        self.output_of(name, T::data_type())
    }

    /// Add a data output with an explicit type identifier
    pub fn output_of(&mut self, name: impl Into<String>, data_type: DataType) -> &mut Self {
        self.push_data(Socket::data(name, data_type, SocketDirection::Output))
    }

    /// Set the default value of the most recently declared data socket
    pub fn default_value(&mut self, value: Value) -> &mut Self {
        if let Some(socket) = self.last_data_socket() {
            socket.default_value = Some(value);
        }
        self
    }

    /// Set the editor hint of the most recently declared data socket
    pub fn hint(&mut self, hint: impl Into<String>) -> &mut Self {
        let hint = hint.into();
        if let Some(socket) = self.last_data_socket() {
            socket.editor_hint = Some(hint);
        }
        self
    }

    /// Declare a stream group: an item output, the execution output fired
    /// per item, and optionally an execution output fired on completion
    pub fn stream_output<T: SocketValue>(
        &mut self,
        item: impl Into<String>,
        item_emitted: impl Into<String>,
        completed: Option<&str>,
    ) -> &mut Self {
        let item = item.into();
        let item_emitted = item_emitted.into();
        self.output::<T>(item.clone()).execution_output(item_emitted.clone());
        if let Some(completed) = completed {
            self.execution_output(completed);
        }
        self.metadata.streams.push(StreamGroup {
            item,
            item_emitted,
            completed: completed.map(str::to_string),
        });
        self
    }

    /// Declare how stream emissions schedule their downstream branch
    pub fn stream_mode(&mut self, mode: StreamMode) -> &mut Self {
        self.metadata.stream_mode = Some(mode);
        self
    }

    /// Back the definition with a node type
    pub fn backed_by<N: Node + Default + 'static>(&mut self) -> &mut Self {
        self.metadata.backing_type = Some(std::any::type_name::<N>().to_string());
        self.constructor = Some(Arc::new(|| Box::new(N::default()) as Box<dyn Node>));
        self
    }

    /// Back the definition with a constructor closure
    pub fn constructor(
        &mut self,
        type_name: impl Into<String>,
        constructor: impl Fn() -> Box<dyn Node> + Send + Sync + 'static,
    ) -> &mut Self {
        self.metadata.backing_type = Some(type_name.into());
        self.constructor = Some(Arc::new(constructor));
        self
    }

    /// Execute the definition with a pure function of its inputs.
    ///
    /// Only valid for data-only nodes; replaces any backing type.
    pub fn inline(
        &mut self,
        executor: impl Fn(&InlineInputs) -> Result<InlineOutputs> + Send + Sync + 'static,
    ) -> &mut Self {
        self.metadata.backing_type = None;
        self.constructor = None;
        self.inline = Some(Arc::new(executor));
        self
    }

    /// Validate and produce the definition
    pub fn build(&self) -> Result<NodeDefinition> {
        let invalid = |reason: String| EngineError::InvalidDefinition {
            definition_id: self.metadata.id.clone(),
            reason,
        };

        if let Some(error) = self.errors.first() {
            return Err(invalid(error.clone()));
        }
        if self.metadata.id.trim().is_empty() {
            return Err(invalid("definition id is empty".to_string()));
        }
        if let Some(name) = first_duplicate(&self.metadata.inputs) {
            return Err(invalid(format!("duplicate input socket '{}'", name)));
        }
        if let Some(name) = first_duplicate(&self.metadata.outputs) {
            return Err(invalid(format!("duplicate output socket '{}'", name)));
        }
        // Socket values are keyed by (node, socket name), so data names must not collide
        if let Some(socket) = self.metadata.outputs.iter().find(|o| {
            !o.is_execution()
                && self
                    .metadata
                    .inputs
                    .iter()
                    .any(|i| !i.is_execution() && i.name == o.name)
        }) {
            return Err(invalid(format!(
                "'{}' is declared as both a data input and a data output",
                socket.name
            )));
        }
        if self.inline.is_some() && self.metadata.callable {
            return Err(invalid(
                "inline executors are only supported for data-only nodes".to_string(),
            ));
        }

        Ok(NodeDefinition::new(
            self.metadata.clone(),
            self.constructor.clone(),
            self.inline.clone(),
        ))
    }

    fn push_execution(&mut self, name: String, direction: SocketDirection) {
        let sockets = match direction {
            SocketDirection::Input => &mut self.metadata.inputs,
            SocketDirection::Output => &mut self.metadata.outputs,
        };
        // Re-declaring an execution socket is a no-op so `configure` stays idempotent
        if !sockets.iter().any(|s| s.name == name && s.is_execution()) {
            sockets.push(Socket::execution(name, direction));
        }
    }

    fn push_data(&mut self, socket: Socket) -> &mut Self {
        let direction = socket.direction;
        let sockets = match direction {
            SocketDirection::Input => &mut self.metadata.inputs,
            SocketDirection::Output => &mut self.metadata.outputs,
        };
        sockets.push(socket);
        let index = sockets.len() - 1;
        self.last_socket = Some((direction, index));
        self
    }

    fn last_data_socket(&mut self) -> Option<&mut Socket> {
        let (direction, index) = self.last_socket?;
        match direction {
            SocketDirection::Input => self.metadata.inputs.get_mut(index),
            SocketDirection::Output => self.metadata.outputs.get_mut(index),
        }
    }
}

fn first_duplicate(sockets: &[Socket]) -> Option<&str> {
    let mut seen = HashSet::new();
    sockets
        .iter()
        .find(|s| !seen.insert(s.name.as_str()))
        .map(|s| s.name.as_str())
}
