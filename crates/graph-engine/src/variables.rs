//! Synthesized getter and setter nodes for graph variables
//!
//! Declaring a variable registers two definitions:
//!
//! - `variables.get.<name>`: a volatile data node with a `Value` output. It
//!   re-reads the variable on every pull, so it always reflects the latest
//!   write in the run.
//! - `variables.set.<name>`: a callable node that stores its `Value` input,
//!   mirrors it on the `Output` output and continues through `Exit`.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::builder::NodeBuilder;
use crate::context::ExecutionContext;
use crate::definition::NodeDefinition;
use crate::error::Result;
use crate::node::Node;
use crate::types::{GraphVariable, EXIT};

pub const GET_PREFIX: &str = "variables.get.";
pub const SET_PREFIX: &str = "variables.set.";

/// Category of synthesized variable nodes
pub const CATEGORY: &str = "Variables";

/// Definition id of a variable's getter
pub fn get_definition_id(name: &str) -> String {
    format!("{}{}", GET_PREFIX, name)
}

/// Definition id of a variable's setter
pub fn set_definition_id(name: &str) -> String {
    format!("{}{}", SET_PREFIX, name)
}

/// Build the getter definition for a variable
pub fn get_definition(variable: &GraphVariable) -> Result<NodeDefinition> {
    let name = variable.name.clone();
    let default = variable.default_value.clone();
    NodeBuilder::new(get_definition_id(&variable.name))
        .name(format!("Get {}", variable.name))
        .category(CATEGORY)
        .description(format!("Reads the graph variable '{}'", variable.name))
        .output_of("Value", variable.data_type)
        .volatile()
        .constructor("GetVariable", move || {
            Box::new(GetVariable {
                name: name.clone(),
                default: default.clone(),
            }) as Box<dyn Node>
        })
        .build()
}

/// Build the setter definition for a variable
pub fn set_definition(variable: &GraphVariable) -> Result<NodeDefinition> {
    let name = variable.name.clone();
    NodeBuilder::new(set_definition_id(&variable.name))
        .name(format!("Set {}", variable.name))
        .category(CATEGORY)
        .description(format!("Writes the graph variable '{}'", variable.name))
        .callable()
        .input_of("Value", variable.data_type)
        .default_value(variable.default_value.clone())
        .output_of("Output", variable.data_type)
        .constructor("SetVariable", move || {
            Box::new(SetVariable { name: name.clone() }) as Box<dyn Node>
        })
        .build()
}

struct GetVariable {
    name: String,
    default: Value,
}

#[async_trait]
impl Node for GetVariable {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        // Scopes created without variable inheritance see the declared default
        let value = ctx
            .variable_value(&self.name)
            .unwrap_or_else(|| self.default.clone());
        ctx.set_output_value("Value", value)
    }
}

struct SetVariable {
    name: String,
}

#[async_trait]
impl Node for SetVariable {
    async fn execute(&self, ctx: &ExecutionContext, _cancel: &CancellationToken) -> Result<()> {
        let value = ctx.input_value("Value").await?;
        log::debug!("Variable '{}' = {}", self.name, value);
        ctx.set_variable(&self.name, &value)?;
        ctx.set_output_value("Output", value)?;
        ctx.trigger(EXIT).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use serde_json::json;

    #[test]
    fn test_definitions_are_named_after_variable() {
        let variable = GraphVariable::new("score", DataType::Integer, json!(10));

        let get = get_definition(&variable).unwrap();
        assert_eq!(get.id(), "variables.get.score");
        assert_eq!(get.name(), "Get score");
        assert!(get.metadata.volatile);
        assert!(!get.metadata.callable);
        assert_eq!(get.metadata.outputs[0].data_type, DataType::Integer);

        let set = set_definition(&variable).unwrap();
        assert_eq!(set.id(), "variables.set.score");
        assert!(set.metadata.callable);
        let input = set.metadata.inputs.iter().find(|s| s.name == "Value").unwrap();
        assert_eq!(input.default_value, Some(json!(10)));
        assert!(set.is_executable());
    }
}
