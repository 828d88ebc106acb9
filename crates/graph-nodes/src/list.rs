//! List nodes

use graph_engine::{EngineError, NodeBuilder, NodeDefinition, Result};
use serde_json::Value;

use crate::inline::{integer, list, single, value};

const CATEGORY: &str = "List";

pub const PORT_LIST: &str = "List";
pub const PORT_ITEM: &str = "Item";

/// Number of item inputs on Make List
pub const MAKE_LIST_INPUTS: usize = 4;

fn item_port(index: usize) -> String {
    format!("Item {}", index)
}

/// Collects `Item 0` .. `Item 3` into a list, skipping unset (null) items
pub fn make_list() -> Result<NodeDefinition> {
    let mut builder = NodeBuilder::new("list.make");
    builder
        .name("Make List")
        .category(CATEGORY)
        .description("Builds a list from its item inputs");
    for index in 0..MAKE_LIST_INPUTS {
        builder.input_default::<Value>(item_port(index), Value::Null);
    }
    builder
        .output::<Vec<Value>>(PORT_LIST)
        .inline(|inputs| {
            let mut items = Vec::new();
            for index in 0..MAKE_LIST_INPUTS {
                let item = value(inputs, &item_port(index))?;
                if !item.is_null() {
                    items.push(item.clone());
                }
            }
            single(PORT_LIST, items)
        })
        .build()
}

pub fn list_length() -> Result<NodeDefinition> {
    NodeBuilder::new("list.length")
        .name("List Length")
        .category(CATEGORY)
        .description("Number of elements in List")
        .input::<Vec<Value>>(PORT_LIST)
        .output::<i64>("Length")
        .inline(|inputs| single("Length", list(inputs, PORT_LIST)?.len()))
        .build()
}

/// Element at `Index`; negative indices count from the end
pub fn get_item() -> Result<NodeDefinition> {
    NodeBuilder::new("list.get")
        .name("Get Item")
        .category(CATEGORY)
        .description("Element of List at Index")
        .input::<Vec<Value>>(PORT_LIST)
        .input_default::<i64>("Index", 0)
        .output::<Value>(PORT_ITEM)
        .inline(|inputs| {
            let items = list(inputs, PORT_LIST)?;
            let index = integer(inputs, "Index")?;
            let position = if index < 0 {
                items.len() as i64 + index
            } else {
                index
            };
            let item = usize::try_from(position)
                .ok()
                .and_then(|p| items.get(p))
                .ok_or_else(|| {
                    EngineError::failed(format!(
                        "index {} out of range for list of {}",
                        index,
                        items.len()
                    ))
                })?;
            single(PORT_ITEM, item.clone())
        })
        .build()
}

pub fn append() -> Result<NodeDefinition> {
    NodeBuilder::new("list.append")
        .name("Append")
        .category(CATEGORY)
        .description("List with Item added at the end")
        .input::<Vec<Value>>(PORT_LIST)
        .input_default::<Value>(PORT_ITEM, Value::Null)
        .output::<Vec<Value>>("Result")
        .inline(|inputs| {
            let mut items = list(inputs, PORT_LIST)?.clone();
            items.push(value(inputs, PORT_ITEM)?.clone());
            single("Result", items)
        })
        .build()
}

register_inline!(make_list, list_length, get_item, append);
