//! Logic nodes

use graph_engine::{NodeBuilder, NodeDefinition, Result};

use crate::inline::{boolean, single};

const CATEGORY: &str = "Logic";

fn binary(
    id: &str,
    name: &str,
    op: impl Fn(bool, bool) -> bool + Send + Sync + 'static,
) -> Result<NodeDefinition> {
    NodeBuilder::new(id)
        .name(name)
        .category(CATEGORY)
        .description(format!("A {} B", name.to_uppercase()))
        .input_default::<bool>("A", false)
        .input_default::<bool>("B", false)
        .output::<bool>("Result")
        .inline(move |inputs| single("Result", op(boolean(inputs, "A")?, boolean(inputs, "B")?)))
        .build()
}

pub fn and() -> Result<NodeDefinition> {
    binary("logic.and", "And", |a, b| a && b)
}

pub fn or() -> Result<NodeDefinition> {
    binary("logic.or", "Or", |a, b| a || b)
}

pub fn not() -> Result<NodeDefinition> {
    NodeBuilder::new("logic.not")
        .name("Not")
        .category(CATEGORY)
        .description("Negates Value")
        .input_default::<bool>("Value", false)
        .output::<bool>("Result")
        .inline(|inputs| single("Result", !boolean(inputs, "Value")?))
        .build()
}

register_inline!(and, or, not);
