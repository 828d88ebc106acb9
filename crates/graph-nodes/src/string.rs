//! String nodes

use graph_engine::{NodeBuilder, NodeDefinition, Result};
use serde_json::Value;

use crate::inline::{display, list, single, text, value};

const CATEGORY: &str = "String";

pub const PORT_TEXT: &str = "Text";
pub const PORT_RESULT: &str = "Result";

fn unary(
    id: &str,
    name: &str,
    description: &str,
    op: impl Fn(&str) -> String + Send + Sync + 'static,
) -> Result<NodeDefinition> {
    NodeBuilder::new(id)
        .name(name)
        .category(CATEGORY)
        .description(description)
        .input_default::<String>(PORT_TEXT, String::new())
        .output::<String>(PORT_RESULT)
        .inline(move |inputs| single(PORT_RESULT, op(text(inputs, PORT_TEXT)?)))
        .build()
}

pub fn concat() -> Result<NodeDefinition> {
    NodeBuilder::new("string.concat")
        .name("Concat")
        .category(CATEGORY)
        .description("Joins A and B")
        .input_default::<String>("A", String::new())
        .input_default::<String>("B", String::new())
        .output::<String>(PORT_RESULT)
        .inline(|inputs| {
            let joined = format!("{}{}", text(inputs, "A")?, text(inputs, "B")?);
            single(PORT_RESULT, joined)
        })
        .build()
}

pub fn to_upper() -> Result<NodeDefinition> {
    unary("string.to_upper", "To Upper", "Upper-cases Text", str::to_uppercase)
}

pub fn to_lower() -> Result<NodeDefinition> {
    unary("string.to_lower", "To Lower", "Lower-cases Text", str::to_lowercase)
}

/// Length in characters, not bytes
pub fn length() -> Result<NodeDefinition> {
    NodeBuilder::new("string.length")
        .name("Length")
        .category(CATEGORY)
        .description("Number of characters in Text")
        .input_default::<String>(PORT_TEXT, String::new())
        .output::<i64>("Length")
        .inline(|inputs| single("Length", text(inputs, PORT_TEXT)?.chars().count()))
        .build()
}

/// Replace `{0}`, `{1}`, ... with the matching element of `Args`
pub fn format() -> Result<NodeDefinition> {
    NodeBuilder::new("string.format")
        .name("Format")
        .category(CATEGORY)
        .description("Fills {0}, {1}, ... placeholders from Args")
        .input_default::<String>("Format", String::new())
        .input_default::<Vec<Value>>("Args", Vec::new())
        .output::<String>(PORT_RESULT)
        .inline(|inputs| {
            let template = text(inputs, "Format")?;
            let args = list(inputs, "Args")?;
            single(PORT_RESULT, fill_placeholders(template, args))
        })
        .build()
}

pub fn to_string() -> Result<NodeDefinition> {
    NodeBuilder::new("string.to_string")
        .name("To String")
        .category(CATEGORY)
        .description("Renders any value as text")
        .input_default::<Value>("Value", Value::Null)
        .output::<String>(PORT_RESULT)
        .inline(|inputs| single(PORT_RESULT, display(value(inputs, "Value")?)))
        .build()
}

/// Placeholders without a matching argument are left untouched
fn fill_placeholders(template: &str, args: &[Value]) -> String {
    let mut result = template.to_string();
    for (index, arg) in args.iter().enumerate() {
        result = result.replace(&format!("{{{}}}", index), &display(arg));
    }
    result
}

register_inline!(concat, to_upper, to_lower, length, format, to_string);

#[cfg(test)]
mod tests {
    use super::*;
    use graph_engine::InlineInputs;
    use serde_json::json;

    fn apply(definition: Result<NodeDefinition>, inputs: &[(&str, Value)], output: &str) -> Value {
        let definition = definition.unwrap();
        let executor = definition.inline_executor().unwrap();
        let inputs: InlineInputs = inputs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        executor(&inputs).unwrap().remove(output).unwrap()
    }

    #[test]
    fn test_case_and_length() {
        assert_eq!(apply(to_upper(), &[("Text", json!("abc"))], "Result"), json!("ABC"));
        assert_eq!(apply(to_lower(), &[("Text", json!("AbC"))], "Result"), json!("abc"));
        assert_eq!(apply(length(), &[("Text", json!("héllo"))], "Length"), json!(5));
    }

    #[test]
    fn test_concat() {
        let result = apply(concat(), &[("A", json!("foo")), ("B", json!("bar"))], "Result");
        assert_eq!(result, json!("foobar"));
    }

    #[test]
    fn test_format_placeholders() {
        let result = apply(
            format(),
            &[("Format", json!("{0} has {1} items, {2}")), ("Args", json!(["cart", 3]))],
            "Result",
        );
        assert_eq!(result, json!("cart has 3 items, {2}"));
    }

    #[test]
    fn test_to_string() {
        assert_eq!(apply(to_string(), &[("Value", json!(true))], "Result"), json!("true"));
        assert_eq!(apply(to_string(), &[("Value", json!("x"))], "Result"), json!("x"));
    }
}
