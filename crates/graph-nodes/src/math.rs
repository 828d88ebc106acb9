//! Math nodes
//!
//! Pure inline data nodes over `A` and `B`, producing `Result`.

use graph_engine::{DataType, EngineError, NodeBuilder, NodeDefinition, Result};
use serde_json::Value;

use crate::inline::{number, single, value};

const CATEGORY: &str = "Math";

pub const PORT_A: &str = "A";
pub const PORT_B: &str = "B";
pub const PORT_RESULT: &str = "Result";

fn binary(
    id: &str,
    name: &str,
    description: &str,
    result: DataType,
    op: impl Fn(f64, f64) -> Result<Value> + Send + Sync + 'static,
) -> Result<NodeDefinition> {
    NodeBuilder::new(id)
        .name(name)
        .category(CATEGORY)
        .description(description)
        .input_default::<f64>(PORT_A, 0.0)
        .input_default::<f64>(PORT_B, 0.0)
        .output_of(PORT_RESULT, result)
        .inline(move |inputs| {
            let a = number(inputs, PORT_A)?;
            let b = number(inputs, PORT_B)?;
            single(PORT_RESULT, op(a, b)?)
        })
        .build()
}

pub fn add() -> Result<NodeDefinition> {
    binary("math.add", "Add", "A + B", DataType::Number, |a, b| Ok((a + b).into()))
}

pub fn subtract() -> Result<NodeDefinition> {
    binary("math.subtract", "Subtract", "A - B", DataType::Number, |a, b| {
        Ok((a - b).into())
    })
}

pub fn multiply() -> Result<NodeDefinition> {
    binary("math.multiply", "Multiply", "A * B", DataType::Number, |a, b| {
        Ok((a * b).into())
    })
}

pub fn divide() -> Result<NodeDefinition> {
    binary("math.divide", "Divide", "A / B", DataType::Number, |a, b| {
        if b == 0.0 {
            return Err(EngineError::failed("division by zero"));
        }
        Ok((a / b).into())
    })
}

pub fn greater_than() -> Result<NodeDefinition> {
    binary("math.greater_than", "Greater Than", "A > B", DataType::Boolean, |a, b| {
        Ok((a > b).into())
    })
}

pub fn less_than() -> Result<NodeDefinition> {
    binary("math.less_than", "Less Than", "A < B", DataType::Boolean, |a, b| {
        Ok((a < b).into())
    })
}

/// Equality over any two values; numbers compare by value so `1` equals `1.0`
pub fn equals() -> Result<NodeDefinition> {
    NodeBuilder::new("math.equals")
        .name("Equals")
        .category(CATEGORY)
        .description("A == B")
        .input_default::<Value>(PORT_A, Value::Null)
        .input_default::<Value>(PORT_B, Value::Null)
        .output::<bool>(PORT_RESULT)
        .inline(|inputs| {
            let a = value(inputs, PORT_A)?;
            let b = value(inputs, PORT_B)?;
            let equal = match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x == y,
                _ => a == b,
            };
            single(PORT_RESULT, equal)
        })
        .build()
}

register_inline!(add, subtract, multiply, divide, greater_than, less_than, equals);

#[cfg(test)]
mod tests {
    use super::*;
    use graph_engine::InlineInputs;
    use serde_json::json;

    fn apply(definition: Result<NodeDefinition>, a: Value, b: Value) -> Result<Value> {
        let definition = definition.unwrap();
        let executor = definition.inline_executor().unwrap();
        let inputs = InlineInputs::from([(PORT_A.to_string(), a), (PORT_B.to_string(), b)]);
        let mut outputs = executor(&inputs)?;
        Ok(outputs.remove(PORT_RESULT).unwrap())
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(apply(add(), json!(2.0), json!(3.0)).unwrap(), json!(5.0));
        assert_eq!(apply(subtract(), json!(2.0), json!(3.0)).unwrap(), json!(-1.0));
        assert_eq!(apply(multiply(), json!(2.5), json!(4.0)).unwrap(), json!(10.0));
        assert_eq!(apply(divide(), json!(9.0), json!(2.0)).unwrap(), json!(4.5));
    }

    #[test]
    fn test_divide_by_zero_fails() {
        let error = apply(divide(), json!(1.0), json!(0.0)).unwrap_err();
        assert!(error.to_string().contains("division by zero"));
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(apply(greater_than(), json!(3.0), json!(2.0)).unwrap(), json!(true));
        assert_eq!(apply(less_than(), json!(3.0), json!(2.0)).unwrap(), json!(false));
        assert_eq!(apply(equals(), json!(1), json!(1.0)).unwrap(), json!(true));
        assert_eq!(apply(equals(), json!("a"), json!("a")).unwrap(), json!(true));
        assert_eq!(apply(equals(), json!([1]), json!([2])).unwrap(), json!(false));
    }

    #[test]
    fn test_inline_definitions_are_data_only() {
        let definition = add().unwrap();
        assert!(!definition.metadata.callable);
        assert!(definition.inline_executor().is_some());
        assert_eq!(definition.category(), "Math");
    }
}
