//! Helpers shared by inline data nodes
//!
//! Inputs reach an inline executor already coerced to their declared socket
//! type, so these accessors only fail on values the type cannot hold.

use graph_engine::{EngineError, InlineInputs, InlineOutputs, Result};
use serde_json::Value;

pub(crate) fn value<'a>(inputs: &'a InlineInputs, name: &str) -> Result<&'a Value> {
    inputs
        .get(name)
        .ok_or_else(|| EngineError::failed(format!("missing input '{}'", name)))
}

pub(crate) fn number(inputs: &InlineInputs, name: &str) -> Result<f64> {
    value(inputs, name)?
        .as_f64()
        .ok_or_else(|| EngineError::failed(format!("input '{}' is not a number", name)))
}

pub(crate) fn integer(inputs: &InlineInputs, name: &str) -> Result<i64> {
    value(inputs, name)?
        .as_i64()
        .ok_or_else(|| EngineError::failed(format!("input '{}' is not an integer", name)))
}

pub(crate) fn boolean(inputs: &InlineInputs, name: &str) -> Result<bool> {
    value(inputs, name)?
        .as_bool()
        .ok_or_else(|| EngineError::failed(format!("input '{}' is not a boolean", name)))
}

pub(crate) fn text<'a>(inputs: &'a InlineInputs, name: &str) -> Result<&'a str> {
    value(inputs, name)?
        .as_str()
        .ok_or_else(|| EngineError::failed(format!("input '{}' is not a string", name)))
}

pub(crate) fn list<'a>(inputs: &'a InlineInputs, name: &str) -> Result<&'a Vec<Value>> {
    value(inputs, name)?
        .as_array()
        .ok_or_else(|| EngineError::failed(format!("input '{}' is not a list", name)))
}

/// Render a value for display: strings unquoted, everything else as JSON
pub(crate) fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Outputs holding a single socket value
pub(crate) fn single(socket: &str, value: impl Into<Value>) -> Result<InlineOutputs> {
    Ok(InlineOutputs::from([(socket.to_string(), value.into())]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_accessors() {
        let inputs = InlineInputs::from([
            ("N".to_string(), json!(2.5)),
            ("S".to_string(), json!("hi")),
        ]);
        assert_eq!(number(&inputs, "N").unwrap(), 2.5);
        assert_eq!(text(&inputs, "S").unwrap(), "hi");
        assert!(text(&inputs, "N").is_err());
        assert!(value(&inputs, "missing").is_err());
    }

    #[test]
    fn test_display() {
        assert_eq!(display(&json!("plain")), "plain");
        assert_eq!(display(&json!(3)), "3");
        assert_eq!(display(&json!([1, 2])), "[1,2]");
    }
}
