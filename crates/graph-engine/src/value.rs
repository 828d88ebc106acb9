//! Socket value typing and lossless coercion
//!
//! Values travel between sockets as `serde_json::Value`. [`SocketValue`] ties
//! a Rust type to the socket [`DataType`] it is declared with, and [`coerce`]
//! converts a stored value toward a requested type without losing information.

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::DataType;

/// A Rust type that can be carried by a data socket
pub trait SocketValue: Serialize + DeserializeOwned + Send + 'static {
    /// The socket type identifier for this Rust type
    fn data_type() -> DataType;
}

macro_rules! socket_value {
    ($data_type:expr => $($ty:ty),+) => {
        $(impl SocketValue for $ty {
            fn data_type() -> DataType {
                $data_type
            }
        })+
    };
}

socket_value!(DataType::Boolean => bool);
socket_value!(DataType::Integer => i8, i16, i32, i64, u8, u16, u32, u64, usize, isize);
socket_value!(DataType::Number => f32, f64);
socket_value!(DataType::String => String);
socket_value!(DataType::Any => Value);
socket_value!(DataType::Object => Map<String, Value>);

impl<T: SocketValue> SocketValue for Vec<T> {
    fn data_type() -> DataType {
        DataType::List
    }
}

impl<T: SocketValue> SocketValue for Option<T> {
    fn data_type() -> DataType {
        T::data_type()
    }
}

/// Convert `value` toward `target` without losing information.
///
/// Returns `None` when no lossless conversion exists.
pub fn coerce(value: Value, target: DataType) -> Option<Value> {
    match target {
        DataType::Any | DataType::Execution => Some(value),
        DataType::Object => match value {
            Value::Object(_) | Value::Null => Some(value),
            _ => None,
        },
        DataType::Boolean => match value {
            Value::Bool(_) => Some(value),
            Value::String(ref s) => match s.trim() {
                "true" => Some(Value::Bool(true)),
                "false" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        DataType::Integer => match value {
            Value::Number(ref n) if n.is_i64() || n.is_u64() => Some(value),
            Value::Number(ref n) => n.as_f64().and_then(integral_float),
            Value::String(ref s) => {
                let trimmed = s.trim();
                trimmed
                    .parse::<i64>()
                    .ok()
                    .map(Value::from)
                    .or_else(|| trimmed.parse::<f64>().ok().and_then(integral_float))
            }
            _ => None,
        },
        DataType::Number => match value {
            Value::Number(ref n) => n.as_f64().map(Value::from),
            Value::String(ref s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(Value::from),
            _ => None,
        },
        DataType::String => match value {
            Value::String(_) => Some(value),
            Value::Number(n) => Some(Value::String(n.to_string())),
            Value::Bool(b) => Some(Value::String(b.to_string())),
            _ => None,
        },
        DataType::List => match value {
            Value::Array(_) => Some(value),
            _ => None,
        },
    }
}

fn integral_float(f: f64) -> Option<Value> {
    if f.is_finite() && f.fract() == 0.0 && f >= i64::MIN as f64 && f <= i64::MAX as f64 {
        Some(Value::from(f as i64))
    } else {
        None
    }
}
