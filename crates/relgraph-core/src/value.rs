//! Driver-level values.
//!
//! [`Value`] is what flows between specs, statement builders and drivers:
//! field values, identifiers, edge targets and scanned columns. It
//! serializes untagged with serde, so a JSON-typed field can be marshalled
//! from whichever variant the caller supplied.

use std::fmt;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::CoreError;

/// A single bound or scanned value.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Json(serde_json::Value),
    Uuid(uuid::Uuid),
}

impl Value {
    /// Returns `true` if this is [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, accepting booleans and integral floats.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Bool(b) => Some(i64::from(*b)),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            _ => None,
        }
    }

    /// Returns the text payload.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns a short name of the variant, used in mismatch errors.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Bytes(_) => "bytes",
            Value::Json(_) => "json",
            Value::Uuid(_) => "uuid",
        }
    }

    /// Marshals the value to JSON text, the storage form of JSON fields.
    pub fn to_json_text(&self) -> Result<Value, CoreError> {
        Ok(Value::Text(serde_json::to_string(self)?))
    }

    /// Decodes a JSON field read back from storage. Text and byte values are
    /// parsed; any other variant is converted through its serde form.
    pub fn decode_json<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        let decoded = match self {
            Value::Text(s) => serde_json::from_str(s)?,
            Value::Bytes(b) => serde_json::from_slice(b)?,
            Value::Json(j) => serde_json::from_value(j.clone())?,
            other => serde_json::from_value(serde_json::to_value(other)?)?,
        };
        Ok(decoded)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("<nil>"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Text(s) => f.write_str(s),
            Value::Bytes(b) => write!(f, "{b:?}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Uuid(u) => write!(f, "{u}"),
        }
    }
}

/// Formats a list of values as `[a b c]`, the form used in engine messages.
pub fn display_list(values: &[Value]) -> String {
    let parts: Vec<String> = values.iter().map(ToString::to_string).collect();
    format!("[{}]", parts.join(" "))
}

// ---------------------------------------------------------------------------
// Conversions into Value
// ---------------------------------------------------------------------------

macro_rules! from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(i64::from(v))
            }
        })*
    };
}

from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(f64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<uuid::Uuid> for Value {
    fn from(v: uuid::Uuid) -> Self {
        Value::Uuid(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ---------------------------------------------------------------------------
// Conversions out of Value
// ---------------------------------------------------------------------------

impl TryFrom<Value> for i64 {
    type Error = CoreError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        v.as_i64().ok_or(CoreError::TypeMismatch {
            expected: "int",
            got: v.kind(),
        })
    }
}

impl TryFrom<Value> for String {
    type Error = CoreError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Text(s) => Ok(s),
            Value::Uuid(u) => Ok(u.to_string()),
            other => Err(CoreError::TypeMismatch {
                expected: "text",
                got: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for bool {
    type Error = CoreError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Bool(b) => Ok(b),
            Value::Int(i) => Ok(i != 0),
            other => Err(CoreError::TypeMismatch {
                expected: "bool",
                got: other.kind(),
            }),
        }
    }
}

impl TryFrom<Value> for f64 {
    type Error = CoreError;

    fn try_from(v: Value) -> Result<Self, Self::Error> {
        match v {
            Value::Float(f) => Ok(f),
            Value::Int(i) => Ok(i as f64),
            other => Err(CoreError::TypeMismatch {
                expected: "float",
                got: other.kind(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_text_of_each_variant() {
        assert_eq!(Value::from("a").to_json_text().unwrap(), Value::Text("\"a\"".into()));
        assert_eq!(Value::from(7).to_json_text().unwrap(), Value::Text("7".into()));
        assert_eq!(Value::Null.to_json_text().unwrap(), Value::Text("null".into()));
        let obj = Value::from(json!({"a": [1, 2]}));
        assert_eq!(obj.to_json_text().unwrap(), Value::Text("{\"a\":[1,2]}".into()));
    }

    #[test]
    fn decode_json_from_text() {
        let stored = Value::Text("{\"tags\":[\"x\",\"y\"]}".into());
        let back: serde_json::Value = stored.decode_json().unwrap();
        assert_eq!(back, json!({"tags": ["x", "y"]}));
    }

    #[test]
    fn display_list_uses_spaces() {
        let ids = vec![Value::from(1), Value::from(2), Value::from(3)];
        assert_eq!(display_list(&ids), "[1 2 3]");
        assert_eq!(display_list(&[]), "[]");
    }

    #[test]
    fn option_conversion() {
        assert_eq!(Value::from(None::<i64>), Value::Null);
        assert_eq!(Value::from(Some("x")), Value::Text("x".into()));
    }

    #[test]
    fn try_from_mismatch() {
        let err = i64::try_from(Value::from("nope")).unwrap_err();
        assert_eq!(err.to_string(), "type mismatch: expected int, got text");
        assert_eq!(i64::try_from(Value::Bool(true)).unwrap(), 1);
        assert_eq!(String::try_from(Value::from("ok")).unwrap(), "ok");
    }
}
