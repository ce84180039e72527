//! Plain values handed back to callers after flattening.
//!
//! A plain value is either a primitive or an ordered mapping. Mappings keep
//! the order in which keys were first seen.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Ordered mapping from string to plain value
pub type PlainMap = IndexMap<String, PlainValue>;

/// A plain, engine-independent value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PlainValue {
    /// JSON null
    Null,
    /// Boolean
    Bool(bool),
    /// Integer that fits in an i64
    Integer(i64),
    /// Any other number
    Number(f64),
    /// String
    String(String),
    /// Array of values
    Array(Vec<PlainValue>),
    /// Ordered object
    Object(PlainMap),
}

impl PlainValue {
    /// Convert a JSON value, keeping object key order
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Integer(i),
                None => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Self::String(s),
            Value::Array(items) => Self::Array(items.into_iter().map(Self::from_json).collect()),
            Value::Object(map) => Self::Object(
                map.into_iter()
                    .map(|(k, v)| (k, Self::from_json(v)))
                    .collect(),
            ),
        }
    }

    /// Convert into a JSON value
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Integer(i) => Value::from(*i),
            // Non-finite floats have no JSON form
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(Value::Number)
                .unwrap_or(Value::Null),
            Self::String(s) => Value::String(s.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }

    /// Short name of the value's kind, used in validation messages
    #[must_use]
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "boolean",
            Self::Integer(_) => "integer",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::Array(_) => "array",
            Self::Object(_) => "object",
        }
    }

    /// Borrow as a string
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as an integer
    #[must_use]
    pub const fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as a float; integers widen
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Integer(i) => Some(*i as f64),
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Get as a boolean
    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Borrow as an ordered object
    #[must_use]
    pub fn as_object(&self) -> Option<&PlainMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Consume into an ordered object, if this is one
    #[must_use]
    pub fn into_object(self) -> Option<PlainMap> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Render as text: strings verbatim, everything else as compact JSON
    #[must_use]
    pub fn into_text(self) -> String {
        match self {
            Self::String(s) => s,
            other => other.to_json().to_string(),
        }
    }
}

impl From<&str> for PlainValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for PlainValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<i64> for PlainValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<f64> for PlainValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<bool> for PlainValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<PlainMap> for PlainValue {
    fn from(value: PlainMap) -> Self {
        Self::Object(value)
    }
}
