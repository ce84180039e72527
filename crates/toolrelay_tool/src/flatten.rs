//! Flattening of engine output into plain values.
//!
//! Flattening is total: content that cannot be interpreted becomes the
//! [`FLATTEN_FAILURE`] string instead of an error.

use serde_json::Value;
use toolrelay_core::{PlainValue, StructuredContent};
use tracing::debug;

/// Value produced when content matches neither a primitive nor an object
pub const FLATTEN_FAILURE: &str = "failed to parse content";

/// Converts [`StructuredContent`] into [`PlainValue`]s
#[derive(Debug, Clone, Default)]
pub struct ContentFlattener;

impl ContentFlattener {
    /// Create a new flattener
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Flatten content.
    ///
    /// Primitive decodes are tried in a fixed order (string, integer,
    /// float, boolean) and the first that succeeds wins. Otherwise the JSON
    /// text is parsed as an ordered object.
    #[must_use]
    pub fn flatten(&self, content: &StructuredContent) -> PlainValue {
        if let Ok(text) = content.decode::<String>() {
            return PlainValue::String(text);
        }
        if let Ok(int) = content.decode::<i64>() {
            return PlainValue::Integer(int);
        }
        if let Ok(float) = content.decode::<f64>() {
            return PlainValue::Number(float);
        }
        if let Ok(flag) = content.decode::<bool>() {
            return PlainValue::Bool(flag);
        }

        match serde_json::from_str::<Value>(&content.json_string()) {
            Ok(object @ Value::Object(_)) => PlainValue::from_json(object),
            Ok(other) => {
                debug!(kind = %json_kind(&other), "content is not a primitive or object");
                PlainValue::String(FLATTEN_FAILURE.to_string())
            }
            Err(err) => {
                debug!(error = %err, "content is not valid JSON");
                PlainValue::String(FLATTEN_FAILURE.to_string())
            }
        }
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
