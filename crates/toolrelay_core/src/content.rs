//! Structured content produced by a generation engine.
//!
//! The runtime treats content as opaque: callers may only try to decode it
//! as a concrete type or read its JSON text.

use crate::error::{CoreError, CoreResult};
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, PartialEq)]
enum Repr {
    /// Already-parsed value
    Value(serde_json::Value),
    /// Raw JSON text as emitted by the engine, parsed lazily
    Json(String),
}

/// Opaque engine output: a primitive or a JSON-like object
#[derive(Debug, Clone, PartialEq)]
pub struct StructuredContent {
    repr: Repr,
}

impl StructuredContent {
    /// Wrap an already-parsed JSON value
    #[must_use]
    pub fn from_value(value: serde_json::Value) -> Self {
        Self {
            repr: Repr::Value(value),
        }
    }

    /// Wrap raw JSON text without parsing it
    #[must_use]
    pub fn from_json_text(text: impl Into<String>) -> Self {
        Self {
            repr: Repr::Json(text.into()),
        }
    }

    /// Content holding a single string
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::from_value(serde_json::Value::String(text.into()))
    }

    /// Try to decode the content as `T`
    ///
    /// # Errors
    ///
    /// Returns error if the content is not exactly a `T`
    pub fn decode<T: DeserializeOwned>(&self) -> CoreResult<T> {
        let decoded = match &self.repr {
            Repr::Value(value) => T::deserialize(value),
            Repr::Json(text) => serde_json::from_str(text),
        };
        decoded.map_err(|_| CoreError::Decode {
            expected: std::any::type_name::<T>(),
        })
    }

    /// JSON text of the content
    #[must_use]
    pub fn json_string(&self) -> String {
        match &self.repr {
            Repr::Value(value) => value.to_string(),
            Repr::Json(text) => text.clone(),
        }
    }
}

impl From<serde_json::Value> for StructuredContent {
    fn from(value: serde_json::Value) -> Self {
        Self::from_value(value)
    }
}
