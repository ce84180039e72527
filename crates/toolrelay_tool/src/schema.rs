//! Attribute descriptions and the typed schema tree compiled from them.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use toolrelay_core::CoreResult;

/// Generic, caller-supplied description of a set of fields.
///
/// Maps a field name to a descriptor object that may carry `type`,
/// `description`, `enum` and `properties`. Field order is the order in which
/// the caller wrote the fields. Nothing about the descriptors is trusted:
/// the compiler decides what is usable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AttributeDescription {
    fields: Map<String, Value>,
}

impl AttributeDescription {
    /// Create an empty description
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from any JSON value; anything but an object is an empty description
    #[must_use]
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(fields) => Self { fields },
            _ => Self::default(),
        }
    }

    /// Parse from JSON text
    ///
    /// # Errors
    ///
    /// Returns error if the text is not valid JSON
    pub fn from_json_str(text: &str) -> CoreResult<Self> {
        let value: Value = serde_json::from_str(text)?;
        Ok(Self::from_value(value))
    }

    /// Add a field descriptor
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, descriptor: Value) -> Self {
        self.fields.insert(name.into(), descriptor);
        self
    }

    /// Iterate fields in declaration order
    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Number of declared fields, malformed ones included
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Check if no fields are declared
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl From<Map<String, Value>> for AttributeDescription {
    fn from(fields: Map<String, Value>) -> Self {
        Self { fields }
    }
}

/// Primitive kinds a leaf node may take
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrimitiveKind {
    /// UTF-8 string
    String,
    /// Whole number
    Integer,
    /// Floating-point number
    Number,
    /// true / false
    Boolean,
}

impl PrimitiveKind {
    /// Map a descriptor `type` string to a kind
    #[must_use]
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "integer" => Some(Self::Integer),
            "number" => Some(Self::Number),
            "boolean" => Some(Self::Boolean),
            _ => None,
        }
    }

    /// The descriptor `type` string for this kind
    #[must_use]
    pub const fn type_name(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Integer => "integer",
            Self::Number => "number",
            Self::Boolean => "boolean",
        }
    }
}

/// Typed schema tree
///
/// Built once by the compiler and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum SchemaNode {
    /// A single primitive value
    Primitive {
        /// Value kind
        kind: PrimitiveKind,
    },
    /// One of a fixed, ordered set of strings
    Enum {
        /// Field the enum belongs to
        name: String,
        /// Allowed values in declaration order
        allowed_values: Vec<String>,
    },
    /// Named object with ordered properties
    Object {
        /// Object name
        name: String,
        /// Properties in first-seen order
        properties: Vec<SchemaProperty>,
    },
}

/// One property of an object node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// Property name
    pub name: String,
    /// Optional human-readable description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Schema of the property value
    pub node: SchemaNode,
}

impl SchemaProperty {
    /// Create a new property
    #[must_use]
    pub fn new(name: impl Into<String>, description: Option<String>, node: SchemaNode) -> Self {
        Self {
            name: name.into(),
            description,
            node,
        }
    }
}

impl SchemaNode {
    /// Primitive leaf
    #[must_use]
    pub const fn primitive(kind: PrimitiveKind) -> Self {
        Self::Primitive { kind }
    }

    /// Empty object with the given name
    #[must_use]
    pub fn empty_object(name: impl Into<String>) -> Self {
        Self::Object {
            name: name.into(),
            properties: Vec::new(),
        }
    }

    /// Name of the node; primitives are anonymous
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Primitive { .. } => None,
            Self::Enum { name, .. } | Self::Object { name, .. } => Some(name),
        }
    }

    /// Ordered properties of an object node; empty for leaves
    #[must_use]
    pub fn properties(&self) -> &[SchemaProperty] {
        match self {
            Self::Object { properties, .. } => properties,
            _ => &[],
        }
    }

    /// Look up a property by name
    #[must_use]
    pub fn property(&self, name: &str) -> Option<&SchemaProperty> {
        self.properties().iter().find(|p| p.name == name)
    }

    /// Export as JSON Schema, for engines that take JSON Schema directly
    #[must_use]
    pub fn to_json_schema(&self) -> Value {
        match self {
            Self::Primitive { kind } => json!({ "type": kind.type_name() }),
            Self::Enum {
                name,
                allowed_values,
            } => json!({
                "title": name,
                "type": "string",
                "enum": allowed_values,
            }),
            Self::Object { name, properties } => {
                let mut props = Map::new();
                for property in properties {
                    let mut schema = property.node.to_json_schema();
                    if let (Some(description), Value::Object(obj)) =
                        (&property.description, &mut schema)
                    {
                        obj.insert("description".to_string(), json!(description));
                    }
                    props.insert(property.name.clone(), schema);
                }
                let required: Vec<&str> = properties.iter().map(|p| p.name.as_str()).collect();
                json!({
                    "title": name,
                    "type": "object",
                    "properties": props,
                    "required": required,
                    "additionalProperties": false,
                })
            }
        }
    }
}
