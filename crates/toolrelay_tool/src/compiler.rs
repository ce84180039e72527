//! Attribute description to schema tree compiler.
//!
//! Compilation is total. Descriptions come from outside the process, so
//! every shape of input produces a schema: malformed entries are dropped and
//! unknown types degrade to strings.

use crate::schema::{AttributeDescription, PrimitiveKind, SchemaNode, SchemaProperty};
use serde_json::{Map, Value};
use tracing::debug;

/// Default nesting limit for object fields
pub const DEFAULT_MAX_DEPTH: usize = 32;

/// How one descriptor entry is interpreted
#[derive(Debug)]
enum FieldShape<'a> {
    /// Not a descriptor object
    Malformed,
    /// `enum` wins over any declared type
    Enum(Vec<String>),
    /// Arrays are not supported and are dropped
    Array,
    /// `type: object` with nested properties
    Object(&'a Map<String, Value>),
    /// Everything else
    Primitive(PrimitiveKind),
}

impl<'a> FieldShape<'a> {
    fn classify(raw: &'a Value) -> Self {
        let Some(field) = raw.as_object() else {
            return Self::Malformed;
        };
        let type_name = field.get("type").and_then(Value::as_str);

        if let Some(values) = field.get("enum").and_then(string_list) {
            return Self::Enum(values);
        }
        if type_name == Some("array") {
            return Self::Array;
        }
        if type_name == Some("object") {
            if let Some(nested) = field.get("properties").and_then(Value::as_object) {
                return Self::Object(nested);
            }
        }
        Self::Primitive(
            type_name
                .and_then(PrimitiveKind::from_type_name)
                .unwrap_or(PrimitiveKind::String),
        )
    }
}

/// An `enum` entry only counts when every member is a string
fn string_list(value: &Value) -> Option<Vec<String>> {
    value
        .as_array()?
        .iter()
        .map(|v| v.as_str().map(str::to_string))
        .collect()
}

/// Compiles attribute descriptions into [`SchemaNode`] trees
#[derive(Debug, Clone)]
pub struct SchemaCompiler {
    /// Nested objects deeper than this degrade to strings
    max_depth: usize,
}

impl SchemaCompiler {
    /// Create a compiler with the default depth limit
    #[must_use]
    pub fn new() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// Set the nesting limit
    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Compile a description into an object node called `name`.
    ///
    /// Never fails. Output order follows the description's field order.
    #[must_use]
    pub fn compile(&self, description: &AttributeDescription, name: &str) -> SchemaNode {
        self.compile_object(description.fields(), name, 0)
    }

    fn compile_object<'a>(
        &self,
        fields: impl Iterator<Item = (&'a String, &'a Value)>,
        name: &str,
        depth: usize,
    ) -> SchemaNode {
        let mut properties = Vec::new();

        for (key, raw) in fields {
            let description = raw
                .get("description")
                .and_then(Value::as_str)
                .map(str::to_string);

            let node = match FieldShape::classify(raw) {
                FieldShape::Malformed => {
                    debug!(schema = name, field = %key, "skipping malformed field descriptor");
                    continue;
                }
                FieldShape::Array => {
                    debug!(schema = name, field = %key, "skipping unsupported array field");
                    continue;
                }
                FieldShape::Enum(allowed_values) => SchemaNode::Enum {
                    name: key.clone(),
                    allowed_values,
                },
                FieldShape::Object(nested) if depth < self.max_depth => {
                    self.compile_object(nested.iter(), key, depth + 1)
                }
                FieldShape::Object(_) => {
                    debug!(schema = name, field = %key, depth, "object nesting too deep, using string");
                    SchemaNode::primitive(PrimitiveKind::String)
                }
                FieldShape::Primitive(kind) => SchemaNode::primitive(kind),
            };

            properties.push(SchemaProperty::new(key.clone(), description, node));
        }

        SchemaNode::Object {
            name: name.to_string(),
            properties,
        }
    }
}

impl Default for SchemaCompiler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn compile(value: Value) -> SchemaNode {
        SchemaCompiler::new().compile(&AttributeDescription::from_value(value), "Root")
    }

    fn kind_of(node: &SchemaNode, field: &str) -> PrimitiveKind {
        match &node.property(field).unwrap().node {
            SchemaNode::Primitive { kind } => *kind,
            other => panic!("expected primitive, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_description() {
        let node = compile(json!({}));
        assert_eq!(node, SchemaNode::empty_object("Root"));
    }

    #[test]
    fn test_primitive_types() {
        let node = compile(json!({
            "s": {"type": "string"},
            "i": {"type": "integer"},
            "n": {"type": "number"},
            "b": {"type": "boolean"},
        }));
        assert_eq!(kind_of(&node, "s"), PrimitiveKind::String);
        assert_eq!(kind_of(&node, "i"), PrimitiveKind::Integer);
        assert_eq!(kind_of(&node, "n"), PrimitiveKind::Number);
        assert_eq!(kind_of(&node, "b"), PrimitiveKind::Boolean);
    }

    #[test]
    fn test_missing_and_unknown_types_degrade_to_string() {
        let node = compile(json!({
            "missing": {"description": "no type"},
            "unknown": {"type": "date-time"},
            "not_a_string": {"type": 42},
            "bare_object": {"type": "object"},
        }));
        assert_eq!(kind_of(&node, "missing"), PrimitiveKind::String);
        assert_eq!(kind_of(&node, "unknown"), PrimitiveKind::String);
        assert_eq!(kind_of(&node, "not_a_string"), PrimitiveKind::String);
        assert_eq!(kind_of(&node, "bare_object"), PrimitiveKind::String);
    }

    #[test]
    fn test_description_is_carried() {
        let node = compile(json!({"city": {"type": "string", "description": "City name"}}));
        assert_eq!(
            node.property("city").unwrap().description.as_deref(),
            Some("City name")
        );
    }

    #[test]
    fn test_enum_wins_over_type() {
        let node = compile(json!({
            "unit": {"type": "integer", "enum": ["celsius", "fahrenheit", "kelvin"]},
        }));
        assert_eq!(
            node.property("unit").unwrap().node,
            SchemaNode::Enum {
                name: "unit".to_string(),
                allowed_values: vec![
                    "celsius".to_string(),
                    "fahrenheit".to_string(),
                    "kelvin".to_string()
                ],
            }
        );
    }

    #[test]
    fn test_enum_with_non_strings_is_ignored() {
        let node = compile(json!({"level": {"type": "integer", "enum": [1, 2, 3]}}));
        assert_eq!(kind_of(&node, "level"), PrimitiveKind::Integer);
    }

    #[test]
    fn test_nested_object() {
        let node = compile(json!({
            "location": {
                "type": "object",
                "description": "Where",
                "properties": {
                    "city": {"type": "string"},
                    "coords": {
                        "type": "object",
                        "properties": {"lat": {"type": "number"}, "lon": {"type": "number"}}
                    }
                }
            }
        }));
        let location = &node.property("location").unwrap().node;
        assert_eq!(location.name(), Some("location"));
        let names: Vec<_> = location.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["city", "coords"]);

        let coords = &location.property("coords").unwrap().node;
        assert_eq!(kind_of(coords, "lat"), PrimitiveKind::Number);
        assert_eq!(kind_of(coords, "lon"), PrimitiveKind::Number);
    }

    #[test]
    fn test_malformed_and_array_fields_are_skipped() {
        let node = compile(json!({
            "ok": {"type": "string"},
            "plain": "string",
            "number": 5,
            "null": null,
            "tags": {"type": "array", "items": {"type": "string"}},
        }));
        let names: Vec<_> = node.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["ok"]);
    }

    #[test]
    fn test_first_seen_order_is_kept() {
        let node = compile(json!({
            "zulu": {"type": "string"},
            "alpha": {"type": "integer"},
            "mike": {"enum": ["a"]},
        }));
        let names: Vec<_> = node.properties().iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["zulu", "alpha", "mike"]);
    }

    #[test]
    fn test_depth_limit_degrades() {
        let desc = json!({
            "a": {"type": "object", "properties": {
                "b": {"type": "object", "properties": {"c": {"type": "integer"}}}
            }}
        });
        let node = SchemaCompiler::new()
            .with_max_depth(1)
            .compile(&AttributeDescription::from_value(desc), "Root");
        let a = &node.property("a").unwrap().node;
        assert_eq!(kind_of(a, "b"), PrimitiveKind::String);
    }

    #[test]
    fn test_compile_is_deterministic() {
        let desc = AttributeDescription::from_value(json!({
            "x": {"type": "number"},
            "y": {"enum": ["p", "q"]},
        }));
        let compiler = SchemaCompiler::new();
        assert_eq!(compiler.compile(&desc, "R"), compiler.compile(&desc, "R"));
    }

    fn arb_json() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::from),
            any::<i64>().prop_map(Value::from),
            prop::sample::select(vec![
                "string", "integer", "number", "boolean", "object", "array", "bogus"
            ])
            .prop_map(Value::from),
            "[a-z]{0,8}".prop_map(Value::from),
        ];
        leaf.prop_recursive(4, 48, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
                prop::collection::vec(
                    (
                        prop::sample::select(vec![
                            "type", "enum", "properties", "description", "name", "items"
                        ]),
                        inner
                    ),
                    0..5
                )
                .prop_map(|entries| {
                    Value::Object(entries.into_iter().map(|(k, v)| (k.to_string(), v)).collect())
                }),
            ]
        })
    }

    proptest! {
        #[test]
        fn prop_compile_is_total(value in arb_json()) {
            let node = compile(value);
            let is_object = matches!(node, SchemaNode::Object { .. });
            prop_assert!(is_object);
        }

        #[test]
        fn prop_enum_preserves_order(values in prop::collection::vec("[a-z]{1,6}", 1..6)) {
            let node = compile(json!({"field": {"type": "number", "enum": values.clone()}}));
            prop_assert_eq!(
                &node.property("field").unwrap().node,
                &SchemaNode::Enum { name: "field".to_string(), allowed_values: values }
            );
        }
    }
}
