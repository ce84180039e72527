//! Tool parameter validation against a compiled schema.

use crate::schema::{PrimitiveKind, SchemaNode};
use toolrelay_core::{PlainMap, PlainValue};

/// Validation error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A declared property is absent
    #[error("missing field: {path}")]
    MissingField {
        /// Dotted path of the field
        path: String,
    },

    /// Value kind does not match the schema
    #[error("field {path}: expected {expected}, got {actual}")]
    TypeMismatch {
        /// Dotted path of the field
        path: String,
        /// Kind required by the schema
        expected: &'static str,
        /// Kind actually supplied
        actual: &'static str,
    },

    /// String is not one of the enum's allowed values
    #[error("field {path}: {value:?} is not one of {allowed:?}")]
    NotAllowed {
        /// Dotted path of the field
        path: String,
        /// Supplied value
        value: String,
        /// Allowed values
        allowed: Vec<String>,
    },
}

/// Validate a parameter mapping against an object schema.
///
/// Keys the schema does not declare are ignored; every declared key must
/// be present with a matching value.
///
/// # Errors
///
/// Returns the first mismatch found, in property order
pub fn validate_parameters(schema: &SchemaNode, parameters: &PlainMap) -> Result<(), ValidationError> {
    validate_object(schema, parameters, "")
}

fn validate_object(schema: &SchemaNode, object: &PlainMap, prefix: &str) -> Result<(), ValidationError> {
    for property in schema.properties() {
        let path = if prefix.is_empty() {
            property.name.clone()
        } else {
            format!("{}.{}", prefix, property.name)
        };
        let value = object
            .get(&property.name)
            .ok_or_else(|| ValidationError::MissingField { path: path.clone() })?;
        validate_value(&property.node, value, &path)?;
    }
    Ok(())
}

fn validate_value(node: &SchemaNode, value: &PlainValue, path: &str) -> Result<(), ValidationError> {
    match node {
        SchemaNode::Primitive { kind } => {
            let matches = match kind {
                PrimitiveKind::String => value.as_str().is_some(),
                PrimitiveKind::Integer => value.as_i64().is_some(),
                PrimitiveKind::Number => value.as_f64().is_some(),
                PrimitiveKind::Boolean => value.as_bool().is_some(),
            };
            if matches {
                Ok(())
            } else {
                Err(ValidationError::TypeMismatch {
                    path: path.to_string(),
                    expected: kind.type_name(),
                    actual: value.kind_name(),
                })
            }
        }
        SchemaNode::Enum { allowed_values, .. } => {
            let text = value.as_str().ok_or_else(|| ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: "string",
                actual: value.kind_name(),
            })?;
            if allowed_values.iter().any(|allowed| allowed == text) {
                Ok(())
            } else {
                Err(ValidationError::NotAllowed {
                    path: path.to_string(),
                    value: text.to_string(),
                    allowed: allowed_values.clone(),
                })
            }
        }
        SchemaNode::Object { .. } => {
            let object = value.as_object().ok_or_else(|| ValidationError::TypeMismatch {
                path: path.to_string(),
                expected: "object",
                actual: value.kind_name(),
            })?;
            validate_object(node, object, path)
        }
    }
}
