//! Tool definitions handed to the generation engine.
//!
//! A definition reaches its session's broker through a [`BrokerHandle`],
//! which never keeps the broker alive. Once the session is reset the handle
//! stops resolving and calls fail with [`ToolError::ModuleGone`].

use crate::broker::{InvocationBroker, ToolError};
use crate::flatten::ContentFlattener;
use crate::schema::SchemaNode;
use crate::validate::validate_parameters;
use std::sync::{Arc, Weak};
use toolrelay_core::{PlainMap, PlainValue, StructuredContent};
use tracing::warn;

/// Non-owning reference to a session's broker
#[derive(Debug, Clone, Default)]
pub struct BrokerHandle {
    broker: Weak<InvocationBroker>,
}

impl BrokerHandle {
    /// Handle to a live broker
    #[must_use]
    pub fn new(broker: &Arc<InvocationBroker>) -> Self {
        Self {
            broker: Arc::downgrade(broker),
        }
    }

    /// Handle that never resolves
    #[must_use]
    pub fn detached() -> Self {
        Self::default()
    }

    /// Check if the broker still exists
    #[must_use]
    pub fn is_live(&self) -> bool {
        self.broker.strong_count() > 0
    }

    /// Invoke through the broker, if it is still around
    ///
    /// # Errors
    ///
    /// Returns [`ToolError::ModuleGone`] if the broker was dropped, otherwise
    /// whatever the broker resolves with
    pub async fn invoke(&self, name: &str, parameters: PlainMap) -> Result<String, ToolError> {
        let broker = self.broker.upgrade().ok_or(ToolError::ModuleGone)?;
        broker.invoke(name, parameters).await
    }
}

/// A named tool whose execution happens across the boundary
#[derive(Debug, Clone)]
pub struct ToolDefinition {
    /// Unique tool name
    pub name: String,
    /// What the tool does, for the engine
    pub description: String,
    /// Compiled parameter schema
    pub schema: Arc<SchemaNode>,
    owner: BrokerHandle,
}

impl ToolDefinition {
    /// Create a definition owned by the given broker
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        schema: SchemaNode,
        owner: BrokerHandle,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            schema: Arc::new(schema),
            owner,
        }
    }

    /// The owning broker handle
    #[must_use]
    pub fn owner(&self) -> &BrokerHandle {
        &self.owner
    }

    /// Parameter schema as JSON Schema
    #[must_use]
    pub fn parameters_json_schema(&self) -> serde_json::Value {
        self.schema.to_json_schema()
    }

    /// Run the tool with engine-generated arguments.
    ///
    /// Arguments that do not flatten to an object count as no arguments.
    /// Arguments that do not fit the schema fail without reaching the
    /// boundary.
    ///
    /// # Errors
    ///
    /// Returns the [`ToolError`] the call resolved with
    pub async fn call(&self, arguments: &StructuredContent) -> Result<StructuredContent, ToolError> {
        let parameters = match ContentFlattener::new().flatten(arguments) {
            PlainValue::Object(map) => map,
            _ => PlainMap::new(),
        };

        if let Err(err) = validate_parameters(&self.schema, &parameters) {
            warn!(tool = %self.name, error = %err, "rejecting tool arguments");
            return Err(ToolError::ExecutionFailed {
                message: format!("invalid arguments: {}", err),
            });
        }

        let output = self.owner.invoke(&self.name, parameters).await?;
        Ok(StructuredContent::text(output))
    }
}
