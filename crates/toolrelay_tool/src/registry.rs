//! Tool registry for the tools a session exposes to the engine.

use crate::compiler::SchemaCompiler;
use crate::handle::{BrokerHandle, ToolDefinition};
use crate::schema::AttributeDescription;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Error from registry operations
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    /// A required field of the tool definition is missing
    #[error("Invalid tool definition structure: missing {field}")]
    InvalidDefinition {
        /// Name of the missing field
        field: &'static str,
    },
}

/// Tool definition as supplied by the caller
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolSpec {
    /// Unique tool name
    #[serde(default)]
    pub name: Option<String>,
    /// What the tool does
    #[serde(default)]
    pub description: Option<String>,
    /// Parameter descriptions
    #[serde(default)]
    pub parameters: AttributeDescription,
}

impl ToolSpec {
    /// Create a complete spec
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        description: impl Into<String>,
        parameters: AttributeDescription,
    ) -> Self {
        Self {
            name: Some(name.into()),
            description: Some(description.into()),
            parameters,
        }
    }
}

/// Registry of named tools
///
/// Registering a name twice replaces the earlier definition. Iteration
/// order is first-registration order.
#[derive(Debug, Default)]
pub struct ToolRegistry {
    /// Registered tools by name
    tools: IndexMap<String, ToolDefinition>,
    compiler: SchemaCompiler,
}

impl ToolRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a specific compiler for tool schemas
    #[must_use]
    pub fn with_compiler(mut self, compiler: SchemaCompiler) -> Self {
        self.compiler = compiler;
        self
    }

    /// Register a tool owned by the given broker
    ///
    /// # Errors
    ///
    /// Returns error if the spec lacks a name or a description
    pub fn register(
        &mut self,
        spec: ToolSpec,
        owner: BrokerHandle,
    ) -> Result<ToolDefinition, RegistryError> {
        let name = spec
            .name
            .ok_or(RegistryError::InvalidDefinition { field: "name" })?;
        let description = spec
            .description
            .ok_or(RegistryError::InvalidDefinition { field: "description" })?;

        let schema = self.compiler.compile(&spec.parameters, &name);
        let definition = ToolDefinition::new(name.clone(), description, schema, owner);
        if self.tools.insert(name.clone(), definition.clone()).is_some() {
            debug!(tool = %name, "replaced existing tool definition");
        }
        Ok(definition)
    }

    /// Get a tool by name
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name)
    }

    /// Snapshot of all definitions, in registration order
    #[must_use]
    pub fn list(&self) -> Vec<ToolDefinition> {
        self.tools.values().cloned().collect()
    }

    /// Registered tool names
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Check if a tool is registered
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tools.contains_key(name)
    }

    /// Remove every tool
    pub fn clear(&mut self) {
        self.tools.clear();
    }

    /// Get the count of registered tools
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Check if registry is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}
