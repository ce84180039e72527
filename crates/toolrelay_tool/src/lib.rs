//! TOOLRELAY Tool System
//!
//! Compiles externally supplied attribute descriptions into typed schemas,
//! keeps the registry of named tools, and brokers tool calls whose
//! execution happens on the far side of a process boundary.
//! All attribute descriptions are treated as untrusted input.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod boundary;
pub mod broker;
pub mod compiler;
pub mod flatten;
pub mod handle;
pub mod registry;
pub mod schema;
pub mod validate;

pub use boundary::{
    BoundarySink, ChannelSink, RecordingSink, ToolInvocationEvent, ToolResultMessage,
    ToolResultPayload, TOOL_INVOCATION_EVENT,
};
pub use broker::{BrokerConfig, InvocationBroker, PendingSnapshot, ToolError};
pub use compiler::SchemaCompiler;
pub use flatten::{ContentFlattener, FLATTEN_FAILURE};
pub use handle::{BrokerHandle, ToolDefinition};
pub use registry::{RegistryError, ToolRegistry, ToolSpec};
pub use schema::{AttributeDescription, PrimitiveKind, SchemaNode, SchemaProperty};
pub use validate::{validate_parameters, ValidationError};
