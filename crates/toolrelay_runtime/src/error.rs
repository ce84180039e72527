//! Errors surfaced by the session coordinator.

use crate::engine::GenerationError;
use toolrelay_tool::{RegistryError, ToolError};

/// Failure of a coordinator operation
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The engine cannot be used
    #[error("Foundation model is not available: {status}")]
    NotAvailable {
        /// Availability status string
        status: String,
    },
    /// No session has been configured
    #[error("Session not configured")]
    NotConfigured,
    /// A required input is missing or malformed
    #[error("{message}")]
    InvalidInput {
        /// What was wrong
        message: String,
    },
    /// The engine rejected the schema
    #[error("Failed to create generation schema: {reason}")]
    SchemaError {
        /// Rejection reason
        reason: String,
    },
    /// The engine failed to generate
    #[error("{message}")]
    GenerationFailed {
        /// Presented engine failure
        message: String,
    },
    /// A tool call failed outside of generation
    #[error(transparent)]
    Tool(#[from] ToolError),
}

impl BridgeError {
    /// Missing or malformed input
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Stable error code
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NotAvailable { .. } => "UNAVAILABLE",
            Self::NotConfigured => "SESSION_NOT_CONFIGURED",
            Self::InvalidInput { .. } => "INVALID_INPUT",
            Self::SchemaError { .. } => "GENERATION_SCHEMA_ERROR",
            Self::GenerationFailed { .. } => "GENERATION_FAILED",
            Self::Tool(_) => "TOOL_ERROR",
        }
    }
}

impl From<GenerationError> for BridgeError {
    fn from(err: GenerationError) -> Self {
        Self::GenerationFailed {
            message: err.present(),
        }
    }
}

impl From<RegistryError> for BridgeError {
    fn from(err: RegistryError) -> Self {
        Self::InvalidInput {
            message: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::GenerationErrorKind;

    #[test]
    fn test_codes() {
        assert_eq!(BridgeError::NotConfigured.code(), "SESSION_NOT_CONFIGURED");
        assert_eq!(BridgeError::invalid_input("x").code(), "INVALID_INPUT");
        assert_eq!(BridgeError::Tool(ToolError::Timeout).code(), "TOOL_ERROR");
        assert_eq!(
            BridgeError::NotAvailable {
                status: "notEnabled".into()
            }
            .code(),
            "UNAVAILABLE"
        );
    }

    #[test]
    fn test_from_generation_error() {
        let err: BridgeError = GenerationError::new(GenerationErrorKind::Other, "boom").into();
        assert_eq!(
            err,
            BridgeError::GenerationFailed {
                message: "Failed to respond: boom".into()
            }
        );
    }

    #[test]
    fn test_from_registry_error() {
        let err: BridgeError = RegistryError::InvalidDefinition { field: "name" }.into();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert_eq!(err.to_string(), "Invalid tool definition structure: missing name");
    }

    #[test]
    fn test_display() {
        assert_eq!(
            BridgeError::Tool(ToolError::ModuleGone).to_string(),
            "Module reference lost"
        );
        assert_eq!(
            BridgeError::SchemaError {
                reason: "bad".into()
            }
            .to_string(),
            "Failed to create generation schema: bad"
        );
    }
}
