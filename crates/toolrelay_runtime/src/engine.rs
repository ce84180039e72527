//! Contract for the external generation engine.
//!
//! The runtime never generates anything itself. It hands an engine the
//! session instructions, the registered tools, a prompt and an optional
//! schema, and gets [`StructuredContent`] back.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use toolrelay_core::StructuredContent;
use toolrelay_tool::{SchemaNode, ToolDefinition};

/// Why an engine cannot be used
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnavailableReason {
    /// The feature is switched off on this host
    NotEnabled,
    /// The model is still downloading or preparing
    ModelNotReady,
    /// Any other reason
    Other(String),
}

/// Engine availability
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Availability {
    /// Ready to respond
    #[default]
    Available,
    /// Cannot respond
    Unavailable(UnavailableReason),
}

impl Availability {
    /// Check if the engine can respond
    #[must_use]
    pub const fn is_available(&self) -> bool {
        matches!(self, Self::Available)
    }

    /// Status string reported to callers
    #[must_use]
    pub const fn status(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Unavailable(UnavailableReason::NotEnabled) => "notEnabled",
            Self::Unavailable(UnavailableReason::ModelNotReady) => "modelNotReady",
            Self::Unavailable(UnavailableReason::Other(_)) => "unavailable",
        }
    }
}

/// Token sampling strategy
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Sampling {
    /// Always take the most likely token
    Greedy,
    /// Engine-defined random sampling
    #[default]
    Random,
}

/// Options passed with every respond call
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationOptions {
    /// Sampling strategy
    pub sampling: Sampling,
    /// Sampling temperature
    pub temperature: Option<f64>,
    /// Upper bound on generated tokens
    pub max_tokens: Option<u32>,
}

impl GenerationOptions {
    /// Greedy options with engine defaults otherwise
    #[must_use]
    pub const fn greedy() -> Self {
        Self {
            sampling: Sampling::Greedy,
            temperature: None,
            max_tokens: None,
        }
    }

    /// Set the temperature
    #[must_use]
    pub const fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    /// Set the token limit
    #[must_use]
    pub const fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }
}

/// One respond call
#[derive(Debug, Clone)]
pub struct RespondRequest<'a> {
    /// Session instructions
    pub instructions: &'a str,
    /// Tools the engine may call
    pub tools: &'a [ToolDefinition],
    /// User prompt
    pub prompt: &'a str,
    /// Shape the output must take, if any
    pub schema: Option<&'a SchemaNode>,
    /// Whether the schema should also be described in the prompt
    pub include_schema_in_prompt: bool,
    /// Sampling options
    pub options: GenerationOptions,
}

/// Category of a generation failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GenerationErrorKind {
    /// Prompt plus transcript no longer fit
    ExceededContextWindowSize,
    /// Model assets are missing
    AssetsUnavailable,
    /// Safety guardrails refused the content
    GuardrailViolation,
    /// Schema uses a guide the engine cannot honor
    UnsupportedGuide,
    /// Prompt language or locale is unsupported
    UnsupportedLanguageOrLocale,
    /// Output could not be decoded into the schema
    DecodingFailure,
    /// Too many requests
    RateLimited,
    /// A tool the engine called failed
    ToolCallFailed,
    /// Uncategorized
    Other,
}

/// Failure reported by an engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[serde(rename_all = "camelCase")]
#[error("{}", self.present())]
pub struct GenerationError {
    /// Category
    pub kind: GenerationErrorKind,
    /// Short description
    pub description: String,
    /// Why it failed
    #[serde(default)]
    pub failure_reason: Option<String>,
    /// What the caller could do about it
    #[serde(default)]
    pub recovery_suggestion: Option<String>,
    /// Extra engine context
    #[serde(default)]
    pub context: Option<String>,
}

impl GenerationError {
    /// Create an error with only a description
    #[must_use]
    pub fn new(kind: GenerationErrorKind, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            failure_reason: None,
            recovery_suggestion: None,
            context: None,
        }
    }

    /// Set the failure reason
    #[must_use]
    pub fn with_failure_reason(mut self, reason: impl Into<String>) -> Self {
        self.failure_reason = Some(reason.into());
        self
    }

    /// Set the recovery suggestion
    #[must_use]
    pub fn with_recovery_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.recovery_suggestion = Some(suggestion.into());
        self
    }

    /// Set the context
    #[must_use]
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Human-readable message for callers
    #[must_use]
    pub fn present(&self) -> String {
        if self.kind == GenerationErrorKind::Other {
            return format!("Failed to respond: {}", self.description);
        }
        format!(
            "Failed to respond: {}.\nFailure reason: {}.\nRecovery suggestion: {}.\nContext: {}",
            self.description,
            self.failure_reason.as_deref().unwrap_or("none"),
            self.recovery_suggestion.as_deref().unwrap_or("none"),
            self.context.as_deref().unwrap_or("none"),
        )
    }
}

/// A generation engine
#[async_trait]
pub trait LanguageEngine: Send + Sync {
    /// Current availability
    fn availability(&self) -> Availability;

    /// Check that the engine can generate into `schema`
    ///
    /// # Errors
    ///
    /// Returns the rejection reason
    fn check_schema(&self, _schema: &SchemaNode) -> Result<(), String> {
        Ok(())
    }

    /// Produce content for a request, calling tools as needed
    ///
    /// # Errors
    ///
    /// Returns the engine's failure
    async fn respond(&self, request: RespondRequest<'_>)
    -> Result<StructuredContent, GenerationError>;
}
