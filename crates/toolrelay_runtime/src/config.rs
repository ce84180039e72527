//! Request and session configuration.
//!
//! Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use toolrelay_tool::AttributeDescription;

/// Instructions used when a session is configured without any
pub const DEFAULT_INSTRUCTIONS: &str =
    "You are a helpful assistant that returns structured JSON data based on a given schema.";

/// Default token limit for tool-enabled generation
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// Default temperature for tool-enabled generation
pub const DEFAULT_TEMPERATURE: f64 = 0.5;

/// Default tool timeout in milliseconds
pub const DEFAULT_TOOL_TIMEOUT_MS: u64 = 30_000;

/// Session configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    /// System instructions for the engine
    #[serde(default)]
    pub instructions: Option<String>,
}

impl SessionConfig {
    /// Configuration with explicit instructions
    #[must_use]
    pub fn with_instructions(instructions: impl Into<String>) -> Self {
        Self {
            instructions: Some(instructions.into()),
        }
    }

    /// Instructions to use, falling back to [`DEFAULT_INSTRUCTIONS`]
    #[must_use]
    pub fn effective_instructions(&self) -> &str {
        self.instructions.as_deref().unwrap_or(DEFAULT_INSTRUCTIONS)
    }
}

/// Plain text generation request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRequest {
    /// User prompt
    #[serde(default)]
    pub prompt: Option<String>,
}

impl TextRequest {
    /// Request with a prompt
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
        }
    }
}

/// Structured generation request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuredRequest {
    /// User prompt
    #[serde(default)]
    pub prompt: Option<String>,
    /// Shape of the output
    #[serde(default)]
    pub structure: Option<AttributeDescription>,
}

impl StructuredRequest {
    /// Request with a prompt and a structure
    #[must_use]
    pub fn new(prompt: impl Into<String>, structure: AttributeDescription) -> Self {
        Self {
            prompt: Some(prompt.into()),
            structure: Some(structure),
        }
    }
}

/// Tool-enabled generation request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ToolGenerationRequest {
    /// User prompt
    pub prompt: Option<String>,
    /// Upper bound on generated tokens
    pub max_tokens: u32,
    /// Sampling temperature
    pub temperature: f64,
    /// Per-invocation tool timeout in milliseconds
    pub tool_timeout: u64,
}

impl Default for ToolGenerationRequest {
    fn default() -> Self {
        Self {
            prompt: None,
            max_tokens: DEFAULT_MAX_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
            tool_timeout: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }
}

impl ToolGenerationRequest {
    /// Request with a prompt and default limits
    #[must_use]
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Set the tool timeout
    #[must_use]
    pub const fn with_tool_timeout(mut self, timeout_ms: u64) -> Self {
        self.tool_timeout = timeout_ms;
        self
    }

    /// Tool timeout as a duration
    #[must_use]
    pub const fn tool_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.tool_timeout)
    }
}

/// Error loading a runtime configuration file
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("cannot read config: {0}")]
    Io(#[from] std::io::Error),
    /// The file is not a valid configuration
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level runtime configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RuntimeConfig {
    /// Session settings
    pub session: SessionConfig,
    /// Broker timeout in milliseconds
    pub tool_timeout: u64,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            tool_timeout: DEFAULT_TOOL_TIMEOUT_MS,
        }
    }
}

impl RuntimeConfig {
    /// Load from a JSON file
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Broker timeout as a duration
    #[must_use]
    pub const fn tool_timeout_duration(&self) -> Duration {
        Duration::from_millis(self.tool_timeout)
    }
}
