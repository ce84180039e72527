//! Scripted engine for tests and offline runs.
//!
//! Each respond call consumes the next queued [`ScriptedTurn`]: the turn's
//! tool calls run in order through the request's tools, then the turn's
//! output is produced.

use crate::engine::{
    Availability, GenerationError, GenerationErrorKind, GenerationOptions, LanguageEngine,
    RespondRequest,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use toolrelay_core::StructuredContent;
use toolrelay_tool::SchemaNode;
use tracing::debug;

/// A tool call the engine makes during a turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScriptedToolCall {
    /// Tool name
    pub tool: String,
    /// Generated arguments
    #[serde(default)]
    pub arguments: Value,
}

impl ScriptedToolCall {
    /// Create a call
    #[must_use]
    pub fn new(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool: tool.into(),
            arguments,
        }
    }
}

/// What a turn ends with
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ScriptedOutput {
    /// Fixed content
    Content {
        /// The generated value
        value: Value,
    },
    /// Tool outputs joined by newlines, or the prompt if no tool ran
    Echo,
    /// Engine failure
    Fail {
        /// The failure
        error: GenerationError,
    },
}

/// One scripted respond call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedTurn {
    /// Tool calls made before answering
    #[serde(default)]
    pub tool_calls: Vec<ScriptedToolCall>,
    /// Final output
    pub output: ScriptedOutput,
}

impl ScriptedTurn {
    /// Turn that answers with fixed content
    #[must_use]
    pub fn content(value: Value) -> Self {
        Self {
            tool_calls: Vec::new(),
            output: ScriptedOutput::Content { value },
        }
    }

    /// Turn that fails
    #[must_use]
    pub fn fail(error: GenerationError) -> Self {
        Self {
            tool_calls: Vec::new(),
            output: ScriptedOutput::Fail { error },
        }
    }

    /// Turn that calls a tool and echoes its output
    #[must_use]
    pub fn call_and_echo(tool: impl Into<String>, arguments: Value) -> Self {
        Self {
            tool_calls: vec![ScriptedToolCall::new(tool, arguments)],
            output: ScriptedOutput::Echo,
        }
    }

    /// Add another tool call
    #[must_use]
    pub fn with_tool_call(mut self, tool: impl Into<String>, arguments: Value) -> Self {
        self.tool_calls.push(ScriptedToolCall::new(tool, arguments));
        self
    }
}

/// What the engine was asked to do
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    /// Session instructions
    pub instructions: String,
    /// Names of the tools offered
    pub tool_names: Vec<String>,
    /// User prompt
    pub prompt: String,
    /// Requested output shape
    pub schema: Option<SchemaNode>,
    /// Whether the schema was to be described in the prompt
    pub include_schema_in_prompt: bool,
    /// Sampling options
    pub options: GenerationOptions,
}

/// Engine that replays queued turns
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    turns: Mutex<VecDeque<ScriptedTurn>>,
    recorded: Mutex<Vec<RecordedRequest>>,
    availability: Mutex<Availability>,
    schema_rejection: Mutex<Option<String>>,
}

impl ScriptedEngine {
    /// Create an available engine with no turns
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine from a JSON array of turns
    ///
    /// # Errors
    ///
    /// Returns error if the text is not a list of turns
    pub fn from_json_str(text: &str) -> Result<Self, serde_json::Error> {
        let turns: Vec<ScriptedTurn> = serde_json::from_str(text)?;
        Ok(Self {
            turns: Mutex::new(turns.into()),
            ..Self::default()
        })
    }

    /// Queue a turn
    #[must_use]
    pub fn with_turn(self, turn: ScriptedTurn) -> Self {
        self.push_turn(turn);
        self
    }

    /// Queue a turn through a shared reference
    pub fn push_turn(&self, turn: ScriptedTurn) {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(turn);
    }

    /// Report the given availability from now on
    pub fn set_availability(&self, availability: Availability) {
        *self
            .availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = availability;
    }

    /// Reject every schema with `reason`
    pub fn reject_schemas(&self, reason: impl Into<String>) {
        *self
            .schema_rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(reason.into());
    }

    /// Requests received so far, oldest first
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<RecordedRequest> {
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of turns not yet consumed
    #[must_use]
    pub fn remaining_turns(&self) -> usize {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn record(&self, request: &RespondRequest<'_>) {
        let recorded = RecordedRequest {
            instructions: request.instructions.to_string(),
            tool_names: request.tools.iter().map(|tool| tool.name.clone()).collect(),
            prompt: request.prompt.to_string(),
            schema: request.schema.cloned(),
            include_schema_in_prompt: request.include_schema_in_prompt,
            options: request.options,
        };
        self.recorded
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(recorded);
    }

    fn next_turn(&self) -> Option<ScriptedTurn> {
        self.turns
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

#[async_trait]
impl LanguageEngine for ScriptedEngine {
    fn availability(&self) -> Availability {
        self.availability
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_schema(&self, _schema: &SchemaNode) -> Result<(), String> {
        match self
            .schema_rejection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
        {
            Some(reason) => Err(reason.clone()),
            None => Ok(()),
        }
    }

    async fn respond(
        &self,
        request: RespondRequest<'_>,
    ) -> Result<StructuredContent, GenerationError> {
        self.record(&request);
        let turn = self.next_turn().ok_or_else(|| {
            GenerationError::new(GenerationErrorKind::Other, "no scripted response left")
        })?;

        let mut outputs = Vec::with_capacity(turn.tool_calls.len());
        for call in &turn.tool_calls {
            let tool = request
                .tools
                .iter()
                .find(|tool| tool.name == call.tool)
                .ok_or_else(|| {
                    GenerationError::new(GenerationErrorKind::ToolCallFailed, "Tool call failed")
                        .with_failure_reason(format!("unknown tool {}", call.tool))
                })?;

            debug!(tool = %call.tool, "scripted engine calling tool");
            let output = tool
                .call(&StructuredContent::from_value(call.arguments.clone()))
                .await
                .map_err(|err| {
                    GenerationError::new(GenerationErrorKind::ToolCallFailed, "Tool call failed")
                        .with_failure_reason(err.to_string())
                        .with_context(call.tool.clone())
                })?;
            outputs.push(output.decode::<String>().unwrap_or_else(|_| output.json_string()));
        }

        match turn.output {
            ScriptedOutput::Content { value } => Ok(StructuredContent::from_value(value)),
            ScriptedOutput::Echo if outputs.is_empty() => Ok(StructuredContent::text(request.prompt)),
            ScriptedOutput::Echo => Ok(StructuredContent::text(outputs.join("\n"))),
            ScriptedOutput::Fail { error } => Err(error),
        }
    }
}
