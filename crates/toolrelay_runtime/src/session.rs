//! Session coordination.
//!
//! A [`SessionCoordinator`] owns the tool registry and the invocation broker
//! for one logical session. Generation calls snapshot the active session and
//! broker under a short lock and never hold it across an await.

use crate::config::{SessionConfig, StructuredRequest, TextRequest, ToolGenerationRequest};
use crate::engine::{Availability, GenerationOptions, LanguageEngine, RespondRequest};
use crate::error::BridgeError;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use toolrelay_core::{PlainValue, SessionId, StructuredContent};
use toolrelay_tool::{
    BoundarySink, BrokerConfig, BrokerHandle, ContentFlattener, InvocationBroker, PendingSnapshot,
    SchemaCompiler, SchemaNode, ToolDefinition, ToolRegistry, ToolResultMessage,
    ToolResultPayload, ToolSpec,
};
use tracing::{debug, info};

/// Name given to the root of a structured-output schema
pub const STRUCTURED_ROOT_NAME: &str = "Root";

/// A configured session
#[derive(Debug)]
struct ActiveSession {
    id: SessionId,
    instructions: String,
    tools: Vec<ToolDefinition>,
}

#[derive(Debug)]
struct SessionState {
    registry: ToolRegistry,
    broker: Arc<InvocationBroker>,
    session: Option<Arc<ActiveSession>>,
}

/// Drives an engine through a configured session
pub struct SessionCoordinator {
    engine: Arc<dyn LanguageEngine>,
    sink: Arc<dyn BoundarySink>,
    broker_config: BrokerConfig,
    compiler: SchemaCompiler,
    flattener: ContentFlattener,
    state: Mutex<SessionState>,
}

impl SessionCoordinator {
    /// Create a coordinator with the default broker configuration
    #[must_use]
    pub fn new(engine: Arc<dyn LanguageEngine>, sink: Arc<dyn BoundarySink>) -> Self {
        Self::with_config(engine, sink, BrokerConfig::default())
    }

    /// Create a coordinator with an explicit broker configuration
    #[must_use]
    pub fn with_config(
        engine: Arc<dyn LanguageEngine>,
        sink: Arc<dyn BoundarySink>,
        broker_config: BrokerConfig,
    ) -> Self {
        let broker = Arc::new(InvocationBroker::with_config(
            Arc::clone(&sink),
            broker_config.clone(),
        ));
        Self {
            engine,
            sink,
            broker_config,
            compiler: SchemaCompiler::new(),
            flattener: ContentFlattener::new(),
            state: Mutex::new(SessionState {
                registry: ToolRegistry::new(),
                broker,
                session: None,
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn active(&self) -> Result<(Arc<ActiveSession>, Arc<InvocationBroker>), BridgeError> {
        let state = self.state();
        let session = state.session.clone().ok_or(BridgeError::NotConfigured)?;
        Ok((session, Arc::clone(&state.broker)))
    }

    /// Engine availability
    #[must_use]
    pub fn availability(&self) -> Availability {
        self.engine.availability()
    }

    /// Register a tool, replacing any tool with the same name.
    ///
    /// Tools registered after [`configure`](Self::configure) are offered
    /// from the next configure on.
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidInput`] if the name or description is
    /// missing
    pub fn register_tool(&self, spec: ToolSpec) -> Result<ToolDefinition, BridgeError> {
        let mut state = self.state();
        let owner = BrokerHandle::new(&state.broker);
        let definition = state.registry.register(spec, owner)?;
        debug!(tool = %definition.name, "registered tool");
        Ok(definition)
    }

    /// Start a session over the currently registered tools
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotAvailable`] if the engine cannot respond
    pub fn configure(&self, config: SessionConfig) -> Result<SessionId, BridgeError> {
        let availability = self.engine.availability();
        if !availability.is_available() {
            return Err(BridgeError::NotAvailable {
                status: availability.status().to_string(),
            });
        }

        let mut state = self.state();
        let session = ActiveSession {
            id: SessionId::new(),
            instructions: config.effective_instructions().to_string(),
            tools: state.registry.list(),
        };
        let id = session.id;
        info!(session = %id, tools = session.tools.len(), "session configured");
        state.session = Some(Arc::new(session));
        Ok(id)
    }

    /// Check if a session is active
    #[must_use]
    pub fn is_configured(&self) -> bool {
        self.state().session.is_some()
    }

    /// Id of the active session
    #[must_use]
    pub fn session_id(&self) -> Option<SessionId> {
        self.state().session.as_ref().map(|session| session.id)
    }

    /// Generate plain text
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured, the prompt is missing, or
    /// the engine fails
    pub async fn generate_text(&self, request: TextRequest) -> Result<String, BridgeError> {
        let (session, _) = self.active()?;
        let prompt = request.prompt.ok_or_else(|| missing("prompt"))?;

        let content = self
            .respond(&session, &prompt, None, GenerationOptions::default())
            .await?;
        Ok(self.flattener.flatten(&content).into_text())
    }

    /// Generate a value shaped by the request's structure
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured, the prompt or structure
    /// is missing, the engine rejects the schema, or the engine fails
    pub async fn generate_structured(
        &self,
        request: StructuredRequest,
    ) -> Result<PlainValue, BridgeError> {
        let (session, _) = self.active()?;
        let structure = request.structure.ok_or_else(|| missing("structure"))?;
        let prompt = request.prompt.ok_or_else(|| missing("prompt"))?;

        let schema = self.compiler.compile(&structure, STRUCTURED_ROOT_NAME);
        self.engine
            .check_schema(&schema)
            .map_err(|reason| BridgeError::SchemaError { reason })?;

        let content = self
            .respond(&session, &prompt, Some(&schema), GenerationOptions::greedy())
            .await?;
        Ok(self.flattener.flatten(&content))
    }

    /// Generate text, letting the engine call registered tools
    ///
    /// The request's tool timeout applies to this and later invocations.
    ///
    /// # Errors
    ///
    /// Returns error if no session is configured, the prompt is missing, or
    /// the engine fails
    pub async fn generate_with_tools(
        &self,
        request: ToolGenerationRequest,
    ) -> Result<String, BridgeError> {
        let (session, broker) = self.active()?;
        let prompt = request.prompt.clone().ok_or_else(|| missing("prompt"))?;

        broker.set_timeout(request.tool_timeout_duration());
        let options = GenerationOptions::greedy()
            .with_temperature(request.temperature)
            .with_max_tokens(request.max_tokens);

        let content = self.respond(&session, &prompt, None, options).await?;
        Ok(self.flattener.flatten(&content).into_text())
    }

    async fn respond(
        &self,
        session: &ActiveSession,
        prompt: &str,
        schema: Option<&SchemaNode>,
        options: GenerationOptions,
    ) -> Result<StructuredContent, BridgeError> {
        let request = RespondRequest {
            instructions: &session.instructions,
            tools: &session.tools,
            prompt,
            schema,
            include_schema_in_prompt: false,
            options,
        };
        Ok(self.engine.respond(request).await?)
    }

    /// Deliver a tool result from the boundary.
    ///
    /// Returns `false` if the id is not pending.
    pub fn deliver_tool_result(&self, id: &str, payload: ToolResultPayload) -> bool {
        let broker = Arc::clone(&self.state().broker);
        broker.deliver_result(id, payload)
    }

    /// Deliver a parsed result message
    pub fn deliver_message(&self, message: ToolResultMessage) -> bool {
        self.deliver_tool_result(&message.id, message.payload)
    }

    /// Deliver a result message in its JSON wire form
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::InvalidInput`] if the text is not a result
    /// message
    pub fn deliver_json(&self, text: &str) -> Result<bool, BridgeError> {
        let message: ToolResultMessage = serde_json::from_str(text)
            .map_err(|err| BridgeError::invalid_input(format!("Invalid tool result: {}", err)))?;
        Ok(self.deliver_message(message))
    }

    /// Run one of the session's tools directly, outside of generation
    ///
    /// # Errors
    ///
    /// Returns [`BridgeError::NotConfigured`] without a session,
    /// [`BridgeError::InvalidInput`] for a tool the session does not offer,
    /// and [`BridgeError::Tool`] when the call itself fails
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: &StructuredContent,
    ) -> Result<StructuredContent, BridgeError> {
        let (session, _) = self.active()?;
        let tool = session
            .tools
            .iter()
            .find(|tool| tool.name == name)
            .ok_or_else(|| BridgeError::invalid_input(format!("Unknown tool: {}", name)))?;
        Ok(tool.call(arguments).await?)
    }

    /// In-flight invocations, oldest first
    #[must_use]
    pub fn pending_invocations(&self) -> Vec<PendingSnapshot> {
        self.state().broker.pending()
    }

    /// Tear down the session.
    ///
    /// Clears the registry, fails every pending invocation with
    /// `ModuleGone` and installs a fresh broker, so tools from before the
    /// reset can no longer reach the boundary. Safe to call repeatedly.
    pub fn reset(&self) {
        let fresh = Arc::new(InvocationBroker::with_config(
            Arc::clone(&self.sink),
            self.broker_config.clone(),
        ));
        let (old, had_session) = {
            let mut state = self.state();
            state.registry.clear();
            let had_session = state.session.take().is_some();
            (std::mem::replace(&mut state.broker, fresh), had_session)
        };

        let cancelled = old.close();
        info!(cancelled, had_session, "session reset");
    }
}

impl std::fmt::Debug for SessionCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("SessionCoordinator")
            .field("tools", &state.registry.len())
            .field("configured", &state.session.is_some())
            .field("pending", &state.broker.pending_count())
            .finish()
    }
}

fn missing(field: &str) -> BridgeError {
    BridgeError::invalid_input(format!("Missing {}", field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{GenerationError, GenerationErrorKind, Sampling, UnavailableReason};
    use crate::testing::{ScriptedEngine, ScriptedTurn};
    use serde_json::json;
    use toolrelay_tool::{AttributeDescription, RecordingSink, ToolError};

    fn weather_spec() -> ToolSpec {
        ToolSpec::new(
            "getWeather",
            "Current weather for a city",
            AttributeDescription::from_value(json!({"city": {"type": "string"}})),
        )
    }

    fn coordinator(engine: &Arc<ScriptedEngine>) -> (Arc<SessionCoordinator>, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let coordinator = Arc::new(SessionCoordinator::new(engine.clone(), sink.clone()));
        (coordinator, sink)
    }

    async fn wait_for_events(sink: &RecordingSink, count: usize) {
        while sink.events().len() < count {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test]
    async fn test_weather_tool_end_to_end() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_turn(ScriptedTurn::call_and_echo("getWeather", json!({"city": "Paris"}))),
        );
        let (coordinator, sink) = coordinator(&engine);
        coordinator.register_tool(weather_spec()).unwrap();
        coordinator.configure(SessionConfig::default()).unwrap();

        let generation = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .generate_with_tools(ToolGenerationRequest::new("Weather in Paris?"))
                    .await
            })
        };

        wait_for_events(&sink, 1).await;
        let event = sink.last().unwrap();
        assert_eq!(event.name, "getWeather");
        assert_eq!(event.parameters["city"], PlainValue::from("Paris"));
        assert_eq!(coordinator.pending_invocations().len(), 1);
        assert!(coordinator.deliver_tool_result(&event.id, ToolResultPayload::success("Sunny")));

        assert_eq!(generation.await.unwrap().unwrap(), "Sunny");
        assert!(coordinator.pending_invocations().is_empty());

        let recorded = engine.recorded_requests();
        assert_eq!(recorded[0].tool_names, vec!["getWeather"]);
        assert_eq!(recorded[0].instructions, crate::config::DEFAULT_INSTRUCTIONS);
        assert_eq!(recorded[0].options.temperature, Some(0.5));
        assert_eq!(recorded[0].options.max_tokens, Some(1000));
    }

    #[tokio::test]
    async fn test_not_configured() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, _) = coordinator(&engine);

        let text = coordinator.generate_text(TextRequest::new("hi")).await;
        assert_eq!(text, Err(BridgeError::NotConfigured));

        let structured = coordinator
            .generate_structured(StructuredRequest::new("hi", AttributeDescription::new()))
            .await;
        assert_eq!(structured, Err(BridgeError::NotConfigured));

        let tools = coordinator
            .generate_with_tools(ToolGenerationRequest::new("hi"))
            .await;
        assert_eq!(tools, Err(BridgeError::NotConfigured));
    }

    #[tokio::test]
    async fn test_missing_prompt() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, _) = coordinator(&engine);
        coordinator.configure(SessionConfig::default()).unwrap();

        let err = coordinator
            .generate_text(TextRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::invalid_input("Missing prompt"));

        let err = coordinator
            .generate_structured(StructuredRequest {
                prompt: Some("p".into()),
                structure: None,
            })
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
        assert!(engine.recorded_requests().is_empty());
    }

    #[test]
    fn test_configure_unavailable() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.set_availability(Availability::Unavailable(UnavailableReason::NotEnabled));
        let (coordinator, _) = coordinator(&engine);

        assert_eq!(coordinator.availability().status(), "notEnabled");
        assert_eq!(
            coordinator.configure(SessionConfig::default()),
            Err(BridgeError::NotAvailable {
                status: "notEnabled".into()
            })
        );
        assert!(!coordinator.is_configured());
    }

    #[test]
    fn test_register_invalid_tool() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, _) = coordinator(&engine);
        let err = coordinator.register_tool(ToolSpec::default()).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");
    }

    #[tokio::test]
    async fn test_generate_text() {
        let engine = Arc::new(ScriptedEngine::new().with_turn(ScriptedTurn::content(json!("Hello"))));
        let (coordinator, _) = coordinator(&engine);
        coordinator
            .configure(SessionConfig::with_instructions("Be brief"))
            .unwrap();

        let text = coordinator.generate_text(TextRequest::new("Greet me")).await.unwrap();
        assert_eq!(text, "Hello");
        let recorded = &engine.recorded_requests()[0];
        assert_eq!(recorded.instructions, "Be brief");
        assert_eq!(recorded.options.sampling, Sampling::Random);
    }

    #[tokio::test]
    async fn test_generate_structured() {
        let engine = Arc::new(
            ScriptedEngine::new().with_turn(ScriptedTurn::content(json!({"name": "Ada", "age": 36}))),
        );
        let (coordinator, _) = coordinator(&engine);
        coordinator.configure(SessionConfig::default()).unwrap();

        let structure = AttributeDescription::from_value(json!({
            "name": {"type": "string"},
            "age": {"type": "integer"}
        }));
        let value = coordinator
            .generate_structured(StructuredRequest::new("Describe Ada", structure))
            .await
            .unwrap();

        let map = value.as_object().unwrap();
        let keys: Vec<_> = map.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["name", "age"]);
        assert_eq!(map["age"], PlainValue::Integer(36));

        let recorded = &engine.recorded_requests()[0];
        let schema = recorded.schema.as_ref().unwrap();
        assert_eq!(schema.name(), Some(STRUCTURED_ROOT_NAME));
        assert_eq!(schema.properties().len(), 2);
        assert!(!recorded.include_schema_in_prompt);
        assert_eq!(recorded.options.sampling, Sampling::Greedy);
    }

    #[tokio::test]
    async fn test_schema_rejected() {
        let engine = Arc::new(ScriptedEngine::new());
        engine.reject_schemas("unsupported guide");
        let (coordinator, _) = coordinator(&engine);
        coordinator.configure(SessionConfig::default()).unwrap();

        let err = coordinator
            .generate_structured(StructuredRequest::new("p", AttributeDescription::new()))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::SchemaError {
                reason: "unsupported guide".into()
            }
        );
    }

    #[tokio::test]
    async fn test_generation_failure_is_presented() {
        let failure = GenerationError::new(GenerationErrorKind::GuardrailViolation, "Unsafe content")
            .with_failure_reason("blocked by guardrails");
        let engine = Arc::new(ScriptedEngine::new().with_turn(ScriptedTurn::fail(failure.clone())));
        let (coordinator, _) = coordinator(&engine);
        coordinator.configure(SessionConfig::default()).unwrap();

        let err = coordinator
            .generate_text(TextRequest::new("p"))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            BridgeError::GenerationFailed {
                message: failure.present()
            }
        );
        assert_eq!(err.code(), "GENERATION_FAILED");
    }

    #[tokio::test]
    async fn test_reset_cancels_pending() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, sink) = coordinator(&engine);
        let tool = coordinator.register_tool(weather_spec()).unwrap();
        coordinator.configure(SessionConfig::default()).unwrap();

        let calls: Vec<_> = (0..3)
            .map(|_| {
                let tool = tool.clone();
                tokio::spawn(async move {
                    tool.call(&StructuredContent::from_value(json!({"city": "Oslo"})))
                        .await
                })
            })
            .collect();
        wait_for_events(&sink, 3).await;
        assert_eq!(coordinator.pending_invocations().len(), 3);

        coordinator.reset();
        for call in calls {
            assert_eq!(call.await.unwrap(), Err(ToolError::ModuleGone));
        }
        assert!(coordinator.pending_invocations().is_empty());
        assert!(!coordinator.is_configured());

        let stale = tool
            .call(&StructuredContent::from_value(json!({"city": "Oslo"})))
            .await;
        assert_eq!(stale, Err(ToolError::ModuleGone));
        assert_eq!(sink.events().len(), 3);

        coordinator.reset();
        let err = coordinator
            .generate_text(TextRequest::new("p"))
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::NotConfigured);
    }

    #[tokio::test]
    async fn test_reset_clears_registry() {
        let engine = Arc::new(ScriptedEngine::new().with_turn(ScriptedTurn::content(json!("ok"))));
        let (coordinator, _) = coordinator(&engine);
        coordinator.register_tool(weather_spec()).unwrap();
        coordinator.reset();
        coordinator.configure(SessionConfig::default()).unwrap();

        coordinator.generate_text(TextRequest::new("p")).await.unwrap();
        assert!(engine.recorded_requests()[0].tool_names.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_tool_timeout_fails_generation() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_turn(ScriptedTurn::call_and_echo("getWeather", json!({"city": "Rome"}))),
        );
        let (coordinator, sink) = coordinator(&engine);
        coordinator.register_tool(weather_spec()).unwrap();
        coordinator.configure(SessionConfig::default()).unwrap();

        let err = coordinator
            .generate_with_tools(ToolGenerationRequest::new("p").with_tool_timeout(100))
            .await
            .unwrap_err();
        let BridgeError::GenerationFailed { message } = err else {
            panic!("expected generation failure, got {:?}", err);
        };
        assert!(message.contains("Tool execution timeout"));

        let late = sink.last().unwrap();
        assert!(!coordinator.deliver_tool_result(&late.id, ToolResultPayload::success("late")));
        assert_eq!(
            coordinator.pending_invocations().len(),
            0,
            "timed out call must leave nothing pending"
        );
    }

    #[test]
    fn test_deliver_json() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, _) = coordinator(&engine);

        let err = coordinator.deliver_json(r#"{"success": true}"#).unwrap_err();
        assert_eq!(err.code(), "INVALID_INPUT");

        let unknown = coordinator
            .deliver_json(r#"{"id": "00000000-0000-0000-0000-000000000000", "success": true}"#)
            .unwrap();
        assert!(!unknown);
    }

    #[tokio::test]
    async fn test_structure_checked_before_prompt() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, _) = coordinator(&engine);
        coordinator.configure(SessionConfig::default()).unwrap();

        let err = coordinator
            .generate_structured(StructuredRequest::default())
            .await
            .unwrap_err();
        assert_eq!(err, BridgeError::invalid_input("Missing structure"));
    }

    #[tokio::test]
    async fn test_reply_without_success_fails_call() {
        let engine = Arc::new(
            ScriptedEngine::new()
                .with_turn(ScriptedTurn::call_and_echo("getWeather", json!({"city": "Lima"}))),
        );
        let (coordinator, sink) = coordinator(&engine);
        coordinator.register_tool(weather_spec()).unwrap();
        coordinator.configure(SessionConfig::default()).unwrap();

        let generation = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .generate_with_tools(ToolGenerationRequest::new("Weather in Lima?"))
                    .await
            })
        };
        wait_for_events(&sink, 1).await;
        let id = sink.last().unwrap().id;

        let delivered = coordinator
            .deliver_json(&format!(r#"{{"id": "{}", "error": "boom"}}"#, id))
            .unwrap();
        assert!(delivered);
        assert!(coordinator.pending_invocations().is_empty());

        let BridgeError::GenerationFailed { message } = generation.await.unwrap().unwrap_err()
        else {
            panic!("expected generation failure");
        };
        assert!(message.contains("Tool execution failed: boom"));
    }

    #[tokio::test]
    async fn test_call_tool_directly() {
        let engine = Arc::new(ScriptedEngine::new());
        let (coordinator, sink) = coordinator(&engine);
        coordinator.register_tool(weather_spec()).unwrap();
        coordinator.configure(SessionConfig::default()).unwrap();

        let call = {
            let coordinator = Arc::clone(&coordinator);
            tokio::spawn(async move {
                coordinator
                    .call_tool(
                        "getWeather",
                        &StructuredContent::from_value(json!({"city": "Kyiv"})),
                    )
                    .await
            })
        };
        wait_for_events(&sink, 1).await;
        let id = sink.last().unwrap().id;
        assert!(coordinator.deliver_tool_result(&id, ToolResultPayload::failure("offline")));

        let err = call.await.unwrap().unwrap_err();
        assert_eq!(
            err,
            BridgeError::Tool(ToolError::ExecutionFailed {
                message: "offline".into()
            })
        );
        assert_eq!(err.code(), "TOOL_ERROR");

        let unknown = coordinator
            .call_tool("missing", &StructuredContent::text("{}"))
            .await
            .unwrap_err();
        assert_eq!(unknown.code(), "INVALID_INPUT");
    }
}
