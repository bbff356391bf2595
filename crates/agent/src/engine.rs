//! The ReAct loop: reason → act → observe until the model answers or a
//! budget runs out.
//!
//! Each iteration makes one model call through the [`ModelGateway`]. If the
//! model asks for tools, they run one after another in the order requested
//! and every result (including errors) goes back to the model as an
//! observation. A tool failure never ends the run; a gateway failure does.
//!
//! The wall-clock budget is checked between iterations only. A slow model
//! or tool call can therefore overrun `timeout_seconds`; the gateway's own
//! per-call timeout bounds how far.

use chrono::Utc;
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::{Result, ToolError};
use deskhand_core::event::{DomainEvent, EventBus};
use deskhand_core::message::{Message, MessageToolCall};
use deskhand_core::tool::{ToolCall, ToolRegistry};
use deskhand_providers::{ModelGateway, ModelRole};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::event::{EngineEvent, EventSink};
use crate::request::ExecutionRequest;
use crate::trace::{ExecutionResult, IterationRecord, TerminationReason, ToolInvocationRecord};

/// A ReAct engine. Cheap to share; every call to [`execute`](Self::execute)
/// is an independent run with its own conversation state and trace.
pub struct ReactEngine {
    gateway: Arc<ModelGateway>,
    tools: Arc<ToolRegistry>,
    system_prompt: Option<String>,
    role: ModelRole,
    event_bus: Option<Arc<EventBus>>,
}

impl ReactEngine {
    pub fn new(gateway: Arc<ModelGateway>, tools: Arc<ToolRegistry>) -> Self {
        Self {
            gateway,
            tools,
            system_prompt: None,
            role: ModelRole::Primary,
            event_bus: None,
        }
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        let prompt = prompt.into();
        self.system_prompt = (!prompt.trim().is_empty()).then_some(prompt);
        self
    }

    /// Model role resolved at the start of every run.
    pub fn with_role(mut self, role: ModelRole) -> Self {
        self.role = role;
        self
    }

    /// Publish tool and run summaries on a process-wide bus.
    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    pub fn gateway(&self) -> &ModelGateway {
        &self.gateway
    }

    /// Run to completion without a listener.
    ///
    /// Returns `Err` only for an invalid request, before anything runs.
    pub async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResult> {
        self.execute_with_events(request, EventSink::discard()).await
    }

    /// Run to completion, reporting progress to `events`.
    pub async fn execute_with_events(
        &self,
        request: ExecutionRequest,
        events: EventSink,
    ) -> Result<ExecutionResult> {
        request.validate()?;

        // Identity and model settings are fixed for the whole run.
        let ctx = request.context();
        let selection = self.gateway.select(self.role);
        let budget = Duration::from_secs_f64(request.timeout_seconds);
        let started = Instant::now();

        info!(
            session_id = %ctx.session_id,
            entity = %ctx.entity_type,
            model = %selection.model,
            max_iterations = request.max_iterations,
            timeout_secs = request.timeout_seconds,
            "ReAct run starting"
        );
        events.emit(EngineEvent::Start {
            session_id: ctx.session_id.clone(),
            entity_type: ctx.entity_type,
            prompt: request.prompt.clone(),
            max_iterations: request.max_iterations,
            timeout_seconds: request.timeout_seconds,
        });

        let mut messages = Vec::with_capacity(request.history.len() + 2);
        if let Some(prompt) = &self.system_prompt {
            messages.push(Message::system(prompt));
        }
        messages.extend(request.history.iter().cloned());
        messages.push(Message::user(&request.prompt));

        let tool_defs = if request.tools_enabled {
            self.tools.definitions()
        } else {
            Vec::new()
        };

        let mut trace: Vec<IterationRecord> = Vec::new();
        let mut response = String::new();
        let mut failure: Option<String> = None;

        let reason = loop {
            let completed = trace.len() as u32;
            if completed >= request.max_iterations {
                warn!(session_id = %ctx.session_id, iterations = completed, "ReAct: max iterations reached");
                break TerminationReason::MaxIterations;
            }
            if completed > 0 && started.elapsed() >= budget {
                warn!(
                    session_id = %ctx.session_id,
                    iterations = completed,
                    elapsed_secs = started.elapsed().as_secs_f64(),
                    "ReAct: timeout reached"
                );
                break TerminationReason::Timeout;
            }

            let iteration = completed + 1;
            debug!(session_id = %ctx.session_id, iteration, "ReAct iteration");
            events.emit(EngineEvent::IterationStart { iteration });
            let mut record = IterationRecord::begin(iteration);

            let reply = match self
                .gateway
                .generate(&selection, messages.clone(), tool_defs.clone())
                .await
            {
                Ok(reply) => reply,
                Err(e) => {
                    let message = e.to_string();
                    error!(session_id = %ctx.session_id, iteration, error = %message, "Model gateway failed");
                    record.error = Some(message.clone());
                    trace.push(record.finish());
                    events.emit(EngineEvent::Error {
                        iteration,
                        message: message.clone(),
                    });
                    failure = Some(message);
                    break TerminationReason::Error;
                }
            };

            let assistant = reply.message;
            record.model_output = assistant.content.clone();

            // ── Final answer ──
            if assistant.tool_calls.is_empty() {
                response = assistant.content;
                events.emit(EngineEvent::Response {
                    iteration,
                    content: response.clone(),
                });
                trace.push(record.finish());
                break TerminationReason::NaturalCompletion;
            }

            // ── Act + observe ──
            if !assistant.content.trim().is_empty() {
                response = assistant.content.clone();
                events.emit(EngineEvent::Thinking {
                    iteration,
                    content: assistant.content.clone(),
                });
            }

            let calls = assistant.tool_calls.clone();
            messages.push(assistant);
            for call in &calls {
                let invocation = self
                    .invoke_tool(&ctx, request.tools_enabled, iteration, call, &events)
                    .await;
                messages.push(Message::tool_result(&call.id, &invocation.observation));
                record.tool_calls.push(invocation);
            }
            trace.push(record.finish());
        };

        let elapsed = started.elapsed();
        let result = ExecutionResult {
            response,
            iterations: trace.len() as u32,
            trace,
            termination_reason: reason,
            execution_time_seconds: elapsed.as_secs_f64(),
            session_id: ctx.session_id.clone(),
            error: failure,
        };

        events.emit(EngineEvent::Completion {
            termination_reason: reason,
            iterations: result.iterations,
            execution_time_seconds: result.execution_time_seconds,
        });
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::RunFinished {
                session_id: ctx.session_id.clone(),
                entity_type: ctx.entity_type.to_string(),
                termination_reason: reason.to_string(),
                iterations: result.iterations,
                duration_ms: elapsed.as_millis() as u64,
                timestamp: Utc::now(),
            });
        }
        info!(
            session_id = %ctx.session_id,
            iterations = result.iterations,
            reason = %reason,
            elapsed_secs = result.execution_time_seconds,
            "ReAct run finished"
        );

        Ok(result)
    }

    /// Run one requested tool and turn whatever happens into an observation.
    async fn invoke_tool(
        &self,
        ctx: &RuntimeContext,
        tools_enabled: bool,
        iteration: u32,
        call: &MessageToolCall,
        events: &EventSink,
    ) -> ToolInvocationRecord {
        let parsed = call.parsed_arguments();
        let arguments = match &parsed {
            Ok(value) => value.clone(),
            Err(_) => serde_json::Value::String(call.arguments.clone()),
        };

        events.emit(EngineEvent::ToolCall {
            iteration,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments: arguments.clone(),
        });

        let start = std::time::Instant::now();
        let outcome = match parsed {
            _ if !tools_enabled => Err(ToolError::PermissionDenied {
                tool_name: call.name.clone(),
                reason: "tool use is disabled for this run".into(),
            }),
            Err(e) => Err(ToolError::InvalidArguments(format!(
                "{}: arguments are not valid JSON: {e}",
                call.name
            ))),
            Ok(arguments) => {
                self.tools
                    .invoke(
                        ctx,
                        &ToolCall {
                            id: call.id.clone(),
                            name: call.name.clone(),
                            arguments,
                        },
                    )
                    .await
            }
        };
        let duration_ms = start.elapsed().as_millis() as u64;

        let (success, observation) = match outcome {
            Ok(result) => (result.success, result.output),
            Err(e) => {
                warn!(session_id = %ctx.session_id, tool = %call.name, error = %e, "Tool invocation failed");
                (false, format!("Error: {e}"))
            }
        };

        events.emit(EngineEvent::Observation {
            iteration,
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            success,
            output: observation.clone(),
        });
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::ToolExecuted {
                session_id: ctx.session_id.clone(),
                tool_name: call.name.clone(),
                success,
                duration_ms,
                timestamp: Utc::now(),
            });
        }

        ToolInvocationRecord {
            call_id: call.id.clone(),
            tool_name: call.name.clone(),
            arguments,
            success,
            observation,
            duration_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use deskhand_core::context::EntityType;
    use deskhand_core::error::ProviderError;
    use deskhand_core::message::Role;
    use crate::event::TimedEvent;
    use deskhand_core::tool::{Tool, ToolResult};
    use deskhand_providers::{
        ModelRouting, ScriptedProvider, text_response, tool_call, tool_call_response,
    };
    use std::sync::Mutex;

    // ── Test tools ──

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echo the text back"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": { "text": { "type": "string" } },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            ctx: &RuntimeContext,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or_default();
            Ok(ToolResult::ok(format!("{}:{text}", ctx.session_id)))
        }
    }

    struct BrokenTool;

    #[async_trait]
    impl Tool for BrokenTool {
        fn name(&self) -> &str {
            "broken"
        }
        fn description(&self) -> &str {
            "Always fails"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({ "type": "object", "properties": {} })
        }
        async fn execute(
            &self,
            _ctx: &RuntimeContext,
            _arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            Err(ToolError::ExecutionFailed {
                tool_name: "broken".into(),
                reason: "disk on fire".into(),
            })
        }
    }

    /// Records every write instead of touching the filesystem.
    #[derive(Default)]
    struct RecordingWriteTool {
        writes: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl Tool for RecordingWriteTool {
        fn name(&self) -> &str {
            "file_write"
        }
        fn description(&self) -> &str {
            "Write a file"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "path": { "type": "string" },
                    "content": { "type": "string" }
                },
                "required": ["path", "content"]
            })
        }
        async fn execute(
            &self,
            _ctx: &RuntimeContext,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let path = arguments["path"].as_str().unwrap_or_default().to_string();
            let content = arguments["content"].as_str().unwrap_or_default();
            self.writes.lock().unwrap().push(path.clone());
            Ok(ToolResult::ok(format!(
                "Successfully wrote {} bytes to {path}",
                content.len()
            )))
        }
    }

    fn routing() -> ModelRouting {
        ModelRouting {
            primary: "primary-model".into(),
            fast: "fast-model".into(),
            emergency: None,
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry.register(Box::new(BrokenTool));
        Arc::new(registry)
    }

    fn engine(provider: Arc<ScriptedProvider>) -> ReactEngine {
        ReactEngine::new(Arc::new(ModelGateway::new(provider, routing())), registry())
    }

    fn echo(text: &str) -> MessageToolCall {
        tool_call("echo", serde_json::json!({ "text": text }))
    }

    async fn drain(mut rx: tokio::sync::mpsc::UnboundedReceiver<TimedEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Some(timed) = rx.recv().await {
            events.push(timed.event);
        }
        events
    }

    // ── Termination ──

    #[tokio::test]
    async fn direct_answer_is_one_natural_iteration() {
        let provider = Arc::new(ScriptedProvider::single_text("4"));
        let result = engine(provider.clone())
            .execute(ExecutionRequest::new("What is 2+2?"))
            .await
            .unwrap();

        assert_eq!(result.response, "4");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.termination_reason, TerminationReason::NaturalCompletion);
        assert_eq!(provider.call_count(), 1);
        assert!(result.execution_time_seconds >= 0.0);
    }

    #[tokio::test]
    async fn always_calling_tools_stops_at_max_iterations() {
        let provider = Arc::new(ScriptedProvider::always_tool_call(echo("again")));
        let result = engine(provider.clone())
            .execute(ExecutionRequest::new("loop forever").with_budget(3, 60.0))
            .await
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::MaxIterations);
        assert_eq!(result.iterations, 3);
        assert_eq!(result.trace.len(), 3);
        assert_eq!(provider.call_count(), 3);
    }

    #[tokio::test]
    async fn single_iteration_budget_cuts_multi_step_task() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(vec![echo("one")], "First I need step one."),
            tool_call_response(vec![echo("two")], ""),
            text_response("done"),
        ]));
        let result = engine(provider)
            .execute(ExecutionRequest::new("two steps").with_budget(1, 60.0))
            .await
            .unwrap();

        assert_eq!(result.iterations, 1);
        assert_eq!(result.termination_reason, TerminationReason::MaxIterations);
        assert_eq!(result.response, "First I need step one.");
    }

    #[tokio::test]
    async fn empty_reply_is_natural_completion() {
        let provider = Arc::new(ScriptedProvider::single_text(""));
        let result = engine(provider)
            .execute(ExecutionRequest::new("say nothing"))
            .await
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::NaturalCompletion);
        assert_eq!(result.iterations, 1);
        assert!(result.response.is_empty());
        assert!(result.succeeded());
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_is_checked_between_iterations() {
        let provider = Arc::new(
            ScriptedProvider::always_tool_call(echo("slow")).with_delay(Duration::from_secs(2)),
        );
        let result = engine(provider.clone())
            .execute(ExecutionRequest::new("be slow").with_budget(10, 3.0))
            .await
            .unwrap();

        // t=0 → 2 → 4; the check before the third iteration sees 4s >= 3s.
        assert_eq!(result.termination_reason, TerminationReason::Timeout);
        assert_eq!(result.iterations, 2);
        assert_eq!(provider.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn first_iteration_always_runs() {
        let provider = Arc::new(ScriptedProvider::single_text("quick"));
        let result = engine(provider)
            .execute(ExecutionRequest::new("hi").with_budget(5, 1e-9))
            .await
            .unwrap();
        assert_eq!(result.iterations, 1);
        assert_eq!(result.termination_reason, TerminationReason::NaturalCompletion);
    }

    #[tokio::test]
    async fn gateway_failure_fails_the_run() {
        let provider = Arc::new(ScriptedProvider::new(vec![
            Ok(tool_call_response(vec![echo("x")], "")),
            Err(ProviderError::Network("connection refused".into())),
        ]));
        let (sink, rx) = EventSink::channel();
        let result = engine(provider)
            .execute_with_events(ExecutionRequest::new("hi"), sink)
            .await
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::Error);
        assert_eq!(result.iterations, 2);
        assert!(result.error.as_deref().unwrap().contains("connection refused"));
        assert!(result.trace[1].error.is_some());

        let types: Vec<_> = drain(rx).await.iter().map(|e| e.event_type()).collect();
        assert_eq!(types[types.len() - 2..], ["error", "completion"]);
    }

    #[tokio::test]
    async fn invalid_request_is_rejected_before_model_call() {
        let provider = Arc::new(ScriptedProvider::single_text("unused"));
        let err = engine(provider.clone())
            .execute(ExecutionRequest::new("hi").with_budget(0, 10.0))
            .await
            .unwrap_err();

        assert!(err.is_configuration());
        assert_eq!(provider.call_count(), 0);
    }

    // ── Observations ──

    #[tokio::test]
    async fn tool_errors_become_observations() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(vec![tool_call("broken", serde_json::json!({}))], ""),
            text_response("I could not do it"),
        ]));
        let result = engine(provider.clone())
            .execute(ExecutionRequest::new("try"))
            .await
            .unwrap();

        assert_eq!(result.termination_reason, TerminationReason::NaturalCompletion);
        assert_eq!(result.iterations, 2);
        let obs = &result.trace[0].tool_calls[0];
        assert!(!obs.success);
        assert!(obs.observation.contains("disk on fire"));

        // The error text was fed back to the model.
        let second = &provider.requests()[1];
        let last = second.messages.last().unwrap();
        assert_eq!(last.role, Role::Tool);
        assert!(last.content.contains("disk on fire"));
    }

    #[tokio::test]
    async fn unknown_tool_and_bad_arguments_are_observations() {
        let bad_json = MessageToolCall {
            id: "call_bad".into(),
            name: "echo".into(),
            arguments: "{not json".into(),
        };
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(
                vec![
                    tool_call("no_such_tool", serde_json::json!({})),
                    bad_json,
                    tool_call("echo", serde_json::json!({ "text": 5 })),
                ],
                "",
            ),
            text_response("ok"),
        ]));
        let result = engine(provider)
            .execute(ExecutionRequest::new("mess up"))
            .await
            .unwrap();

        let calls = &result.trace[0].tool_calls;
        assert_eq!(calls.len(), 3);
        assert!(calls.iter().all(|c| !c.success));
        assert!(calls[0].observation.contains("Tool not found"));
        assert!(calls[1].observation.contains("not valid JSON"));
        assert!(calls[2].observation.contains("Invalid tool arguments"));
        assert_eq!(result.termination_reason, TerminationReason::NaturalCompletion);
    }

    #[tokio::test]
    async fn tools_run_in_requested_order() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(
                vec![
                    MessageToolCall { id: "a".into(), ..echo("first") },
                    MessageToolCall { id: "b".into(), ..echo("second") },
                ],
                "",
            ),
            text_response("both done"),
        ]));
        let result = engine(provider)
            .execute(ExecutionRequest::new("order").with_context(&RuntimeContext::human("s9")))
            .await
            .unwrap();

        let observations: Vec<_> = result
            .tool_invocations()
            .map(|t| t.observation.as_str())
            .collect();
        assert_eq!(observations, vec!["s9:first", "s9:second"]);
    }

    #[tokio::test]
    async fn file_write_then_confirm() {
        let writes = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(RecordingWriteTool { writes: writes.clone() }));

        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(
                vec![tool_call(
                    "file_write",
                    serde_json::json!({ "path": "notes.txt", "content": "hello" }),
                )],
                "",
            ),
            text_response("I saved your note to notes.txt."),
        ]));
        let engine = ReactEngine::new(
            Arc::new(ModelGateway::new(provider, routing())),
            Arc::new(registry),
        );
        let result = engine
            .execute(ExecutionRequest::new("Save 'hello' to notes.txt"))
            .await
            .unwrap();

        assert_eq!(result.iterations, 2);
        let invocations: Vec<_> = result.tool_invocations().collect();
        assert_eq!(invocations.len(), 1);
        assert_eq!(invocations[0].tool_name, "file_write");
        assert!(invocations[0].success);
        assert!(invocations[0].observation.contains("Successfully wrote 5 bytes"));
        assert_eq!(*writes.lock().unwrap(), vec!["notes.txt".to_string()]);
    }

    #[tokio::test]
    async fn disabled_tools_send_no_schema() {
        let provider = Arc::new(ScriptedProvider::single_text("plain"));
        engine(provider.clone())
            .execute(ExecutionRequest::new("hi").with_tools_enabled(false))
            .await
            .unwrap();
        assert!(provider.requests()[0].tools.is_empty());

        let provider = Arc::new(ScriptedProvider::single_text("plain"));
        engine(provider.clone())
            .execute(ExecutionRequest::new("hi"))
            .await
            .unwrap();
        let names: Vec<_> = provider.requests()[0].tools.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["broken", "echo"]);
    }

    // ── Events ──

    #[tokio::test]
    async fn events_arrive_in_order() {
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(vec![echo("hi")], "Let me echo."),
            text_response("echoed"),
        ]));
        let (sink, rx) = EventSink::channel();
        engine(provider)
            .execute_with_events(ExecutionRequest::new("echo hi"), sink)
            .await
            .unwrap();

        let types: Vec<_> = drain(rx).await.iter().map(|e| e.event_type()).collect();
        assert_eq!(
            types,
            vec![
                "start",
                "iteration_start",
                "thinking",
                "tool_call",
                "observation",
                "iteration_start",
                "response",
                "completion",
            ]
        );
    }

    #[tokio::test]
    async fn run_summary_published_on_bus() {
        let bus = Arc::new(EventBus::new(16));
        let mut rx = bus.subscribe();
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(vec![echo("x")], ""),
            text_response("done"),
        ]));
        engine(provider)
            .with_event_bus(bus.clone())
            .execute(ExecutionRequest::new("go").with_context(&RuntimeContext::api("s1")))
            .await
            .unwrap();

        let first = rx.recv().await.unwrap();
        assert_eq!(first.event_type(), "tool_executed");
        match &*rx.recv().await.unwrap() {
            DomainEvent::RunFinished {
                session_id,
                entity_type,
                termination_reason,
                iterations,
                ..
            } => {
                assert_eq!(session_id, "s1");
                assert_eq!(entity_type, "api");
                assert_eq!(termination_reason, "natural_completion");
                assert_eq!(*iterations, 2);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    // ── Isolation ──

    #[tokio::test]
    async fn concurrent_runs_keep_separate_traces() {
        let engine = Arc::new(engine(Arc::new(ScriptedProvider::always_tool_call(echo(
            "ping",
        )))));

        let a = engine.execute(
            ExecutionRequest::new("a")
                .with_budget(3, 60.0)
                .with_context(&RuntimeContext::human("alice")),
        );
        let b = engine.execute(
            ExecutionRequest::new("b")
                .with_budget(2, 60.0)
                .with_context(&RuntimeContext::human("bob")),
        );
        let (a, b) = tokio::join!(a, b);
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.iterations, 3);
        assert_eq!(b.iterations, 2);
        assert!(a.tool_invocations().all(|t| t.observation == "alice:ping"));
        assert!(b.tool_invocations().all(|t| t.observation == "bob:ping"));
        assert_eq!(a.session_id, "alice");
        assert_eq!(b.session_id, "bob");
    }

    #[tokio::test]
    async fn tools_see_the_request_context() {
        let ghost = RuntimeContext::scheduler("ghost_scheduler_j1", Default::default());
        let provider = Arc::new(ScriptedProvider::responses(vec![
            tool_call_response(vec![echo("hello")], ""),
            text_response("done"),
        ]));
        let (sink, rx) = EventSink::channel();
        let result = engine(provider)
            .execute_with_events(ExecutionRequest::new("x").with_context(&ghost), sink)
            .await
            .unwrap();

        assert_eq!(
            result.trace[0].tool_calls[0].observation,
            "ghost_scheduler_j1:hello"
        );
        match &drain(rx).await[0] {
            EngineEvent::Start { entity_type, .. } => assert_eq!(*entity_type, EntityType::Scheduler),
            other => panic!("unexpected first event {other:?}"),
        }
    }

    #[tokio::test]
    async fn history_and_system_prompt_precede_prompt() {
        let provider = Arc::new(ScriptedProvider::single_text("fine"));
        engine(provider.clone())
            .with_system_prompt("You are terse.")
            .execute(
                ExecutionRequest::new("and now?").with_history(vec![
                    Message::user("earlier question"),
                    Message::assistant("earlier answer"),
                ]),
            )
            .await
            .unwrap();

        let sent = &provider.requests()[0].messages;
        let roles: Vec<_> = sent.iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::System, Role::User, Role::Assistant, Role::User]);
        assert_eq!(sent[3].content, "and now?");
    }

    #[tokio::test]
    async fn role_selects_model() {
        let provider = Arc::new(ScriptedProvider::single_text("ok"));
        engine(provider.clone())
            .with_role(ModelRole::Fast)
            .execute(ExecutionRequest::new("hi"))
            .await
            .unwrap();
        assert_eq!(provider.requests()[0].model, "fast-model");
    }
}
