//! The streaming gateway: one engine run, delivered as ordered frames.
//!
//! The run executes in its own task and pushes engine events into an
//! unbounded channel, so it never waits on the client. A forwarding task
//! drains that channel in order and turns every event into a [`Frame`]
//! stamped with the time the engine emitted it.
//! When the client goes away the forwarder keeps draining but discards
//! what it cannot deliver; the run itself continues to its own end.

use chrono::{DateTime, Utc};
use deskhand_agent::{EventSink, ExecutionRequest, ExecutionResult, ReactEngine, TimedEvent};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// Frames buffered for a slow client before the forwarder waits on it.
const FRAME_BUFFER: usize = 64;

/// One timestamped unit on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    #[serde(rename = "type")]
    pub frame_type: String,
    pub data: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    pub fn new(frame_type: impl Into<String>, data: serde_json::Value) -> Self {
        Self {
            frame_type: frame_type.into(),
            data,
            timestamp: Utc::now(),
        }
    }

    /// Frame for an engine event, timestamped when the engine emitted it.
    pub fn from_event(timed: &TimedEvent) -> Self {
        Self {
            frame_type: timed.event.event_type().into(),
            data: timed.event.data(),
            timestamp: timed.emitted_at,
        }
    }

    /// The closing frame of a run that was not a failure.
    pub fn final_result(result: &ExecutionResult) -> Self {
        Self::new(
            "final",
            serde_json::to_value(result).unwrap_or(serde_json::Value::Null),
        )
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "message": message.into() }))
    }

    pub fn is_error(&self) -> bool {
        self.frame_type == "error"
    }
}

/// A running stream: the frame receiver plus the run's outcome.
pub struct FrameStream {
    pub frames: mpsc::Receiver<Frame>,
    /// Resolves once the run is over, whether or not anyone read the frames.
    /// `None` when the request was rejected or the run task died.
    pub outcome: JoinHandle<Option<ExecutionResult>>,
}

#[derive(Clone)]
pub struct StreamingGateway {
    engine: Arc<ReactEngine>,
}

impl StreamingGateway {
    pub fn new(engine: Arc<ReactEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &Arc<ReactEngine> {
        &self.engine
    }

    /// Start `request` and return its frames.
    ///
    /// Successful and benign terminations end with a `final` frame carrying
    /// the serialized [`ExecutionResult`]. A fatal failure ends right after
    /// the engine's `error` frame. A request that fails validation produces
    /// a single `error` frame.
    pub fn stream(&self, request: ExecutionRequest) -> FrameStream {
        let (frame_tx, frames) = mpsc::channel(FRAME_BUFFER);

        if let Err(e) = request.validate() {
            debug!(error = %e, "Rejected stream request");
            let outcome = tokio::spawn(async move {
                let _ = frame_tx.send(Frame::error(e.to_string())).await;
                None
            });
            return FrameStream { frames, outcome };
        }

        let session_id = request.session_id.clone();
        let (sink, mut events) = EventSink::channel();
        let engine = Arc::clone(&self.engine);
        let run = tokio::spawn(async move { engine.execute_with_events(request, sink).await });

        let outcome = tokio::spawn(async move {
            let mut forwarder = Forwarder::new(frame_tx, session_id);

            // Closes once the engine drops its sink, i.e. after the run returned.
            while let Some(event) = events.recv().await {
                forwarder.send(Frame::from_event(&event)).await;
            }

            match run.await {
                Ok(Ok(result)) => {
                    if !result.termination_reason.is_failure() {
                        forwarder.send(Frame::final_result(&result)).await;
                    }
                    Some(result)
                }
                Ok(Err(e)) => {
                    forwarder.send(Frame::error(e.to_string())).await;
                    None
                }
                Err(e) => {
                    warn!(session_id = %forwarder.session_id, error = %e, "Streamed run aborted");
                    forwarder.send(Frame::error(format!("run aborted: {e}"))).await;
                    None
                }
            }
        });

        FrameStream { frames, outcome }
    }
}

/// Delivers frames in order until the client leaves or an `error` frame
/// has gone out; after that everything is dropped.
struct Forwarder {
    tx: mpsc::Sender<Frame>,
    session_id: String,
    open: bool,
}

impl Forwarder {
    fn new(tx: mpsc::Sender<Frame>, session_id: String) -> Self {
        Self {
            tx,
            session_id,
            open: true,
        }
    }

    async fn send(&mut self, frame: Frame) {
        if !self.open {
            return;
        }
        let closing = frame.is_error();
        if self.tx.send(frame).await.is_err() {
            debug!(session_id = %self.session_id, "Client went away, discarding frames");
            self.open = false;
            return;
        }
        if closing {
            self.open = false;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::error::ProviderError;
    use deskhand_core::tool::ToolRegistry;
    use deskhand_providers::{
        ModelGateway, ModelRouting, ScriptedProvider, text_response, tool_call,
        tool_call_response,
    };
    use std::time::Duration;

    fn routing() -> ModelRouting {
        ModelRouting {
            primary: "primary-model".into(),
            fast: "fast-model".into(),
            emergency: None,
            temperature: 0.2,
            max_tokens: 512,
        }
    }

    fn gateway_with(provider: ScriptedProvider) -> StreamingGateway {
        let models = Arc::new(ModelGateway::new(Arc::new(provider), routing()));
        let engine = ReactEngine::new(models, Arc::new(ToolRegistry::new()));
        StreamingGateway::new(Arc::new(engine))
    }

    async fn collect(mut stream: FrameStream) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Some(frame) = stream.frames.recv().await {
            frames.push(frame);
        }
        frames
    }

    fn types(frames: &[Frame]) -> Vec<&str> {
        frames.iter().map(|f| f.frame_type.as_str()).collect()
    }

    #[tokio::test]
    async fn natural_completion_ends_with_final() {
        let gateway = gateway_with(ScriptedProvider::single_text("4"));
        let frames = collect(gateway.stream(ExecutionRequest::new("What is 2+2?"))).await;

        assert_eq!(
            types(&frames),
            vec!["start", "iteration_start", "response", "completion", "final"]
        );
        let last = frames.last().unwrap();
        assert_eq!(last.data["response"], "4");
        assert_eq!(last.data["termination_reason"], "natural_completion");
        assert_eq!(last.data["iterations"], 1);
    }

    #[tokio::test]
    async fn tool_round_trip_is_streamed_in_order() {
        // The tool does not exist, so the observation carries the error text.
        let provider = ScriptedProvider::responses(vec![
            tool_call_response(vec![tool_call("lookup", serde_json::json!({}))], "checking"),
            text_response("done"),
        ]);
        let gateway = gateway_with(provider);
        let frames = collect(gateway.stream(ExecutionRequest::new("go"))).await;

        assert_eq!(
            types(&frames),
            vec![
                "start",
                "iteration_start",
                "thinking",
                "tool_call",
                "observation",
                "iteration_start",
                "response",
                "completion",
                "final",
            ]
        );
        assert_eq!(frames[4].data["success"], false);
        for pair in frames.windows(2) {
            assert!(pair[0].timestamp <= pair[1].timestamp);
        }
    }

    #[tokio::test]
    async fn slow_client_sees_emit_times() {
        // Three events per iteration overflow the frame buffer.
        let provider =
            ScriptedProvider::always_tool_call(tool_call("lookup", serde_json::json!({})));
        let gateway = gateway_with(provider);
        let mut stream = gateway.stream(ExecutionRequest::new("loop").with_budget(40, 60.0));

        // The run finishes while the forwarder is stuck on a full buffer.
        tokio::time::sleep(Duration::from_millis(200)).await;
        let cutoff = Utc::now();
        tokio::time::sleep(Duration::from_millis(20)).await;

        let mut frames = Vec::new();
        while let Some(frame) = stream.frames.recv().await {
            frames.push(frame);
        }
        assert!(frames.len() > FRAME_BUFFER);
        let (last, events) = frames.split_last().unwrap();
        assert_eq!(last.frame_type, "final");
        for frame in events {
            assert!(frame.timestamp <= cutoff, "{} stamped late", frame.frame_type);
        }
    }

    #[test]
    fn frame_keeps_emit_time() {
        let emitted_at = Utc::now() - chrono::Duration::seconds(30);
        let frame = Frame::from_event(&TimedEvent {
            event: deskhand_agent::EngineEvent::IterationStart { iteration: 2 },
            emitted_at,
        });
        assert_eq!(frame.frame_type, "iteration_start");
        assert_eq!(frame.timestamp, emitted_at);
        assert_eq!(frame.data["iteration"], 2);
    }

    #[tokio::test]
    async fn max_iterations_still_gets_final() {
        let provider =
            ScriptedProvider::always_tool_call(tool_call("lookup", serde_json::json!({})));
        let gateway = gateway_with(provider);
        let request = ExecutionRequest::new("loop").with_budget(2, 30.0);
        let frames = collect(gateway.stream(request)).await;

        let last = frames.last().unwrap();
        assert_eq!(last.frame_type, "final");
        assert_eq!(last.data["termination_reason"], "max_iterations");
        assert_eq!(last.data["iterations"], 2);
    }

    #[tokio::test]
    async fn fatal_failure_ends_with_error_frame() {
        let provider = ScriptedProvider::new(vec![Err(ProviderError::Network(
            "connection refused".into(),
        ))]);
        let gateway = gateway_with(provider);
        let stream = gateway.stream(ExecutionRequest::new("hello"));
        let outcome = stream.outcome;
        let mut frames_rx = stream.frames;
        let mut frames = Vec::new();
        while let Some(frame) = frames_rx.recv().await {
            frames.push(frame);
        }

        let last = frames.last().unwrap();
        assert!(last.is_error());
        assert!(last.data["message"].as_str().unwrap().contains("connection refused"));
        assert!(frames.iter().all(|f| f.frame_type != "final"));

        let result = outcome.await.unwrap().unwrap();
        assert_eq!(result.termination_reason.as_str(), "error");
    }

    #[tokio::test]
    async fn invalid_request_is_a_single_error_frame() {
        let gateway = gateway_with(ScriptedProvider::single_text("unused"));
        let request = ExecutionRequest::new("hi").with_budget(0, 10.0);
        let stream = gateway.stream(request);
        let outcome = stream.outcome;
        let frames = {
            let mut rx = stream.frames;
            let mut frames = Vec::new();
            while let Some(frame) = rx.recv().await {
                frames.push(frame);
            }
            frames
        };

        assert_eq!(frames.len(), 1);
        assert!(frames[0].is_error());
        assert!(frames[0].data["message"].as_str().unwrap().contains("max_iterations"));
        assert!(outcome.await.unwrap().is_none());
    }

    #[tokio::test]
    async fn run_completes_after_client_disconnects() {
        let provider = ScriptedProvider::responses(vec![
            tool_call_response(vec![tool_call("lookup", serde_json::json!({}))], ""),
            text_response("finished anyway"),
        ])
        .with_delay(Duration::from_millis(20));
        let gateway = gateway_with(provider);

        let stream = gateway.stream(ExecutionRequest::new("go"));
        drop(stream.frames);

        let result = stream.outcome.await.unwrap().unwrap();
        assert_eq!(result.response, "finished anyway");
        assert_eq!(result.iterations, 2);
    }

    #[test]
    fn frame_serializes_type_key() {
        let frame = Frame::new("thinking", serde_json::json!({"content": "hmm"}));
        let json = serde_json::to_value(&frame).unwrap();
        assert_eq!(json["type"], "thinking");
        assert_eq!(json["data"]["content"], "hmm");
        assert!(json["timestamp"].is_string());
    }
}
