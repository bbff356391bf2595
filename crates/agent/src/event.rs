//! Engine events.
//!
//! A run reports progress as a sequence of [`EngineEvent`]s pushed into an
//! [`EventSink`]. The sink is an unbounded channel, so the engine never
//! waits on whoever is listening; a listener that went away is ignored.
//! Every event is stamped with the time it was emitted.

use chrono::{DateTime, Utc};
use deskhand_core::context::EntityType;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::trace::TerminationReason;

/// Progress events in the order a run produces them:
///
/// - `start`           run accepted, budgets fixed
/// - `iteration_start` a reasoning cycle begins
/// - `thinking`        model text that came with tool requests
/// - `tool_call`       a tool is about to run
/// - `observation`     the tool's result (or error) as fed back to the model
/// - `response`        the final answer text
/// - `completion`      terminal summary
/// - `error`           the model gateway failed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    Start {
        session_id: String,
        entity_type: EntityType,
        prompt: String,
        max_iterations: u32,
        timeout_seconds: f64,
    },

    IterationStart { iteration: u32 },

    Thinking { iteration: u32, content: String },

    ToolCall {
        iteration: u32,
        call_id: String,
        tool_name: String,
        arguments: serde_json::Value,
    },

    Observation {
        iteration: u32,
        call_id: String,
        tool_name: String,
        success: bool,
        output: String,
    },

    Response { iteration: u32, content: String },

    Completion {
        termination_reason: TerminationReason,
        iterations: u32,
        execution_time_seconds: f64,
    },

    Error { iteration: u32, message: String },
}

impl EngineEvent {
    /// Wire name of this event.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::Start { .. } => "start",
            Self::IterationStart { .. } => "iteration_start",
            Self::Thinking { .. } => "thinking",
            Self::ToolCall { .. } => "tool_call",
            Self::Observation { .. } => "observation",
            Self::Response { .. } => "response",
            Self::Completion { .. } => "completion",
            Self::Error { .. } => "error",
        }
    }

    /// The event body without the `type` tag.
    pub fn data(&self) -> serde_json::Value {
        let mut value = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let Some(obj) = value.as_object_mut() {
            obj.remove("type");
        }
        value
    }
}

/// An event together with the moment the engine emitted it.
#[derive(Debug, Clone, PartialEq)]
pub struct TimedEvent {
    pub event: EngineEvent,
    pub emitted_at: DateTime<Utc>,
}

/// Sending half of a run's event channel.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: Option<mpsc::UnboundedSender<TimedEvent>>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TimedEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx: Some(tx) }, rx)
    }

    /// A sink that drops everything.
    pub fn discard() -> Self {
        Self { tx: None }
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(tx) = &self.tx {
            // Receiver gone: nobody is listening any more.
            let _ = tx.send(TimedEvent {
                event,
                emitted_at: Utc::now(),
            });
        }
    }
}
