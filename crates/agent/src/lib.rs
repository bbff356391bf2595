//! The deskhand ReAct loop engine.
//!
//! One [`ExecutionRequest`] goes in, one [`ExecutionResult`] comes out:
//!
//! 1. **Start**: validate budgets, derive the run's runtime context, seed
//!    the conversation with history and the prompt
//! 2. **Reason**: one model call through the model gateway
//! 3. **Act**: run every requested tool in order
//! 4. **Observe**: feed each result back and loop to step 2
//!
//! The loop ends when the model answers without tool calls, the iteration
//! or time budget is spent, or the model gateway fails. Progress is
//! reported as [`EngineEvent`]s on an [`EventSink`].

pub mod engine;
pub mod event;
pub mod request;
pub mod trace;

pub use engine::ReactEngine;
pub use event::{EngineEvent, EventSink, TimedEvent};
pub use request::{DEFAULT_MAX_ITERATIONS, DEFAULT_TIMEOUT_SECONDS, ExecutionRequest};
pub use trace::{
    ExecutionResult, IterationRecord, ReasoningTrace, TerminationReason, ToolInvocationRecord,
};
