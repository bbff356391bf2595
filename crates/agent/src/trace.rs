//! Reasoning trace and run results.
//!
//! A run appends one [`IterationRecord`] per model call. The ordered list is
//! the [`ReasoningTrace`]; it is handed to the caller inside the
//! [`ExecutionResult`] and never touched again.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Why a run stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    /// The model answered without requesting a tool.
    NaturalCompletion,
    /// The iteration budget ran out.
    MaxIterations,
    /// The wall-clock budget ran out (checked between iterations).
    Timeout,
    /// The model gateway failed.
    Error,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NaturalCompletion => "natural_completion",
            Self::MaxIterations => "max_iterations",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }

    /// Only gateway failures count as failed runs.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Error)
    }
}

impl std::fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tool call and its observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocationRecord {
    pub call_id: String,
    pub tool_name: String,
    pub arguments: serde_json::Value,
    pub success: bool,
    /// The observation fed back to the model; error text when `success` is false.
    pub observation: String,
    pub duration_ms: u64,
}

/// One reasoning cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IterationRecord {
    /// 1-based.
    pub index: u32,
    pub started_at: DateTime<Utc>,
    /// Text the model produced this iteration.
    #[serde(default)]
    pub model_output: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolInvocationRecord>,
    /// Set when the model call itself failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub ended_at: DateTime<Utc>,
}

impl IterationRecord {
    pub(crate) fn begin(index: u32) -> Self {
        let now = Utc::now();
        Self {
            index,
            started_at: now,
            model_output: String::new(),
            tool_calls: Vec::new(),
            error: None,
            ended_at: now,
        }
    }

    pub(crate) fn finish(mut self) -> Self {
        self.ended_at = Utc::now();
        self
    }
}

pub type ReasoningTrace = Vec<IterationRecord>;

/// The terminal record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub response: String,
    pub iterations: u32,
    pub trace: ReasoningTrace,
    pub termination_reason: TerminationReason,
    pub execution_time_seconds: f64,
    pub session_id: String,
    /// Populated only for `error` terminations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecutionResult {
    pub fn succeeded(&self) -> bool {
        !self.termination_reason.is_failure()
    }

    /// Every tool invocation across the trace, in execution order.
    pub fn tool_invocations(&self) -> impl Iterator<Item = &ToolInvocationRecord> {
        self.trace.iter().flat_map(|it| it.tool_calls.iter())
    }
}
