//! The input to one engine run.

use deskhand_core::context::{DEFAULT_SESSION_ID, EntityType, RuntimeContext};
use deskhand_core::error::{Error, Result};
use deskhand_core::message::Message;
use serde::{Deserialize, Serialize};

pub const DEFAULT_MAX_ITERATIONS: u32 = 10;
pub const DEFAULT_TIMEOUT_SECONDS: f64 = 300.0;

/// Everything an engine run needs. Treated as immutable once the loop starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub prompt: String,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: f64,

    #[serde(default)]
    pub entity_type: EntityType,

    #[serde(default = "default_session_id")]
    pub session_id: String,

    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,

    /// Earlier turns of the same session, oldest first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<Message>,

    /// `false` sends no tool schema to the model.
    #[serde(default = "default_true")]
    pub tools_enabled: bool,
}

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}
fn default_timeout_seconds() -> f64 {
    DEFAULT_TIMEOUT_SECONDS
}
fn default_session_id() -> String {
    DEFAULT_SESSION_ID.into()
}
fn default_true() -> bool {
    true
}

impl ExecutionRequest {
    /// A human-context request with default budgets.
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            timeout_seconds: DEFAULT_TIMEOUT_SECONDS,
            entity_type: EntityType::Human,
            session_id: DEFAULT_SESSION_ID.into(),
            metadata: serde_json::Map::new(),
            history: Vec::new(),
            tools_enabled: true,
        }
    }

    pub fn with_budget(mut self, max_iterations: u32, timeout_seconds: f64) -> Self {
        self.max_iterations = max_iterations;
        self.timeout_seconds = timeout_seconds;
        self
    }

    /// Adopt the identity of `ctx`.
    pub fn with_context(mut self, ctx: &RuntimeContext) -> Self {
        self.entity_type = ctx.entity_type;
        self.session_id = ctx.session_id.clone();
        self.metadata = ctx.metadata.clone();
        self
    }

    pub fn with_history(mut self, history: Vec<Message>) -> Self {
        self.history = history;
        self
    }

    pub fn with_tools_enabled(mut self, enabled: bool) -> Self {
        self.tools_enabled = enabled;
        self
    }

    /// A fresh runtime context for this run.
    pub fn context(&self) -> RuntimeContext {
        RuntimeContext::set(
            self.entity_type,
            self.session_id.clone(),
            self.metadata.clone(),
        )
    }

    /// Reject budgets and prompts that cannot start a run.
    pub fn validate(&self) -> Result<()> {
        if self.prompt.trim().is_empty() {
            return Err(Error::config("prompt must not be empty"));
        }
        if self.max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        if !self.timeout_seconds.is_finite() || self.timeout_seconds <= 0.0 {
            return Err(Error::config(format!(
                "timeout_seconds must be a positive number, got {}",
                self.timeout_seconds
            )));
        }
        Ok(())
    }
}
