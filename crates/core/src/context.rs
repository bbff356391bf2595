//! Runtime context: the per-unit-of-work identity.
//!
//! A [`RuntimeContext`] is built once when a chat turn or a scheduler firing
//! begins and is then passed by reference into every tool invocation of that
//! run. It is a plain value, never a process-wide global: anything that
//! crosses a task boundary carries its own copy.

use serde::{Deserialize, Serialize};

/// Who (or what) triggered the current execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    /// An interactive user session.
    #[default]
    Human,
    /// A background ("ghost") run fired by the scheduler.
    Scheduler,
    /// A programmatic API caller.
    Api,
    /// Origin could not be determined.
    Unknown,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Scheduler => "scheduler",
            Self::Api => "api",
            Self::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "scheduler" => Ok(Self::Scheduler),
            "api" => Ok(Self::Api),
            "unknown" => Ok(Self::Unknown),
            other => Err(format!("unknown entity type: {other}")),
        }
    }
}

/// Session id used when no caller supplied one.
pub const DEFAULT_SESSION_ID: &str = "default";

/// Prefix reserved for scheduler-owned sessions.
pub const GHOST_SESSION_PREFIX: &str = "ghost_";

/// Identity of one logical unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeContext {
    pub entity_type: EntityType,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub metadata: serde_json::Map<String, serde_json::Value>,
}

impl RuntimeContext {
    /// Establish a brand-new context. Nothing is inherited from any earlier
    /// unit of work.
    pub fn set(
        entity_type: EntityType,
        session_id: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self {
            entity_type,
            session_id: session_id.into(),
            metadata,
        }
    }

    pub fn human(session_id: impl Into<String>) -> Self {
        Self::set(EntityType::Human, session_id, serde_json::Map::new())
    }

    pub fn api(session_id: impl Into<String>) -> Self {
        Self::set(EntityType::Api, session_id, serde_json::Map::new())
    }

    pub fn scheduler(
        session_id: impl Into<String>,
        metadata: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        Self::set(EntityType::Scheduler, session_id, metadata)
    }

    pub fn is_scheduler(&self) -> bool {
        self.entity_type == EntityType::Scheduler
    }

    pub fn is_human(&self) -> bool {
        self.entity_type == EntityType::Human
    }

    /// String value of a metadata key, if present and a string.
    pub fn metadata_str(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).and_then(|v| v.as_str())
    }

    /// Builder-style metadata insertion.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

impl Default for RuntimeContext {
    fn default() -> Self {
        Self::human(DEFAULT_SESSION_ID)
    }
}

/// True if the session id lives in the scheduler-owned namespace.
pub fn is_ghost_session(session_id: &str) -> bool {
    session_id.starts_with(GHOST_SESSION_PREFIX)
}
