//! Long-term fact memory.
//!
//! Facts saved by the user's assistant across sessions. Only human and api
//! runs may reach a backend; the memory skills refuse scheduler runs before
//! any call lands here.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::MemoryError;

/// A single remembered fact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryEntry {
    pub id: String,
    pub content: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// Session that saved the fact
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    pub created_at: DateTime<Utc>,

    /// Relevance score (set by search operations)
    #[serde(default)]
    pub score: f32,
}

impl MemoryEntry {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            content: content.into(),
            tags: Vec::new(),
            source: None,
            created_at: Utc::now(),
            score: 0.0,
        }
    }
}

/// A keyword query over saved facts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryQuery {
    pub text: String,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Only return entries carrying all of these tags
    #[serde(default)]
    pub tags: Vec<String>,
}

impl MemoryQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            limit: default_limit(),
            tags: Vec::new(),
        }
    }
}

fn default_limit() -> usize {
    10
}

/// Implementations: in-memory (tests, ephemeral) and JSONL file.
#[async_trait]
pub trait MemoryBackend: Send + Sync {
    fn name(&self) -> &str;

    /// Store a fact, returning its id.
    async fn store(&self, entry: MemoryEntry) -> std::result::Result<String, MemoryError>;

    async fn search(&self, query: MemoryQuery) -> std::result::Result<Vec<MemoryEntry>, MemoryError>;

    async fn delete(&self, id: &str) -> std::result::Result<bool, MemoryError>;

    async fn count(&self) -> std::result::Result<usize, MemoryError>;

    async fn clear(&self) -> std::result::Result<(), MemoryError>;
}
