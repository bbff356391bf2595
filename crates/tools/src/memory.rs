//! Fact recall and fact save: the two memory-isolation consumers.
//!
//! Both check `ctx.is_scheduler()` before doing anything else. A scheduler
//! run gets [`SCHEDULER_MEMORY_NOTICE`] back as a successful observation and
//! the backend is never called, so a ghost run can neither read nor change
//! what the user told the assistant.

use async_trait::async_trait;
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::ToolError;
use deskhand_core::memory::{MemoryBackend, MemoryEntry, MemoryQuery};
use deskhand_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::{debug, info};

pub const SCHEDULER_MEMORY_NOTICE: &str = "Long-term memory is not available to scheduled background runs. \
     No facts were read or saved; continue the task without them.";

fn isolation_notice(tool: &str, ctx: &RuntimeContext) -> ToolResult {
    info!(
        tool,
        session_id = %ctx.session_id,
        job_id = ctx.metadata_str("job_id").unwrap_or(""),
        "Memory access skipped for scheduler run"
    );
    ToolResult::ok(SCHEDULER_MEMORY_NOTICE).with_data(serde_json::json!({ "skipped": true }))
}

fn string_list(value: &serde_json::Value) -> Vec<String> {
    value
        .as_array()
        .map(|a| a.iter().filter_map(|t| t.as_str().map(String::from)).collect())
        .unwrap_or_default()
}

fn backend_failure(tool: &str, e: impl std::fmt::Display) -> ToolError {
    ToolError::ExecutionFailed {
        tool_name: tool.into(),
        reason: e.to_string(),
    }
}

// ── memory_recall ──

pub struct MemoryRecallTool {
    backend: Arc<dyn MemoryBackend>,
    default_limit: usize,
}

impl MemoryRecallTool {
    pub fn new(backend: Arc<dyn MemoryBackend>, default_limit: usize) -> Self {
        Self {
            backend,
            default_limit: default_limit.max(1),
        }
    }
}

#[async_trait]
impl Tool for MemoryRecallTool {
    fn name(&self) -> &str {
        "memory_recall"
    }

    fn description(&self) -> &str {
        "Look up facts the user asked you to remember earlier (preferences, names, dates). \
         Use this before answering questions about the user's personal details."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "Keywords describing the fact to find"
                },
                "limit": {
                    "type": "integer",
                    "description": "Maximum number of facts to return"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Only return facts carrying all of these tags"
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        if ctx.is_scheduler() {
            return Ok(isolation_notice(self.name(), ctx));
        }

        let text = arguments["query"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'query' argument".into()))?;
        let limit = arguments["limit"]
            .as_u64()
            .map(|l| l as usize)
            .unwrap_or(self.default_limit);

        let query = MemoryQuery {
            text: text.to_string(),
            limit,
            tags: string_list(&arguments["tags"]),
        };
        let facts = self
            .backend
            .search(query)
            .await
            .map_err(|e| backend_failure(self.name(), e))?;

        debug!(query = %text, hits = facts.len(), "Memory recall");

        if facts.is_empty() {
            return Ok(ToolResult::ok(format!("No saved facts match \"{text}\".")));
        }

        let mut output = format!("Found {} saved fact(s):\n", facts.len());
        for (i, fact) in facts.iter().enumerate() {
            output.push_str(&format!("{}. {}", i + 1, fact.content));
            if !fact.tags.is_empty() {
                output.push_str(&format!(" [{}]", fact.tags.join(", ")));
            }
            output.push('\n');
        }

        let data = serde_json::to_value(&facts).unwrap_or(serde_json::Value::Null);
        Ok(ToolResult::ok(output.trim_end()).with_data(data))
    }
}

// ── memory_save ──

pub struct MemorySaveTool {
    backend: Arc<dyn MemoryBackend>,
}

impl MemorySaveTool {
    pub fn new(backend: Arc<dyn MemoryBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for MemorySaveTool {
    fn name(&self) -> &str {
        "memory_save"
    }

    fn description(&self) -> &str {
        "Remember a fact about the user for future conversations. \
         Save one short, self-contained statement per call."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "fact": {
                    "type": "string",
                    "description": "The fact to remember, e.g. 'User is vegetarian'"
                },
                "tags": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Optional category tags"
                }
            },
            "required": ["fact"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        if ctx.is_scheduler() {
            return Ok(isolation_notice(self.name(), ctx));
        }

        let fact = arguments["fact"]
            .as_str()
            .map(str::trim)
            .filter(|f| !f.is_empty())
            .ok_or_else(|| ToolError::InvalidArguments("'fact' must be a non-empty string".into()))?;

        let mut entry = MemoryEntry::new(fact);
        entry.tags = string_list(&arguments["tags"]);
        entry.source = Some(ctx.session_id.clone());

        let id = self
            .backend
            .store(entry)
            .await
            .map_err(|e| backend_failure(self.name(), e))?;

        info!(session_id = %ctx.session_id, fact_id = %id, "Fact saved");
        Ok(ToolResult::ok(format!("Saved: {fact}")).with_data(serde_json::json!({ "id": id })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use deskhand_core::context::EntityType;
    use deskhand_core::error::MemoryError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Counts every call that reaches the store.
    #[derive(Default)]
    struct CountingBackend {
        inner: deskhand_memory::InMemoryBackend,
        calls: AtomicUsize,
    }

    impl CountingBackend {
        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl MemoryBackend for CountingBackend {
        fn name(&self) -> &str {
            "counting"
        }
        async fn store(&self, entry: MemoryEntry) -> Result<String, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.store(entry).await
        }
        async fn search(&self, query: MemoryQuery) -> Result<Vec<MemoryEntry>, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.search(query).await
        }
        async fn delete(&self, id: &str) -> Result<bool, MemoryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.delete(id).await
        }
        async fn count(&self) -> Result<usize, MemoryError> {
            self.inner.count().await
        }
        async fn clear(&self) -> Result<(), MemoryError> {
            self.inner.clear().await
        }
    }

    fn ghost() -> RuntimeContext {
        RuntimeContext::set(
            EntityType::Scheduler,
            "ghost_scheduler_j1",
            serde_json::Map::from_iter([("job_id".to_string(), "j1".into())]),
        )
    }

    #[tokio::test]
    async fn recall_in_scheduler_context_never_reads() {
        let backend = Arc::new(CountingBackend::default());
        backend.inner.store(MemoryEntry::new("User's PIN hint is 'blue'")).await.unwrap();
        let tool = MemoryRecallTool::new(backend.clone(), 5);

        let result = tool
            .execute(&ghost(), serde_json::json!({"query": "PIN"}))
            .await
            .unwrap();

        assert_eq!(result.output, SCHEDULER_MEMORY_NOTICE);
        assert!(!result.output.contains("blue"));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn recall_in_human_context_reads() {
        let backend = Arc::new(CountingBackend::default());
        backend.inner.store(MemoryEntry::new("User's PIN hint is 'blue'")).await.unwrap();
        let tool = MemoryRecallTool::new(backend.clone(), 5);

        let result = tool
            .execute(&RuntimeContext::human("alice"), serde_json::json!({"query": "PIN hint"}))
            .await
            .unwrap();

        assert!(result.output.contains("blue"));
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn save_in_scheduler_context_never_writes() {
        let backend = Arc::new(CountingBackend::default());
        let tool = MemorySaveTool::new(backend.clone());

        let result = tool
            .execute(&ghost(), serde_json::json!({"fact": "User moved to Lisbon"}))
            .await
            .unwrap();

        assert_eq!(result.output, SCHEDULER_MEMORY_NOTICE);
        assert_eq!(backend.calls(), 0);
        assert_eq!(backend.inner.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn save_records_source_session_and_tags() {
        let backend = Arc::new(deskhand_memory::InMemoryBackend::new());
        let tool = MemorySaveTool::new(backend.clone());

        tool.execute(
            &RuntimeContext::api("s-42"),
            serde_json::json!({"fact": "User is vegetarian", "tags": ["diet"]}),
        )
        .await
        .unwrap();

        let facts = backend.search(MemoryQuery::new("vegetarian")).await.unwrap();
        assert_eq!(facts[0].source.as_deref(), Some("s-42"));
        assert_eq!(facts[0].tags, vec!["diet"]);
    }

    #[tokio::test]
    async fn save_rejects_blank_fact() {
        let tool = MemorySaveTool::new(Arc::new(deskhand_memory::InMemoryBackend::new()));
        let err = tool
            .execute(&RuntimeContext::default(), serde_json::json!({"fact": "   "}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }

    #[tokio::test]
    async fn recall_reports_no_match() {
        let tool = MemoryRecallTool::new(Arc::new(deskhand_memory::InMemoryBackend::new()), 5);
        let result = tool
            .execute(&RuntimeContext::default(), serde_json::json!({"query": "passport"}))
            .await
            .unwrap();
        assert!(result.output.starts_with("No saved facts"));
    }
}
