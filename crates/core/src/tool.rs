//! Tool trait and registry.
//!
//! Tools (skills) are what let the agent act: save a fact, write a file,
//! run a snippet, schedule a job. The registry maps a tool name to its
//! implementation and declared JSON schema, and checks a model's arguments
//! against that schema before anything runs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::context::RuntimeContext;
use crate::error::ToolError;
use crate::provider::ToolDefinition;

/// A request to execute a tool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique call ID (matches the model's tool_call.id)
    pub id: String,

    /// Name of the tool to execute
    pub name: String,

    /// Arguments as a JSON value
    pub arguments: serde_json::Value,
}

/// The result of a tool execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    /// The call ID this result is for
    pub call_id: String,

    /// Whether the tool executed successfully
    pub success: bool,

    /// The output content fed back to the model
    pub output: String,

    /// Optional structured data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ToolResult {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: true,
            output: output.into(),
            data: None,
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            call_id: String::new(),
            success: false,
            output: output.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core Tool trait.
///
/// `execute` receives the [`RuntimeContext`] of the run that requested it so
/// the tool can apply isolation policy (for example refusing memory access
/// from a scheduler run). Implementations must not keep hidden state across
/// calls.
#[async_trait]
pub trait Tool: Send + Sync {
    /// The unique name of this tool (e.g., "file_read", "schedule_task").
    fn name(&self) -> &str;

    /// A description of what this tool does (sent to the model).
    fn description(&self) -> &str;

    /// JSON Schema describing this tool's parameters.
    fn parameters_schema(&self) -> serde_json::Value;

    /// Execute the tool with the given arguments.
    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> std::result::Result<ToolResult, ToolError>;

    /// Convert this tool into a ToolDefinition for sending to the model.
    fn to_definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            parameters: self.parameters_schema(),
        }
    }
}

/// A registry of available tools.
///
/// Populated at startup, then shared read-only (usually behind an `Arc`)
/// by every concurrent run.
pub struct ToolRegistry {
    tools: BTreeMap<String, Box<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
        }
    }

    /// Register a tool. Replaces any existing tool with the same name.
    pub fn register(&mut self, tool: Box<dyn Tool>) {
        let name = tool.name().to_string();
        self.tools.insert(name, tool);
    }

    /// Get a tool by name.
    pub fn get(&self, name: &str) -> Option<&dyn Tool> {
        self.tools.get(name).map(|t| t.as_ref())
    }

    /// All tool definitions, ordered by name.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|t| t.to_definition()).collect()
    }

    /// List all registered tool names.
    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(|s| s.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    /// Check `arguments` against the declared parameter schema of `tool`.
    pub fn validate(
        &self,
        tool: &dyn Tool,
        arguments: &serde_json::Value,
    ) -> std::result::Result<(), ToolError> {
        validate_arguments(&tool.parameters_schema(), arguments)
            .map_err(|reason| ToolError::InvalidArguments(format!("{}: {reason}", tool.name())))
    }

    /// Resolve, validate and run a tool call under `ctx`.
    pub async fn invoke(
        &self,
        ctx: &RuntimeContext,
        call: &ToolCall,
    ) -> std::result::Result<ToolResult, ToolError> {
        let tool = self
            .get(&call.name)
            .ok_or_else(|| ToolError::NotFound(call.name.clone()))?;
        self.validate(tool, &call.arguments)?;

        tracing::debug!(
            tool = %call.name,
            session_id = %ctx.session_id,
            entity = %ctx.entity_type,
            "Invoking tool"
        );

        let mut result = tool.execute(ctx, call.arguments.clone()).await?;
        result.call_id = call.id.clone();
        Ok(result)
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Schema validation ──

/// Minimal JSON-schema check: object-ness, `required` keys, and the
/// primitive `type` of each declared property that is present.
fn validate_arguments(
    schema: &serde_json::Value,
    arguments: &serde_json::Value,
) -> std::result::Result<(), String> {
    let Some(args) = arguments.as_object() else {
        return Err("arguments must be a JSON object".into());
    };

    if let Some(required) = schema.get("required").and_then(|r| r.as_array()) {
        for key in required.iter().filter_map(|k| k.as_str()) {
            match args.get(key) {
                None | Some(serde_json::Value::Null) => {
                    return Err(format!("missing required parameter '{key}'"));
                }
                Some(_) => {}
            }
        }
    }

    let Some(properties) = schema.get("properties").and_then(|p| p.as_object()) else {
        return Ok(());
    };

    for (key, value) in args {
        if value.is_null() {
            continue;
        }
        let Some(expected) = properties
            .get(key)
            .and_then(|p| p.get("type"))
            .and_then(|t| t.as_str())
        else {
            continue;
        };
        if !type_matches(expected, value) {
            return Err(format!("parameter '{key}' must be of type {expected}"));
        }
    }

    Ok(())
}

fn type_matches(expected: &str, value: &serde_json::Value) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "array" => value.is_array(),
        "object" => value.is_object(),
        _ => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::EntityType;

    /// A simple test tool that echoes text and reports who called it.
    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "Echoes back the input"
        }
        fn parameters_schema(&self) -> serde_json::Value {
            serde_json::json!({
                "type": "object",
                "properties": {
                    "text": { "type": "string" },
                    "times": { "type": "integer" }
                },
                "required": ["text"]
            })
        }
        async fn execute(
            &self,
            ctx: &RuntimeContext,
            arguments: serde_json::Value,
        ) -> std::result::Result<ToolResult, ToolError> {
            let text = arguments["text"].as_str().unwrap_or("").to_string();
            Ok(ToolResult::ok(format!("{}:{text}", ctx.entity_type)))
        }
    }

    fn registry() -> ToolRegistry {
        let mut registry = ToolRegistry::new();
        registry.register(Box::new(EchoTool));
        registry
    }

    fn call(args: serde_json::Value) -> ToolCall {
        ToolCall {
            id: "call_1".into(),
            name: "echo".into(),
            arguments: args,
        }
    }

    #[test]
    fn registry_register_and_lookup() {
        let registry = registry();
        assert!(registry.get("echo").is_some());
        assert!(registry.get("nonexistent").is_none());
        assert_eq!(registry.names(), vec!["echo"]);
    }

    #[test]
    fn registry_definitions() {
        let defs = registry().definitions();
        assert_eq!(defs.len(), 1);
        assert_eq!(defs[0].name, "echo");
    }

    #[tokio::test]
    async fn invoke_passes_context_and_call_id() {
        let ctx = RuntimeContext::set(EntityType::Scheduler, "ghost_x", Default::default());
        let result = registry()
            .invoke(&ctx, &call(serde_json::json!({"text": "hi"})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.output, "scheduler:hi");
        assert_eq!(result.call_id, "call_1");
    }

    #[tokio::test]
    async fn invoke_missing_tool() {
        let registry = ToolRegistry::new();
        let err = registry
            .invoke(&RuntimeContext::default(), &call(serde_json::json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::NotFound(_)));
    }

    #[tokio::test]
    async fn invoke_rejects_missing_required() {
        let err = registry()
            .invoke(&RuntimeContext::default(), &call(serde_json::json!({"times": 2})))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("'text'")));
    }

    #[tokio::test]
    async fn invoke_rejects_wrong_type() {
        let err = registry()
            .invoke(
                &RuntimeContext::default(),
                &call(serde_json::json!({"text": "a", "times": "two"})),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(ref m) if m.contains("integer")));
    }

    #[test]
    fn validation_rejects_non_object() {
        let schema = serde_json::json!({"type": "object"});
        assert!(validate_arguments(&schema, &serde_json::json!("text")).is_err());
        assert!(validate_arguments(&schema, &serde_json::json!({})).is_ok());
    }

    #[test]
    fn validation_ignores_undeclared_properties() {
        let schema = serde_json::json!({
            "type": "object",
            "properties": { "a": { "type": "number" } }
        });
        assert!(validate_arguments(&schema, &serde_json::json!({"a": 1.5, "b": true})).is_ok());
    }
}
