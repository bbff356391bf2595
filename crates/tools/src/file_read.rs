//! Read a text file from the workspace.

use async_trait::async_trait;
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::ToolError;
use deskhand_core::tool::{Tool, ToolResult};
use deskhand_security::WorkspaceSandbox;

const DEFAULT_MAX_BYTES: usize = 64 * 1024;

pub struct FileReadTool {
    sandbox: WorkspaceSandbox,
}

impl FileReadTool {
    pub fn new(sandbox: WorkspaceSandbox) -> Self {
        Self { sandbox }
    }
}

#[async_trait]
impl Tool for FileReadTool {
    fn name(&self) -> &str {
        "file_read"
    }

    fn description(&self) -> &str {
        "Read a text file from the workspace. Paths are relative to the workspace root."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file, relative to the workspace"
                },
                "max_bytes": {
                    "type": "integer",
                    "description": "Truncate the content after this many bytes (default 65536)"
                }
            },
            "required": ["path"]
        })
    }

    async fn execute(
        &self,
        _ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let max_bytes = arguments["max_bytes"]
            .as_u64()
            .map(|m| m as usize)
            .unwrap_or(DEFAULT_MAX_BYTES);

        let resolved = self
            .sandbox
            .resolve(path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        let bytes = tokio::fs::read(&resolved)
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("cannot read {path}: {e}"),
            })?;

        let total = bytes.len();
        let mut content = String::from_utf8_lossy(&bytes[..total.min(max_bytes)]).into_owned();
        if total > max_bytes {
            content.push_str(&format!("\n[truncated: showing {max_bytes} of {total} bytes]"));
        }

        Ok(ToolResult::ok(content).with_data(serde_json::json!({ "bytes": total })))
    }
}
