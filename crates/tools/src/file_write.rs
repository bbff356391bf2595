//! Write (or append to) a file in the workspace.

use async_trait::async_trait;
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::ToolError;
use deskhand_core::tool::{Tool, ToolResult};
use deskhand_security::WorkspaceSandbox;
use tokio::io::AsyncWriteExt;
use tracing::debug;

pub struct FileWriteTool {
    sandbox: WorkspaceSandbox,
}

impl FileWriteTool {
    pub fn new(sandbox: WorkspaceSandbox) -> Self {
        Self { sandbox }
    }

    fn failure(&self, path: &str, e: std::io::Error) -> ToolError {
        ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("cannot write {path}: {e}"),
        }
    }
}

#[async_trait]
impl Tool for FileWriteTool {
    fn name(&self) -> &str {
        "file_write"
    }

    fn description(&self) -> &str {
        "Write content to a file in the workspace. Creates parent directories and the file \
         if needed; overwrites unless 'append' is true."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "path": {
                    "type": "string",
                    "description": "Path of the file, relative to the workspace"
                },
                "content": {
                    "type": "string",
                    "description": "The content to write"
                },
                "append": {
                    "type": "boolean",
                    "description": "Append instead of overwriting"
                }
            },
            "required": ["path", "content"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let path = arguments["path"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'path' argument".into()))?;
        let content = arguments["content"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'content' argument".into()))?;
        let append = arguments["append"].as_bool().unwrap_or(false);

        let resolved = self
            .sandbox
            .resolve(path)
            .map_err(|e| ToolError::PermissionDenied {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?;

        if let Some(parent) = resolved.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| self.failure(path, e))?;
        }

        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .append(append)
            .truncate(!append)
            .open(&resolved)
            .await
            .map_err(|e| self.failure(path, e))?;
        file.write_all(content.as_bytes())
            .await
            .map_err(|e| self.failure(path, e))?;
        file.flush().await.map_err(|e| self.failure(path, e))?;

        debug!(path = %resolved.display(), bytes = content.len(), session_id = %ctx.session_id, "File written");

        let verb = if append { "appended" } else { "wrote" };
        Ok(ToolResult::ok(format!(
            "Successfully {verb} {} bytes to {path}",
            content.len()
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn writes_and_creates_directories() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(WorkspaceSandbox::new(dir.path(), vec![]));

        let result = tool
            .execute(
                &RuntimeContext::default(),
                serde_json::json!({"path": "reports/weekly.md", "content": "# Week 42"}),
            )
            .await
            .unwrap();

        assert!(result.success);
        assert!(result.output.contains("9 bytes"));
        let written = std::fs::read_to_string(dir.path().join("reports/weekly.md")).unwrap();
        assert_eq!(written, "# Week 42");
    }

    #[tokio::test]
    async fn append_mode_keeps_existing_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("log.txt"), "a\n").unwrap();
        let tool = FileWriteTool::new(WorkspaceSandbox::new(dir.path(), vec![]));

        tool.execute(
            &RuntimeContext::default(),
            serde_json::json!({"path": "log.txt", "content": "b\n", "append": true}),
        )
        .await
        .unwrap();

        assert_eq!(std::fs::read_to_string(dir.path().join("log.txt")).unwrap(), "a\nb\n");
    }

    #[tokio::test]
    async fn absolute_path_outside_workspace_denied() {
        let dir = tempfile::tempdir().unwrap();
        let tool = FileWriteTool::new(WorkspaceSandbox::new(dir.path(), vec![]));
        let err = tool
            .execute(
                &RuntimeContext::default(),
                serde_json::json!({"path": "/tmp/escape.txt", "content": "x"}),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::PermissionDenied { .. }));
    }
}
