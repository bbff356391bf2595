//! Sandboxed code runner: executes a Python or shell snippet as a
//! subprocess in the workspace directory, bounded by a timeout.
//!
//! The child is killed if the timeout fires (`kill_on_drop`). Output is
//! capped so a chatty script cannot flood the conversation.

use async_trait::async_trait;
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::ToolError;
use deskhand_core::tool::{Tool, ToolResult};
use deskhand_security::WorkspaceSandbox;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

const MAX_OUTPUT_CHARS: usize = 8 * 1024;

pub struct CodeRunnerTool {
    sandbox: WorkspaceSandbox,
    python_bin: String,
    timeout: Duration,
}

impl CodeRunnerTool {
    pub fn new(sandbox: WorkspaceSandbox, python_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            sandbox,
            python_bin: python_bin.into(),
            timeout,
        }
    }

    fn command_for(&self, language: &str, code: &str) -> Result<Command, ToolError> {
        let mut cmd = match language {
            "python" => {
                let mut c = Command::new(&self.python_bin);
                c.args(["-c", code]);
                c
            }
            "shell" => {
                let mut c = Command::new("sh");
                c.args(["-c", code]);
                c
            }
            other => {
                return Err(ToolError::InvalidArguments(format!(
                    "unsupported language '{other}', expected 'python' or 'shell'"
                )));
            }
        };
        cmd.current_dir(self.sandbox.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        Ok(cmd)
    }
}

fn cap(text: &str) -> String {
    if text.chars().count() <= MAX_OUTPUT_CHARS {
        return text.to_string();
    }
    let kept: String = text.chars().take(MAX_OUTPUT_CHARS).collect();
    format!("{kept}\n[output truncated]")
}

#[async_trait]
impl Tool for CodeRunnerTool {
    fn name(&self) -> &str {
        "run_code"
    }

    fn description(&self) -> &str {
        "Run a short Python or shell snippet in the workspace directory and return its \
         stdout, stderr and exit code. Use it for calculations and data wrangling."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "language": {
                    "type": "string",
                    "enum": ["python", "shell"],
                    "description": "Interpreter to use"
                },
                "code": {
                    "type": "string",
                    "description": "The source code to run"
                }
            },
            "required": ["language", "code"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let language = arguments["language"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'language' argument".into()))?;
        let code = arguments["code"]
            .as_str()
            .ok_or_else(|| ToolError::InvalidArguments("Missing 'code' argument".into()))?;

        self.sandbox.ensure_root().map_err(|e| ToolError::ExecutionFailed {
            tool_name: self.name().into(),
            reason: format!("workspace unavailable: {e}"),
        })?;

        debug!(language, session_id = %ctx.session_id, "Running code snippet");

        let child = self
            .command_for(language, code)?
            .spawn()
            .map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: format!("failed to start {language}: {e}"),
            })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|e| ToolError::ExecutionFailed {
                tool_name: self.name().into(),
                reason: e.to_string(),
            })?,
            Err(_) => {
                warn!(language, timeout_secs = self.timeout.as_secs(), "Code snippet timed out");
                return Err(ToolError::Timeout {
                    tool_name: self.name().into(),
                    timeout_secs: self.timeout.as_secs(),
                });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let stderr = String::from_utf8_lossy(&output.stderr);
        let code = output.status.code().unwrap_or(-1);
        let success = output.status.success();

        let mut text = format!("[exit code: {code}]\n{}", stdout.trim_end());
        if !stderr.trim().is_empty() {
            text.push_str(&format!("\n[stderr]\n{}", stderr.trim_end()));
        }

        let data = serde_json::json!({ "exit_code": code });
        let result = if success {
            ToolResult::ok(cap(&text))
        } else {
            ToolResult::failed(cap(&text))
        };
        Ok(result.with_data(data))
    }
}
