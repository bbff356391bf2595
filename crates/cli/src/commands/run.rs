//! `deskhand run` - one prompt, one engine run, JSON on stdout.

use deskhand_agent::ExecutionRequest;
use deskhand_core::context::RuntimeContext;
use deskhand_gateway::StreamingGateway;
use std::path::Path;

use crate::runtime::{Runtime, load_config};

/// Session id for prompts run from the terminal.
const CLI_SESSION_ID: &str = "cli";

pub struct RunOptions {
    pub message: String,
    pub max_iterations: Option<u32>,
    pub timeout_seconds: Option<f64>,
    pub stream: bool,
}

pub async fn run(config_path: Option<&Path>, options: RunOptions) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let runtime = Runtime::build(config)?;
    let engine_config = &runtime.config.engine;

    let request = ExecutionRequest::new(options.message)
        .with_budget(
            options.max_iterations.unwrap_or(engine_config.max_iterations),
            options.timeout_seconds.unwrap_or(engine_config.timeout_seconds),
        )
        .with_context(&RuntimeContext::human(CLI_SESSION_ID));

    if options.stream {
        let gateway = StreamingGateway::new(runtime.engine.clone());
        let mut stream = gateway.stream(request);
        while let Some(frame) = stream.frames.recv().await {
            println!("{}", serde_json::to_string(&frame)?);
        }
        if stream.outcome.await?.is_none_or(|r| r.termination_reason.is_failure()) {
            anyhow::bail!("run failed");
        }
        return Ok(());
    }

    let result = runtime.engine.execute(request).await?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if let Some(error) = &result.error {
        anyhow::bail!("run failed: {error}");
    }
    Ok(())
}
