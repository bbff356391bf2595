//! A provider that replays a fixed script of responses.
//!
//! Each `complete` call pops the next scripted outcome. When the script is
//! exhausted the provider either repeats its last response (`repeat_last`)
//! or fails with `NotConfigured`. Every request is recorded so callers can
//! inspect which model and tools were sent.

use async_trait::async_trait;
use deskhand_core::error::ProviderError;
use deskhand_core::message::{Message, MessageToolCall};
use deskhand_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

pub struct ScriptedProvider {
    script: Mutex<VecDeque<Result<ProviderResponse, ProviderError>>>,
    last: Mutex<Option<ProviderResponse>>,
    requests: Mutex<Vec<ProviderRequest>>,
    repeat_last: bool,
    delay: Option<Duration>,
}

impl ScriptedProvider {
    pub fn new(script: Vec<Result<ProviderResponse, ProviderError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            last: Mutex::new(None),
            requests: Mutex::new(Vec::new()),
            repeat_last: false,
            delay: None,
        }
    }

    /// Script of successful responses.
    pub fn responses(responses: Vec<ProviderResponse>) -> Self {
        Self::new(responses.into_iter().map(Ok).collect())
    }

    /// Always answer with the same plain text.
    pub fn single_text(text: &str) -> Self {
        Self::responses(vec![text_response(text)]).repeat_last()
    }

    /// Request the same tool call forever.
    pub fn always_tool_call(call: MessageToolCall) -> Self {
        Self::responses(vec![tool_call_response(vec![call], "")]).repeat_last()
    }

    pub fn repeat_last(mut self) -> Self {
        self.repeat_last = true;
        self
    }

    /// Sleep before every response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().map(|r| r.len()).unwrap_or(0)
    }

    /// Snapshot of every request received so far.
    pub fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn next(&self) -> Result<ProviderResponse, ProviderError> {
        let mut script = self.script.lock().map_err(|_| poisoned())?;
        let mut last = self.last.lock().map_err(|_| poisoned())?;

        match script.pop_front() {
            Some(Ok(response)) => {
                *last = Some(response.clone());
                Ok(response)
            }
            Some(Err(e)) => Err(e),
            None => match (&*last, self.repeat_last) {
                (Some(response), true) => Ok(response.clone()),
                _ => Err(ProviderError::NotConfigured("script exhausted".into())),
            },
        }
    }
}

#[async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request);
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.next()
    }
}

fn poisoned() -> ProviderError {
    ProviderError::NotConfigured("scripted provider lock poisoned".into())
}

fn usage() -> Option<Usage> {
    Some(Usage {
        prompt_tokens: 10,
        completion_tokens: 5,
        total_tokens: 15,
    })
}

/// A plain text response (no tool calls).
pub fn text_response(text: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant(text),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// A response requesting tool calls, with optional reasoning text.
pub fn tool_call_response(tool_calls: Vec<MessageToolCall>, thought: &str) -> ProviderResponse {
    ProviderResponse {
        message: Message::assistant_with_tool_calls(thought, tool_calls),
        usage: usage(),
        model: "scripted-model".into(),
    }
}

/// Build a tool call with a deterministic id.
pub fn tool_call(name: &str, args: serde_json::Value) -> MessageToolCall {
    MessageToolCall {
        id: format!("call_{name}"),
        name: name.to_string(),
        arguments: args.to_string(),
    }
}
