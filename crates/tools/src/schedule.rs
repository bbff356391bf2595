//! Scheduling skills.
//!
//! `schedule_task` and `schedule_interval_task` register ghost jobs; the
//! rest manage existing ones. All of them delegate to a [`JobScheduler`]
//! and take the origin session from the runtime context. An invalid
//! trigger comes back as an unsuccessful result whose text explains the
//! problem, so the model can correct itself.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use deskhand_core::context::RuntimeContext;
use deskhand_core::error::{Error, ToolError};
use deskhand_core::schedule::{JobScheduler, ScheduleRequest, Trigger};
use deskhand_core::tool::{Tool, ToolResult};
use std::sync::Arc;
use tracing::info;

const GHOST_REFUSAL: &str =
    "Scheduled background runs cannot create or change scheduled tasks.";

fn refuse_in_scheduler(tool: &str, ctx: &RuntimeContext) -> Option<ToolResult> {
    ctx.is_scheduler().then(|| {
        info!(tool, session_id = %ctx.session_id, "Schedule change refused in scheduler context");
        ToolResult::failed(GHOST_REFUSAL)
    })
}

/// Map a scheduler error to either a readable failed result (caller
/// mistakes) or a tool error (everything else).
fn scheduler_outcome(tool: &str, err: Error) -> Result<ToolResult, ToolError> {
    if err.is_configuration() {
        return Ok(ToolResult::failed(format!("Error: {err}")));
    }
    match err {
        Error::Scheduler(deskhand_core::error::SchedulerError::JobNotFound(id)) => {
            Ok(ToolResult::failed(format!("Error: no scheduled task with id '{id}'")))
        }
        other => Err(ToolError::ExecutionFailed {
            tool_name: tool.into(),
            reason: other.to_string(),
        }),
    }
}

/// Accepts RFC 3339 (`2026-05-01T09:00:00+02:00`) or a naive
/// `YYYY-MM-DDTHH:MM[:SS]` taken as UTC.
pub fn parse_run_at(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// `Err` carries the failed result to hand back to the model.
fn job_options(arguments: &serde_json::Value) -> Result<(bool, Option<u32>), ToolResult> {
    let use_react_loop = arguments["use_react_loop"].as_bool().unwrap_or(true);
    let max_iterations = match &arguments["max_iterations"] {
        serde_json::Value::Null => None,
        value => match value.as_u64().and_then(|m| u32::try_from(m).ok()) {
            Some(m) => Some(m),
            None => {
                return Err(ToolResult::failed(format!(
                    "Error: max_iterations must be an integer between 1 and {}, got {value}",
                    u32::MAX
                )));
            }
        },
    };
    Ok((use_react_loop, max_iterations))
}

fn job_id_arg(arguments: &serde_json::Value) -> Result<&str, ToolError> {
    arguments["job_id"]
        .as_str()
        .ok_or_else(|| ToolError::InvalidArguments("Missing 'job_id' argument".into()))
}

fn common_properties() -> serde_json::Value {
    serde_json::json!({
        "prompt": {
            "type": "string",
            "description": "The instruction to run later, written as if the user typed it"
        },
        "use_react_loop": {
            "type": "boolean",
            "description": "Allow tool use when the job runs (default true)"
        },
        "max_iterations": {
            "type": "integer",
            "description": "Reasoning step budget for each run"
        }
    })
}

async fn register(
    scheduler: &dyn JobScheduler,
    tool: &str,
    ctx: &RuntimeContext,
    request: ScheduleRequest,
) -> Result<ToolResult, ToolError> {
    let trigger = request.trigger.to_string();
    match scheduler.schedule(request).await {
        Ok(job_id) => {
            info!(tool, job_id = %job_id, trigger = %trigger, session_id = %ctx.session_id, "Job scheduled");
            Ok(ToolResult::ok(format!("Scheduled task {job_id} ({trigger})"))
                .with_data(serde_json::json!({ "job_id": job_id })))
        }
        Err(e) => scheduler_outcome(tool, e),
    }
}

// ── schedule_task ──

pub struct ScheduleTaskTool {
    scheduler: Arc<dyn JobScheduler>,
}

impl ScheduleTaskTool {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn name(&self) -> &str {
        "schedule_task"
    }

    fn description(&self) -> &str {
        "Schedule a one-off background task that runs the given prompt at a specific time. \
         Returns the job id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = common_properties();
        properties["run_at"] = serde_json::json!({
            "type": "string",
            "description": "When to run, ISO-8601 (e.g. 2026-05-01T09:00:00Z)"
        });
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["prompt", "run_at"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        if let Some(refusal) = refuse_in_scheduler(self.name(), ctx) {
            return Ok(refusal);
        }
        let prompt = arguments["prompt"].as_str().unwrap_or_default().to_string();
        let raw = arguments["run_at"].as_str().unwrap_or_default();
        let Some(run_at) = parse_run_at(raw) else {
            return Ok(ToolResult::failed(format!(
                "Error: '{raw}' is not a valid ISO-8601 date-time"
            )));
        };
        let (use_react_loop, max_iterations) = match job_options(&arguments) {
            Ok(options) => options,
            Err(failed) => return Ok(failed),
        };

        let request = ScheduleRequest {
            prompt,
            trigger: Trigger::Date { run_at },
            session_id: ctx.session_id.clone(),
            use_react_loop,
            max_iterations,
            timeout_seconds: None,
        };
        register(self.scheduler.as_ref(), self.name(), ctx, request).await
    }
}

// ── schedule_interval_task ──

pub struct ScheduleIntervalTaskTool {
    scheduler: Arc<dyn JobScheduler>,
}

impl ScheduleIntervalTaskTool {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ScheduleIntervalTaskTool {
    fn name(&self) -> &str {
        "schedule_interval_task"
    }

    fn description(&self) -> &str {
        "Schedule a recurring background task that runs the given prompt every N seconds. \
         Returns the job id."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        let mut properties = common_properties();
        properties["interval_seconds"] = serde_json::json!({
            "type": "integer",
            "description": "Seconds between runs (must be > 0)"
        });
        serde_json::json!({
            "type": "object",
            "properties": properties,
            "required": ["prompt", "interval_seconds"]
        })
    }

    async fn execute(
        &self,
        ctx: &RuntimeContext,
        arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        if let Some(refusal) = refuse_in_scheduler(self.name(), ctx) {
            return Ok(refusal);
        }
        let prompt = arguments["prompt"].as_str().unwrap_or_default().to_string();
        let Some(seconds) = arguments["interval_seconds"].as_u64() else {
            return Ok(ToolResult::failed(
                "Error: interval_seconds must be a positive integer",
            ));
        };
        let (use_react_loop, max_iterations) = match job_options(&arguments) {
            Ok(options) => options,
            Err(failed) => return Ok(failed),
        };

        let request = ScheduleRequest {
            prompt,
            trigger: Trigger::Interval { seconds },
            session_id: ctx.session_id.clone(),
            use_react_loop,
            max_iterations,
            timeout_seconds: None,
        };
        register(self.scheduler.as_ref(), self.name(), ctx, request).await
    }
}

// ── list_scheduled_tasks ──

pub struct ListScheduledTasksTool {
    scheduler: Arc<dyn JobScheduler>,
}

impl ListScheduledTasksTool {
    pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
        Self { scheduler }
    }
}

#[async_trait]
impl Tool for ListScheduledTasksTool {
    fn name(&self) -> &str {
        "list_scheduled_tasks"
    }

    fn description(&self) -> &str {
        "List all scheduled background tasks with their trigger, status and next run time."
    }

    fn parameters_schema(&self) -> serde_json::Value {
        serde_json::json!({ "type": "object", "properties": {} })
    }

    async fn execute(
        &self,
        _ctx: &RuntimeContext,
        _arguments: serde_json::Value,
    ) -> Result<ToolResult, ToolError> {
        let jobs = match self.scheduler.list().await {
            Ok(jobs) => jobs,
            Err(e) => return scheduler_outcome(self.name(), e),
        };
        if jobs.is_empty() {
            return Ok(ToolResult::ok("No scheduled tasks."));
        }

        let mut output = String::new();
        for job in &jobs {
            let status = if job.paused { "paused" } else { "active" };
            let next = job
                .next_run
                .map(|t| t.to_rfc3339())
                .unwrap_or_else(|| "-".into());
            output.push_str(&format!(
                "- {} [{status}] {} next={next}: {}\n",
                job.id, job.trigger, job.prompt
            ));
        }
        let data = serde_json::to_value(&jobs).unwrap_or(serde_json::Value::Null);
        Ok(ToolResult::ok(output.trim_end()).with_data(data))
    }
}

// ── pause / resume / delete ──

macro_rules! job_action_tool {
    ($tool:ident, $name:literal, $description:literal, $method:ident, $done:literal) => {
        pub struct $tool {
            scheduler: Arc<dyn JobScheduler>,
        }

        impl $tool {
            pub fn new(scheduler: Arc<dyn JobScheduler>) -> Self {
                Self { scheduler }
            }
        }

        #[async_trait]
        impl Tool for $tool {
            fn name(&self) -> &str {
                $name
            }

            fn description(&self) -> &str {
                $description
            }

            fn parameters_schema(&self) -> serde_json::Value {
                serde_json::json!({
                    "type": "object",
                    "properties": {
                        "job_id": { "type": "string", "description": "Id of the scheduled task" }
                    },
                    "required": ["job_id"]
                })
            }

            async fn execute(
                &self,
                ctx: &RuntimeContext,
                arguments: serde_json::Value,
            ) -> Result<ToolResult, ToolError> {
                if let Some(refusal) = refuse_in_scheduler(self.name(), ctx) {
                    return Ok(refusal);
                }
                let job_id = job_id_arg(&arguments)?;
                match self.scheduler.$method(job_id).await {
                    Ok(()) => Ok(ToolResult::ok(format!("Task {job_id} {}", $done))),
                    Err(e) => scheduler_outcome(self.name(), e),
                }
            }
        }
    };
}

job_action_tool!(
    PauseScheduledTaskTool,
    "pause_scheduled_task",
    "Pause a scheduled task so it stops firing until resumed.",
    pause,
    "paused"
);
job_action_tool!(
    ResumeScheduledTaskTool,
    "resume_scheduled_task",
    "Resume a paused scheduled task.",
    resume,
    "resumed"
);
job_action_tool!(
    DeleteScheduledTaskTool,
    "delete_scheduled_task",
    "Delete a scheduled task permanently.",
    delete,
    "deleted"
);
