//! Scheduling contract.
//!
//! The scheduling skills only need "register a job, list, pause, resume,
//! delete". That surface is the [`JobScheduler`] trait; the scheduler crate
//! implements it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// When a job fires.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Trigger {
    /// Fire once at the given instant.
    Date { run_at: DateTime<Utc> },
    /// Fire every `seconds` seconds.
    Interval { seconds: u64 },
    /// Fire on a 5-field cron expression (UTC).
    Cron { expression: String },
}

impl Trigger {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Date { .. } => "date",
            Self::Interval { .. } => "interval",
            Self::Cron { .. } => "cron",
        }
    }

    /// One-off triggers are dropped after a single firing.
    pub fn is_one_off(&self) -> bool {
        matches!(self, Self::Date { .. })
    }
}

impl std::fmt::Display for Trigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Date { run_at } => write!(f, "date({})", run_at.to_rfc3339()),
            Self::Interval { seconds } => write!(f, "interval({seconds}s)"),
            Self::Cron { expression } => write!(f, "cron({expression})"),
        }
    }
}

/// A request to schedule a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleRequest {
    pub prompt: String,
    pub trigger: Trigger,

    /// Session that created the job. Kept for audit only.
    #[serde(default)]
    pub session_id: String,

    /// `false` runs a single model turn with tools disabled.
    #[serde(default = "default_true")]
    pub use_react_loop: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_iterations: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_seconds: Option<f64>,
}

fn default_true() -> bool {
    true
}

/// A durable scheduled job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub id: String,
    pub prompt: String,
    pub trigger: Trigger,
    /// Origin session, for audit only
    pub session_id: String,
    pub use_react_loop: bool,
    pub max_iterations: u32,
    pub timeout_seconds: f64,
    #[serde(default)]
    pub paused: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run: Option<DateTime<Utc>>,
    #[serde(default)]
    pub run_count: u64,
}

/// The scheduling operations available to skills and the HTTP API.
#[async_trait]
pub trait JobScheduler: Send + Sync {
    /// Validate the trigger and register the job, returning its id.
    async fn schedule(&self, request: ScheduleRequest) -> Result<String>;

    async fn list(&self) -> Result<Vec<ScheduledJob>>;

    async fn get(&self, job_id: &str) -> Result<Option<ScheduledJob>>;

    async fn pause(&self, job_id: &str) -> Result<()>;

    async fn resume(&self, job_id: &str) -> Result<()>;

    async fn delete(&self, job_id: &str) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trigger_serializes_tagged() {
        let t = Trigger::Interval { seconds: 60 };
        let json = serde_json::to_value(&t).unwrap();
        assert_eq!(json["type"], "interval");
        assert_eq!(json["seconds"], 60);

        let parsed: Trigger =
            serde_json::from_str(r#"{"type":"cron","expression":"0 9 * * 1-5"}"#).unwrap();
        assert_eq!(parsed.kind(), "cron");
        assert!(!parsed.is_one_off());
    }

    #[test]
    fn schedule_request_defaults() {
        let req: ScheduleRequest = serde_json::from_str(
            r#"{"prompt":"water the plants","trigger":{"type":"interval","seconds":3600}}"#,
        )
        .unwrap();
        assert!(req.use_react_loop);
        assert!(req.max_iterations.is_none());
        assert!(req.session_id.is_empty());
    }

    #[test]
    fn trigger_display() {
        assert_eq!(Trigger::Interval { seconds: 5 }.to_string(), "interval(5s)");
        assert_eq!(
            Trigger::Cron { expression: "*/5 * * * *".into() }.to_string(),
            "cron(*/5 * * * *)"
        );
    }
}
