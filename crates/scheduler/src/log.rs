//! Audit trail of scheduled firings.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Success,
    Error,
}

/// One firing of one job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionLogRecord {
    pub job_id: String,
    pub ghost_session_id: String,
    pub status: RunStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub termination_reason: Option<String>,
    #[serde(default)]
    pub iterations: u32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub duration_seconds: f64,
}

/// Bounded in-memory log; the oldest records fall off first.
pub struct ExecutionLog {
    records: Mutex<VecDeque<ExecutionLogRecord>>,
    capacity: usize,
}

impl ExecutionLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            records: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    pub fn record(&self, record: ExecutionLogRecord) {
        let mut records = match self.records.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        if records.len() == self.capacity {
            records.pop_front();
        }
        records.push_back(record);
    }

    /// Newest first.
    pub fn recent(&self, limit: usize) -> Vec<ExecutionLogRecord> {
        self.snapshot(|_| true, limit)
    }

    /// Records for one job, newest first.
    pub fn for_job(&self, job_id: &str, limit: usize) -> Vec<ExecutionLogRecord> {
        self.snapshot(|r| r.job_id == job_id, limit)
    }

    pub fn len(&self) -> usize {
        self.records.lock().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self, keep: impl Fn(&ExecutionLogRecord) -> bool, limit: usize) -> Vec<ExecutionLogRecord> {
        let records = match self.records.lock() {
            Ok(r) => r,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.iter().rev().filter(|r| keep(r)).take(limit).cloned().collect()
    }
}

impl Default for ExecutionLog {
    fn default() -> Self {
        Self::new(500)
    }
}
