//! Scheduler service for deskhand.
//!
//! Jobs are prompts with a trigger (`date`, `interval` or `cron`). The
//! [`SchedulerService`] validates and stores them in a [`JobQueue`], polls
//! for due jobs, and fires each one as an isolated "ghost" run of the ReAct
//! engine under a scheduler-typed runtime context. Every firing leaves an
//! [`ExecutionLogRecord`].

pub mod cron;
pub mod log;
pub mod queue;
pub mod service;
pub mod trigger;

pub use cron::CronExpr;
pub use log::{ExecutionLog, ExecutionLogRecord, RunStatus};
pub use queue::{FileJobQueue, JobQueue};
pub use service::{JobDefaults, SchedulerService, ghost_session_id};
