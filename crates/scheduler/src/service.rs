//! The scheduler service: registers jobs, polls the queue and fires due
//! jobs as ghost runs.
//!
//! Every firing gets its own session id (`ghost_scheduler_<job_id>`), its
//! own scheduler-typed runtime context and its own engine run. Whatever
//! happens inside the run (gateway failure, invalid stored budget, even a
//! panicking tool) ends up as a failed [`ExecutionLogRecord`]; nothing
//! escapes into the polling loop.

use async_trait::async_trait;
use chrono::Utc;
use deskhand_agent::{ExecutionRequest, ReactEngine};
use deskhand_config::{ScheduleEntryConfig, SchedulerConfig};
use deskhand_core::context::{GHOST_SESSION_PREFIX, RuntimeContext};
use deskhand_core::error::{Error, Result, SchedulerError};
use deskhand_core::event::{DomainEvent, EventBus};
use deskhand_core::schedule::{JobScheduler, ScheduleRequest, ScheduledJob, Trigger};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::log::{ExecutionLog, ExecutionLogRecord, RunStatus};
use crate::queue::{FileJobQueue, JobQueue};
use crate::trigger;

const PROMPT_PREVIEW_CHARS: usize = 100;

/// Session id used for every firing of `job_id`.
pub fn ghost_session_id(job_id: &str) -> String {
    format!("{GHOST_SESSION_PREFIX}scheduler_{job_id}")
}

/// Budgets applied when a request does not carry its own.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct JobDefaults {
    pub max_iterations: u32,
    pub timeout_seconds: f64,
}

impl Default for JobDefaults {
    fn default() -> Self {
        Self {
            max_iterations: 5,
            timeout_seconds: 300.0,
        }
    }
}

pub struct SchedulerService {
    queue: Arc<dyn JobQueue>,
    log: ExecutionLog,
    defaults: JobDefaults,
    poll_interval: Duration,
    event_bus: Option<Arc<EventBus>>,
}

impl SchedulerService {
    pub fn new(queue: Arc<dyn JobQueue>) -> Self {
        Self {
            queue,
            log: ExecutionLog::default(),
            defaults: JobDefaults::default(),
            poll_interval: Duration::from_secs(5),
            event_bus: None,
        }
    }

    /// Build from the `[scheduler]` config section.
    pub fn from_config(config: &SchedulerConfig) -> Self {
        let queue: Arc<dyn JobQueue> = match &config.jobs_path {
            Some(path) => Arc::new(FileJobQueue::open(path)),
            None => Arc::new(FileJobQueue::in_memory()),
        };
        let mut service = Self::new(queue)
            .with_defaults(JobDefaults {
                max_iterations: config.default_max_iterations,
                timeout_seconds: config.default_timeout_seconds,
            })
            .with_poll_interval(Duration::from_secs(config.poll_interval_secs));
        service.log = ExecutionLog::new(config.max_log_records);
        service
    }

    pub fn with_defaults(mut self, defaults: JobDefaults) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_event_bus(mut self, bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(bus);
        self
    }

    pub fn log(&self) -> &ExecutionLog {
        &self.log
    }

    /// Register the recurring jobs declared in config. Jobs keep their
    /// config name as id, so a restart updates rather than duplicates them.
    /// Returns one message per entry that could not be registered.
    pub async fn load_config_schedules(&self, entries: &[ScheduleEntryConfig]) -> Vec<String> {
        let mut errors = Vec::new();
        for entry in entries {
            let trigger = match (&entry.cron, entry.interval_secs) {
                (Some(expression), None) => Trigger::Cron {
                    expression: expression.clone(),
                },
                (None, Some(seconds)) => Trigger::Interval { seconds },
                _ => {
                    errors.push(format!(
                        "Schedule '{}': needs exactly one of cron or interval_secs",
                        entry.name
                    ));
                    continue;
                }
            };

            if let Ok(Some(existing)) = self.queue.get(&entry.name).await {
                if existing.trigger == trigger && existing.prompt == entry.prompt {
                    debug!(job_id = %entry.name, "Config schedule already registered");
                    continue;
                }
            }

            let request = ScheduleRequest {
                prompt: entry.prompt.clone(),
                trigger,
                session_id: "config".into(),
                use_react_loop: entry.use_react_loop,
                max_iterations: None,
                timeout_seconds: None,
            };
            if let Err(e) = self.register(entry.name.clone(), request).await {
                errors.push(format!("Schedule '{}': {e}", entry.name));
            }
        }
        errors
    }

    async fn register(&self, id: String, request: ScheduleRequest) -> Result<String> {
        if request.prompt.trim().is_empty() {
            return Err(Error::config("scheduled prompt must not be empty"));
        }
        let max_iterations = request.max_iterations.unwrap_or(self.defaults.max_iterations);
        if max_iterations == 0 {
            return Err(Error::config("max_iterations must be at least 1"));
        }
        let timeout_seconds = request.timeout_seconds.unwrap_or(self.defaults.timeout_seconds);
        if !timeout_seconds.is_finite() || timeout_seconds <= 0.0 {
            return Err(Error::config("timeout_seconds must be a positive number"));
        }

        let now = Utc::now();
        let next_run = trigger::first_run(&request.trigger, now)?;

        let job = ScheduledJob {
            id: id.clone(),
            prompt: request.prompt,
            trigger: request.trigger,
            session_id: request.session_id,
            use_react_loop: request.use_react_loop,
            max_iterations,
            timeout_seconds,
            paused: false,
            created_at: now,
            next_run: Some(next_run),
            last_run: None,
            run_count: 0,
        };
        info!(
            job_id = %id,
            trigger = %job.trigger,
            next_run = %next_run.to_rfc3339(),
            origin_session = %job.session_id,
            "Job scheduled"
        );
        let trigger = job.trigger.to_string();
        self.queue.insert(job).await?;

        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::JobScheduled {
                job_id: id.clone(),
                trigger,
                timestamp: now,
            });
        }
        Ok(id)
    }

    // ── Firing ──

    /// Fire `job_id` now, outside its schedule.
    ///
    /// Re-arms (or retires) the job exactly like a scheduled firing, then
    /// runs it to completion. Paused jobs can be fired this way. `Err` when
    /// the job does not exist or a one-off run of it is still in flight.
    pub async fn on_fire(&self, job_id: &str, engine: Arc<ReactEngine>) -> Result<ExecutionLogRecord> {
        if self.queue.get(job_id).await?.is_none() {
            return Err(SchedulerError::JobNotFound(job_id.to_string()).into());
        }
        let Some(job) = self.queue.mark_fired(job_id, Utc::now()).await? else {
            return Err(Error::config(format!("job {job_id} is already running")));
        };
        Ok(self.run_job(job, engine).await)
    }

    /// Spawn the polling loop. Each due job runs in its own task, so a slow
    /// or failing job never holds up the others.
    pub fn start(self: &Arc<Self>, engine: Arc<ReactEngine>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        info!(poll_secs = service.poll_interval.as_secs_f64(), "Scheduler loop starting");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(service.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                ticker.tick().await;
                let now = Utc::now();

                let due = match service.queue.due(now).await {
                    Ok(due) => due,
                    Err(e) => {
                        warn!(error = %e, "Could not read due jobs");
                        continue;
                    }
                };

                for job in due {
                    // Re-arm before running so the next tick cannot fire it again.
                    let job = match service.queue.claim(&job.id, now).await {
                        Ok(Some(job)) => job,
                        Ok(None) => continue,
                        Err(e) => {
                            warn!(job_id = %job.id, error = %e, "Could not re-arm job, skipping firing");
                            continue;
                        }
                    };
                    let service = Arc::clone(&service);
                    let engine = Arc::clone(&engine);
                    tokio::spawn(async move {
                        service.run_job(job, engine).await;
                    });
                }
            }
        })
    }

    /// One ghost run. Never fails: every outcome becomes a log record.
    async fn run_job(&self, job: ScheduledJob, engine: Arc<ReactEngine>) -> ExecutionLogRecord {
        let ghost_id = ghost_session_id(&job.id);
        let ctx = ghost_context(&job, &ghost_id);
        let request = ExecutionRequest::new(job.prompt.clone())
            .with_budget(
                if job.use_react_loop { job.max_iterations } else { 1 },
                job.timeout_seconds,
            )
            .with_context(&ctx)
            .with_tools_enabled(job.use_react_loop);

        info!(job_id = %job.id, session_id = %ghost_id, "Scheduled job firing");
        let started_at = Utc::now();
        let clock = Instant::now();

        // A separate task so a panic inside the run is contained here.
        let outcome = tokio::spawn(async move { engine.execute(request).await }).await;

        let mut record = ExecutionLogRecord {
            job_id: job.id.clone(),
            ghost_session_id: ghost_id.clone(),
            status: RunStatus::Error,
            response: None,
            error: None,
            termination_reason: None,
            iterations: 0,
            started_at,
            finished_at: Utc::now(),
            duration_seconds: clock.elapsed().as_secs_f64(),
        };
        match outcome {
            Ok(Ok(result)) => {
                if result.succeeded() {
                    record.status = RunStatus::Success;
                }
                record.error = result.error;
                record.termination_reason = Some(result.termination_reason.to_string());
                record.iterations = result.iterations;
                record.response = Some(result.response);
            }
            Ok(Err(e)) => record.error = Some(e.to_string()),
            Err(e) => record.error = Some(format!("run aborted: {e}")),
        }

        match record.status {
            RunStatus::Success => info!(
                job_id = %job.id,
                iterations = record.iterations,
                duration_secs = record.duration_seconds,
                "Scheduled job finished"
            ),
            RunStatus::Error => error!(
                job_id = %job.id,
                error = record.error.as_deref().unwrap_or("unknown"),
                "Scheduled job failed"
            ),
        }

        self.log.record(record.clone());
        if let Err(e) = self.queue.complete(&job.id).await {
            warn!(job_id = %job.id, error = %e, "Could not retire finished job");
        }
        if let Some(bus) = &self.event_bus {
            bus.publish(DomainEvent::JobFired {
                job_id: job.id,
                ghost_session_id: ghost_id,
                success: record.status == RunStatus::Success,
                timestamp: record.finished_at,
            });
        }
        record
    }
}

fn ghost_context(job: &ScheduledJob, ghost_id: &str) -> RuntimeContext {
    let preview: String = job.prompt.chars().take(PROMPT_PREVIEW_CHARS).collect();
    let mut metadata = serde_json::Map::new();
    metadata.insert("job_id".into(), job.id.clone().into());
    metadata.insert("parent_session_id".into(), job.session_id.clone().into());
    metadata.insert("prompt_preview".into(), preview.into());
    RuntimeContext::scheduler(ghost_id, metadata)
}

#[async_trait]
impl JobScheduler for SchedulerService {
    async fn schedule(&self, request: ScheduleRequest) -> Result<String> {
        self.register(Uuid::new_v4().simple().to_string(), request).await
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>> {
        self.queue.list().await
    }

    async fn get(&self, job_id: &str) -> Result<Option<ScheduledJob>> {
        self.queue.get(job_id).await
    }

    async fn pause(&self, job_id: &str) -> Result<()> {
        if !self.queue.set_paused(job_id, true).await? {
            return Err(SchedulerError::JobNotFound(job_id.to_string()).into());
        }
        info!(job_id, "Job paused");
        Ok(())
    }

    async fn resume(&self, job_id: &str) -> Result<()> {
        if !self.queue.set_paused(job_id, false).await? {
            return Err(SchedulerError::JobNotFound(job_id.to_string()).into());
        }
        info!(job_id, "Job resumed");
        Ok(())
    }

    async fn delete(&self, job_id: &str) -> Result<()> {
        if !self.queue.remove(job_id).await? {
            return Err(SchedulerError::JobNotFound(job_id.to_string()).into());
        }
        info!(job_id, "Job deleted");
        Ok(())
    }
}
