//! Durable job queue.
//!
//! [`JobQueue`] is the substrate the scheduler service sits on: it stores
//! jobs, reports which are due and re-arms recurring ones after they fire.
//! [`FileJobQueue`] keeps one JSON-encoded job per line and rewrites the
//! file on every mutation. Without a path it is purely in-memory.
//!
//! Delivery is at least once. A fired one-off job stays stored with no
//! `next_run` (in flight) until [`JobQueue::complete`] retires it; a job
//! still in flight when the file is reopened is due again.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use deskhand_core::error::{Result, SchedulerError};
use deskhand_core::schedule::ScheduledJob;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::trigger;

#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn insert(&self, job: ScheduledJob) -> Result<()>;

    async fn get(&self, job_id: &str) -> Result<Option<ScheduledJob>>;

    /// All jobs, ordered by creation time.
    async fn list(&self) -> Result<Vec<ScheduledJob>>;

    /// Returns `false` if no such job existed.
    async fn remove(&self, job_id: &str) -> Result<bool>;

    /// Returns `false` if no such job existed.
    async fn set_paused(&self, job_id: &str, paused: bool) -> Result<bool>;

    /// Active jobs whose next run is at or before `now`.
    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>>;

    /// Record a firing. Recurring jobs are re-armed from `now`; one-off
    /// jobs are kept in flight until [`complete`](Self::complete). Returns
    /// the job after the update, or `None` if it is missing or already in
    /// flight.
    async fn mark_fired(&self, job_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledJob>>;

    /// [`mark_fired`](Self::mark_fired), but only if the job is still
    /// active and due at `now`. Used by the polling loop.
    async fn claim(&self, job_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledJob>>;

    /// The run of a fired job is over: retire it if it was a one-off.
    async fn complete(&self, job_id: &str) -> Result<()>;
}

pub struct FileJobQueue {
    path: Option<PathBuf>,
    jobs: RwLock<BTreeMap<String, ScheduledJob>>,
}

impl FileJobQueue {
    /// A queue that forgets everything on restart.
    pub fn in_memory() -> Self {
        Self {
            path: None,
            jobs: RwLock::new(BTreeMap::new()),
        }
    }

    /// Open (or lazily create) the queue file at `path`.
    ///
    /// One-off jobs whose run was interrupted are re-armed at their last
    /// firing time, so the next poll fires them again.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let mut jobs = load_jsonl(&path);
        for job in jobs.values_mut().filter(|job| job.next_run.is_none()) {
            warn!(job_id = %job.id, "Re-arming job interrupted mid-run");
            job.next_run = Some(job.last_run.unwrap_or(job.created_at));
        }
        debug!(path = %path.display(), count = jobs.len(), "Job queue loaded");
        Self {
            path: Some(path),
            jobs: RwLock::new(jobs),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Rewrite the file from `jobs`. Caller holds the write lock.
    async fn flush(&self, jobs: &BTreeMap<String, ScheduledJob>) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let persistence = |what: &str, e: &dyn std::fmt::Display| {
            SchedulerError::Persistence(format!("{what}: {e}"))
        };

        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence("create job directory", &e))?;
        }

        let mut content = String::new();
        for job in jobs.values() {
            let line = serde_json::to_string(job).map_err(|e| persistence("serialize job", &e))?;
            content.push_str(&line);
            content.push('\n');
        }

        let tmp = path.with_extension("jsonl.tmp");
        tokio::fs::write(&tmp, content)
            .await
            .map_err(|e| persistence("write job file", &e))?;
        tokio::fs::rename(&tmp, path)
            .await
            .map_err(|e| persistence("replace job file", &e))?;
        Ok(())
    }
}

fn load_jsonl(path: &Path) -> BTreeMap<String, ScheduledJob> {
    let Ok(content) = std::fs::read_to_string(path) else {
        return BTreeMap::new();
    };

    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str::<ScheduledJob>(line) {
            Ok(job) => Some((job.id.clone(), job)),
            Err(e) => {
                warn!(error = %e, "Skipping corrupted job record");
                None
            }
        })
        .collect()
}

#[async_trait]
impl JobQueue for FileJobQueue {
    async fn insert(&self, job: ScheduledJob) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        jobs.insert(job.id.clone(), job);
        self.flush(&jobs).await
    }

    async fn get(&self, job_id: &str) -> Result<Option<ScheduledJob>> {
        Ok(self.jobs.read().await.get(job_id).cloned())
    }

    async fn list(&self) -> Result<Vec<ScheduledJob>> {
        let mut jobs: Vec<_> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(jobs)
    }

    async fn remove(&self, job_id: &str) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        if jobs.remove(job_id).is_none() {
            return Ok(false);
        }
        self.flush(&jobs).await?;
        Ok(true)
    }

    async fn set_paused(&self, job_id: &str, paused: bool) -> Result<bool> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(false);
        };
        job.paused = paused;
        self.flush(&jobs).await?;
        Ok(true)
    }

    async fn due(&self, now: DateTime<Utc>) -> Result<Vec<ScheduledJob>> {
        let jobs = self.jobs.read().await;
        Ok(jobs
            .values()
            .filter(|job| !job.paused && job.next_run.is_some_and(|at| at <= now))
            .cloned()
            .collect())
    }

    async fn mark_fired(&self, job_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledJob>> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };
        if job.next_run.is_none() {
            return Ok(None);
        }
        let snapshot = fire(job, now);
        self.flush(&jobs).await?;
        Ok(Some(snapshot))
    }

    async fn claim(&self, job_id: &str, now: DateTime<Utc>) -> Result<Option<ScheduledJob>> {
        let mut jobs = self.jobs.write().await;
        let Some(job) = jobs.get_mut(job_id) else {
            return Ok(None);
        };
        if job.paused || !job.next_run.is_some_and(|at| at <= now) {
            debug!(job_id, paused = job.paused, "Job no longer due, not firing");
            return Ok(None);
        }
        let snapshot = fire(job, now);
        self.flush(&jobs).await?;
        Ok(Some(snapshot))
    }

    async fn complete(&self, job_id: &str) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        if !jobs.get(job_id).is_some_and(|job| job.next_run.is_none()) {
            return Ok(());
        }
        jobs.remove(job_id);
        debug!(job_id, "One-off job retired");
        self.flush(&jobs).await
    }
}

/// Stamp a firing on `job` and re-arm it; one-off jobs end up in flight.
fn fire(job: &mut ScheduledJob, now: DateTime<Utc>) -> ScheduledJob {
    job.last_run = Some(now);
    job.run_count += 1;
    job.next_run = trigger::next_run(&job.trigger, now);
    job.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use deskhand_core::schedule::Trigger;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, 1, 12, 0, 0).unwrap()
    }

    fn job(id: &str, trigger: Trigger, next_run: DateTime<Utc>) -> ScheduledJob {
        ScheduledJob {
            id: id.into(),
            prompt: format!("prompt for {id}"),
            trigger,
            session_id: "alice".into(),
            use_react_loop: true,
            max_iterations: 5,
            timeout_seconds: 60.0,
            paused: false,
            created_at: t0(),
            next_run: Some(next_run),
            last_run: None,
            run_count: 0,
        }
    }

    #[tokio::test]
    async fn due_skips_paused_and_future() {
        let queue = FileJobQueue::in_memory();
        let every_minute = Trigger::Interval { seconds: 60 };
        queue.insert(job("due", every_minute.clone(), t0())).await.unwrap();
        queue
            .insert(job("later", every_minute.clone(), t0() + Duration::hours(1)))
            .await
            .unwrap();
        queue.insert(job("paused", every_minute, t0())).await.unwrap();
        assert!(queue.set_paused("paused", true).await.unwrap());

        let due: Vec<_> = queue.due(t0()).await.unwrap().into_iter().map(|j| j.id).collect();
        assert_eq!(due, vec!["due"]);
        assert!(!queue.set_paused("ghost", true).await.unwrap());
    }

    #[tokio::test]
    async fn interval_job_is_rearmed() {
        let queue = FileJobQueue::in_memory();
        queue
            .insert(job("j", Trigger::Interval { seconds: 300 }, t0()))
            .await
            .unwrap();

        let fired = queue.mark_fired("j", t0()).await.unwrap().unwrap();
        assert_eq!(fired.run_count, 1);
        assert_eq!(fired.last_run, Some(t0()));
        assert_eq!(fired.next_run, Some(t0() + Duration::seconds(300)));
        assert!(queue.due(t0()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn date_job_is_retired_once_its_run_completes() {
        let queue = FileJobQueue::in_memory();
        queue
            .insert(job("once", Trigger::Date { run_at: t0() }, t0()))
            .await
            .unwrap();

        let fired = queue.mark_fired("once", t0()).await.unwrap().unwrap();
        assert_eq!(fired.next_run, None);
        // In flight: still stored, not due, cannot fire twice.
        assert!(queue.get("once").await.unwrap().is_some());
        assert!(queue.due(t0()).await.unwrap().is_empty());
        assert!(queue.mark_fired("once", t0()).await.unwrap().is_none());

        queue.complete("once").await.unwrap();
        assert!(queue.get("once").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn complete_keeps_recurring_jobs() {
        let queue = FileJobQueue::in_memory();
        queue
            .insert(job("j", Trigger::Interval { seconds: 60 }, t0()))
            .await
            .unwrap();
        queue.mark_fired("j", t0()).await.unwrap();
        queue.complete("j").await.unwrap();
        queue.complete("missing").await.unwrap();
        assert!(queue.get("j").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn interrupted_one_off_fires_again_after_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");

        {
            let queue = FileJobQueue::open(&path);
            queue
                .insert(job("once", Trigger::Date { run_at: t0() }, t0()))
                .await
                .unwrap();
            // Fired, then the process dies before the run completes.
            queue.claim("once", t0()).await.unwrap().unwrap();
        }

        let reopened = FileJobQueue::open(&path);
        let due = reopened.due(t0() + Duration::minutes(1)).await.unwrap();
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].id, "once");
        assert_eq!(due[0].next_run, Some(t0()));

        let refired = reopened.claim("once", t0() + Duration::minutes(1)).await.unwrap().unwrap();
        assert_eq!(refired.run_count, 2);
        reopened.complete("once").await.unwrap();
        assert!(FileJobQueue::open(&path).list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn claim_skips_jobs_paused_or_no_longer_due() {
        let queue = FileJobQueue::in_memory();
        queue
            .insert(job("j", Trigger::Interval { seconds: 60 }, t0()))
            .await
            .unwrap();
        let due = queue.due(t0()).await.unwrap();
        assert_eq!(due.len(), 1);

        // Paused between the due scan and the claim.
        queue.set_paused("j", true).await.unwrap();
        assert!(queue.claim("j", t0()).await.unwrap().is_none());
        assert_eq!(queue.get("j").await.unwrap().unwrap().run_count, 0);

        queue.set_paused("j", false).await.unwrap();
        assert!(queue.claim("j", t0()).await.unwrap().is_some());
        // Re-armed into the future by the first claim.
        assert!(queue.claim("j", t0()).await.unwrap().is_none());
        assert!(queue.claim("missing", t0()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn jobs_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");

        {
            let queue = FileJobQueue::open(&path);
            queue
                .insert(job("keep", Trigger::Cron { expression: "0 9 * * *".into() }, t0()))
                .await
                .unwrap();
            queue
                .insert(job("drop", Trigger::Interval { seconds: 10 }, t0()))
                .await
                .unwrap();
            assert!(queue.remove("drop").await.unwrap());
            assert!(!queue.remove("drop").await.unwrap());
        }

        let reopened = FileJobQueue::open(&path);
        let jobs = reopened.list().await.unwrap();
        assert_eq!(jobs.len(), 1);
        assert_eq!(jobs[0].id, "keep");
        assert_eq!(jobs[0].trigger.kind(), "cron");
        // Missed while down: due on the first poll.
        assert_eq!(reopened.due(t0() + Duration::days(1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn corrupted_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jobs.jsonl");
        let good = serde_json::to_string(&job("ok", Trigger::Interval { seconds: 5 }, t0())).unwrap();
        std::fs::write(&path, format!("{{broken\n{good}\n\n")).unwrap();

        let queue = FileJobQueue::open(&path);
        assert_eq!(queue.list().await.unwrap().len(), 1);
    }
}
