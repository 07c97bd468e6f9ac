//! Cron scheduler
//!
//! Holds one timer loop per scheduled task. Recurrence expressions are the
//! standard 5-field cron form. On fire the task is re-read from the store
//! so runtime changes to `enabled` are observed; a task that is disabled,
//! already running, or already queued is skipped. The scheduler depends on
//! the task store and the queue only, never on the generator.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use cron::Schedule;
use dashmap::DashMap;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::models::{Task, TaskId};
use crate::repository::TaskRepository;
use crate::service::task_queue::TaskQueue;
use crate::{Error, Result};

struct SchedulerEntry {
    schedule: Schedule,
    handle: JoinHandle<()>,
}

struct SchedulerInner {
    task_repo: TaskRepository,
    queue: TaskQueue,
    entries: DashMap<TaskId, SchedulerEntry>,
}

/// Cron scheduler
#[derive(Clone)]
pub struct CronScheduler {
    inner: Arc<SchedulerInner>,
}

impl std::fmt::Debug for CronScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CronScheduler")
            .field("entries", &self.inner.entries.len())
            .finish_non_exhaustive()
    }
}

/// Parse a 5-field cron expression (minute, hour, day, month, weekday).
///
/// The parser underneath takes a seconds field, so a zero-seconds column is
/// prepended; anything other than five fields is rejected up front.
pub fn parse_cron(expr: &str) -> Result<Schedule> {
    let trimmed = expr.trim();
    if trimmed.split_whitespace().count() != 5 {
        return Err(Error::InvalidInput(format!(
            "cron expression must have 5 fields: '{expr}'"
        )));
    }
    Schedule::from_str(&format!("0 {trimmed}"))
        .map_err(|e| Error::InvalidInput(format!("invalid cron expression '{expr}': {e}")))
}

impl CronScheduler {
    #[must_use]
    pub fn new(task_repo: TaskRepository, queue: TaskQueue) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                task_repo,
                queue,
                entries: DashMap::new(),
            }),
        }
    }

    /// Schedule every enabled task that carries a cron expression.
    pub async fn start(&self) -> Result<()> {
        let tasks = self.inner.task_repo.list_enabled_with_cron().await?;
        let total = tasks.len();
        for task in tasks {
            self.schedule(&task);
        }
        info!(
            "scheduler started: {}/{} tasks scheduled",
            self.inner.entries.len(),
            total
        );
        Ok(())
    }

    /// Register a timer loop for a task. An invalid expression is logged
    /// and skipped; the task remains manually executable.
    pub fn schedule(&self, task: &Task) {
        let schedule = match parse_cron(&task.cron) {
            Ok(schedule) => schedule,
            Err(e) => {
                warn!("task {} not scheduled: {e}", task.id);
                return;
            }
        };

        // Replace any previous entry for this task.
        self.remove(&task.id);

        let task_id = task.id.clone();
        let loop_id = task_id.clone();
        let loop_schedule = schedule.clone();
        let task_repo = self.inner.task_repo.clone();
        let queue = self.inner.queue.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Some(next) = loop_schedule.upcoming(Utc).next() else {
                    break;
                };
                let wait = next - Utc::now();
                let Ok(wait) = wait.to_std() else {
                    // Fire time already passed while computing; try again.
                    continue;
                };
                tokio::time::sleep(wait).await;
                fire(&task_repo, &queue, &loop_id).await;
            }
        });

        self.inner
            .entries
            .insert(task_id, SchedulerEntry { schedule, handle });
        debug!("task {} scheduled with '{}'", task.id, task.cron);
    }

    /// Drop a task's timer loop
    pub fn remove(&self, id: &TaskId) {
        if let Some((_, entry)) = self.inner.entries.remove(id) {
            entry.handle.abort();
            debug!("task {id} unscheduled");
        }
    }

    /// Re-schedule after a task change. Runs asynchronously so callers on
    /// a request path do not wait for entry replacement.
    pub fn update(&self, task: Task) {
        let scheduler = self.clone();
        tokio::spawn(async move {
            scheduler.remove(&task.id);
            if task.enabled && !task.cron.is_empty() {
                scheduler.schedule(&task);
            }
        });
    }

    /// Next fire time of a scheduled task
    #[must_use]
    pub fn next_run(&self, id: &TaskId) -> Option<DateTime<Utc>> {
        self.inner
            .entries
            .get(id)
            .and_then(|entry| entry.schedule.upcoming(Utc).next())
    }

    #[must_use]
    pub fn is_scheduled(&self, id: &TaskId) -> bool {
        self.inner.entries.contains_key(id)
    }

    /// Abort every timer loop
    pub fn stop(&self) {
        for entry in self.inner.entries.iter() {
            entry.value().handle.abort();
        }
        self.inner.entries.clear();
        info!("scheduler stopped");
    }
}

/// One tick: re-read the task and enqueue it unless gated.
async fn fire(task_repo: &TaskRepository, queue: &TaskQueue, id: &TaskId) {
    let task = match task_repo.get_by_id(id).await {
        Ok(Some(task)) => task,
        Ok(None) => {
            warn!("scheduled task {id} no longer exists");
            return;
        }
        Err(e) => {
            warn!("failed to read scheduled task {id}: {e}");
            return;
        }
    };

    if !task.enabled {
        debug!("task {id} disabled, tick skipped");
        return;
    }
    if task.running {
        debug!("task {id} still running, tick skipped");
        return;
    }
    if queue.in_queue(id).await {
        debug!("task {id} already queued, tick skipped");
        return;
    }

    queue.add(id.clone()).await;
    debug!("task {id} enqueued by schedule");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_cron_accepts_five_fields() {
        let schedule = parse_cron("*/5 * * * *").unwrap();
        assert!(schedule.upcoming(Utc).next().is_some());
        assert!(parse_cron("  0 3 * * 1  ").is_ok());
    }

    #[test]
    fn test_parse_cron_rejects_wrong_arity() {
        assert!(parse_cron("").is_err());
        assert!(parse_cron("* * * *").is_err());
        assert!(parse_cron("0 * * * * *").is_err());
    }

    #[test]
    fn test_parse_cron_rejects_garbage() {
        assert!(parse_cron("a b c d e").is_err());
        assert!(parse_cron("61 * * * *").is_err());
    }
}
