//! Task orchestration
//!
//! CRUD over tasks plus the operations the engine components need around
//! them: manual execution, cascade deletion, boot-time recovery, and the
//! stats passthroughs.

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::models::{
    CreateTaskRequest, FileProcessingStats, PageParams, StatsRange, Task, TaskId, TaskLog,
};
use crate::repository::{FileHistoryRepository, TaskLogRepository, TaskRepository};
use crate::service::scheduler::{parse_cron, CronScheduler};
use crate::service::task_queue::TaskQueue;
use crate::{Error, Result};

/// Task service
pub struct TaskService {
    task_repo: TaskRepository,
    task_log_repo: TaskLogRepository,
    history_repo: FileHistoryRepository,
    queue: TaskQueue,
    scheduler: CronScheduler,
}

impl std::fmt::Debug for TaskService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskService").finish_non_exhaustive()
    }
}

impl TaskService {
    #[must_use]
    pub fn new(
        task_repo: TaskRepository,
        task_log_repo: TaskLogRepository,
        history_repo: FileHistoryRepository,
        queue: TaskQueue,
        scheduler: CronScheduler,
    ) -> Self {
        Self {
            task_repo,
            task_log_repo,
            history_repo,
            queue,
            scheduler,
        }
    }

    /// Create a task. An invalid cron expression does not reject creation;
    /// the task simply gets no schedule and stays manually runnable.
    pub async fn create(&self, req: &CreateTaskRequest) -> Result<Task> {
        if !req.cron.is_empty() {
            if let Err(e) = parse_cron(&req.cron) {
                warn!("task '{}' created without schedule: {e}", req.name);
            }
        }

        let task = self.task_repo.create(req).await?;
        if task.enabled && !task.cron.is_empty() {
            self.scheduler.schedule(&task);
        }
        info!("task {} ({}) created", task.id, task.name);
        Ok(task)
    }

    /// Update a task and refresh its schedule.
    pub async fn update(&self, task: &Task) -> Result<Task> {
        let updated = self.task_repo.update(task).await?;
        self.scheduler.update(updated.clone());
        Ok(updated)
    }

    /// Delete a task with its logs and history. Refused while running.
    pub async fn delete(&self, id: &TaskId) -> Result<()> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if task.running {
            return Err(Error::TaskRunning);
        }

        self.scheduler.remove(id);
        self.queue.remove(id).await;

        let logs = self.task_log_repo.delete_by_task_id(id).await?;
        let histories = self.history_repo.delete_by_task_id(id).await?;
        self.task_repo.delete(id).await?;
        info!(
            "task {id} deleted ({logs} logs, {histories} history rows)"
        );
        Ok(())
    }

    /// Queue a manual execution. A task that is already running is
    /// refused; one already queued is left as-is.
    pub async fn execute_now(&self, id: &TaskId) -> Result<()> {
        let task = self
            .task_repo
            .get_by_id(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("task {id}")))?;
        if task.running {
            return Err(Error::TaskRunning);
        }
        if self.queue.add(id.clone()).await {
            info!("task {id} queued for manual execution");
        }
        Ok(())
    }

    pub async fn get(&self, id: &TaskId) -> Result<Option<Task>> {
        self.task_repo.get_by_id(id).await
    }

    pub async fn list(&self) -> Result<Vec<Task>> {
        self.task_repo.list_all().await
    }

    pub async fn logs(&self, id: &TaskId, params: &PageParams) -> Result<Vec<TaskLog>> {
        self.task_log_repo.list_by_task_id(id, params).await
    }

    /// Next scheduled fire time, when the task carries a schedule.
    #[must_use]
    pub fn next_run(&self, id: &TaskId) -> Option<DateTime<Utc>> {
        self.scheduler.next_run(id)
    }

    /// Clear stale running flags left behind by a previous process. Task
    /// logs stuck in `running` are left as-is for external cleanup.
    pub async fn reset_running_flags(&self) -> Result<()> {
        let reset = self.task_repo.reset_running_flags().await?;
        if reset > 0 {
            warn!("reset {reset} stale running flags at boot");
        }
        Ok(())
    }

    pub async fn success_count(&self, range: StatsRange) -> Result<i64> {
        self.task_log_repo.success_count(range).await
    }

    pub async fn failed_count(&self, range: StatsRange) -> Result<i64> {
        self.task_log_repo.failed_count(range).await
    }

    pub async fn file_processing_stats(&self, range: StatsRange) -> Result<FileProcessingStats> {
        self.task_log_repo.file_processing_stats(range).await
    }
}
