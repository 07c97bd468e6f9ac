//! Task queue
//!
//! Single-consumer FIFO of task IDs. `add` de-duplicates pending entries,
//! so a task can never be queued twice; the consumer dispatches at most one
//! new execution per 100 ms. The queue holds only IDs and an executor
//! handle, keeping it free of any scheduling dependency.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{watch, Mutex, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::models::TaskId;

/// Gap between consecutive execution dispatches.
const DISPATCH_INTERVAL: Duration = Duration::from_millis(100);

/// Something that can run a task by ID. Per-task errors are the executor's
/// own to record; the queue only sequences starts.
#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn execute(&self, id: TaskId);
}

struct QueueInner {
    queue: Mutex<VecDeque<TaskId>>,
    notify: Notify,
    active: AtomicUsize,
    shutdown_tx: watch::Sender<bool>,
    consumer: Mutex<Option<JoinHandle<()>>>,
}

/// Single-consumer task queue
#[derive(Clone)]
pub struct TaskQueue {
    inner: Arc<QueueInner>,
}

impl std::fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskQueue")
            .field("active", &self.inner.active.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl TaskQueue {
    #[must_use]
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(QueueInner {
                queue: Mutex::new(VecDeque::new()),
                notify: Notify::new(),
                active: AtomicUsize::new(0),
                shutdown_tx,
                consumer: Mutex::new(None),
            }),
        }
    }

    /// Append a task ID unless it is already pending. Returns whether the
    /// entry was added.
    pub async fn add(&self, id: TaskId) -> bool {
        let mut queue = self.inner.queue.lock().await;
        if queue.contains(&id) {
            debug!("task {id} already queued, skipping");
            return false;
        }
        queue.push_back(id);
        drop(queue);
        self.inner.notify.notify_one();
        true
    }

    /// Drop a pending entry
    pub async fn remove(&self, id: &TaskId) {
        let mut queue = self.inner.queue.lock().await;
        queue.retain(|queued| queued != id);
    }

    pub async fn in_queue(&self, id: &TaskId) -> bool {
        self.inner.queue.lock().await.contains(id)
    }

    pub async fn queue_length(&self) -> usize {
        self.inner.queue.lock().await.len()
    }

    /// True while at least one dispatched execution is still in flight.
    #[must_use]
    pub fn executor_running(&self) -> bool {
        self.inner.active.load(Ordering::SeqCst) > 0
    }

    /// Spawn the consumer loop.
    pub async fn start(&self, executor: Arc<dyn TaskExecutor>) {
        let queue = self.clone();
        let mut shutdown_rx = self.inner.shutdown_tx.subscribe();
        let handle = tokio::spawn(async move {
            info!("task queue consumer started");
            loop {
                if *shutdown_rx.borrow() {
                    break;
                }

                let next = queue.inner.queue.lock().await.pop_front();
                match next {
                    Some(id) => {
                        queue.inner.active.fetch_add(1, Ordering::SeqCst);
                        let executor = Arc::clone(&executor);
                        let counter = queue.clone();
                        tokio::spawn(async move {
                            executor.execute(id).await;
                            counter.inner.active.fetch_sub(1, Ordering::SeqCst);
                        });
                        tokio::time::sleep(DISPATCH_INTERVAL).await;
                    }
                    None => {
                        tokio::select! {
                            _ = queue.inner.notify.notified() => {}
                            _ = shutdown_rx.changed() => break,
                        }
                    }
                }
            }
            info!("task queue consumer stopped");
        });
        *self.inner.consumer.lock().await = Some(handle);
    }

    /// Signal the consumer to exit after its current wait.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        self.inner.notify.notify_one();
        if let Some(handle) = self.inner.consumer.lock().await.take() {
            let _ = handle.await;
        }
    }
}

impl Default for TaskQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct RecordingExecutor {
        seen: StdMutex<Vec<TaskId>>,
    }

    #[async_trait]
    impl TaskExecutor for RecordingExecutor {
        async fn execute(&self, id: TaskId) {
            self.seen.lock().expect("poisoned").push(id);
        }
    }

    fn id(s: &str) -> TaskId {
        TaskId::from_string(s.to_string())
    }

    #[tokio::test]
    async fn test_add_deduplicates() {
        let queue = TaskQueue::new();
        assert!(queue.add(id("a")).await);
        assert!(!queue.add(id("a")).await);
        assert!(queue.add(id("b")).await);
        assert_eq!(queue.queue_length().await, 2);
        assert!(queue.in_queue(&id("a")).await);
    }

    #[tokio::test]
    async fn test_remove_drops_pending_entry() {
        let queue = TaskQueue::new();
        queue.add(id("a")).await;
        queue.add(id("b")).await;
        queue.remove(&id("a")).await;
        assert!(!queue.in_queue(&id("a")).await);
        assert_eq!(queue.queue_length().await, 1);
    }

    #[tokio::test]
    async fn test_consumer_dispatches_in_order() {
        let queue = TaskQueue::new();
        let executor = Arc::new(RecordingExecutor {
            seen: StdMutex::new(Vec::new()),
        });
        queue.start(Arc::clone(&executor) as Arc<dyn TaskExecutor>).await;

        queue.add(id("one")).await;
        queue.add(id("two")).await;

        // Two dispatches are at least 100 ms apart.
        tokio::time::sleep(Duration::from_millis(400)).await;
        queue.shutdown().await;

        let seen = executor.seen.lock().expect("poisoned").clone();
        assert_eq!(seen, vec![id("one"), id("two")]);
        assert!(!queue.executor_running());
    }

    #[tokio::test]
    async fn test_shutdown_stops_consumer() {
        let queue = TaskQueue::new();
        let executor = Arc::new(RecordingExecutor {
            seen: StdMutex::new(Vec::new()),
        });
        queue.start(Arc::clone(&executor) as Arc<dyn TaskExecutor>).await;
        queue.shutdown().await;

        // Entries added after shutdown are never consumed.
        queue.add(id("late")).await;
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(executor.seen.lock().expect("poisoned").is_empty());
        assert_eq!(queue.queue_length().await, 1);
    }
}
