//! Per-run processing counters
//!
//! Shared by the scanner, the stub workers, and the download drain. Writes
//! are batched: the pending delta is flushed to the task log every 10
//! processed files or every 100 generated stubs, plus a final flush at the
//! terminal update.

use parking_lot::Mutex;
use tracing::warn;

use crate::models::{CounterDelta, TaskLogId};
use crate::repository::TaskLogRepository;

const FLUSH_EVERY_PROCESSED: u32 = 10;
const FLUSH_EVERY_GENERATED: u32 = 100;

/// Running counters, split by companion category so the log-level
/// `skip_file` aggregate can be computed.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunCounters {
    pub total_file: i64,
    pub generated_file: i64,
    pub overwrite_file: i64,
    pub media_skipped: i64,
    pub metadata_count: i64,
    pub subtitle_count: i64,
    pub metadata_downloaded: i64,
    pub subtitle_downloaded: i64,
    pub metadata_skipped: i64,
    pub subtitle_skipped: i64,
    pub other_skipped: i64,
    pub failed_count: i64,
}

impl RunCounters {
    /// Log-level skip aggregate across all categories.
    #[must_use]
    pub fn skip_file(&self) -> i64 {
        self.media_skipped + self.metadata_skipped + self.subtitle_skipped + self.other_skipped
    }

    fn to_delta(self) -> CounterDelta {
        CounterDelta {
            total_file: self.total_file,
            generated_file: self.generated_file,
            skip_file: self.skip_file(),
            overwrite_file: self.overwrite_file,
            metadata_count: self.metadata_count,
            subtitle_count: self.subtitle_count,
            metadata_downloaded: self.metadata_downloaded,
            subtitle_downloaded: self.subtitle_downloaded,
            failed_count: self.failed_count,
        }
    }

    fn add(&mut self, other: &RunCounters) {
        self.total_file += other.total_file;
        self.generated_file += other.generated_file;
        self.overwrite_file += other.overwrite_file;
        self.media_skipped += other.media_skipped;
        self.metadata_count += other.metadata_count;
        self.subtitle_count += other.subtitle_count;
        self.metadata_downloaded += other.metadata_downloaded;
        self.subtitle_downloaded += other.subtitle_downloaded;
        self.metadata_skipped += other.metadata_skipped;
        self.subtitle_skipped += other.subtitle_skipped;
        self.other_skipped += other.other_skipped;
        self.failed_count += other.failed_count;
    }

    fn is_zero(&self) -> bool {
        self.to_delta().is_zero()
    }
}

#[derive(Default)]
struct PendingState {
    pending: RunCounters,
    cumulative: RunCounters,
    processed_since_flush: u32,
    generated_since_flush: u32,
}

/// Batched counter sink for one task execution.
pub struct ProcessingStats {
    sink: Option<(TaskLogId, TaskLogRepository)>,
    state: Mutex<PendingState>,
}

impl ProcessingStats {
    #[must_use]
    pub fn new(log_id: TaskLogId, repo: TaskLogRepository) -> Self {
        Self {
            sink: Some((log_id, repo)),
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Counters without a task log behind them. Used by webhook-driven
    /// per-file operations, which run outside any execution.
    #[must_use]
    pub fn detached() -> Self {
        Self {
            sink: None,
            state: Mutex::new(PendingState::default()),
        }
    }

    /// Record a counter change; flushes the pending batch when a threshold
    /// is crossed.
    pub async fn record(&self, update: impl FnOnce(&mut RunCounters)) {
        let flush = {
            let mut state = self.state.lock();
            let before_generated = state.pending.generated_file;
            update(&mut state.pending);
            let generated_now = state.pending.generated_file - before_generated;

            state.processed_since_flush += 1;
            state.generated_since_flush += generated_now as u32;

            if state.processed_since_flush >= FLUSH_EVERY_PROCESSED
                || state.generated_since_flush >= FLUSH_EVERY_GENERATED
            {
                Some(Self::take_pending(&mut state))
            } else {
                None
            }
        };

        if let Some(batch) = flush {
            self.apply(batch).await;
        }
    }

    /// Flush whatever is pending.
    pub async fn flush(&self) {
        let batch = {
            let mut state = self.state.lock();
            Self::take_pending(&mut state)
        };
        if !batch.is_zero() {
            self.apply(batch).await;
        }
    }

    /// Totals accumulated over the whole run, pending included.
    #[must_use]
    pub fn snapshot(&self) -> RunCounters {
        let state = self.state.lock();
        let mut totals = state.cumulative;
        totals.add(&state.pending);
        totals
    }

    fn take_pending(state: &mut PendingState) -> RunCounters {
        let batch = state.pending;
        state.cumulative.add(&batch);
        state.pending = RunCounters::default();
        state.processed_since_flush = 0;
        state.generated_since_flush = 0;
        batch
    }

    async fn apply(&self, batch: RunCounters) {
        let Some((log_id, repo)) = &self.sink else {
            return;
        };
        if let Err(e) = repo.apply_delta(log_id, &batch.to_delta()).await {
            warn!("failed to flush counters for log {log_id}: {e}");
        }
    }
}

impl std::fmt::Debug for ProcessingStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingStats")
            .field("attached", &self.sink.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_skip_file_aggregates_categories() {
        let counters = RunCounters {
            media_skipped: 1,
            metadata_skipped: 2,
            subtitle_skipped: 3,
            other_skipped: 4,
            ..Default::default()
        };
        assert_eq!(counters.skip_file(), 10);
        assert_eq!(counters.to_delta().skip_file, 10);
    }

    #[test]
    fn test_add_is_componentwise() {
        let mut a = RunCounters {
            total_file: 1,
            generated_file: 2,
            ..Default::default()
        };
        let b = RunCounters {
            total_file: 3,
            failed_count: 1,
            ..Default::default()
        };
        a.add(&b);
        assert_eq!(a.total_file, 4);
        assert_eq!(a.generated_file, 2);
        assert_eq!(a.failed_count, 1);
    }
}
