//! Task log models
//!
//! One row per task execution, carrying running counters and the final
//! status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{TaskId, TaskLogId};

/// Execution status. `Running` rows have no end time; the status field is
/// the authoritative terminal state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for TaskStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid task status: {s}")),
        }
    }
}

/// Task log model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskLog {
    pub id: TaskLogId,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub message: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    /// Seconds between start and end.
    pub duration: i64,
    pub total_file: i64,
    pub generated_file: i64,
    pub skip_file: i64,
    pub overwrite_file: i64,
    pub metadata_count: i64,
    pub subtitle_count: i64,
    pub metadata_downloaded: i64,
    pub subtitle_downloaded: i64,
    pub failed_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Additive counter delta applied through the partial-update path.
/// Counters only ever increase, which keeps every TaskLog counter monotone
/// during a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CounterDelta {
    pub total_file: i64,
    pub generated_file: i64,
    pub skip_file: i64,
    pub overwrite_file: i64,
    pub metadata_count: i64,
    pub subtitle_count: i64,
    pub metadata_downloaded: i64,
    pub subtitle_downloaded: i64,
    pub failed_count: i64,
}

impl CounterDelta {
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::default()
    }
}

/// Aggregate over task logs, scoped by a time range.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FileProcessingStats {
    pub total_file: i64,
    pub generated_file: i64,
    pub skip_file: i64,
    pub metadata_downloaded: i64,
    pub subtitle_downloaded: i64,
    pub failed_count: i64,
}

/// Time range for the stats queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StatsRange {
    Day,
    Month,
    Year,
}

impl StatsRange {
    /// Start of the range, measured back from `now`.
    #[must_use]
    pub fn since(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Day => now - chrono::Duration::days(1),
            Self::Month => now - chrono::Duration::days(30),
            Self::Year => now - chrono::Duration::days(365),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip() {
        assert_eq!(TaskStatus::Running.to_string(), "running");
        assert_eq!("failed".parse::<TaskStatus>().unwrap(), TaskStatus::Failed);
        assert!("paused".parse::<TaskStatus>().is_err());
    }

    #[test]
    fn test_counter_delta_zero() {
        assert!(CounterDelta::default().is_zero());
        let delta = CounterDelta {
            generated_file: 1,
            ..Default::default()
        };
        assert!(!delta.is_zero());
    }

    #[test]
    fn test_stats_range_since() {
        let now = Utc::now();
        assert!(StatsRange::Day.since(now) < now);
        assert!(StatsRange::Year.since(now) < StatsRange::Month.since(now));
    }
}
