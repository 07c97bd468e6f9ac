//! Notification queue models
//!
//! Durable queue items for task-outcome notifications. Items are not owned
//! by a task and survive task deletion.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Delivery channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Telegram,
    Wecom,
}

impl std::fmt::Display for ChannelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Telegram => write!(f, "telegram"),
            Self::Wecom => write!(f, "wecom"),
        }
    }
}

impl std::str::FromStr for ChannelType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(Self::Telegram),
            "wecom" => Ok(Self::Wecom),
            _ => Err(anyhow::anyhow!("Invalid channel type: {s}")),
        }
    }
}

/// Message template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateType {
    TaskCompleted,
    TaskFailed,
}

impl std::fmt::Display for TemplateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TaskCompleted => write!(f, "task_completed"),
            Self::TaskFailed => write!(f, "task_failed"),
        }
    }
}

impl std::str::FromStr for TemplateType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "task_completed" => Ok(Self::TaskCompleted),
            "task_failed" => Ok(Self::TaskFailed),
            _ => Err(anyhow::anyhow!("Invalid template type: {s}")),
        }
    }
}

/// Queue item status. Transitions form a DAG:
/// pending → processing → (sent | pending-with-retry | failed).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl std::fmt::Display for NotificationStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Processing => write!(f, "processing"),
            Self::Sent => write!(f, "sent"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl std::str::FromStr for NotificationStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "processing" => Ok(Self::Processing),
            "sent" => Ok(Self::Sent),
            "failed" => Ok(Self::Failed),
            _ => Err(anyhow::anyhow!("Invalid notification status: {s}")),
        }
    }
}

/// Notification queue item model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationQueueItem {
    pub id: Uuid,
    pub channel_type: ChannelType,
    pub template_type: TemplateType,
    /// JSON-encoded task result payload.
    pub payload: serde_json::Value,
    pub status: NotificationStatus,
    pub retry_count: i32,
    pub next_retry_time: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationQueueItem {
    /// Eligibility predicate: pending and due.
    #[must_use]
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == NotificationStatus::Pending
            && self.next_retry_time.map_or(true, |t| t <= now)
    }

    /// Sort key for the consumer: retry-due items preempt fresh ones.
    #[must_use]
    pub fn order_key(&self) -> DateTime<Utc> {
        self.next_retry_time.unwrap_or(self.created_at)
    }
}

/// The template vocabulary: a fully populated task result.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskResultPayload {
    pub task_name: String,
    pub status: String,
    pub duration: i64,
    pub source_path: String,
    pub target_path: String,
    pub total_file: i64,
    pub generated_file: i64,
    pub skip_file: i64,
    pub metadata_count: i64,
    pub subtitle_count: i64,
    pub metadata_downloaded: i64,
    pub subtitle_downloaded: i64,
    pub failed_count: i64,
    pub error_message: String,
    pub event_time: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(
        status: NotificationStatus,
        next_retry_time: Option<DateTime<Utc>>,
    ) -> NotificationQueueItem {
        NotificationQueueItem {
            id: Uuid::new_v4(),
            channel_type: ChannelType::Telegram,
            template_type: TemplateType::TaskCompleted,
            payload: serde_json::json!({}),
            status,
            retry_count: 0,
            next_retry_time,
            error_message: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_eligibility() {
        let now = Utc::now();
        assert!(item(NotificationStatus::Pending, None).is_eligible(now));
        assert!(item(
            NotificationStatus::Pending,
            Some(now - chrono::Duration::seconds(1))
        )
        .is_eligible(now));
        assert!(!item(
            NotificationStatus::Pending,
            Some(now + chrono::Duration::seconds(60))
        )
        .is_eligible(now));
        assert!(!item(NotificationStatus::Processing, None).is_eligible(now));
        assert!(!item(NotificationStatus::Sent, None).is_eligible(now));
    }

    #[test]
    fn test_order_key_prefers_retry_time() {
        let now = Utc::now();
        let fresh = item(NotificationStatus::Pending, None);
        let overdue = item(
            NotificationStatus::Pending,
            Some(now - chrono::Duration::minutes(5)),
        );
        assert!(overdue.order_key() < fresh.order_key());
    }

    #[test]
    fn test_enum_round_trips() {
        assert_eq!(
            "telegram".parse::<ChannelType>().unwrap(),
            ChannelType::Telegram
        );
        assert_eq!(
            "task_failed".parse::<TemplateType>().unwrap(),
            TemplateType::TaskFailed
        );
        assert_eq!(
            "pending".parse::<NotificationStatus>().unwrap(),
            NotificationStatus::Pending
        );
    }
}
