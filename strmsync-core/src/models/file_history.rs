//! File history models
//!
//! One record per output file. Lookup is by content hash when the source
//! provides one, else by the `(source_path, file_name, file_size, file_type)`
//! composite; re-running a task updates the existing record in place.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::{FileHistoryId, TaskId, TaskLogId};

/// Output file category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FileType {
    Media,
    Metadata,
    Subtitle,
    Other,
}

impl std::fmt::Display for FileType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Media => write!(f, "media"),
            Self::Metadata => write!(f, "metadata"),
            Self::Subtitle => write!(f, "subtitle"),
            Self::Other => write!(f, "other"),
        }
    }
}

impl std::str::FromStr for FileType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "media" => Ok(Self::Media),
            "metadata" => Ok(Self::Metadata),
            "subtitle" => Ok(Self::Subtitle),
            "other" => Ok(Self::Other),
            _ => Err(anyhow::anyhow!("Invalid file type: {s}")),
        }
    }
}

/// File history model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileHistory {
    pub id: FileHistoryId,
    pub task_id: TaskId,
    /// Absent for webhook-driven per-file operations, which run outside any
    /// task execution.
    pub task_log_id: Option<TaskLogId>,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub file_suffix: String,
    pub is_main_file: bool,
    pub main_file_id: Option<FileHistoryId>,
    /// Content fingerprint when provided by the source; authoritative for
    /// lookup when present.
    pub hash: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// New record, before the lookup-then-update discipline assigns identity.
#[derive(Debug, Clone)]
pub struct NewFileHistory {
    pub task_id: TaskId,
    pub task_log_id: Option<TaskLogId>,
    pub file_name: String,
    pub source_path: String,
    pub target_file_path: String,
    pub file_size: i64,
    pub file_type: FileType,
    pub file_suffix: String,
    pub is_main_file: bool,
    pub main_file_id: Option<FileHistoryId>,
    pub hash: Option<String>,
    pub modified_at: Option<DateTime<Utc>>,
}

/// Per-type counts produced by the validation summary query.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ValidationSummary {
    pub total: i64,
    pub media: i64,
    pub metadata: i64,
    pub subtitle: i64,
    pub other: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_file_type_round_trip() {
        for ft in [
            FileType::Media,
            FileType::Metadata,
            FileType::Subtitle,
            FileType::Other,
        ] {
            assert_eq!(ft.to_string().parse::<FileType>().unwrap(), ft);
        }
        assert!("artwork".parse::<FileType>().is_err());
    }
}
