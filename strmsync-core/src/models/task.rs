//! Task models
//!
//! A task binds a remote source prefix to a local target directory, a filter
//! policy, and a recurrence rule.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::id::TaskId;

/// Library kind a task mirrors. Drives the companion-file naming scheme.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaType {
    Movie,
    Tvshow,
}

impl std::fmt::Display for MediaType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Movie => write!(f, "movie"),
            Self::Tvshow => write!(f, "tvshow"),
        }
    }
}

impl std::str::FromStr for MediaType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "movie" => Ok(Self::Movie),
            "tvshow" => Ok(Self::Tvshow),
            _ => Err(anyhow::anyhow!("Invalid media type: {s}")),
        }
    }
}

/// Which source adapter variant serves this task.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConfigType {
    Cloud,
    Local,
}

impl std::fmt::Display for ConfigType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cloud => write!(f, "cloud"),
            Self::Local => write!(f, "local"),
        }
    }
}

impl std::str::FromStr for ConfigType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cloud" => Ok(Self::Cloud),
            "local" => Ok(Self::Local),
            _ => Err(anyhow::anyhow!("Invalid config type: {s}")),
        }
    }
}

/// Task model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub media_type: MediaType,
    pub source_path: String,
    pub target_path: String,
    pub config_type: ConfigType,
    /// Comma-joined video extensions overriding the global STRM suffix list
    /// when non-empty.
    pub file_suffix: String,
    pub metadata_extensions: String,
    pub subtitle_extensions: String,
    pub download_metadata: bool,
    pub download_subtitle: bool,
    pub overwrite: bool,
    pub enabled: bool,
    pub cron: String,
    /// True iff the generator holds a live execution for this task.
    /// Reset on process restart.
    pub running: bool,
    pub last_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Create task request
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub media_type: MediaType,
    pub source_path: String,
    pub target_path: String,
    pub config_type: ConfigType,
    #[serde(default)]
    pub file_suffix: String,
    #[serde(default)]
    pub metadata_extensions: String,
    #[serde(default)]
    pub subtitle_extensions: String,
    #[serde(default)]
    pub download_metadata: bool,
    #[serde(default)]
    pub download_subtitle: bool,
    #[serde(default)]
    pub overwrite: bool,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub cron: String,
}

const fn default_enabled() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_media_type_round_trip() {
        assert_eq!(MediaType::Movie.to_string(), "movie");
        assert_eq!("tvshow".parse::<MediaType>().unwrap(), MediaType::Tvshow);
        assert!("music".parse::<MediaType>().is_err());
    }

    #[test]
    fn test_config_type_round_trip() {
        assert_eq!(ConfigType::Cloud.to_string(), "cloud");
        assert_eq!("local".parse::<ConfigType>().unwrap(), ConfigType::Local);
        assert!("ftp".parse::<ConfigType>().is_err());
    }
}
