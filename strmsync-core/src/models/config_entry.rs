//! Configuration records
//!
//! Typed configuration lives in the `configs` table as opaque JSON strings
//! keyed by a unique code. The registry caches records and parses them into
//! the typed option structs below on demand.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Source adapter config record.
pub const CODE_SOURCE: &str = "source";
/// STRM generation options.
pub const CODE_STRM: &str = "strm";
/// Notification engine settings.
pub const CODE_NOTIFICATION: &str = "notification";
/// Media-server integration.
pub const CODE_MEDIA_SERVER: &str = "media_server";

/// All codes the core knows about, seeded with defaults at boot.
pub const KNOWN_CODES: &[&str] = &[CODE_SOURCE, CODE_STRM, CODE_NOTIFICATION, CODE_MEDIA_SERVER];

/// Config record model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigEntry {
    pub id: Uuid,
    pub code: String,
    pub name: String,
    /// Opaque JSON string, parsed by the component owning the code.
    pub value: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parsed `strm` record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StrmOptions {
    /// Comma-joined media extensions.
    pub default_suffix: String,
    /// Replace the media extension with `.strm` instead of appending.
    pub replace_suffix: bool,
    /// Percent-encode URL path segments in stub bodies.
    pub url_encode: bool,
    /// Minimum media size in MiB; 0 disables the filter.
    pub min_file_size: u64,
}

impl Default for StrmOptions {
    fn default() -> Self {
        Self {
            default_suffix: "mp4,mkv,avi,mov,wmv,flv,webm,ts,m2ts,rmvb,mpg,mpeg,iso".to_string(),
            replace_suffix: true,
            url_encode: false,
            min_file_size: 0,
        }
    }
}

impl StrmOptions {
    /// Size filter threshold in bytes; `None` when filtering is disabled.
    #[must_use]
    pub fn min_file_size_bytes(&self) -> Option<i64> {
        if self.min_file_size == 0 {
            None
        } else {
            Some((self.min_file_size as i64) * 1024 * 1024)
        }
    }
}

/// Parsed `notification` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationOptions {
    pub enabled: bool,
    pub retry_max: Option<i32>,
    /// Seconds between retries.
    pub retry_interval: Option<i64>,
    pub telegram: TelegramOptions,
    pub wecom: WecomOptions,
}

impl NotificationOptions {
    #[must_use]
    pub fn retry_max(&self) -> i32 {
        self.retry_max.unwrap_or(3)
    }

    #[must_use]
    pub fn retry_interval_secs(&self) -> i64 {
        self.retry_interval.unwrap_or(60)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramOptions {
    pub enabled: bool,
    pub bot_token: String,
    pub chat_id: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WecomOptions {
    pub enabled: bool,
    pub webhook_url: String,
}

/// Parsed `media_server` record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MediaServerOptions {
    pub kind: MediaServerKind,
    pub base_url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MediaServerKind {
    #[default]
    None,
    Emby,
    Jellyfin,
}

/// Default raw JSON value for a known code, used to seed missing records.
#[must_use]
pub fn default_value_for(code: &str) -> Option<String> {
    let value = match code {
        CODE_SOURCE => serde_json::json!({
            "domain": "",
            "host": "",
            "token": "",
            "req_interval": 500,
            "req_retry_count": 3,
            "req_retry_interval": 1000,
        }),
        CODE_STRM => serde_json::to_value(StrmOptions::default()).ok()?,
        CODE_NOTIFICATION => serde_json::to_value(NotificationOptions::default()).ok()?,
        CODE_MEDIA_SERVER => serde_json::to_value(MediaServerOptions::default()).ok()?,
        _ => return None,
    };
    serde_json::to_string(&value).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strm_options_defaults() {
        let options: StrmOptions = serde_json::from_str("{}").unwrap();
        assert!(options.replace_suffix);
        assert!(!options.url_encode);
        assert_eq!(options.min_file_size_bytes(), None);
        assert!(options.default_suffix.contains("mkv"));
    }

    #[test]
    fn test_min_file_size_bytes() {
        let options = StrmOptions {
            min_file_size: 100,
            ..Default::default()
        };
        assert_eq!(options.min_file_size_bytes(), Some(100 * 1024 * 1024));
    }

    #[test]
    fn test_notification_option_fallbacks() {
        let options: NotificationOptions = serde_json::from_str("{}").unwrap();
        assert!(!options.enabled);
        assert_eq!(options.retry_max(), 3);
        assert_eq!(options.retry_interval_secs(), 60);
    }

    #[test]
    fn test_default_values_for_known_codes() {
        for code in KNOWN_CODES {
            let value = default_value_for(code).unwrap();
            assert!(serde_json::from_str::<serde_json::Value>(&value).is_ok());
        }
        assert!(default_value_for("unknown").is_none());
    }
}
