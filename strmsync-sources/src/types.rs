//! Shared source types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry reported by a directory listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub name: String,
    pub size: i64,
    pub is_dir: bool,
    pub modified: Option<DateTime<Utc>>,
    /// Access signature appended to download URLs as `?sign=...`.
    pub sign: Option<String>,
    /// Content fingerprint when the backend provides one.
    pub hash_sha1: Option<String>,
}

impl FileEntry {
    /// File name without its last extension.
    #[must_use]
    pub fn base_name(&self) -> &str {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => &self.name[..idx],
            _ => &self.name,
        }
    }

    /// Lower-cased extension without the dot, empty when absent.
    #[must_use]
    pub fn extension(&self) -> String {
        match self.name.rfind('.') {
            Some(idx) if idx > 0 => self.name[idx + 1..].to_lowercase(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 0,
            is_dir: false,
            modified: None,
            sign: None,
            hash_sha1: None,
        }
    }

    #[test]
    fn test_base_name_and_extension() {
        assert_eq!(entry("movie.mp4").base_name(), "movie");
        assert_eq!(entry("movie.mp4").extension(), "mp4");
        assert_eq!(entry("S01E01.en.SRT").base_name(), "S01E01.en");
        assert_eq!(entry("S01E01.en.SRT").extension(), "srt");
        assert_eq!(entry("noext").extension(), "");
        // A leading dot is part of the name, not an extension separator.
        assert_eq!(entry(".hidden").base_name(), ".hidden");
        assert_eq!(entry(".hidden").extension(), "");
    }
}
