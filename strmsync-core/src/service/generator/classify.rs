//! File classification
//!
//! Classifies listing entries into media, metadata, subtitle, or other by
//! extension (case-insensitive) and by the fixed companion-file naming
//! schemes of movie and TV-show libraries.

use std::collections::HashSet;

use strmsync_sources::FileEntry;

use crate::models::{MediaType, StrmOptions, Task};

/// Outcome of classifying a single non-directory entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileClass {
    Media,
    Metadata,
    Subtitle,
    Other,
}

/// Pre-computed suffix sets for one task execution.
#[derive(Debug, Clone)]
pub struct Classifier {
    media_suffixes: HashSet<String>,
    metadata_suffixes: HashSet<String>,
    subtitle_suffixes: HashSet<String>,
    media_type: MediaType,
    download_metadata: bool,
    download_subtitle: bool,
}

/// Split a comma-joined extension list into a lower-cased set.
fn suffix_set(joined: &str) -> HashSet<String> {
    joined
        .split(',')
        .map(|s| s.trim().trim_start_matches('.').to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Fixed artwork names shared by both library kinds.
const ARTWORK_NAMES: &[&str] = &[
    "poster.jpg",
    "poster.png",
    "backdrop.jpg",
    "backdrop.png",
    "banner.jpg",
    "banner.png",
    "thumb.jpg",
    "thumb.png",
    "fanart.jpg",
    "fanart.png",
    "clearart.png",
    "logo.png",
    "disc.png",
];

/// Does the (lower-cased) file name belong to the predefined naming scheme
/// for the library kind?
fn matches_naming_scheme(name_lower: &str, media_type: MediaType) -> bool {
    if ARTWORK_NAMES.contains(&name_lower) {
        return true;
    }
    match media_type {
        MediaType::Movie => name_lower == "movie.nfo",
        MediaType::Tvshow => {
            if name_lower == "tvshow.nfo" || name_lower == "season.nfo" {
                return true;
            }
            // Season-level artwork: season01-poster.jpg, season-specials-banner.png, ...
            if name_lower.starts_with("season")
                && (name_lower.ends_with(".jpg") || name_lower.ends_with(".png"))
            {
                return true;
            }
            // Per-episode companions.
            name_lower.ends_with(".nfo")
                || name_lower.ends_with("-thumb.jpg")
                || name_lower.ends_with("-fanart.jpg")
        }
    }
}

impl Classifier {
    /// Build the classifier for a task. The task's own suffix list overrides
    /// the global STRM default when non-empty.
    #[must_use]
    pub fn new(task: &Task, options: &StrmOptions) -> Self {
        let media_joined = if task.file_suffix.trim().is_empty() {
            &options.default_suffix
        } else {
            &task.file_suffix
        };
        Self {
            media_suffixes: suffix_set(media_joined),
            metadata_suffixes: suffix_set(&task.metadata_extensions),
            subtitle_suffixes: suffix_set(&task.subtitle_extensions),
            media_type: task.media_type,
            download_metadata: task.download_metadata,
            download_subtitle: task.download_subtitle,
        }
    }

    /// Classify one non-directory entry.
    #[must_use]
    pub fn classify(&self, entry: &FileEntry) -> FileClass {
        let extension = entry.extension();
        if self.media_suffixes.contains(&extension) {
            return FileClass::Media;
        }

        let name_lower = entry.name.to_lowercase();
        if self.download_metadata
            && (self.metadata_suffixes.contains(&extension)
                || matches_naming_scheme(&name_lower, self.media_type))
        {
            return FileClass::Metadata;
        }

        if self.download_subtitle && self.subtitle_suffixes.contains(&extension) {
            return FileClass::Subtitle;
        }

        FileClass::Other
    }
}

/// Subtitle pairing: a subtitle is kept only when some media entry in the
/// same directory shares its stem — `S01E01.en.srt` pairs with
/// `S01E01.mkv`, `random.srt` does not.
#[must_use]
pub fn subtitle_is_paired(subtitle_base: &str, media_bases: &[&str]) -> bool {
    media_bases
        .iter()
        .any(|media| subtitle_base.starts_with(media))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use crate::models::{ConfigType, TaskId};

    fn entry(name: &str) -> FileEntry {
        FileEntry {
            name: name.to_string(),
            size: 1024,
            is_dir: false,
            modified: None,
            sign: None,
            hash_sha1: None,
        }
    }

    fn task(media_type: MediaType) -> Task {
        Task {
            id: TaskId::new(),
            name: "test".to_string(),
            media_type,
            source_path: "/src".to_string(),
            target_path: "/tgt".to_string(),
            config_type: ConfigType::Cloud,
            file_suffix: String::new(),
            metadata_extensions: "nfo,jpg".to_string(),
            subtitle_extensions: "srt,ass".to_string(),
            download_metadata: true,
            download_subtitle: true,
            overwrite: false,
            enabled: true,
            cron: String::new(),
            running: false,
            last_run_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_media_classification_is_case_insensitive() {
        let classifier = Classifier::new(&task(MediaType::Movie), &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("Movie.MKV")), FileClass::Media);
        assert_eq!(classifier.classify(&entry("movie.mp4")), FileClass::Media);
    }

    #[test]
    fn test_metadata_by_extension_and_scheme() {
        let classifier = Classifier::new(&task(MediaType::Movie), &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("movie.nfo")), FileClass::Metadata);
        assert_eq!(classifier.classify(&entry("poster.jpg")), FileClass::Metadata);
        // In the scheme even though "png" is not in the extension list.
        assert_eq!(classifier.classify(&entry("logo.png")), FileClass::Metadata);
        assert_eq!(classifier.classify(&entry("readme.txt")), FileClass::Other);
    }

    #[test]
    fn test_metadata_disabled_falls_through() {
        let mut t = task(MediaType::Movie);
        t.download_metadata = false;
        let classifier = Classifier::new(&t, &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("movie.nfo")), FileClass::Other);
    }

    #[test]
    fn test_tvshow_scheme() {
        let classifier = Classifier::new(&task(MediaType::Tvshow), &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("tvshow.nfo")), FileClass::Metadata);
        assert_eq!(classifier.classify(&entry("season.nfo")), FileClass::Metadata);
        assert_eq!(
            classifier.classify(&entry("season01-poster.jpg")),
            FileClass::Metadata
        );
        assert_eq!(
            classifier.classify(&entry("S01E01-thumb.jpg")),
            FileClass::Metadata
        );
        assert_eq!(
            classifier.classify(&entry("S01E01.nfo")),
            FileClass::Metadata
        );
    }

    #[test]
    fn test_subtitle_classification() {
        let classifier = Classifier::new(&task(MediaType::Tvshow), &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("S01E01.en.srt")), FileClass::Subtitle);

        let mut t = task(MediaType::Tvshow);
        t.subtitle_extensions = String::new();
        let classifier = Classifier::new(&t, &StrmOptions::default());
        // Empty subtitle extension list yields zero subtitle classifications
        // even with downloads enabled.
        assert_eq!(classifier.classify(&entry("S01E01.en.srt")), FileClass::Other);
    }

    #[test]
    fn test_task_suffix_overrides_default() {
        let mut t = task(MediaType::Movie);
        t.file_suffix = "mkv".to_string();
        let classifier = Classifier::new(&t, &StrmOptions::default());
        assert_eq!(classifier.classify(&entry("a.mkv")), FileClass::Media);
        assert_eq!(classifier.classify(&entry("a.mp4")), FileClass::Other);
    }

    #[test]
    fn test_subtitle_pairing() {
        let media = vec!["S01E01", "S01E02"];
        assert!(subtitle_is_paired("S01E01", &media));
        assert!(subtitle_is_paired("S01E01.en", &media));
        assert!(!subtitle_is_paired("random", &media));
        assert!(!subtitle_is_paired("", &["S01E01"]));
    }

    #[test]
    fn test_suffix_set_trims_dots_and_spaces() {
        let set = suffix_set(" .mp4, MKV , ,avi");
        assert!(set.contains("mp4"));
        assert!(set.contains("mkv"));
        assert!(set.contains("avi"));
        assert_eq!(set.len(), 3);
    }
}
