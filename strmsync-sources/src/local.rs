//! Local-filesystem source adapter

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::adapter::{join_path, SourceAdapter};
use crate::error::SourceError;
use crate::types::FileEntry;

/// Source adapter over a local directory tree. Listings report real file
/// metadata; `file_url` returns the absolute local path so stubs and
/// downloads reference the filesystem directly.
pub struct LocalSourceAdapter;

impl LocalSourceAdapter {
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for LocalSourceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for LocalSourceAdapter {
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SourceError> {
        let mut entries = Vec::new();
        let mut dir = tokio::fs::read_dir(path).await?;
        while let Some(item) = dir.next_entry().await? {
            let metadata = item.metadata().await?;
            let modified = metadata
                .modified()
                .ok()
                .map(DateTime::<Utc>::from);
            entries.push(FileEntry {
                name: item.file_name().to_string_lossy().into_owned(),
                size: metadata.len() as i64,
                is_dir: metadata.is_dir(),
                modified,
                sign: None,
                hash_sha1: None,
            });
        }
        // Listings come back in OS order; keep traversal deterministic.
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn file_url(
        &self,
        dir_path: &str,
        file_name: &str,
        _sign: Option<&str>,
        _url_encode: bool,
    ) -> Result<String, SourceError> {
        Ok(join_path(dir_path, file_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_list_local_directory() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.mp4"), b"xx").await.unwrap();
        tokio::fs::write(dir.path().join("a.nfo"), b"x").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let adapter = LocalSourceAdapter::new();
        let entries = adapter.list(dir.path().to_str().unwrap()).await.unwrap();

        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].name, "a.nfo");
        assert_eq!(entries[0].size, 1);
        assert!(!entries[0].is_dir);
        assert!(entries[0].modified.is_some());
        assert_eq!(entries[1].name, "b.mp4");
        assert!(entries[2].is_dir);
    }

    #[tokio::test]
    async fn test_file_url_is_local_path() {
        let adapter = LocalSourceAdapter::new();
        let url = adapter
            .file_url("/data/movies", "a.mp4", Some("ignored"), true)
            .await
            .unwrap();
        assert_eq!(url, "/data/movies/a.mp4");
    }

    #[tokio::test]
    async fn test_missing_directory_errors() {
        let adapter = LocalSourceAdapter::new();
        assert!(adapter.list("/definitely/not/here").await.is_err());
    }
}
