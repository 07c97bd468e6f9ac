//! Source adapter capability
//!
//! Narrow interface over the file-listing backends. The STRM generator and
//! the webhook handler only ever see this trait.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::FileEntry;

/// A polymorphic file-listing backend.
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// List the entries of a directory. The path uses forward slashes and is
    /// absolute within the backend's namespace.
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SourceError>;

    /// Compose the download URL (or local path) for a file in a directory.
    ///
    /// `url_encode` percent-encodes each path segment and the file name
    /// independently, preserving the `/` separators between segments. A
    /// `sign` is appended as a `?sign=...` query parameter.
    async fn file_url(
        &self,
        dir_path: &str,
        file_name: &str,
        sign: Option<&str>,
        url_encode: bool,
    ) -> Result<String, SourceError>;

    /// Probe the backend. Implemented as a listing of the root directory.
    async fn test_connection(&self) -> Result<(), SourceError> {
        self.list("/").await.map(|_| ())
    }
}

/// Join a directory path and a file name with exactly one slash.
#[must_use]
pub fn join_path(dir_path: &str, file_name: &str) -> String {
    let dir = dir_path.trim_end_matches('/');
    if dir.is_empty() {
        format!("/{file_name}")
    } else {
        format!("{dir}/{file_name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/media/movies", "a.mp4"), "/media/movies/a.mp4");
        assert_eq!(join_path("/media/movies/", "a.mp4"), "/media/movies/a.mp4");
        assert_eq!(join_path("/", "a.mp4"), "/a.mp4");
        assert_eq!(join_path("", "a.mp4"), "/a.mp4");
    }
}
