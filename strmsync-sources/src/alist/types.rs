//! AList wire types

use serde::Deserialize;

/// Response envelope shared by all AList endpoints.
#[derive(Debug, Deserialize)]
pub struct AlistResp<T> {
    pub code: i64,
    #[serde(default)]
    pub message: String,
    pub data: Option<T>,
}

/// `data` payload of `/api/fs/list`.
#[derive(Debug, Deserialize)]
pub struct FsListData {
    #[serde(default)]
    pub content: Option<Vec<FsEntry>>,
    #[serde(default)]
    pub total: i64,
    #[serde(default)]
    pub readme: String,
    #[serde(default)]
    pub provider: String,
}

/// A single entry in a directory listing.
#[derive(Debug, Clone, Deserialize)]
pub struct FsEntry {
    pub name: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub is_dir: bool,
    /// RFC 3339 timestamp as reported by the server.
    #[serde(default)]
    pub modified: String,
    #[serde(default)]
    pub sign: String,
    #[serde(default)]
    pub hash_info: Option<HashInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HashInfo {
    #[serde(default)]
    pub sha1: Option<String>,
}
