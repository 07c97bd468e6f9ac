//! AList HTTP client
//!
//! Pure HTTP client for the AList file-listing API, no dependency on the
//! adapter layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::{
    header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE, USER_AGENT},
    Client,
};
use serde_json::json;

use super::types::{AlistResp, FsEntry, FsListData};
use crate::error::SourceError;
use crate::types::FileEntry;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// AList HTTP client
pub struct AlistClient {
    base: String,
    token: Option<String>,
    client: Client,
}

impl AlistClient {
    /// Create a new client against a base URL, optionally authenticated with
    /// an opaque token passed in the `Authorization` header.
    pub fn new(
        base: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, SourceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base: base.into(),
            token,
            client,
        })
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    fn build_headers(&self) -> Result<HeaderMap, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("Mozilla/5.0"));
        if let Some(ref token) = self.token {
            headers.insert(AUTHORIZATION, HeaderValue::from_str(token)?);
        }
        Ok(headers)
    }

    /// Fetch a single page of a directory listing.
    pub async fn fs_list(
        &self,
        path: &str,
        page: u64,
        per_page: u64,
    ) -> Result<FsListData, SourceError> {
        let url = format!("{}/api/fs/list", self.base.trim_end_matches('/'));
        let body = json!({
            "path": path,
            "password": "",
            "page": page,
            "per_page": per_page,
            "refresh": false,
        });

        let response = self
            .client
            .post(&url)
            .headers(self.build_headers()?)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        // 5xx is transport trouble and retryable under the rate discipline;
        // other non-success statuses are refusals, as is the envelope's
        // own code below.
        if status.is_server_error() {
            return Err(SourceError::Network(format!("http status {status}")));
        }
        if !status.is_success() {
            return Err(SourceError::ListFailed(format!("http status {status}")));
        }

        let resp: AlistResp<FsListData> = response.json().await?;
        if resp.code != 200 {
            return Err(SourceError::ListFailed(format!(
                "code {}: {}",
                resp.code, resp.message
            )));
        }

        resp.data
            .ok_or_else(|| SourceError::Parse("missing data in list response".to_string()))
    }

    /// List a directory completely.
    ///
    /// The first request asks for everything (`page=1, per_page=0`). Servers
    /// that enforce a page cap return a partial page; in that case the fetch
    /// continues linearly until the cumulative count reaches `total`.
    pub async fn list_all(&self, path: &str) -> Result<Vec<FileEntry>, SourceError> {
        let first = self.fs_list(path, 1, 0).await?;
        let total = first.total;
        let mut raw = first.content.unwrap_or_default();

        if raw.is_empty() || (raw.len() as i64) >= total {
            return Ok(raw.into_iter().map(convert_entry).collect());
        }

        let page_size = raw.len() as u64;
        let mut page = 2u64;
        while (raw.len() as i64) < total {
            let next = self.fs_list(path, page, page_size).await?;
            let batch = next.content.unwrap_or_default();
            if batch.is_empty() {
                break;
            }
            raw.extend(batch);
            page += 1;
        }

        Ok(raw.into_iter().map(convert_entry).collect())
    }
}

fn convert_entry(raw: FsEntry) -> FileEntry {
    let modified = DateTime::parse_from_rfc3339(&raw.modified)
        .ok()
        .map(|dt| dt.with_timezone(&Utc));
    let sign = if raw.sign.is_empty() {
        None
    } else {
        Some(raw.sign)
    };
    let hash_sha1 = raw
        .hash_info
        .and_then(|h| h.sha1)
        .filter(|s| !s.is_empty());

    FileEntry {
        name: raw.name,
        size: raw.size,
        is_dir: raw.is_dir,
        modified,
        sign,
        hash_sha1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_client_creation() {
        let client = AlistClient::new("https://drive.example.com", None).unwrap();
        assert_eq!(client.base(), "https://drive.example.com");
    }

    #[tokio::test]
    async fn test_fs_list_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .and(body_partial_json(json!({
                "path": "/media",
                "password": "",
                "page": 1,
                "per_page": 0,
                "refresh": false,
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "content": [
                        {
                            "name": "movie.mp4",
                            "size": 2147483648u64,
                            "is_dir": false,
                            "modified": "2024-05-01T12:00:00Z",
                            "sign": "S1",
                            "hash_info": {"sha1": "abc123"}
                        },
                        {
                            "name": "Season 1",
                            "size": 0,
                            "is_dir": true,
                            "modified": "2024-05-01T12:00:00Z",
                            "sign": ""
                        }
                    ],
                    "total": 2,
                    "readme": "",
                    "provider": "Local"
                }
            })))
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), Some("token-1".to_string())).unwrap();
        let entries = client.list_all("/media").await.unwrap();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].name, "movie.mp4");
        assert_eq!(entries[0].sign.as_deref(), Some("S1"));
        assert_eq!(entries[0].hash_sha1.as_deref(), Some("abc123"));
        assert!(entries[0].modified.is_some());
        assert!(entries[1].is_dir);
        assert_eq!(entries[1].sign, None);
    }

    #[tokio::test]
    async fn test_fs_list_server_error_is_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), None).unwrap();
        let err = client.list_all("/media").await.unwrap_err();
        match err {
            SourceError::Network(msg) => assert!(msg.contains("502")),
            other => panic!("expected Network, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_fs_list_api_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 403,
                "message": "permission denied",
                "data": null
            })))
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), None).unwrap();
        let err = client.list_all("/media").await.unwrap_err();
        match err {
            SourceError::ListFailed(msg) => {
                assert!(msg.contains("403"));
                assert!(msg.contains("permission denied"));
            }
            other => panic!("expected ListFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_list_all_paged() {
        let server = MockServer::start().await;
        // First page: server caps at one entry despite per_page=0.
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .and(body_partial_json(json!({"page": 1})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "content": [{"name": "a.mp4", "size": 1, "is_dir": false, "modified": "", "sign": ""}],
                    "total": 2
                }
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .and(body_partial_json(json!({"page": 2})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "content": [{"name": "b.mp4", "size": 1, "is_dir": false, "modified": "", "sign": ""}],
                    "total": 2
                }
            })))
            .mount(&server)
            .await;

        let client = AlistClient::new(server.uri(), None).unwrap();
        let entries = client.list_all("/media").await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].name, "b.mp4");
    }
}
