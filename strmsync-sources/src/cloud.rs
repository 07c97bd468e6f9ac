//! Cloud source adapter
//!
//! Wraps the AList client with the request rate discipline and the
//! config-change contract: the adapter rebuilds its client, token, and rate
//! settings atomically on every config update, and degrades to
//! `NotConfigured` when the record is absent or malformed.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use crate::adapter::SourceAdapter;
use crate::alist::AlistClient;
use crate::error::SourceError;
use crate::types::FileEntry;

/// Percent-encoding set for URL path segments: everything but the RFC 3986
/// unreserved characters. Encoding is bijective on unreserved input.
const PATH_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Parsed `source` config record.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CloudSourceConfig {
    /// Preferred base for download URLs, scheme included.
    pub domain: String,
    /// Fallback base; `http://` is injected when the scheme is absent.
    pub host: String,
    /// Opaque API token sent in the `Authorization` header.
    pub token: String,
    /// Minimum gap between outgoing requests, milliseconds.
    pub req_interval: u64,
    /// Retries for transient network failures.
    pub req_retry_count: u32,
    /// Sleep between retries, milliseconds.
    pub req_retry_interval: u64,
}

impl Default for CloudSourceConfig {
    fn default() -> Self {
        Self {
            domain: String::new(),
            host: String::new(),
            token: String::new(),
            req_interval: 500,
            req_retry_count: 3,
            req_retry_interval: 1000,
        }
    }
}

impl CloudSourceConfig {
    /// Resolve the URL base: `domain` preferred, else `host` with `http://`
    /// injected when no scheme is present. `None` when neither is set.
    #[must_use]
    pub fn base(&self) -> Option<String> {
        let domain = self.domain.trim().trim_end_matches('/');
        if !domain.is_empty() {
            return Some(domain.to_string());
        }
        let host = self.host.trim().trim_end_matches('/');
        if host.is_empty() {
            return None;
        }
        if host.starts_with("http://") || host.starts_with("https://") {
            Some(host.to_string())
        } else {
            Some(format!("http://{host}"))
        }
    }
}

struct CloudState {
    client: AlistClient,
    base: String,
    req_interval: Duration,
    req_retry_count: u32,
    req_retry_interval: Duration,
}

/// Cloud variant of the source adapter.
pub struct CloudSourceAdapter {
    state: RwLock<Option<CloudState>>,
    /// Serializes the request-level interval across all callers.
    gate: Mutex<Option<Instant>>,
}

impl CloudSourceAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: RwLock::new(None),
            gate: Mutex::new(None),
        }
    }

    /// Rebuild the adapter from a raw config record value.
    ///
    /// Absent or malformed config leaves the adapter unconfigured; existing
    /// in-flight calls finish against the previous state.
    pub async fn apply_config(&self, raw: Option<&str>) {
        let parsed = raw.and_then(|value| {
            serde_json::from_str::<CloudSourceConfig>(value)
                .map_err(|e| warn!("malformed source config: {e}"))
                .ok()
        });

        let next = match parsed {
            Some(config) => match config.base() {
                Some(base) => {
                    let token = if config.token.is_empty() {
                        None
                    } else {
                        Some(config.token.clone())
                    };
                    match AlistClient::new(base.clone(), token) {
                        Ok(client) => Some(CloudState {
                            client,
                            base,
                            req_interval: Duration::from_millis(config.req_interval),
                            req_retry_count: config.req_retry_count,
                            req_retry_interval: Duration::from_millis(
                                config.req_retry_interval,
                            ),
                        }),
                        Err(e) => {
                            warn!("failed to build source client: {e}");
                            None
                        }
                    }
                }
                None => {
                    warn!("source config has neither domain nor host");
                    None
                }
            },
            None => None,
        };

        let configured = next.is_some();
        *self.state.write().await = next;
        if configured {
            info!("source adapter reconfigured");
        } else {
            warn!("source adapter is now unconfigured");
        }
    }

    /// Sleep until `interval` has elapsed since the previous dispatch.
    /// Caller must hold the gate for the whole request.
    async fn wait_interval(last: &mut Option<Instant>, interval: Duration) {
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < interval {
                tokio::time::sleep(interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }
}

impl Default for CloudSourceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SourceAdapter for CloudSourceAdapter {
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>, SourceError> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(SourceError::NotConfigured)?;

        let mut gate = self.gate.lock().await;
        let mut attempt = 0u32;
        loop {
            Self::wait_interval(&mut gate, state.req_interval).await;
            match state.client.list_all(path).await {
                Ok(entries) => return Ok(entries),
                // Transient network failures retry; API refusals do not.
                Err(SourceError::Network(msg)) if attempt < state.req_retry_count => {
                    attempt += 1;
                    warn!(
                        "listing {path} failed ({msg}), retry {attempt}/{}",
                        state.req_retry_count
                    );
                    tokio::time::sleep(state.req_retry_interval).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn file_url(
        &self,
        dir_path: &str,
        file_name: &str,
        sign: Option<&str>,
        url_encode: bool,
    ) -> Result<String, SourceError> {
        let state = self.state.read().await;
        let state = state.as_ref().ok_or(SourceError::NotConfigured)?;

        let dir = dir_path.trim_matches('/');
        let (dir, name) = if url_encode {
            let encoded_dir = dir
                .split('/')
                .map(|seg| utf8_percent_encode(seg, PATH_SEGMENT).to_string())
                .collect::<Vec<_>>()
                .join("/");
            let encoded_name = utf8_percent_encode(file_name, PATH_SEGMENT).to_string();
            (encoded_dir, encoded_name)
        } else {
            (dir.to_string(), file_name.to_string())
        };

        let mut url = if dir.is_empty() {
            format!("{}/d/{}", state.base, name)
        } else {
            format!("{}/d/{}/{}", state.base, dir, name)
        };
        if let Some(sign) = sign {
            url.push_str("?sign=");
            url.push_str(sign);
        }
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config_json(domain: &str, host: &str) -> String {
        serde_json::json!({
            "domain": domain,
            "host": host,
            "token": "tok",
            "req_interval": 0,
            "req_retry_count": 0,
            "req_retry_interval": 0,
        })
        .to_string()
    }

    #[test]
    fn test_base_resolution() {
        let mut config = CloudSourceConfig::default();
        assert_eq!(config.base(), None);

        config.host = "drive.example.com".to_string();
        assert_eq!(config.base().as_deref(), Some("http://drive.example.com"));

        config.host = "https://drive.example.com/".to_string();
        assert_eq!(config.base().as_deref(), Some("https://drive.example.com"));

        config.domain = "https://cdn.example.com".to_string();
        assert_eq!(config.base().as_deref(), Some("https://cdn.example.com"));
    }

    #[tokio::test]
    async fn test_unconfigured_operations_fail() {
        let adapter = CloudSourceAdapter::new();
        assert!(matches!(
            adapter.list("/").await,
            Err(SourceError::NotConfigured)
        ));
        assert!(matches!(
            adapter.file_url("/a", "b.mp4", None, false).await,
            Err(SourceError::NotConfigured)
        ));

        // Malformed config keeps the adapter unconfigured without crashing.
        adapter.apply_config(Some("not json")).await;
        assert!(matches!(
            adapter.list("/").await,
            Err(SourceError::NotConfigured)
        ));
    }

    #[tokio::test]
    async fn test_file_url_composition() {
        let adapter = CloudSourceAdapter::new();
        adapter
            .apply_config(Some(&config_json("https://cdn.example.com", "")))
            .await;

        let url = adapter
            .file_url("/media/movies", "movie.mp4", Some("S1"), false)
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/d/media/movies/movie.mp4?sign=S1");

        let url = adapter
            .file_url("/media/电影 2024", "some movie.mp4", None, true)
            .await
            .unwrap();
        assert_eq!(
            url,
            "https://cdn.example.com/d/media/%E7%94%B5%E5%BD%B1%202024/some%20movie.mp4"
        );
        // Unreserved characters survive encoding untouched.
        let url = adapter
            .file_url("/a-b_c.d~e", "f.mp4", None, true)
            .await
            .unwrap();
        assert_eq!(url, "https://cdn.example.com/d/a-b_c.d~e/f.mp4");
    }

    #[tokio::test]
    async fn test_list_retries_transient_server_errors() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        // One 502, then a healthy listing.
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .respond_with(ResponseTemplate::new(502))
            .up_to_n_times(1)
            .with_priority(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/fs/list"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "code": 200,
                "message": "success",
                "data": {
                    "content": [{"name": "a.mp4", "size": 1, "is_dir": false, "modified": "", "sign": ""}],
                    "total": 1
                }
            })))
            .with_priority(2)
            .mount(&server)
            .await;

        let adapter = CloudSourceAdapter::new();
        adapter
            .apply_config(Some(
                &json!({
                    "domain": server.uri(),
                    "token": "tok",
                    "req_interval": 0,
                    "req_retry_count": 2,
                    "req_retry_interval": 0,
                })
                .to_string(),
            ))
            .await;

        let entries = adapter.list("/media").await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(server.received_requests().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_list_does_not_retry_api_refusal() {
        use serde_json::json;
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

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

        let adapter = CloudSourceAdapter::new();
        adapter
            .apply_config(Some(
                &json!({
                    "domain": server.uri(),
                    "token": "tok",
                    "req_interval": 0,
                    "req_retry_count": 3,
                    "req_retry_interval": 0,
                })
                .to_string(),
            ))
            .await;

        assert!(matches!(
            adapter.list("/media").await,
            Err(SourceError::ListFailed(_))
        ));
        // A refusal aborts on the first response.
        assert_eq!(server.received_requests().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_host_fallback_url() {
        let adapter = CloudSourceAdapter::new();
        adapter
            .apply_config(Some(&config_json("", "drive.internal:5244")))
            .await;
        let url = adapter
            .file_url("/m", "a.mp4", None, false)
            .await
            .unwrap();
        assert_eq!(url, "http://drive.internal:5244/d/m/a.mp4");
    }
}
