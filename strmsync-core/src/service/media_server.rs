//! Media-server library refresh
//!
//! Best-effort refresh call after a successful task run. Failures are
//! logged and never affect the task outcome.

use std::time::Duration;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::{MediaServerKind, MediaServerOptions};

const REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Media-server integration service
pub struct MediaServerService {
    options: RwLock<MediaServerOptions>,
    client: reqwest::Client,
}

impl MediaServerService {
    #[must_use]
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(REFRESH_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            options: RwLock::new(MediaServerOptions::default()),
            client,
        }
    }

    /// Apply a raw `media_server` config value; malformed config disables
    /// the integration.
    pub async fn apply_raw(&self, raw: Option<&str>) {
        let options = raw
            .and_then(|value| {
                serde_json::from_str::<MediaServerOptions>(value)
                    .map_err(|e| warn!("malformed media server config: {e}"))
                    .ok()
            })
            .unwrap_or_default();
        *self.options.write().await = options;
    }

    /// Trigger a library refresh. Emby and Jellyfin share the endpoint and
    /// the token header.
    pub async fn refresh(&self) {
        let options = self.options.read().await.clone();
        if options.kind == MediaServerKind::None {
            debug!("no media server configured, refresh skipped");
            return;
        }
        if options.base_url.is_empty() {
            warn!("media server configured without base URL, refresh skipped");
            return;
        }

        let url = format!(
            "{}/Library/Refresh",
            options.base_url.trim_end_matches('/')
        );
        let result = self
            .client
            .post(&url)
            .header("X-Emby-Token", &options.api_key)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                info!("media server library refresh triggered");
            }
            Ok(response) => {
                warn!("media server refresh rejected: {}", response.status());
            }
            Err(e) => {
                warn!("media server refresh failed: {e}");
            }
        }
    }
}

impl Default for MediaServerService {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MediaServerService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaServerService").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_refresh_posts_with_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/Library/Refresh"))
            .and(header("X-Emby-Token", "key-1"))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let service = MediaServerService::new();
        service
            .apply_raw(Some(
                &json!({
                    "kind": "emby",
                    "base_url": server.uri(),
                    "api_key": "key-1",
                })
                .to_string(),
            ))
            .await;
        service.refresh().await;
    }

    #[tokio::test]
    async fn test_refresh_noop_when_unconfigured() {
        // No server: a refresh with kind=none must not attempt any request.
        let service = MediaServerService::new();
        service.refresh().await;

        service.apply_raw(Some("not json")).await;
        service.refresh().await;
    }
}
