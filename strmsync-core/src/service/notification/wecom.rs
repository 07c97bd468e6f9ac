//! WeCom (enterprise IM) webhook channel adapter

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{TemplateType, WecomOptions};
use crate::{Error, Result};

use super::channel::NotificationChannel;

#[derive(Debug, Deserialize)]
struct WebhookResp {
    #[serde(default)]
    errcode: i64,
    #[serde(default)]
    errmsg: String,
}

/// WeCom group-robot webhook channel
pub struct WecomChannel {
    options: WecomOptions,
    client: reqwest::Client,
}

impl WecomChannel {
    #[must_use]
    pub fn new(options: WecomOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { options, client }
    }
}

#[async_trait]
impl NotificationChannel for WecomChannel {
    fn is_enabled(&self) -> bool {
        self.options.enabled && !self.options.webhook_url.is_empty()
    }

    async fn send(&self, _template_type: TemplateType, text: &str) -> Result<()> {
        let body = json!({
            "msgtype": "text",
            "text": { "content": text },
        });

        let response = self
            .client
            .post(&self.options.webhook_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("wecom request failed: {e}")))?;

        let resp: WebhookResp = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("wecom response unreadable: {e}")))?;
        if resp.errcode != 0 {
            return Err(Error::Internal(format!(
                "wecom refused (errcode {}): {}",
                resp.errcode, resp.errmsg
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for WecomChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WecomChannel")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, method};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_send_success_and_refusal() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({"msgtype": "text"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 0,
                "errmsg": "ok"
            })))
            .expect(1)
            .mount(&server)
            .await;

        let channel = WecomChannel::new(WecomOptions {
            enabled: true,
            webhook_url: server.uri(),
        });
        assert!(channel.is_enabled());
        channel
            .send(TemplateType::TaskCompleted, "hello")
            .await
            .unwrap();

        server.reset().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "errcode": 93000,
                "errmsg": "invalid webhook url"
            })))
            .mount(&server)
            .await;
        assert!(channel
            .send(TemplateType::TaskCompleted, "hello")
            .await
            .is_err());
    }
}
