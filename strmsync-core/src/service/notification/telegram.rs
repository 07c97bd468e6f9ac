//! Telegram channel adapter

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use crate::models::{TelegramOptions, TemplateType};
use crate::{Error, Result};

use super::channel::NotificationChannel;

#[derive(Debug, Deserialize)]
struct SendMessageResp {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
}

/// Telegram bot channel
pub struct TelegramChannel {
    options: TelegramOptions,
    client: reqwest::Client,
}

impl TelegramChannel {
    #[must_use]
    pub fn new(options: TelegramOptions) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { options, client }
    }
}

#[async_trait]
impl NotificationChannel for TelegramChannel {
    fn is_enabled(&self) -> bool {
        self.options.enabled
            && !self.options.bot_token.is_empty()
            && !self.options.chat_id.is_empty()
    }

    async fn send(&self, _template_type: TemplateType, text: &str) -> Result<()> {
        let url = format!(
            "https://api.telegram.org/bot{}/sendMessage",
            self.options.bot_token
        );
        let body = json!({
            "chat_id": self.options.chat_id,
            "text": text,
        });

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Internal(format!("telegram request failed: {e}")))?;

        let resp: SendMessageResp = response
            .json()
            .await
            .map_err(|e| Error::Internal(format!("telegram response unreadable: {e}")))?;
        if !resp.ok {
            return Err(Error::Internal(format!(
                "telegram refused: {}",
                resp.description.unwrap_or_default()
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for TelegramChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramChannel")
            .field("enabled", &self.is_enabled())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_enabled_requires_credentials() {
        let channel = TelegramChannel::new(TelegramOptions {
            enabled: true,
            bot_token: String::new(),
            chat_id: "42".to_string(),
        });
        assert!(!channel.is_enabled());

        let channel = TelegramChannel::new(TelegramOptions {
            enabled: true,
            bot_token: "123:abc".to_string(),
            chat_id: "42".to_string(),
        });
        assert!(channel.is_enabled());
    }
}
