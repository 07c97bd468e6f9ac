//! Notification channel capability

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ChannelType, NotificationOptions, TemplateType};
use crate::Result;

use super::telegram::TelegramChannel;
use super::wecom::WecomChannel;

/// A delivery transport. The engine renders the template before calling
/// `send`; failures are treated as transient and retried by the engine.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    fn is_enabled(&self) -> bool;
    async fn send(&self, template_type: TemplateType, text: &str) -> Result<()>;
}

/// Build the channel map from the current notification options.
#[must_use]
pub fn build_channels(
    options: &NotificationOptions,
) -> HashMap<ChannelType, Arc<dyn NotificationChannel>> {
    let mut channels: HashMap<ChannelType, Arc<dyn NotificationChannel>> = HashMap::new();
    channels.insert(
        ChannelType::Telegram,
        Arc::new(TelegramChannel::new(options.telegram.clone())),
    );
    channels.insert(
        ChannelType::Wecom,
        Arc::new(WecomChannel::new(options.wecom.clone())),
    );
    channels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TelegramOptions, WecomOptions};

    #[test]
    fn test_build_channels_enablement() {
        let options = NotificationOptions {
            enabled: true,
            telegram: TelegramOptions {
                enabled: true,
                bot_token: "123:abc".to_string(),
                chat_id: "42".to_string(),
            },
            wecom: WecomOptions::default(),
            ..Default::default()
        };
        let channels = build_channels(&options);
        assert!(channels[&ChannelType::Telegram].is_enabled());
        assert!(!channels[&ChannelType::Wecom].is_enabled());
    }
}
