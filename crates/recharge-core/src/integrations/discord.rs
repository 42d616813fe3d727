//! Discord integration -- post completion notifications via webhook.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::json;

use crate::error::{NotificationError, ValidationError};
use crate::integrations::traits::NotificationChannel;

const WEBHOOK_PREFIX: &str = "https://discord.com/api/webhooks/";

pub struct DiscordWebhookChannel {
    webhook_url: String,
    client: Client,
}

impl DiscordWebhookChannel {
    /// Build a channel posting to `webhook_url`, giving up on a request after
    /// `timeout`.
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, NotificationError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            webhook_url: webhook_url.into(),
            client,
        })
    }

    /// Reject URLs that are not Discord webhooks.
    pub fn check_url(url: &str) -> Result<(), ValidationError> {
        if url.starts_with(WEBHOOK_PREFIX) {
            Ok(())
        } else {
            Err(ValidationError::InvalidValue {
                field: "notifications.discord_webhook_url".into(),
                message: format!("must start with {WEBHOOK_PREFIX}"),
            })
        }
    }

    /// Message body for a completed recharge.
    pub fn completion_message(user_id: &str, max_capacity: u32) -> String {
        format!(
            "<@{user_id}> 🔥 **Energy full!** ({max_capacity}/{max_capacity}) Time to explore!"
        )
    }

    /// Post a message to the configured Discord webhook.
    async fn post_message(&self, user_id: &str, content: &str) -> Result<(), NotificationError> {
        if self.webhook_url.is_empty() {
            return Err(NotificationError::NotConfigured {
                channel: self.name().to_string(),
            });
        }

        let body = json!({
            "content": content,
            "allowed_mentions": { "users": [user_id] },
        });

        let resp = self.client.post(&self.webhook_url).json(&body).send().await?;

        if resp.status().is_success() {
            Ok(())
        } else {
            let status = resp.status().as_u16();
            let text = resp.text().await.unwrap_or_default();
            Err(NotificationError::Rejected {
                channel: self.name().to_string(),
                status,
                body: text,
            })
        }
    }
}

#[async_trait]
impl NotificationChannel for DiscordWebhookChannel {
    fn name(&self) -> &str {
        "discord"
    }

    async fn notify(&self, user_id: &str, max_capacity: u32) -> Result<(), NotificationError> {
        let content = Self::completion_message(user_id, max_capacity);
        self.post_message(user_id, &content).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn webhook_url_prefix() {
        assert!(DiscordWebhookChannel::check_url("https://discord.com/api/webhooks/1/abc").is_ok());
        assert!(DiscordWebhookChannel::check_url("https://example.com/webhook").is_err());
    }

    #[test]
    fn message_mentions_user() {
        let msg = DiscordWebhookChannel::completion_message("1234", 100);
        assert!(msg.starts_with("<@1234>"));
        assert!(msg.contains("100/100"));
    }

    #[tokio::test]
    async fn empty_url_is_not_configured() {
        let channel = DiscordWebhookChannel::new("", Duration::from_secs(1)).unwrap();
        assert!(matches!(
            channel.notify("1", 100).await,
            Err(NotificationError::NotConfigured { .. })
        ));
    }
}
