//! Notification channels the sweeper can deliver completions through.

pub mod discord;
pub mod traits;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::NotificationError;
use crate::storage::Config;

pub use discord::DiscordWebhookChannel;
pub use traits::NotificationChannel;

/// Logs completions instead of delivering them.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogChannel;

#[async_trait]
impl NotificationChannel for LogChannel {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, user_id: &str, max_capacity: u32) -> Result<(), NotificationError> {
        info!(user_id, max_capacity, "recharge complete (no notification channel configured)");
        Ok(())
    }
}

/// Pick the channel `config` asks for: Discord when a webhook is set,
/// otherwise [`LogChannel`].
pub fn channel_from_config(config: &Config) -> Result<Arc<dyn NotificationChannel>, NotificationError> {
    match config.notifications.discord_webhook_url.as_deref() {
        Some(url) if !url.is_empty() => {
            if let Err(e) = DiscordWebhookChannel::check_url(url) {
                warn!(error = %e, "webhook URL does not look like a Discord webhook");
            }
            Ok(Arc::new(DiscordWebhookChannel::new(url, config.notify_timeout())?))
        }
        _ => Ok(Arc::new(LogChannel)),
    }
}
