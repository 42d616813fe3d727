use async_trait::async_trait;

use crate::error::NotificationError;

/// Delivers "recharge complete" messages to a user.
///
/// The sweeper treats success and failure alike as "delivery attempted";
/// implementations should not retry on their own.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Unique identifier (e.g. "discord", "log").
    fn name(&self) -> &str;

    /// Tell `user_id` their resource is back at `max_capacity`.
    async fn notify(&self, user_id: &str, max_capacity: u32) -> Result<(), NotificationError>;
}
