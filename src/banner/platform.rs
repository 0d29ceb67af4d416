//! Chat platform capabilities used by the entry banner
//!
//! The controller only sees this trait; `SerenityPlatform` backs it with the
//! Discord HTTP client.

use poise::serenity_prelude::{ChannelId, GuildId, Http, UserId};
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

/// Errors returned by the chat platform
#[derive(Debug, Error)]
pub enum PlatformError {
    /// Discord API error
    #[error("Discord API error: {0}")]
    DiscordApi(#[from] Box<poise::serenity_prelude::Error>),

    /// Generic error
    #[error("Platform error: {0}")]
    Other(String),
}

impl From<poise::serenity_prelude::Error> for PlatformError {
    fn from(error: poise::serenity_prelude::Error) -> Self {
        Self::DiscordApi(Box::new(error))
    }
}

/// Result type for platform calls
pub type PlatformResult<T> = Result<T, PlatformError>;

/// Actions the entry banner performs on the chat platform
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Platform: Send + Sync {
    /// Ban a member from a guild
    async fn ban_member(&self, guild_id: u64, user_id: u64, reason: &str) -> PlatformResult<()>;

    /// Post a message in a channel
    async fn send_message(&self, channel_id: u64, text: &str) -> PlatformResult<()>;

    /// Whether a channel belongs to a guild
    async fn channel_in_guild(&self, guild_id: u64, channel_id: u64) -> PlatformResult<bool>;
}

/// `Platform` over the serenity HTTP client
#[derive(Clone)]
pub struct SerenityPlatform {
    http: Arc<Http>,
}

impl SerenityPlatform {
    #[must_use]
    pub const fn new(http: Arc<Http>) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl Platform for SerenityPlatform {
    async fn ban_member(&self, guild_id: u64, user_id: u64, reason: &str) -> PlatformResult<()> {
        let guild_id = GuildId::new(guild_id);
        let user_id = UserId::new(user_id);

        // Keep the member's message history, only the account is removed.
        guild_id
            .ban_with_reason(&*self.http, user_id, 0, reason)
            .await
            .map_err(PlatformError::from)?;

        info!("Successfully banned user {user_id} from guild {guild_id}");
        Ok(())
    }

    async fn send_message(&self, channel_id: u64, text: &str) -> PlatformResult<()> {
        ChannelId::new(channel_id)
            .say(&*self.http, text)
            .await
            .map_err(PlatformError::from)?;
        Ok(())
    }

    async fn channel_in_guild(&self, guild_id: u64, channel_id: u64) -> PlatformResult<bool> {
        let channels = GuildId::new(guild_id)
            .channels(&*self.http)
            .await
            .map_err(PlatformError::from)?;
        Ok(channels.contains_key(&ChannelId::new(channel_id)))
    }
}
