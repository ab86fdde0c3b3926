//! Seams between the core and the chat platform.
//!
//! [`Platform`] is the outbound side: every REST call the dashboard needs.
//! [`EventSink`] is the inbound side: where an adapter's push connection
//! delivers normalized change notifications.

use async_trait::async_trait;

use crate::error::UpstreamResult;
use crate::model::{
    BotProfile, ChannelId, ChatMessage, GuildId, GuildSnapshot, GuildSummary, MessageId,
    MessagePayload, ProfileUpdate,
};
use crate::sync::SyncEvent;

/// Outbound calls to the chat platform.
///
/// Implementations map every failure onto the [`UpstreamError`] taxonomy so
/// callers can classify them without knowing the platform.
///
/// [`UpstreamError`]: crate::UpstreamError
#[async_trait]
pub trait Platform: Send + Sync {
    /// Name of the platform, used in logs.
    fn name(&self) -> &'static str;

    /// The bot account.
    async fn bot_profile(&self) -> UpstreamResult<BotProfile>;

    /// Guilds the bot is a member of.
    async fn list_guilds(&self) -> UpstreamResult<Vec<GuildSummary>>;

    /// Probes the bot's membership in a guild.
    ///
    /// Fails with a 403/404 [`Http`](crate::UpstreamError::Http) error when the
    /// bot is not a member.
    async fn check_presence(&self, guild_id: &GuildId) -> UpstreamResult<GuildSummary>;

    /// The guild's channel forest.
    async fn fetch_channel_tree(&self, guild_id: &GuildId) -> UpstreamResult<GuildSnapshot>;

    /// Most recent messages of a channel, newest first.
    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> UpstreamResult<Vec<ChatMessage>>;

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        payload: &MessagePayload,
    ) -> UpstreamResult<ChatMessage>;

    async fn edit_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        payload: &MessagePayload,
    ) -> UpstreamResult<ChatMessage>;

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> UpstreamResult<()>;

    /// Changes the bot's username and/or avatar.
    async fn update_bot_profile(&self, update: &ProfileUpdate) -> UpstreamResult<BotProfile>;

    /// URL that adds the bot to the given guild.
    async fn create_invite_url(&self, guild_id: &GuildId) -> UpstreamResult<String>;
}

/// Receiver of normalized upstream change notifications.
pub trait EventSink: Send + Sync {
    /// Handles one change notification.
    fn publish(&self, event: SyncEvent);

    /// Called after the push connection was re-established and events may
    /// have been missed.
    fn resync(&self) {}
}
