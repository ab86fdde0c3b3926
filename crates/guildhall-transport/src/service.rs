//! Dashboard operations over the platform.
//!
//! [`DashboardService`] is the explicit context object every handler
//! receives. Each upstream call runs as
//!
//! ```text
//! RetryExecutor ──▶ TimeoutGuard ──▶ cancellable(Platform call)
//! ```
//!
//! and cached reads go through [`StateCache`] fill tickets, so a fetch that
//! races an invalidation never stores stale data.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use guildhall_core::{
    AvatarImage, BotProfile, ChannelId, ChatMessage, ClientId, EventRelay, GuildId,
    GuildPresence, GuildSnapshot, GuildSummary, InviteLink, Lookup, MessageId, MessagePayload,
    Platform, ProfileRequest, ProfileUpdate, RetryExecutor, StateCache, SyncHub, TimeoutGuard,
    UpstreamResult, cancellable,
};
use guildhall_media::{MAX_AVATAR_BYTES, MediaCompressor, data_uri};

use crate::error::{ApiError, ApiResult};

/// Shared state behind the dashboard routes.
pub struct DashboardService {
    platform: Arc<dyn Platform>,
    retry: RetryExecutor,
    timeout: TimeoutGuard,
    cache: Arc<StateCache>,
    relay: Arc<EventRelay>,
    compressor: Arc<MediaCompressor>,
    shutdown: CancellationToken,
    next_client: AtomicU64,
}

impl DashboardService {
    pub fn new(platform: Arc<dyn Platform>, hub: &SyncHub) -> Self {
        Self {
            platform,
            retry: RetryExecutor::default(),
            timeout: TimeoutGuard::new(std::time::Duration::from_secs(15))
                .with_message("upstream call timed out"),
            cache: hub.cache().clone(),
            relay: hub.relay().clone(),
            compressor: Arc::new(MediaCompressor::jpeg()),
            shutdown: CancellationToken::new(),
            next_client: AtomicU64::new(1),
        }
    }

    pub fn with_retry(mut self, retry: RetryExecutor) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_timeout(mut self, timeout: TimeoutGuard) -> Self {
        self.timeout = timeout;
        self
    }

    /// Token that, once cancelled, closes push connections.
    pub fn with_shutdown(mut self, shutdown: CancellationToken) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Allocates an id for a new push connection.
    pub fn next_client_id(&self) -> ClientId {
        let n = self.next_client.fetch_add(1, Ordering::Relaxed);
        ClientId::new(format!("push-{n}"))
    }

    /// Runs one platform call and converts its failure for the dashboard.
    async fn call<T, F, Fut>(&self, op: F) -> ApiResult<T>
    where
        F: Fn(Arc<dyn Platform>) -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        self.call_upstream(op)
            .await
            .map_err(|e| ApiError::upstream(e, self.retry.classifier()))
    }

    /// Runs one platform call under the retry and timeout policies.
    async fn call_upstream<T, F, Fut>(&self, op: F) -> UpstreamResult<T>
    where
        F: Fn(Arc<dyn Platform>) -> Fut,
        Fut: Future<Output = UpstreamResult<T>>,
    {
        let op = &op;
        self.retry
            .execute(|| {
                let call = op(self.platform.clone());
                self.timeout
                    .run(move |token| async move { cancellable(&token, call).await })
            })
            .await
    }

    // =========================================================================
    // Bot
    // =========================================================================

    pub async fn bot_profile(&self) -> ApiResult<BotProfile> {
        self.call(|p| async move { p.bot_profile().await }).await
    }

    /// Applies a username and/or avatar change.
    ///
    /// Avatars are decoded from base64 and compressed to the upload budget
    /// before the upstream call.
    pub async fn update_profile(&self, request: ProfileRequest) -> ApiResult<BotProfile> {
        let username = match request.username.map(|name| name.trim().to_string()) {
            Some(name) if name.is_empty() => {
                return Err(ApiError::InvalidRequest("username must not be empty".into()));
            }
            other => other,
        };

        let avatar = match request.avatar {
            Some(encoded) => Some(self.prepare_avatar(encoded).await?),
            None => None,
        };

        let update = ProfileUpdate { username, avatar };
        if update.is_empty() {
            return Err(ApiError::InvalidRequest(
                "profile update must change the username or the avatar".into(),
            ));
        }

        let update = Arc::new(update);
        let profile = self
            .call(|p| {
                let update = update.clone();
                async move { p.update_bot_profile(&update).await }
            })
            .await?;
        info!(username = %profile.username, "Bot profile updated");
        Ok(profile)
    }

    async fn prepare_avatar(&self, encoded: String) -> ApiResult<AvatarImage> {
        let compressor = self.compressor.clone();
        let compressed = tokio::task::spawn_blocking(move || {
            let raw = data_uri::decode(&encoded)?;
            compressor.compress(&raw, MAX_AVATAR_BYTES)
        })
        .await
        .map_err(|e| ApiError::Internal(format!("avatar compression task failed: {e}")))??;

        debug!(
            bytes = compressed.bytes.len(),
            attempts = compressed.attempts.len(),
            "Avatar compressed"
        );
        Ok(AvatarImage {
            mime: compressed.mime,
            bytes: compressed.bytes,
        })
    }

    // =========================================================================
    // Guilds
    // =========================================================================

    pub async fn list_guilds(&self) -> ApiResult<Vec<GuildSummary>> {
        self.call(|p| async move { p.list_guilds().await }).await
    }

    /// Probes membership; a 403/404 from upstream means "not a member".
    pub async fn presence(&self, guild_id: &GuildId) -> ApiResult<GuildPresence> {
        let result = self
            .call_upstream(|p| {
                let guild_id = guild_id.clone();
                async move { p.check_presence(&guild_id).await }
            })
            .await;
        match result {
            Ok(guild) => Ok(GuildPresence::present(guild)),
            Err(e) if e.is_absence() => {
                debug!(guild_id = %guild_id, "Bot is not a member of guild");
                Ok(GuildPresence::absent())
            }
            Err(e) => Err(ApiError::upstream(e, self.retry.classifier())),
        }
    }

    pub async fn channel_tree(&self, guild_id: &GuildId) -> ApiResult<GuildSnapshot> {
        let ticket = match self.cache.guild(guild_id) {
            Lookup::Hit(snapshot) => return Ok(snapshot),
            Lookup::Miss(ticket) => ticket,
        };
        let snapshot = self
            .call(|p| {
                let guild_id = guild_id.clone();
                async move { p.fetch_channel_tree(&guild_id).await }
            })
            .await?;
        if !self.cache.fill_guild(ticket, snapshot.clone()) {
            debug!(guild_id = %guild_id, "Channel tree invalidated during fetch, not cached");
        }
        Ok(snapshot)
    }

    pub async fn invite(&self, guild_id: &GuildId) -> ApiResult<InviteLink> {
        let url = self
            .call(|p| {
                let guild_id = guild_id.clone();
                async move { p.create_invite_url(&guild_id).await }
            })
            .await?;
        Ok(InviteLink { url })
    }

    // =========================================================================
    // Messages
    // =========================================================================

    pub async fn messages(&self, channel_id: &ChannelId) -> ApiResult<Vec<ChatMessage>> {
        let ticket = match self.cache.messages(channel_id) {
            Lookup::Hit(messages) => return Ok(messages),
            Lookup::Miss(ticket) => ticket,
        };
        let limit = self.cache.message_limit();
        let messages = self
            .call(|p| {
                let channel_id = channel_id.clone();
                async move { p.fetch_messages(&channel_id, limit).await }
            })
            .await?;
        if !self
            .cache
            .fill_messages(channel_id.clone(), ticket, messages.clone())
        {
            debug!(channel_id = %channel_id, "Messages invalidated during fetch, not cached");
        }
        Ok(messages)
    }

    pub async fn send_message(
        &self,
        channel_id: &ChannelId,
        payload: MessagePayload,
    ) -> ApiResult<ChatMessage> {
        validate_content(&payload)?;
        let payload = Arc::new(payload);
        let message = self
            .call(|p| {
                let channel_id = channel_id.clone();
                let payload = payload.clone();
                async move { p.send_message(&channel_id, &payload).await }
            })
            .await?;
        self.cache.invalidate_channel(channel_id);
        Ok(message)
    }

    pub async fn edit_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        payload: MessagePayload,
    ) -> ApiResult<ChatMessage> {
        validate_content(&payload)?;
        let payload = Arc::new(payload);
        let message = self
            .call(|p| {
                let channel_id = channel_id.clone();
                let message_id = message_id.clone();
                let payload = payload.clone();
                async move { p.edit_message(&channel_id, &message_id, &payload).await }
            })
            .await?;
        self.cache.invalidate_channel(channel_id);
        Ok(message)
    }

    pub async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> ApiResult<()> {
        self.call(|p| {
            let channel_id = channel_id.clone();
            let message_id = message_id.clone();
            async move { p.delete_message(&channel_id, &message_id).await }
        })
        .await?;
        self.cache.invalidate_channel(channel_id);
        Ok(())
    }
}

fn validate_content(payload: &MessagePayload) -> ApiResult<()> {
    if payload.content.trim().is_empty() {
        return Err(ApiError::InvalidRequest("message content must not be empty".into()));
    }
    Ok(())
}
