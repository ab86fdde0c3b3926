//! REST client implementing [`Platform`] against the Discord HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use reqwest::{Client, ClientBuilder, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, trace};

use guildhall_core::{
    BotProfile, ChannelId, ChannelInfo, ChannelTree, ChatMessage, GuildId, GuildSnapshot,
    GuildSummary, MessageId, MessagePayload, Platform, ProfileUpdate, UpstreamError,
    UpstreamResult,
};

use crate::config::DiscordConfig;
use crate::error::{map_response, map_transport};
use crate::invite::invite_url;
use crate::model::{Channel, Guild, Message, User};

/// Discord's upper bound for `GET /channels/{id}/messages?limit=`.
const MAX_MESSAGE_PAGE: usize = 100;

/// Bot-authenticated Discord REST client.
#[derive(Clone)]
pub struct DiscordClient {
    http: Client,
    config: Arc<DiscordConfig>,
}

impl DiscordClient {
    pub fn new(config: DiscordConfig) -> UpstreamResult<Self> {
        let http = ClientBuilder::new()
            .timeout(config.request_timeout())
            .user_agent(concat!(
                "DiscordBot (https://github.com/guildhall-rs/guildhall, ",
                env!("CARGO_PKG_VERSION"),
                ")"
            ))
            .build()
            .map_err(|e| UpstreamError::protocol(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            http,
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &DiscordConfig {
        &self.config
    }

    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> UpstreamResult<Option<Vec<u8>>> {
        let url = self.config.endpoint(path);
        debug!(method = %method, path = %path, "Calling Discord API");

        let mut req = self
            .http
            .request(method, &url)
            .header("Authorization", format!("Bot {}", self.config.token));
        if let Some(body) = body {
            req = req.json(body);
        }

        let resp = req.send().await.map_err(|e| map_transport(&e))?;
        let status = resp.status();
        let headers = resp.headers().clone();
        let bytes = resp.bytes().await.map_err(|e| map_transport(&e))?;
        trace!(status = status.as_u16(), len = bytes.len(), "Discord API responded");

        if status == StatusCode::NO_CONTENT {
            return Ok(None);
        }
        if !status.is_success() {
            return Err(map_response(status.as_u16(), &headers, &bytes));
        }
        Ok(Some(bytes.to_vec()))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> UpstreamResult<T> {
        let bytes = self
            .request(method, path, body)
            .await?
            .ok_or_else(|| UpstreamError::protocol(format!("empty response from {path}")))?;
        Ok(serde_json::from_slice(&bytes)?)
    }
}

#[async_trait]
impl Platform for DiscordClient {
    fn name(&self) -> &'static str {
        "discord"
    }

    async fn bot_profile(&self) -> UpstreamResult<BotProfile> {
        let user: User = self.call(Method::GET, "users/@me", None).await?;
        Ok(user.into())
    }

    async fn list_guilds(&self) -> UpstreamResult<Vec<GuildSummary>> {
        let guilds: Vec<Guild> = self.call(Method::GET, "users/@me/guilds", None).await?;
        Ok(guilds.into_iter().map(Into::into).collect())
    }

    async fn check_presence(&self, guild_id: &GuildId) -> UpstreamResult<GuildSummary> {
        let guild: Guild = self
            .call(Method::GET, &format!("guilds/{guild_id}"), None)
            .await?;
        Ok(guild.into())
    }

    async fn fetch_channel_tree(&self, guild_id: &GuildId) -> UpstreamResult<GuildSnapshot> {
        let guild: Guild = self
            .call(Method::GET, &format!("guilds/{guild_id}"), None)
            .await?;
        let channels: Vec<Channel> = self
            .call(Method::GET, &format!("guilds/{guild_id}/channels"), None)
            .await?;
        Ok(GuildSnapshot {
            id: guild.id.into(),
            name: guild.name,
            channels: ChannelTree::build(channels.into_iter().map(ChannelInfo::from).collect()),
        })
    }

    async fn fetch_messages(
        &self,
        channel_id: &ChannelId,
        limit: usize,
    ) -> UpstreamResult<Vec<ChatMessage>> {
        let limit = limit.clamp(1, MAX_MESSAGE_PAGE);
        let messages: Vec<Message> = self
            .call(
                Method::GET,
                &format!("channels/{channel_id}/messages?limit={limit}"),
                None,
            )
            .await?;
        Ok(messages.into_iter().map(Into::into).collect())
    }

    async fn send_message(
        &self,
        channel_id: &ChannelId,
        payload: &MessagePayload,
    ) -> UpstreamResult<ChatMessage> {
        let message: Message = self
            .call(
                Method::POST,
                &format!("channels/{channel_id}/messages"),
                Some(&json!({ "content": payload.content })),
            )
            .await?;
        Ok(message.into())
    }

    async fn edit_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
        payload: &MessagePayload,
    ) -> UpstreamResult<ChatMessage> {
        let message: Message = self
            .call(
                Method::PATCH,
                &format!("channels/{channel_id}/messages/{message_id}"),
                Some(&json!({ "content": payload.content })),
            )
            .await?;
        Ok(message.into())
    }

    async fn delete_message(
        &self,
        channel_id: &ChannelId,
        message_id: &MessageId,
    ) -> UpstreamResult<()> {
        self.request(
            Method::DELETE,
            &format!("channels/{channel_id}/messages/{message_id}"),
            None,
        )
        .await?;
        Ok(())
    }

    async fn update_bot_profile(&self, update: &ProfileUpdate) -> UpstreamResult<BotProfile> {
        let mut body = Map::new();
        if let Some(username) = &update.username {
            body.insert("username".into(), Value::String(username.clone()));
        }
        if let Some(avatar) = &update.avatar {
            body.insert(
                "avatar".into(),
                Value::String(format!(
                    "data:{};base64,{}",
                    avatar.mime,
                    BASE64.encode(&avatar.bytes)
                )),
            );
        }
        let user: User = self
            .call(Method::PATCH, "users/@me", Some(&Value::Object(body)))
            .await?;
        Ok(user.into())
    }

    async fn create_invite_url(&self, guild_id: &GuildId) -> UpstreamResult<String> {
        invite_url(&self.config, guild_id)
    }
}
