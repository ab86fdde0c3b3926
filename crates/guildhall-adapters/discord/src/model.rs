//! Discord REST payloads and their conversion into the core model.

use serde::Deserialize;

use guildhall_core::{BotProfile, ChannelInfo, ChannelKind, ChatMessage, GuildSummary};

const CDN: &str = "https://cdn.discordapp.com";

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    #[serde(default)]
    pub global_name: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl User {
    pub fn avatar_url(&self) -> Option<String> {
        self.avatar
            .as_ref()
            .map(|hash| format!("{CDN}/avatars/{}/{hash}.png", self.id))
    }
}

impl From<User> for BotProfile {
    fn from(user: User) -> Self {
        Self {
            avatar_url: user.avatar_url(),
            id: user.id,
            username: user.username,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Guild {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub icon: Option<String>,
}

impl From<Guild> for GuildSummary {
    fn from(guild: Guild) -> Self {
        Self {
            icon_url: guild
                .icon
                .as_ref()
                .map(|hash| format!("{CDN}/icons/{}/{hash}.png", guild.id)),
            id: guild.id.into(),
            name: guild.name,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: u8,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub position: Option<i64>,
    #[serde(default)]
    pub parent_id: Option<String>,
}

/// Maps a Discord channel type onto the core's coarse kinds.
pub fn channel_kind(kind: u8) -> ChannelKind {
    match kind {
        0 | 5 => ChannelKind::Text,
        2 | 13 => ChannelKind::Voice,
        4 => ChannelKind::Category,
        _ => ChannelKind::Other,
    }
}

impl From<Channel> for ChannelInfo {
    fn from(channel: Channel) -> Self {
        Self {
            kind: channel_kind(channel.kind),
            name: channel.name.unwrap_or_default(),
            position: channel.position.unwrap_or_default(),
            parent_id: channel.parent_id.map(Into::into),
            id: channel.id.into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub id: String,
    pub channel_id: String,
    pub author: User,
    #[serde(default)]
    pub content: String,
    pub timestamp: String,
    #[serde(default)]
    pub edited_timestamp: Option<String>,
}

impl From<Message> for ChatMessage {
    fn from(message: Message) -> Self {
        Self {
            id: message.id.into(),
            channel_id: message.channel_id.into(),
            author: message
                .author
                .global_name
                .unwrap_or(message.author.username),
            content: message.content,
            timestamp: message.timestamp,
            edited_timestamp: message.edited_timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn channel_converts_with_defaults() {
        let channel: Channel = serde_json::from_value(json!({
            "id": "1", "type": 4, "name": "Text Channels"
        }))
        .unwrap();
        let info = ChannelInfo::from(channel);
        assert_eq!(info.kind, ChannelKind::Category);
        assert_eq!(info.position, 0);
        assert_eq!(info.parent_id, None);
    }

    #[test]
    fn message_prefers_display_name() {
        let message: Message = serde_json::from_value(json!({
            "id": "m", "channel_id": "c", "content": "hey",
            "timestamp": "2026-01-01T00:00:00+00:00",
            "author": {"id": "u", "username": "alice", "global_name": "Alice"}
        }))
        .unwrap();
        assert_eq!(ChatMessage::from(message).author, "Alice");
    }

    #[test]
    fn user_avatar_url_uses_cdn() {
        let user = User {
            id: "42".into(),
            username: "bot".into(),
            global_name: None,
            avatar: Some("abc".into()),
        };
        assert_eq!(
            user.avatar_url().as_deref(),
            Some("https://cdn.discordapp.com/avatars/42/abc.png")
        );
    }
}
