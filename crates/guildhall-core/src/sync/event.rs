//! Change notifications and the push-channel wire format.

use serde::{Deserialize, Serialize};

use crate::model::{ChannelId, GuildId};

/// What happened to the entity an event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
}

/// Flattened classification of a [`SyncEvent`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncEventKind {
    ChannelCreated,
    ChannelUpdated,
    ChannelDeleted,
    MessageCreated,
    MessageUpdated,
    MessageDeleted,
}

/// A normalized invalidation hint derived from an upstream push event.
///
/// Carries only the kind of change and its scope; receivers re-fetch the
/// affected slice instead of trusting any payload. Serializes to the push
/// channel frames `{"event":"channelUpdate","data":{"type":..,"guildId":..}}`
/// and `{"event":"messageUpdate","data":{"type":..,"channelId":..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum SyncEvent {
    /// A channel in a guild was created, updated or deleted.
    ChannelUpdate {
        #[serde(rename = "type")]
        change: ChangeType,
        guild_id: GuildId,
    },
    /// A message in a channel was created, updated or deleted.
    MessageUpdate {
        #[serde(rename = "type")]
        change: ChangeType,
        channel_id: ChannelId,
    },
}

impl SyncEvent {
    pub fn channel(change: ChangeType, guild_id: impl Into<GuildId>) -> Self {
        Self::ChannelUpdate {
            change,
            guild_id: guild_id.into(),
        }
    }

    pub fn message(change: ChangeType, channel_id: impl Into<ChannelId>) -> Self {
        Self::MessageUpdate {
            change,
            channel_id: channel_id.into(),
        }
    }

    pub fn kind(&self) -> SyncEventKind {
        match self {
            Self::ChannelUpdate { change, .. } => match change {
                ChangeType::Create => SyncEventKind::ChannelCreated,
                ChangeType::Update => SyncEventKind::ChannelUpdated,
                ChangeType::Delete => SyncEventKind::ChannelDeleted,
            },
            Self::MessageUpdate { change, .. } => match change {
                ChangeType::Create => SyncEventKind::MessageCreated,
                ChangeType::Update => SyncEventKind::MessageUpdated,
                ChangeType::Delete => SyncEventKind::MessageDeleted,
            },
        }
    }

    /// The guild id for channel events, the channel id for message events.
    pub fn scope_id(&self) -> &str {
        match self {
            Self::ChannelUpdate { guild_id, .. } => guild_id.as_str(),
            Self::MessageUpdate { channel_id, .. } => channel_id.as_str(),
        }
    }

    /// Channel events change a guild's structure.
    pub fn is_structural(&self) -> bool {
        matches!(self, Self::ChannelUpdate { .. })
    }

    /// Name of the push channel event.
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::ChannelUpdate { .. } => "channelUpdate",
            Self::MessageUpdate { .. } => "messageUpdate",
        }
    }
}

/// What a client is currently looking at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscriptionFilter {
    pub guild_id: Option<GuildId>,
    pub channel_id: Option<ChannelId>,
}

impl SubscriptionFilter {
    /// Returns `true` if the event's scope matches the selection.
    pub fn is_interested(&self, event: &SyncEvent) -> bool {
        match event {
            SyncEvent::ChannelUpdate { guild_id, .. } => self.guild_id.as_ref() == Some(guild_id),
            SyncEvent::MessageUpdate { channel_id, .. } => {
                self.channel_id.as_ref() == Some(channel_id)
            }
        }
    }
}

/// Frames a dashboard client sends over the push channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientFrame {
    /// Replaces the connection's selection.
    Select {
        #[serde(default)]
        guild_id: Option<GuildId>,
        #[serde(default)]
        channel_id: Option<ChannelId>,
    },
}

impl From<ClientFrame> for SubscriptionFilter {
    fn from(frame: ClientFrame) -> Self {
        match frame {
            ClientFrame::Select {
                guild_id,
                channel_id,
            } => Self {
                guild_id,
                channel_id,
            },
        }
    }
}
