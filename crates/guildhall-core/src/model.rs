//! Platform-neutral data model shared by the server, the adapters and the
//! dashboard client.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

// =============================================================================
// Identifiers
// =============================================================================

macro_rules! id_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wraps a raw identifier.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the raw identifier.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

id_type!(
    /// Identifier of a guild (workspace).
    GuildId
);
id_type!(
    /// Identifier of a channel or channel category.
    ChannelId
);
id_type!(
    /// Identifier of a message.
    MessageId
);
id_type!(
    /// Identifier of a connected dashboard client.
    ClientId
);

// =============================================================================
// Bot and guilds
// =============================================================================

/// The bot account as the platform reports it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BotProfile {
    /// Bot user id.
    pub id: String,
    /// Current username.
    pub username: String,
    /// Avatar URL, if one is set.
    pub avatar_url: Option<String>,
}

/// A guild as listed for the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSummary {
    /// Guild id.
    pub id: GuildId,
    /// Display name.
    pub name: String,
    /// Icon URL, if any.
    pub icon_url: Option<String>,
}

// =============================================================================
// Channel tree
// =============================================================================

/// Broad channel category used for tree construction and rendering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ChannelKind {
    /// Text channel.
    Text,
    /// Voice or stage channel.
    Voice,
    /// Grouping node.
    Category,
    /// Anything else (forums, announcements, ...).
    Other,
}

/// A flat channel record as delivered by the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelInfo {
    /// Channel id.
    pub id: ChannelId,
    /// Channel name.
    pub name: String,
    /// Sort position within its parent.
    pub position: i64,
    /// Parent category, if any.
    pub parent_id: Option<ChannelId>,
    /// Channel kind.
    pub kind: ChannelKind,
}

/// A node of a guild's channel forest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelNode {
    /// Channel id.
    pub id: ChannelId,
    /// Channel name.
    pub name: String,
    /// Sort position within its parent.
    pub position: i64,
    /// Parent category; `None` for root nodes.
    pub parent_id: Option<ChannelId>,
    /// Channel kind.
    pub kind: ChannelKind,
    /// Ordered children; only categories have any.
    pub children: Vec<ChannelNode>,
}

impl ChannelNode {
    fn leaf(info: ChannelInfo, parent_id: Option<ChannelId>) -> Self {
        Self {
            id: info.id,
            name: info.name,
            position: info.position,
            parent_id,
            kind: info.kind,
            children: Vec::new(),
        }
    }

    /// Iterates this node and all of its descendants.
    pub fn walk(&self) -> impl Iterator<Item = &ChannelNode> {
        std::iter::once(self).chain(self.children.iter())
    }
}

/// Canonical snapshot of a guild's channel structure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GuildSnapshot {
    /// Guild id.
    pub id: GuildId,
    /// Guild name.
    pub name: String,
    /// Root nodes ordered by position.
    pub channels: Vec<ChannelNode>,
}

impl GuildSnapshot {
    /// Returns `true` if the snapshot contains the channel anywhere in the forest.
    pub fn contains_channel(&self, channel_id: &ChannelId) -> bool {
        self.channels
            .iter()
            .flat_map(ChannelNode::walk)
            .any(|node| &node.id == channel_id)
    }
}

/// Builds the channel forest from the platform's flat channel list.
pub struct ChannelTree;

impl ChannelTree {
    /// Arranges flat channels into a forest of at most two levels.
    ///
    /// Categories always sit at the root; a category claiming a parent is
    /// lifted to the root. Channels whose parent is missing or is not a
    /// category are promoted to the root. Siblings are ordered by
    /// `(position, id)`.
    pub fn build(channels: Vec<ChannelInfo>) -> Vec<ChannelNode> {
        let (categories, leaves): (Vec<_>, Vec<_>) = channels
            .into_iter()
            .partition(|c| c.kind == ChannelKind::Category);

        let mut roots: Vec<ChannelNode> = Vec::with_capacity(categories.len());
        let mut category_index: HashMap<ChannelId, usize> = HashMap::new();
        for category in categories {
            category_index.insert(category.id.clone(), roots.len());
            roots.push(ChannelNode::leaf(category, None));
        }

        for leaf in leaves {
            match leaf
                .parent_id
                .as_ref()
                .and_then(|parent| category_index.get(parent).copied())
            {
                Some(index) => {
                    let parent = roots[index].id.clone();
                    roots[index]
                        .children
                        .push(ChannelNode::leaf(leaf, Some(parent)));
                }
                None => roots.push(ChannelNode::leaf(leaf, None)),
            }
        }

        sort_siblings(&mut roots);
        for root in &mut roots {
            sort_siblings(&mut root.children);
        }
        roots
    }
}

fn sort_siblings(nodes: &mut [ChannelNode]) {
    nodes.sort_by(|a, b| {
        a.position
            .cmp(&b.position)
            .then_with(|| snowflake_order(a.id.as_str(), b.id.as_str()))
    });
}

/// Orders decimal snowflakes numerically without parsing them.
fn snowflake_order(a: &str, b: &str) -> Ordering {
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

// =============================================================================
// Messages
// =============================================================================

/// A chat message as shown on the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    /// Message id.
    pub id: MessageId,
    /// Channel the message lives in.
    pub channel_id: ChannelId,
    /// Author display name.
    pub author: String,
    /// Text content.
    pub content: String,
    /// ISO-8601 creation timestamp.
    pub timestamp: String,
    /// ISO-8601 edit timestamp, if edited.
    pub edited_timestamp: Option<String>,
}

/// Content for creating or editing a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePayload {
    /// Text content.
    pub content: String,
}

// =============================================================================
// Profile updates
// =============================================================================

/// An encoded avatar image ready for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AvatarImage {
    /// MIME type of `bytes`.
    pub mime: &'static str,
    /// Encoded image.
    pub bytes: Vec<u8>,
}

/// A partial update of the bot's identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    /// New username.
    pub username: Option<String>,
    /// New avatar.
    pub avatar: Option<AvatarImage>,
}

impl ProfileUpdate {
    /// Returns `true` if the update changes nothing.
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.avatar.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(id: &str, position: i64, parent: Option<&str>, kind: ChannelKind) -> ChannelInfo {
        ChannelInfo {
            id: id.into(),
            name: format!("#{id}"),
            position,
            parent_id: parent.map(ChannelId::from),
            kind,
        }
    }

    #[test]
    fn build_groups_children_under_categories() {
        let tree = ChannelTree::build(vec![
            info("general", 0, Some("cat-a"), ChannelKind::Text),
            info("cat-b", 1, None, ChannelKind::Category),
            info("cat-a", 0, None, ChannelKind::Category),
            info("voice", 1, Some("cat-a"), ChannelKind::Voice),
            info("memes", 0, Some("cat-b"), ChannelKind::Text),
        ]);

        let roots: Vec<_> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(roots, ["cat-a", "cat-b"]);
        let children: Vec<_> = tree[0].children.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(children, ["general", "voice"]);
        assert_eq!(tree[1].children[0].parent_id, Some(ChannelId::from("cat-b")));
    }

    #[test]
    fn build_promotes_orphans_and_nested_categories() {
        let tree = ChannelTree::build(vec![
            info("outer", 0, None, ChannelKind::Category),
            info("inner", 1, Some("outer"), ChannelKind::Category),
            info("lost", 2, Some("gone"), ChannelKind::Text),
            info("under-text", 3, Some("lost"), ChannelKind::Text),
        ]);

        assert_eq!(tree.len(), 4);
        assert!(tree.iter().all(|n| n.parent_id.is_none()));
        assert!(tree.iter().all(|n| n.children.is_empty()));
    }

    #[test]
    fn build_breaks_position_ties_by_id() {
        let tree = ChannelTree::build(vec![
            info("b", 0, None, ChannelKind::Text),
            info("a", 0, None, ChannelKind::Text),
        ]);
        assert_eq!(tree[0].id.as_str(), "a");
    }

    #[test]
    fn build_orders_tied_snowflakes_numerically() {
        let tree = ChannelTree::build(vec![
            info("10", 0, None, ChannelKind::Text),
            info("9", 0, None, ChannelKind::Text),
            info("100", 0, None, ChannelKind::Text),
        ]);
        let ids: Vec<_> = tree.iter().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, ["9", "10", "100"]);
    }

    #[test]
    fn snapshot_contains_nested_channel() {
        let snapshot = GuildSnapshot {
            id: "g1".into(),
            name: "Guild".into(),
            channels: ChannelTree::build(vec![
                info("cat", 0, None, ChannelKind::Category),
                info("general", 0, Some("cat"), ChannelKind::Text),
            ]),
        };
        assert!(snapshot.contains_channel(&"general".into()));
        assert!(!snapshot.contains_channel(&"missing".into()));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&GuildId::new("42")).unwrap();
        assert_eq!(json, "\"42\"");
    }
}
