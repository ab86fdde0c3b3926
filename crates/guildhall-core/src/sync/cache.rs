//! Best-effort memoization of guild structure and recent messages.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;
use tracing::trace;

use super::event::SyncEvent;
use crate::model::{ChannelId, ChatMessage, GuildId, GuildSnapshot};

/// Default number of messages kept per channel.
pub const DEFAULT_MESSAGE_LIMIT: usize = 50;

/// Proof that a cache miss was observed at a given cache epoch.
///
/// A fill is only accepted if no invalidation hit the slice in between,
/// so a fetch racing an invalidation cannot store pre-invalidation data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// Result of a cache lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    Hit(T),
    Miss(FillTicket),
}

struct Slot<T> {
    value: Option<T>,
    /// Epoch of the last invalidation of this key.
    stamp: u64,
}

/// Only keys that were filled at some point hold a slot. Invalidating a key
/// without one raises `floor`, which rejects every older ticket for keys
/// without a slot.
struct Inner<K, V> {
    slots: HashMap<K, Slot<V>>,
    epoch: u64,
    floor: u64,
}

struct Slots<K, V> {
    inner: RwLock<Inner<K, V>>,
}

impl<K: Eq + Hash + Clone, V: Clone> Slots<K, V> {
    fn new() -> Self {
        Self {
            inner: RwLock::new(Inner {
                slots: HashMap::new(),
                epoch: 0,
                floor: 0,
            }),
        }
    }

    fn lookup(&self, key: &K) -> Lookup<V> {
        let inner = self.inner.read();
        match inner.slots.get(key) {
            Some(Slot {
                value: Some(value), ..
            }) => Lookup::Hit(value.clone()),
            _ => Lookup::Miss(FillTicket(inner.epoch)),
        }
    }

    fn fill(&self, key: K, ticket: FillTicket, value: V) -> bool {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        let stamp = match inner.slots.get(&key) {
            Some(slot) => slot.stamp,
            None => inner.floor,
        };
        if ticket.0 < stamp {
            return false;
        }
        inner.slots.insert(key, Slot {
            value: Some(value),
            stamp,
        });
        true
    }

    fn invalidate(&self, key: &K) {
        let mut guard = self.inner.write();
        let inner = &mut *guard;
        inner.epoch += 1;
        let epoch = inner.epoch;
        match inner.slots.get_mut(key) {
            Some(slot) => {
                slot.value = None;
                slot.stamp = epoch;
            }
            None => inner.floor = epoch,
        }
    }

    fn clear(&self) {
        let mut inner = self.inner.write();
        inner.slots.clear();
        inner.epoch += 1;
        inner.floor = inner.epoch;
    }

    fn len(&self) -> usize {
        self.inner
            .read()
            .slots
            .values()
            .filter(|s| s.value.is_some())
            .count()
    }

    #[cfg(test)]
    fn slot_count(&self) -> usize {
        self.inner.read().slots.len()
    }
}

/// Server-held snapshot of guild channel trees and recent channel messages.
///
/// Entries are dropped, never patched, when an invalidation hint arrives;
/// the next read goes back to the platform. Guild lists and presence are
/// never cached.
pub struct StateCache {
    guilds: Slots<GuildId, GuildSnapshot>,
    messages: Slots<ChannelId, Vec<ChatMessage>>,
    message_limit: usize,
}

impl StateCache {
    pub fn new(message_limit: usize) -> Self {
        Self {
            guilds: Slots::new(),
            messages: Slots::new(),
            message_limit: message_limit.max(1),
        }
    }

    pub fn message_limit(&self) -> usize {
        self.message_limit
    }

    pub fn guild(&self, guild_id: &GuildId) -> Lookup<GuildSnapshot> {
        self.guilds.lookup(guild_id)
    }

    /// Stores a freshly fetched snapshot. Returns `false` if the slice was
    /// invalidated since `ticket` was issued.
    pub fn fill_guild(&self, ticket: FillTicket, snapshot: GuildSnapshot) -> bool {
        self.guilds.fill(snapshot.id.clone(), ticket, snapshot)
    }

    pub fn messages(&self, channel_id: &ChannelId) -> Lookup<Vec<ChatMessage>> {
        self.messages.lookup(channel_id)
    }

    /// Stores freshly fetched messages, keeping at most `message_limit`.
    pub fn fill_messages(
        &self,
        channel_id: ChannelId,
        ticket: FillTicket,
        mut messages: Vec<ChatMessage>,
    ) -> bool {
        messages.truncate(self.message_limit);
        self.messages.fill(channel_id, ticket, messages)
    }

    pub fn invalidate_guild(&self, guild_id: &GuildId) {
        trace!(guild_id = %guild_id, "invalidating guild slice");
        self.guilds.invalidate(guild_id);
    }

    pub fn invalidate_channel(&self, channel_id: &ChannelId) {
        trace!(channel_id = %channel_id, "invalidating channel slice");
        self.messages.invalidate(channel_id);
    }

    /// Drops the slice an upstream event refers to.
    pub fn apply(&self, event: &SyncEvent) {
        match event {
            SyncEvent::ChannelUpdate { guild_id, .. } => self.invalidate_guild(guild_id),
            SyncEvent::MessageUpdate { channel_id, .. } => self.invalidate_channel(channel_id),
        }
    }

    /// Drops everything, e.g. after the push connection was lost and events
    /// may have been missed.
    pub fn clear(&self) {
        self.guilds.clear();
        self.messages.clear();
    }

    /// Number of cached guild and channel slices.
    pub fn entry_counts(&self) -> (usize, usize) {
        (self.guilds.len(), self.messages.len())
    }
}

impl Default for StateCache {
    fn default() -> Self {
        Self::new(DEFAULT_MESSAGE_LIMIT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event::ChangeType;

    fn snapshot(id: &str) -> GuildSnapshot {
        GuildSnapshot {
            id: id.into(),
            name: "Guild".into(),
            channels: Vec::new(),
        }
    }

    fn message(id: &str) -> ChatMessage {
        ChatMessage {
            id: id.into(),
            channel_id: "c1".into(),
            author: "bot".into(),
            content: "hi".into(),
            timestamp: "2026-01-01T00:00:00Z".into(),
            edited_timestamp: None,
        }
    }

    fn ticket<T>(lookup: Lookup<T>) -> FillTicket {
        match lookup {
            Lookup::Miss(ticket) => ticket,
            Lookup::Hit(_) => panic!("expected miss"),
        }
    }

    #[test]
    fn fill_then_hit() {
        let cache = StateCache::default();
        let id = GuildId::from("g1");
        let t = ticket(cache.guild(&id));
        assert!(cache.fill_guild(t, snapshot("g1")));
        assert_eq!(cache.guild(&id), Lookup::Hit(snapshot("g1")));
    }

    #[test]
    fn channel_event_invalidates_guild_slice() {
        let cache = StateCache::default();
        let id = GuildId::from("g1");
        cache.fill_guild(ticket(cache.guild(&id)), snapshot("g1"));

        cache.apply(&SyncEvent::channel(ChangeType::Create, "g1"));
        assert!(matches!(cache.guild(&id), Lookup::Miss(_)));
    }

    #[test]
    fn message_event_only_touches_its_channel() {
        let cache = StateCache::default();
        let c1 = ChannelId::from("c1");
        let c2 = ChannelId::from("c2");
        cache.fill_messages(c1.clone(), ticket(cache.messages(&c1)), vec![message("m1")]);
        cache.fill_messages(c2.clone(), ticket(cache.messages(&c2)), vec![message("m2")]);

        cache.apply(&SyncEvent::message(ChangeType::Delete, "c1"));
        assert!(matches!(cache.messages(&c1), Lookup::Miss(_)));
        assert!(matches!(cache.messages(&c2), Lookup::Hit(_)));
    }

    #[test]
    fn fill_racing_an_invalidation_is_rejected() {
        let cache = StateCache::default();
        let id = GuildId::from("g1");
        let stale = ticket(cache.guild(&id));
        cache.invalidate_guild(&id);

        assert!(!cache.fill_guild(stale, snapshot("g1")));
        assert!(matches!(cache.guild(&id), Lookup::Miss(_)));
    }

    #[test]
    fn messages_are_truncated_to_limit() {
        let cache = StateCache::new(2);
        let c1 = ChannelId::from("c1");
        cache.fill_messages(
            c1.clone(),
            ticket(cache.messages(&c1)),
            vec![message("m3"), message("m2"), message("m1")],
        );
        match cache.messages(&c1) {
            Lookup::Hit(messages) => assert_eq!(messages.len(), 2),
            Lookup::Miss(_) => panic!("expected hit"),
        }
    }

    #[test]
    fn clear_drops_everything() {
        let cache = StateCache::default();
        let id = GuildId::from("g1");
        cache.fill_guild(ticket(cache.guild(&id)), snapshot("g1"));
        cache.clear();
        assert_eq!(cache.entry_counts(), (0, 0));
    }

    #[test]
    fn events_for_unfetched_slices_leave_no_slots() {
        let cache = StateCache::default();
        for n in 0..10_000 {
            cache.apply(&SyncEvent::message(ChangeType::Create, format!("c{n}")));
        }
        assert_eq!(cache.messages.slot_count(), 0);

        let c1 = ChannelId::from("c1");
        cache.fill_messages(c1.clone(), ticket(cache.messages(&c1)), vec![message("m1")]);
        cache.clear();
        assert_eq!(cache.messages.slot_count(), 0);
    }

    #[test]
    fn fill_after_clear_needs_a_fresh_ticket() {
        let cache = StateCache::default();
        let c1 = ChannelId::from("c1");
        let stale = ticket(cache.messages(&c1));
        cache.clear();

        assert!(!cache.fill_messages(c1.clone(), stale, vec![message("m1")]));
        assert!(cache.fill_messages(c1.clone(), ticket(cache.messages(&c1)), vec![message("m1")]));
        assert!(matches!(cache.messages(&c1), Lookup::Hit(_)));
    }

    #[test]
    fn invalidating_one_slice_keeps_other_fills_valid() {
        let cache = StateCache::default();
        let c1 = ChannelId::from("c1");
        let c2 = ChannelId::from("c2");
        cache.fill_messages(c1.clone(), ticket(cache.messages(&c1)), vec![message("m1")]);
        cache.apply(&SyncEvent::message(ChangeType::Update, "c1"));
        let pending = ticket(cache.messages(&c1));

        cache.apply(&SyncEvent::message(ChangeType::Update, "c2"));
        assert!(cache.fill_messages(c1, pending, vec![message("m1")]));
    }
}
