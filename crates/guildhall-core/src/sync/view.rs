//! Client-side relevance filtering of relayed events.

use super::event::{SubscriptionFilter, SyncEvent};
use crate::model::{ChannelId, GuildId};

/// A slice of state the client has to pull again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Refetch {
    /// The selected guild's channel tree changed.
    ChannelTree(GuildId),
    /// The selected channel's messages changed.
    Messages(ChannelId),
}

/// Tracks what a dashboard client currently shows and decides which relayed
/// events require a re-fetch.
#[derive(Debug, Clone, Default)]
pub struct ClientView {
    selection: SubscriptionFilter,
}

impl ClientView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn selection(&self) -> &SubscriptionFilter {
        &self.selection
    }

    /// Selects a guild. Changing guilds clears the channel selection.
    pub fn select_guild(&mut self, guild_id: Option<GuildId>) {
        if self.selection.guild_id != guild_id {
            self.selection.channel_id = None;
        }
        self.selection.guild_id = guild_id;
    }

    pub fn select_channel(&mut self, channel_id: Option<ChannelId>) {
        self.selection.channel_id = channel_id;
    }

    /// Returns the re-fetch `event` calls for, if it concerns the current
    /// selection.
    pub fn refetch_for(&self, event: &SyncEvent) -> Option<Refetch> {
        if !self.selection.is_interested(event) {
            return None;
        }
        Some(match event {
            SyncEvent::ChannelUpdate { guild_id, .. } => Refetch::ChannelTree(guild_id.clone()),
            SyncEvent::MessageUpdate { channel_id, .. } => Refetch::Messages(channel_id.clone()),
        })
    }

    /// Invokes `on_refetch` if `event` is relevant. Returns whether it was.
    pub fn handle<F>(&self, event: &SyncEvent, on_refetch: F) -> bool
    where
        F: FnOnce(Refetch),
    {
        match self.refetch_for(event) {
            Some(refetch) => {
                on_refetch(refetch);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::ClientId;
    use crate::sync::event::ChangeType;
    use crate::sync::relay::EventRelay;

    #[test]
    fn only_the_viewer_of_the_channel_refetches() {
        let relay = EventRelay::new();
        let mut views = [ClientView::new(), ClientView::new()];
        views[0].select_guild(Some("g1".into()));
        views[0].select_channel(Some("c1".into()));
        views[1].select_guild(Some("g1".into()));
        views[1].select_channel(Some("c2".into()));

        let mut subs = [
            relay.subscribe("a".into(), views[0].selection().clone()),
            relay.subscribe("b".into(), views[1].selection().clone()),
        ];
        relay.publish(&SyncEvent::message(ChangeType::Create, "c1"));

        let mut refetches = Vec::new();
        for (view, sub) in views.iter().zip(subs.iter_mut()) {
            let event = sub.try_recv().expect("every client receives the event");
            view.handle(&event, |r| refetches.push((sub.client_id().clone(), r)));
        }

        assert_eq!(
            refetches,
            [(ClientId::from("a"), Refetch::Messages("c1".into()))]
        );
    }

    #[test]
    fn structural_event_refetches_tree_of_selected_guild() {
        let mut view = ClientView::new();
        view.select_guild(Some("g1".into()));
        assert_eq!(
            view.refetch_for(&SyncEvent::channel(ChangeType::Delete, "g1")),
            Some(Refetch::ChannelTree("g1".into()))
        );
        assert_eq!(view.refetch_for(&SyncEvent::channel(ChangeType::Delete, "g2")), None);
    }

    #[test]
    fn switching_guild_clears_channel() {
        let mut view = ClientView::new();
        view.select_guild(Some("g1".into()));
        view.select_channel(Some("c1".into()));
        view.select_guild(Some("g2".into()));
        assert_eq!(view.selection().channel_id, None);
    }
}
