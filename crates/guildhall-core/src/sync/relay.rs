//! Event fan-out to connected dashboard clients.

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};

use super::event::{SubscriptionFilter, SyncEvent};
use crate::model::ClientId;

/// Events buffered per subscriber before further events are dropped.
pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 256;

struct Subscriber {
    filter: SubscriptionFilter,
    tx: mpsc::Sender<SyncEvent>,
}

/// Receiving end of a relay subscription.
///
/// Events arrive in publish order. The stream ends when the client is
/// unsubscribed or re-subscribes under the same id.
#[derive(Debug)]
pub struct Subscription {
    client_id: ClientId,
    events: mpsc::Receiver<SyncEvent>,
}

impl Subscription {
    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    /// Waits for the next event; `None` once the subscription is gone.
    pub async fn recv(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    /// Returns the next already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<SyncEvent> {
        self.events.try_recv().ok()
    }
}

/// Registry of client subscriptions and broadcaster of [`SyncEvent`]s.
///
/// Every event goes to every subscriber; clients decide relevance
/// themselves against their current selection. This keeps the relay free of
/// per-client view logic but costs one send per subscriber per event.
///
/// Each subscriber has a bounded queue. Events are only invalidation hints,
/// so a subscriber that falls behind loses new events instead of growing
/// its queue.
pub struct EventRelay {
    subscribers: RwLock<HashMap<ClientId, Subscriber>>,
    capacity: usize,
}

impl EventRelay {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_SUBSCRIBER_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Registers a client, replacing any previous subscription under the
    /// same id.
    pub fn subscribe(&self, client_id: ClientId, filter: SubscriptionFilter) -> Subscription {
        let (tx, events) = mpsc::channel(self.capacity);
        let replaced = self
            .subscribers
            .write()
            .insert(client_id.clone(), Subscriber { filter, tx })
            .is_some();
        debug!(client_id = %client_id, replaced, "client subscribed");
        Subscription { client_id, events }
    }

    /// Replaces a client's filter in place. Returns `false` if the client is
    /// not subscribed.
    pub fn update_filter(&self, client_id: &ClientId, filter: SubscriptionFilter) -> bool {
        match self.subscribers.write().get_mut(client_id) {
            Some(subscriber) => {
                subscriber.filter = filter;
                true
            }
            None => false,
        }
    }

    /// Returns the client's current filter.
    pub fn filter(&self, client_id: &ClientId) -> Option<SubscriptionFilter> {
        self.subscribers
            .read()
            .get(client_id)
            .map(|s| s.filter.clone())
    }

    /// Removes a client. Unknown ids are ignored; returns whether a
    /// subscription was removed.
    pub fn unsubscribe(&self, client_id: &ClientId) -> bool {
        let removed = self.subscribers.write().remove(client_id).is_some();
        if removed {
            debug!(client_id = %client_id, "client unsubscribed");
        }
        removed
    }

    /// Delivers `event` to every subscriber. Subscribers whose receiver has
    /// been dropped are pruned; full queues skip the event. Returns the
    /// number of deliveries.
    pub fn publish(&self, event: &SyncEvent) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        let mut interested = 0;
        let mut lagging = 0;
        {
            let subscribers = self.subscribers.read();
            for (client_id, subscriber) in subscribers.iter() {
                if subscriber.filter.is_interested(event) {
                    interested += 1;
                }
                match subscriber.tx.try_send(event.clone()) {
                    Ok(()) => delivered += 1,
                    Err(TrySendError::Full(_)) => {
                        lagging += 1;
                        warn!(client_id = %client_id, "subscriber queue full, event dropped");
                    }
                    Err(TrySendError::Closed(_)) => dead.push(client_id.clone()),
                }
            }
        }

        if !dead.is_empty() {
            let mut subscribers = self.subscribers.write();
            for client_id in &dead {
                if subscribers
                    .get(client_id)
                    .is_some_and(|s| s.tx.is_closed())
                {
                    subscribers.remove(client_id);
                    trace!(client_id = %client_id, "pruned closed subscription");
                }
            }
        }

        debug!(
            event = event.event_name(),
            scope_id = event.scope_id(),
            recipients = delivered,
            interested,
            lagging,
            "published sync event"
        );
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }
}

impl Default for EventRelay {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::event::ChangeType;

    #[test]
    fn unfiltered_subscriber_receives_every_event() {
        let relay = EventRelay::new();
        let mut sub = relay.subscribe("a".into(), SubscriptionFilter::default());

        relay.publish(&SyncEvent::channel(ChangeType::Create, "g1"));
        relay.publish(&SyncEvent::message(ChangeType::Update, "c1"));
        relay.publish(&SyncEvent::message(ChangeType::Delete, "c2"));

        assert_eq!(sub.try_recv(), Some(SyncEvent::channel(ChangeType::Create, "g1")));
        assert_eq!(sub.try_recv(), Some(SyncEvent::message(ChangeType::Update, "c1")));
        assert_eq!(sub.try_recv(), Some(SyncEvent::message(ChangeType::Delete, "c2")));
        assert_eq!(sub.try_recv(), None);
    }

    #[test]
    fn message_events_reach_all_subscribers() {
        let relay = EventRelay::new();
        let mut a = relay.subscribe(
            "a".into(),
            SubscriptionFilter {
                guild_id: None,
                channel_id: Some("c1".into()),
            },
        );
        let mut b = relay.subscribe(
            "b".into(),
            SubscriptionFilter {
                guild_id: None,
                channel_id: Some("c2".into()),
            },
        );

        assert_eq!(relay.publish(&SyncEvent::message(ChangeType::Create, "c1")), 2);
        assert!(a.try_recv().is_some());
        assert!(b.try_recv().is_some());
    }

    #[test]
    fn unsubscribe_is_idempotent() {
        let relay = EventRelay::new();
        let _sub = relay.subscribe("a".into(), SubscriptionFilter::default());
        assert!(relay.unsubscribe(&"a".into()));
        assert!(!relay.unsubscribe(&"a".into()));
        assert_eq!(relay.subscriber_count(), 0);
    }

    #[tokio::test]
    async fn resubscribe_replaces_filter_and_closes_old_stream() {
        let relay = EventRelay::new();
        let mut old = relay.subscribe("a".into(), SubscriptionFilter::default());
        let filter = SubscriptionFilter {
            guild_id: Some("g1".into()),
            channel_id: None,
        };
        let mut new = relay.subscribe("a".into(), filter.clone());

        assert_eq!(relay.subscriber_count(), 1);
        assert_eq!(relay.filter(&"a".into()), Some(filter));
        relay.publish(&SyncEvent::channel(ChangeType::Update, "g1"));
        assert_eq!(old.recv().await, None);
        assert!(new.recv().await.is_some());
    }

    #[test]
    fn dropped_receivers_are_pruned_on_publish() {
        let relay = EventRelay::new();
        drop(relay.subscribe("gone".into(), SubscriptionFilter::default()));
        let mut live = relay.subscribe("live".into(), SubscriptionFilter::default());

        assert_eq!(relay.publish(&SyncEvent::channel(ChangeType::Delete, "g1")), 1);
        assert_eq!(relay.subscriber_count(), 1);
        assert!(live.try_recv().is_some());
    }

    #[test]
    fn update_filter_requires_subscription() {
        let relay = EventRelay::new();
        assert!(!relay.update_filter(&"x".into(), SubscriptionFilter::default()));
        let _sub = relay.subscribe("x".into(), SubscriptionFilter::default());
        assert!(relay.update_filter(
            &"x".into(),
            SubscriptionFilter {
                guild_id: Some("g".into()),
                channel_id: None,
            }
        ));
    }

    #[test]
    fn slow_subscriber_queue_is_bounded() {
        let relay = EventRelay::with_capacity(2);
        let mut slow = relay.subscribe("slow".into(), SubscriptionFilter::default());
        let mut fast = relay.subscribe("fast".into(), SubscriptionFilter::default());

        assert_eq!(relay.publish(&SyncEvent::message(ChangeType::Create, "c1")), 2);
        assert!(fast.try_recv().is_some());
        assert_eq!(relay.publish(&SyncEvent::message(ChangeType::Update, "c1")), 2);
        assert!(fast.try_recv().is_some());
        // `slow` never reads, so the third event only reaches `fast`.
        assert_eq!(relay.publish(&SyncEvent::message(ChangeType::Delete, "c1")), 1);
        assert_eq!(fast.try_recv(), Some(SyncEvent::message(ChangeType::Delete, "c1")));

        assert_eq!(slow.try_recv(), Some(SyncEvent::message(ChangeType::Create, "c1")));
        assert_eq!(slow.try_recv(), Some(SyncEvent::message(ChangeType::Update, "c1")));
        assert_eq!(slow.try_recv(), None);
        assert_eq!(relay.subscriber_count(), 2);
    }
}
