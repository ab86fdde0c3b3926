//! Ingestion point for upstream push events.
//!
//! [`SyncHub`] pairs the [`StateCache`] with the [`EventRelay`] so every
//! event drops the cached slice before clients hear about it.

use std::sync::Arc;

use tracing::info;

use super::cache::StateCache;
use super::event::SyncEvent;
use super::relay::EventRelay;
use crate::platform::EventSink;

/// Entry point for upstream push events: invalidates the cache slice first,
/// then relays the hint to clients, so a client re-fetching in response
/// never sees the stale entry.
#[derive(Clone)]
pub struct SyncHub {
    cache: Arc<StateCache>,
    relay: Arc<EventRelay>,
}

impl SyncHub {
    pub fn new(cache: Arc<StateCache>, relay: Arc<EventRelay>) -> Self {
        Self { cache, relay }
    }

    pub fn cache(&self) -> &Arc<StateCache> {
        &self.cache
    }

    pub fn relay(&self) -> &Arc<EventRelay> {
        &self.relay
    }
}

impl EventSink for SyncHub {
    fn publish(&self, event: SyncEvent) {
        self.cache.apply(&event);
        self.relay.publish(&event);
    }

    fn resync(&self) {
        info!("push connection resumed, dropping cached state");
        self.cache.clear();
    }
}
