//! Real-time synchronization: server-side cache, event fan-out and the
//! client-side view that decides what to re-fetch.

pub mod cache;
pub mod event;
pub mod hub;
pub mod relay;
pub mod view;

pub use cache::{FillTicket, Lookup, StateCache};
pub use event::{ChangeType, ClientFrame, SubscriptionFilter, SyncEvent, SyncEventKind};
pub use hub::SyncHub;
pub use relay::{EventRelay, Subscription};
pub use view::{ClientView, Refetch};
