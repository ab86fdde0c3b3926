//! # Guildhall Core
//!
//! Platform-independent core of the Guildhall dashboard bridge.
//!
//! ## Layers
//!
//! ### Model
//!
//! - **Domain types**: guilds, channel forests, messages ([`GuildSnapshot`], [`ChannelTree`])
//! - **Errors**: the closed upstream error taxonomy ([`UpstreamError`])
//! - **Seams**: outbound [`Platform`] calls and inbound [`EventSink`] delivery
//!
//! ### Resilience
//!
//! Every upstream call runs inside a retry loop, each attempt bounded in time:
//!
//! ```text
//! RetryExecutor ──▶ TimeoutGuard ──▶ Platform call
//!       ▲                                  │ error
//!       └──────── RateLimitClassifier ◀────┘
//! ```
//!
//! ### Sync
//!
//! Push events invalidate the [`StateCache`] and fan out through the
//! [`EventRelay`]; clients check each event against their [`ClientView`] and
//! pull the affected slice again.
//!
//! ```text
//! ┌──────────┐     ┌─────────┐     ┌────────────┐     ┌──────────────┐
//! │ Gateway  │────▶│ SyncHub │────▶│ EventRelay │────▶│ ClientView   │──▶ re-fetch
//! └──────────┘     └────┬────┘     └────────────┘────▶│ ClientView   │
//!                       ▼                             └──────────────┘
//!                  StateCache
//! ```
//!
//! ## Example
//!
//! ```rust,ignore
//! use guildhall_core::{RetryExecutor, RetryPolicy, with_timeout, cancellable};
//! use std::time::Duration;
//!
//! let executor = RetryExecutor::new(RetryPolicy::default());
//! let tree = executor
//!     .execute(|| with_timeout(Duration::from_secs(15), "channel fetch timed out", |token| {
//!         let platform = platform.clone();
//!         async move { cancellable(&token, platform.fetch_channel_tree(&guild_id)).await }
//!     }))
//!     .await?;
//! ```

pub mod api;
pub mod error;
pub mod model;
pub mod platform;
pub mod resilience;
pub mod sync;

pub use api::{ErrorBody, GENERIC_ERROR_MESSAGE, GuildPresence, InviteLink, ProfileRequest};
pub use error::{
    IdentityField, NetworkFailure, RateLimitKind, UpstreamError, UpstreamResult,
};
pub use model::{
    AvatarImage, BotProfile, ChannelId, ChannelInfo, ChannelKind, ChannelNode, ChannelTree,
    ChatMessage, ClientId, GuildId, GuildSnapshot, GuildSummary, MessageId, MessagePayload,
    ProfileUpdate,
};
pub use platform::{EventSink, Platform};
pub use resilience::{
    PolicyError, RateLimitClassifier, RateLimitDecision, RetryExecutor, RetryNotice, RetryPolicy,
    TimeoutGuard, cancellable, with_timeout,
};
pub use sync::{
    ChangeType, ClientFrame, ClientView, EventRelay, FillTicket, Lookup, Refetch, StateCache,
    Subscription, SubscriptionFilter, SyncEvent, SyncEventKind, SyncHub,
};
