//! # Guildhall Adapter for Discord
//!
//! Connects the Guildhall bridge to Discord's REST API (v10) and gateway.
//!
//! ## Overview
//!
//! - [`DiscordClient`] implements [`guildhall_core::Platform`] over REST
//! - [`Gateway`] keeps a gateway session open and feeds channel/message
//!   dispatches into an [`guildhall_core::EventSink`]
//! - [`map_response`] / [`map_transport`] translate failures into the shared
//!   [`guildhall_core::UpstreamError`] taxonomy
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use guildhall_adapter_discord::{DiscordClient, DiscordConfig, Gateway};
//!
//! let config = DiscordConfig { token: "...".into(), ..Default::default() };
//! let platform = DiscordClient::new(config.clone())?;
//! let gateway = Gateway::new(Arc::new(config), hub, RetryPolicy::default(), shutdown.clone());
//! tokio::spawn(gateway.run());
//! ```
//!
//! ## Event Mapping
//!
//! ```text
//! CHANNEL_CREATE / CHANNEL_UPDATE / CHANNEL_DELETE   ──► SyncEvent::ChannelUpdate { guild_id }
//! MESSAGE_CREATE / MESSAGE_UPDATE / MESSAGE_DELETE*  ──► SyncEvent::MessageUpdate { channel_id }
//! READY after a reconnect                            ──► EventSink::resync()
//! ```

mod client;
pub mod config;
pub mod error;
pub mod gateway;
mod invite;
pub mod model;

pub use client::DiscordClient;
pub use config::DiscordConfig;
pub use error::{map_response, map_transport, parse_retry_after};
pub use gateway::{Gateway, GatewayError, dispatch_event, is_fatal_close};
pub use invite::invite_url;
