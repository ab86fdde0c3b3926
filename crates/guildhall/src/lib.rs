//! # Guildhall
//!
//! A bridge between a Discord bot and a multi-client web dashboard.
//!
//! ## Overview
//!
//! Guildhall keeps any number of dashboard clients consistent with the bot's
//! view of Discord. Upstream calls are wrapped in retry, timeout and
//! rate-limit handling; upstream push events invalidate a server-side cache
//! and are relayed to clients, which then re-fetch what changed.
//!
//! ## Architecture
//!
//! ```text
//! ┌────────────┐  gateway   ┌─────────┐   ┌────────────┐   push    ┌───────────┐
//! │  Discord   │──────────▶│ SyncHub │──▶│ EventRelay │─────────▶│ Dashboard │
//! │            │◀──────────│         │   └────────────┘           │  session  │
//! └────────────┘   REST     └─────────┘                            └───────────┘
//!       ▲                     StateCache                                 │
//!       │     Retry → Timeout → RateLimitClassifier      REST (re-fetch)  │
//!       └───────────────── DashboardService ◀────────────────────────────┘
//! ```
//!
//! | Crate | Contents |
//! |-------|----------|
//! | [`core`] | Domain model, error taxonomy, resilience primitives, sync layer |
//! | [`media`] | Size-bounded avatar compression |
//! | [`discord`] | Discord REST client and gateway |
//! | [`transport`] | Dashboard REST routes and push channel |
//! | [`runtime`] | Configuration, logging, orchestration |
//! | [`client`] | SDK for dashboard frontends |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guildhall::prelude::*;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = GuildhallRuntime::builder().profile("production").build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - `toml-config`: TOML configuration files (default)
//! - `json-log`: JSON log output

pub use guildhall_adapter_discord as discord;
pub use guildhall_client as client;
pub use guildhall_core as core;
pub use guildhall_media as media;
pub use guildhall_runtime as runtime;
pub use guildhall_transport as transport;

/// Prelude module for convenient imports.
pub mod prelude {
    // Runtime - main entry point
    pub use guildhall_runtime::{GuildhallConfig, GuildhallRuntime, RuntimeBuilder};

    // Resilience
    pub use guildhall_core::{
        RateLimitClassifier, RateLimitDecision, RetryExecutor, RetryPolicy, TimeoutGuard,
        UpstreamError, UpstreamResult,
    };

    // Sync
    pub use guildhall_core::{ClientView, EventRelay, StateCache, SyncEvent, SyncHub};

    // Media
    pub use guildhall_media::MediaCompressor;

    // Client SDK
    pub use guildhall_client::{
        DashboardClient, DashboardSession, PresenceMonitor, PresenceState, SessionConfig,
        SessionUpdate,
    };
}
