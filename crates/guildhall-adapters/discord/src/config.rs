//! Configuration for the Discord adapter.
//!
//! Loaded from the `discord` section of the global configuration file.
//!
//! # Example Configuration
//!
//! ```toml
//! [discord]
//! token = "..."            # or GUILDHALL_DISCORD__TOKEN
//! application_id = "123456789012345678"
//! request_timeout_ms = 15000
//! invite_permissions = 68608
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// `GUILDS` gateway intent.
pub const INTENT_GUILDS: u64 = 1 << 0;
/// `GUILD_MESSAGES` gateway intent.
pub const INTENT_GUILD_MESSAGES: u64 = 1 << 9;

/// Discord adapter configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Whether the gateway push connection is started.
    pub enabled: bool,

    /// Bot token, sent as `Authorization: Bot <token>`.
    pub token: String,

    /// Application (client) id used for invite links.
    pub application_id: String,

    /// REST API root, including the version segment.
    pub api_base: String,

    /// Gateway WebSocket URL.
    pub gateway_url: String,

    /// OAuth2 authorize endpoint used for invite links.
    pub authorize_url: String,

    /// Gateway intents bitfield.
    pub intents: u64,

    /// Permission bitfield requested by invite links.
    pub invite_permissions: u64,

    /// Per-request HTTP timeout in milliseconds.
    pub request_timeout_ms: u64,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            token: String::new(),
            application_id: String::new(),
            api_base: "https://discord.com/api/v10".into(),
            gateway_url: "wss://gateway.discord.gg/?v=10&encoding=json".into(),
            authorize_url: "https://discord.com/oauth2/authorize".into(),
            intents: INTENT_GUILDS | INTENT_GUILD_MESSAGES,
            // View Channels | Send Messages | Read Message History
            invite_permissions: 1024 | 2048 | 65536,
            request_timeout_ms: 10_000,
        }
    }
}

impl DiscordConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Joins a REST path onto `api_base`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.api_base.trim_end_matches('/'), path.trim_start_matches('/'))
    }
}
