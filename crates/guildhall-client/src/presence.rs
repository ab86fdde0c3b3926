//! Guild membership tracking and the invite flow.
//!
//! # State machine
//!
//! ```text
//!   Unknown ──▶ Checking ──success──▶ Present (terminal)
//!                  │  ▲
//!   forbidden /    │  │ poll every `poll_interval`
//!   not found      ▼  │ until `ceiling`
//!               Absent ──invite url──▶ Inviting
//!
//!   any other failure ──▶ Unknown (stop)
//! ```
//!
//! The presence callback fires once per monitor, the first time `Present` is
//! reached. The invite callback receives the authorize URL the user should be
//! sent to; it fires on the `Absent → Inviting` edge only, polling does not
//! redirect again. Once the ceiling elapses polling stops and the state stays
//! `Inviting` until [`PresenceMonitor::run`] is called again.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::time::{Instant, interval_at, sleep_until};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use guildhall_core::{GuildId, GuildPresence, GuildSummary};

use crate::error::ClientResult;
use crate::rest::DashboardClient;

/// Default time between membership polls while an invite is pending.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(3);
/// Default wall-clock bound on polling after a redirect.
pub const DEFAULT_POLL_CEILING: Duration = Duration::from_secs(120);

/// Where the bot stands with respect to one guild.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PresenceState {
    Unknown,
    Checking,
    Present,
    Absent,
    Inviting,
}

impl fmt::Display for PresenceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "unknown",
            Self::Checking => "checking",
            Self::Present => "present",
            Self::Absent => "absent",
            Self::Inviting => "inviting",
        };
        f.write_str(name)
    }
}

/// The two calls the monitor needs from the dashboard.
#[async_trait]
pub trait PresenceProbe: Send + Sync {
    /// Membership probe. Absence may be reported either as
    /// `present: false` or as a forbidden / not-found error.
    async fn check(&self, guild_id: &GuildId) -> ClientResult<GuildPresence>;

    /// Invite URL for `guild_id`.
    async fn invite_url(&self, guild_id: &GuildId) -> ClientResult<String>;
}

#[async_trait]
impl PresenceProbe for DashboardClient {
    async fn check(&self, guild_id: &GuildId) -> ClientResult<GuildPresence> {
        self.presence(guild_id).await
    }

    async fn invite_url(&self, guild_id: &GuildId) -> ClientResult<String> {
        Ok(self.invite(guild_id).await?.url)
    }
}

type PresentCallback = Box<dyn FnOnce(Option<GuildSummary>) + Send>;
type InviteCallback = Box<dyn Fn(&str) + Send + Sync>;

/// Tracks whether the bot has joined a guild and drives the invite flow.
pub struct PresenceMonitor {
    probe: Arc<dyn PresenceProbe>,
    guild_id: GuildId,
    state: watch::Sender<PresenceState>,
    poll_interval: Duration,
    ceiling: Duration,
    on_present: Mutex<Option<PresentCallback>>,
    on_invite: Option<InviteCallback>,
}

impl PresenceMonitor {
    pub fn new(probe: Arc<dyn PresenceProbe>, guild_id: GuildId) -> Self {
        Self {
            probe,
            guild_id,
            state: watch::Sender::new(PresenceState::Unknown),
            poll_interval: DEFAULT_POLL_INTERVAL,
            ceiling: DEFAULT_POLL_CEILING,
            on_present: Mutex::new(None),
            on_invite: None,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_ceiling(mut self, ceiling: Duration) -> Self {
        self.ceiling = ceiling;
        self
    }

    /// Called once, when the bot is first seen in the guild.
    pub fn on_present<F>(self, callback: F) -> Self
    where
        F: FnOnce(Option<GuildSummary>) + Send + 'static,
    {
        *self.on_present.lock() = Some(Box::new(callback));
        self
    }

    /// Called with the invite URL the user should be redirected to.
    pub fn on_invite<F>(mut self, callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.on_invite = Some(Box::new(callback));
        self
    }

    pub fn guild_id(&self) -> &GuildId {
        &self.guild_id
    }

    pub fn state(&self) -> PresenceState {
        *self.state.borrow()
    }

    /// Receiver observing every state change.
    pub fn subscribe(&self) -> watch::Receiver<PresenceState> {
        self.state.subscribe()
    }

    fn set(&self, next: PresenceState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(guild_id = %self.guild_id, from = %prev, to = %next, "Presence state changed");
        }
    }

    /// Probes once. `Present` is terminal and is never probed again.
    pub async fn check(&self) -> PresenceState {
        if self.state() == PresenceState::Present {
            return PresenceState::Present;
        }
        self.set(PresenceState::Checking);

        let next = match self.probe.check(&self.guild_id).await {
            Ok(GuildPresence {
                present: true,
                guild,
            }) => {
                self.set(PresenceState::Present);
                let callback = self.on_present.lock().take();
                if let Some(callback) = callback {
                    callback(guild);
                }
                info!(guild_id = %self.guild_id, "Bot is present in guild");
                return PresenceState::Present;
            }
            Ok(_) => PresenceState::Absent,
            Err(e) if e.is_absence() => PresenceState::Absent,
            Err(e) => {
                warn!(guild_id = %self.guild_id, error = %e, "Presence probe failed");
                PresenceState::Unknown
            }
        };
        self.set(next);
        next
    }

    /// Requests an invite URL and hands it to the invite callback.
    async fn invite(&self) -> PresenceState {
        match self.probe.invite_url(&self.guild_id).await {
            Ok(url) => {
                self.set(PresenceState::Inviting);
                info!(guild_id = %self.guild_id, "Bot not in guild, inviting");
                if let Some(callback) = &self.on_invite {
                    callback(&url);
                }
                PresenceState::Inviting
            }
            Err(e) => {
                warn!(guild_id = %self.guild_id, error = %e, "Failed to get invite URL");
                self.set(PresenceState::Unknown);
                PresenceState::Unknown
            }
        }
    }

    /// Checks, invites if absent, then polls until present, the ceiling
    /// elapses or `shutdown` is cancelled. Returns the final state.
    pub async fn run(&self, shutdown: CancellationToken) -> PresenceState {
        let state = tokio::select! {
            _ = shutdown.cancelled() => return self.state(),
            state = self.check() => state,
        };
        if state != PresenceState::Absent {
            return state;
        }
        let state = tokio::select! {
            _ = shutdown.cancelled() => return self.state(),
            state = self.invite() => state,
        };
        if state != PresenceState::Inviting {
            return state;
        }
        self.poll(shutdown).await
    }

    async fn poll(&self, shutdown: CancellationToken) -> PresenceState {
        let start = Instant::now();
        let deadline = start + self.ceiling;
        let mut ticker = interval_at(start + self.poll_interval, self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => return self.state(),
                _ = sleep_until(deadline) => {
                    info!(
                        guild_id = %self.guild_id,
                        ceiling_secs = self.ceiling.as_secs(),
                        "Stopped waiting for the bot to join"
                    );
                    return PresenceState::Inviting;
                }
                _ = ticker.tick() => {
                    // A stalled check must not hold off shutdown or the ceiling.
                    let state = tokio::select! {
                        _ = shutdown.cancelled() => return self.abandon_check(),
                        _ = sleep_until(deadline) => {
                            info!(guild_id = %self.guild_id, "Presence check outlived the ceiling");
                            return self.abandon_check();
                        }
                        state = self.check() => state,
                    };
                    match state {
                        PresenceState::Absent => self.set(PresenceState::Inviting),
                        state => return state,
                    }
                }
            }
        }
    }

    /// Abandons an in-flight poll check; the invite is still pending.
    fn abandon_check(&self) -> PresenceState {
        if self.state() == PresenceState::Checking {
            self.set(PresenceState::Inviting);
        }
        self.state()
    }

    /// Runs the monitor on a background task.
    pub fn spawn(
        self: Arc<Self>,
        shutdown: CancellationToken,
    ) -> tokio::task::JoinHandle<PresenceState> {
        tokio::spawn(async move { self.run(shutdown).await })
    }
}
