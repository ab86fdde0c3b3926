//! Guildhall Client - SDK for dashboard frontends.
//!
//! | Type | Role |
//! |------|------|
//! | [`DashboardClient`] | Typed calls for every REST route |
//! | [`PushListener`] | Push channel consumer with reconnection |
//! | [`PresenceMonitor`] | Membership state machine driving the invite flow |
//! | [`DashboardSession`] | Owns the view, push, refresh and presence tasks |
//!
//! # Example
//!
//! ```ignore
//! use guildhall_client::{DashboardClient, DashboardSession, SessionConfig, SessionUpdate};
//!
//! let client = DashboardClient::new("http://127.0.0.1:8080")?;
//! let (session, mut updates) = DashboardSession::open(client, SessionConfig::default());
//!
//! session.select_guild(Some("81384788765712384".into()));
//! let monitor = session.watch_presence(
//!     session
//!         .presence_monitor("81384788765712384".into())
//!         .on_invite(|url| println!("Invite the bot: {url}")),
//! );
//!
//! while let Some(update) = updates.recv().await {
//!     match update {
//!         SessionUpdate::ChannelTree(tree) => println!("{} channels", tree.channels.len()),
//!         SessionUpdate::Messages { messages, .. } => println!("{} messages", messages.len()),
//!         SessionUpdate::FetchFailed { error, .. } => eprintln!("{}", error.user_message()),
//!     }
//! }
//! session.close().await;
//! ```

pub mod error;
pub mod presence;
pub mod push;
pub mod rest;
pub mod session;

pub use error::{ClientError, ClientResult};
pub use presence::{PresenceMonitor, PresenceProbe, PresenceState};
pub use push::PushListener;
pub use rest::DashboardClient;
pub use session::{DashboardSession, SessionConfig, SessionUpdate};
