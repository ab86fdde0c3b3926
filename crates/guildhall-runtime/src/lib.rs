//! Guildhall Runtime - process orchestration for the Guildhall bridge.
//!
//! This crate provides:
//! - Layered configuration (`GuildhallConfig`, `ConfigLoader`)
//! - Logging setup (`LoggingBuilder`)
//! - Wiring of the Discord adapter, the sync hub and the dashboard server
//!   (`GuildhallRuntime`)
//!
//! # Configuration Sources
//!
//! Later sources override earlier ones:
//!
//! | Order | Source                                  |
//! |-------|-----------------------------------------|
//! | 1     | Built-in defaults                       |
//! | 2     | `guildhall.<profile>.toml`              |
//! | 3     | `guildhall.toml` (or an explicit file)  |
//! | 4     | `GUILDHALL_*` environment, `__` nesting |
//! | 5     | Programmatic overrides (`merge`)        |
//!
//! ```ignore
//! use guildhall_runtime::GuildhallRuntime;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let runtime = GuildhallRuntime::builder().build()?;
//!     runtime.run().await?;
//!     Ok(())
//! }
//! ```
//!
//! `GUILDHALL_DISCORD__TOKEN=...` is the usual way to supply the bot token.

pub mod config;
pub mod error;
pub mod logging;
pub mod runtime;

pub use config::{ConfigError, ConfigLoader, ConfigResult, GuildhallConfig, Profile};
pub use error::{RuntimeError, RuntimeResult};
pub use logging::{LoggingBuilder, SpanEvents};
pub use runtime::{AppContext, GuildhallRuntime, RuntimeBuilder};

pub use tracing;
