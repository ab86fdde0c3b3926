//! # Guildhall Transport
//!
//! Dashboard-facing HTTP surface of the Guildhall bridge.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐
//! │  Dashboard (browser)│
//! ├─────────────────────┤
//! │  routes / push      │  <- This crate (axum)
//! ├─────────────────────┤
//! │  DashboardService   │  retry + timeout + cache + media
//! ├─────────────────────┤
//! │  Platform adapter   │  (Discord)
//! └─────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use guildhall_transport::{DashboardServer, DashboardService};
//!
//! let service = Arc::new(DashboardService::new(platform, &hub).with_shutdown(shutdown.clone()));
//! let server = DashboardServer::bind("0.0.0.0:8080", service, "/push").await?;
//! server.serve(shutdown).await?;
//! ```

pub mod error;
pub mod push;
pub mod routes;
pub mod server;
pub mod service;

pub use error::{ApiError, ApiResult, ServerError};
pub use routes::router;
pub use server::DashboardServer;
pub use service::DashboardService;
