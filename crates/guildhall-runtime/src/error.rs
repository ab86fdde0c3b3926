//! Runtime error types.

use thiserror::Error;

use guildhall_adapter_discord::GatewayError;
use guildhall_core::{PolicyError, UpstreamError};
use guildhall_transport::ServerError;

pub use crate::config::{ConfigError, ConfigResult};

/// Errors that can occur while starting or running the bridge.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The retry section does not form a valid policy.
    #[error("Invalid retry policy: {0}")]
    Policy(#[from] PolicyError),

    /// The platform client could not be built.
    #[error("Failed to create platform client: {0}")]
    Platform(#[from] UpstreamError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A background task panicked or was aborted.
    #[error("Task failed: {0}")]
    Task(String),
}

/// Result type for runtime operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
