//! Configuration module for the Guildhall runtime.
//!
//! This module provides layered TOML/environment configuration loading and
//! validation for the dashboard server, the Discord adapter and the
//! resilience policies.

pub mod error;
pub mod loader;
pub mod schema;
pub mod validation;

pub use error::{ConfigError, ConfigResult};
pub use loader::{ConfigLoader, Profile, load_config, load_config_from_file};
pub use schema::{
    CacheConfig, GuildhallConfig, LogFormat, LogLevel, LogOutput, LogRotation, LoggingConfig,
    RetryConfig, ServerConfig, SpanEventConfig, UpstreamConfig,
};
pub use validation::validate_config;
