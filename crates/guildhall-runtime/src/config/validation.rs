//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{GuildhallConfig, RetryConfig, ServerConfig};
use guildhall_adapter_discord::DiscordConfig;

/// Validates the entire configuration.
pub fn validate_config(config: &GuildhallConfig) -> ConfigResult<()> {
    validate_server_config(&config.server)?;
    validate_retry_config(&config.retry)?;
    validate_discord_config(&config.discord)?;

    if config.upstream.timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Upstream timeout must be greater than 0",
        ));
    }
    if config.cache.message_limit == 0 {
        return Err(ConfigError::validation(
            "Cache message limit must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_server_config(server: &ServerConfig) -> ConfigResult<()> {
    if server.host.is_empty() {
        return Err(ConfigError::missing_field("server.host"));
    }
    if server.port == 0 {
        return Err(ConfigError::InvalidPort(server.port));
    }
    validate_path(&server.push_path)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.max_attempts == 0 {
        return Err(ConfigError::validation(
            "Retry max_attempts must be at least 1",
        ));
    }
    if retry.max_delay_ms < retry.base_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to base delay",
        ));
    }
    Ok(())
}

fn validate_discord_config(discord: &DiscordConfig) -> ConfigResult<()> {
    validate_url(&discord.api_base, &["http://", "https://"])?;
    validate_url(&discord.gateway_url, &["ws://", "wss://"])?;
    validate_url(&discord.authorize_url, &["http://", "https://"])?;

    if discord.enabled && discord.token.trim().is_empty() {
        return Err(ConfigError::missing_field("discord.token"));
    }
    if discord.request_timeout_ms == 0 {
        return Err(ConfigError::validation(
            "Discord request timeout must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_url(url: &str, schemes: &[&str]) -> ConfigResult<()> {
    if url.is_empty() {
        return Err(ConfigError::missing_field("url"));
    }
    if !schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {schemes:?}"),
        ));
    }
    Ok(())
}

fn validate_path(path: &str) -> ConfigResult<()> {
    if !path.starts_with('/') {
        return Err(ConfigError::validation("Path must start with '/'"));
    }
    Ok(())
}
