//! OAuth2 authorize URLs that add the bot to a guild.

use reqwest::Url;

use guildhall_core::{GuildId, UpstreamError, UpstreamResult};

use crate::config::DiscordConfig;

/// Builds the OAuth2 URL that adds the bot to `guild_id`.
pub fn invite_url(config: &DiscordConfig, guild_id: &GuildId) -> UpstreamResult<String> {
    if config.application_id.is_empty() {
        return Err(UpstreamError::protocol(
            "discord.application_id is required to build invite links",
        ));
    }
    let permissions = config.invite_permissions.to_string();
    let url = Url::parse_with_params(
        &config.authorize_url,
        [
            ("client_id", config.application_id.as_str()),
            ("scope", "bot applications.commands"),
            ("permissions", permissions.as_str()),
            ("guild_id", guild_id.as_str()),
            ("disable_guild_select", "true"),
        ],
    )
    .map_err(|e| UpstreamError::protocol(format!("invalid authorize url: {e}")))?;
    Ok(url.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_guild_scoped_invite() {
        let config = DiscordConfig {
            application_id: "1234".into(),
            invite_permissions: 8,
            ..Default::default()
        };
        let url = invite_url(&config, &"999".into()).unwrap();
        assert_eq!(
            url,
            "https://discord.com/oauth2/authorize?client_id=1234&scope=bot+applications.commands\
             &permissions=8&guild_id=999&disable_guild_select=true"
        );
    }

    #[test]
    fn requires_application_id() {
        assert!(invite_url(&DiscordConfig::default(), &"1".into()).is_err());
    }
}
