//! Process configuration.
//!
//! The relay needs exactly one shared bot identity to speak upstream:
//! an account login and an OAuth token, both taken from the environment.
//! Missing either is a fatal startup condition.

use secrecy::SecretString;
use url::Url;

use crate::error::ConfigError;

/// Environment variable holding the bot account login.
pub const ENV_BOT_USERNAME: &str = "TWITCH_USERNAME";

/// Environment variable holding the bot OAuth token.
pub const ENV_BOT_TOKEN: &str = "TWITCH_TOKEN";

/// Environment variable overriding the upstream chat endpoint.
pub const ENV_UPSTREAM_URL: &str = "TWITCH_IRC_URL";

/// Default upstream chat endpoint (TMI over WebSocket).
pub const DEFAULT_UPSTREAM_URL: &str = "wss://irc-ws.chat.twitch.tv:443";

/// Runtime configuration for the relay.
#[derive(Debug, Clone)]
pub struct Config {
    /// Login of the shared bot identity.
    pub bot_username: String,
    /// OAuth token for the shared bot identity.
    pub bot_token: SecretString,
    /// Upstream chat endpoint. Overridable for local testing.
    pub upstream_url: Url,
}

impl Config {
    /// Load configuration from the process environment.
    ///
    /// `TWITCH_USERNAME` and `TWITCH_TOKEN` are required; an unset or empty
    /// value fails with [`ConfigError::MissingEnvVar`] naming the variable.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bot_username = require(&lookup, ENV_BOT_USERNAME)?;
        let bot_token = SecretString::from(require(&lookup, ENV_BOT_TOKEN)?);

        let raw_url = lookup(ENV_UPSTREAM_URL)
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_UPSTREAM_URL.to_string());
        let upstream_url = Url::parse(&raw_url).map_err(|e| ConfigError::InvalidValue {
            key: ENV_UPSTREAM_URL.to_string(),
            message: e.to_string(),
        })?;

        Ok(Self {
            bot_username,
            bot_token,
            upstream_url,
        })
    }
}

fn require(lookup: impl Fn(&str) -> Option<String>, key: &str) -> Result<String, ConfigError> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ConfigError::MissingEnvVar(key.to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use secrecy::ExposeSecret;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_loads_required_secrets() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_BOT_USERNAME, "relaybot"),
            (ENV_BOT_TOKEN, "oauth:abc123"),
        ]))
        .unwrap();

        assert_eq!(config.bot_username, "relaybot");
        assert_eq!(config.bot_token.expose_secret(), "oauth:abc123");
        assert_eq!(config.upstream_url.scheme(), "wss");
        assert_eq!(config.upstream_url.host_str(), Some("irc-ws.chat.twitch.tv"));
    }

    #[test]
    fn test_missing_username_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[(ENV_BOT_TOKEN, "oauth:abc")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == ENV_BOT_USERNAME));
    }

    #[test]
    fn test_missing_token_is_fatal() {
        let err = Config::from_lookup(lookup_from(&[(ENV_BOT_USERNAME, "relaybot")])).unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(ref key) if key == ENV_BOT_TOKEN));
    }

    #[test]
    fn test_empty_value_counts_as_missing() {
        let err = Config::from_lookup(lookup_from(&[
            (ENV_BOT_USERNAME, "   "),
            (ENV_BOT_TOKEN, "oauth:abc"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::MissingEnvVar(_)));
    }

    #[test]
    fn test_upstream_url_override() {
        let config = Config::from_lookup(lookup_from(&[
            (ENV_BOT_USERNAME, "relaybot"),
            (ENV_BOT_TOKEN, "oauth:abc"),
            (ENV_UPSTREAM_URL, "ws://127.0.0.1:9443"),
        ]))
        .unwrap();
        assert_eq!(config.upstream_url.as_str(), "ws://127.0.0.1:9443/");
    }

    #[test]
    fn test_invalid_upstream_url_rejected() {
        let err = Config::from_lookup(lookup_from(&[
            (ENV_BOT_USERNAME, "relaybot"),
            (ENV_BOT_TOKEN, "oauth:abc"),
            (ENV_UPSTREAM_URL, "not a url"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == ENV_UPSTREAM_URL));
    }
}
