//! Client and session configuration

use crate::error::SdkError;
use std::time::Duration;

/// Target environment for the brokerage API
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Environment {
    #[default]
    Demo,
    Live,
}

impl Environment {
    /// REST base URL for this environment
    pub fn rest_base(&self) -> &'static str {
        match self {
            Environment::Demo => "https://api-demo.topstep.com",
            Environment::Live => "https://api.topstep.com",
        }
    }

    /// Streaming endpoint derived from the REST base: scheme flipped to
    /// websocket, `/ws` path appended.
    pub fn stream_url(&self) -> String {
        format!("{}/ws", self.rest_base().replacen("http", "ws", 1))
    }
}

/// OAuth application configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: Option<String>,
    pub environment: Environment,
}

impl AuthConfig {
    pub fn new(client_id: &str, client_secret: &str) -> Self {
        Self {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            redirect_uri: None,
            environment: Environment::Demo,
        }
    }

    pub fn with_redirect_uri(mut self, uri: &str) -> Self {
        self.redirect_uri = Some(uri.to_string());
        self
    }

    pub fn with_environment(mut self, env: Environment) -> Self {
        self.environment = env;
        self
    }

    /// Load configuration from environment variables.
    ///
    /// Reads `PROJECTX_CLIENT_ID`, `PROJECTX_CLIENT_SECRET`, and optionally
    /// `PROJECTX_REDIRECT_URI` and `PROJECTX_ENV` (`demo`/`live`).
    /// A `.env` file is honored via dotenvy.
    pub fn from_env() -> Result<Self, SdkError> {
        let _ = dotenvy::dotenv();

        let client_id = std::env::var("PROJECTX_CLIENT_ID")
            .map_err(|_| SdkError::Config("PROJECTX_CLIENT_ID not set".to_string()))?;
        let client_secret = std::env::var("PROJECTX_CLIENT_SECRET")
            .map_err(|_| SdkError::Config("PROJECTX_CLIENT_SECRET not set".to_string()))?;

        let mut config = Self::new(&client_id, &client_secret);

        if let Ok(uri) = std::env::var("PROJECTX_REDIRECT_URI") {
            config.redirect_uri = Some(uri);
        }
        if let Ok(env) = std::env::var("PROJECTX_ENV") {
            config.environment = match env.to_lowercase().as_str() {
                "live" => Environment::Live,
                "demo" => Environment::Demo,
                other => {
                    return Err(SdkError::Config(format!(
                        "PROJECTX_ENV must be `demo` or `live`, got `{}`",
                        other
                    )))
                }
            };
        }

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if self.client_id.is_empty() {
            return Err(SdkError::Config("client_id cannot be empty".to_string()));
        }
        if self.client_secret.is_empty() {
            return Err(SdkError::Config("client_secret cannot be empty".to_string()));
        }
        Ok(())
    }
}

/// Reconnect backoff configuration.
///
/// Delays grow exponentially from `initial_delay` by `multiplier` up to
/// `max_delay`, with up to `jitter_factor` of random jitter applied on top.
/// There is no attempt cap; retries stop only on `disconnect()` or a fatal
/// auth failure.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    pub jitter_factor: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
            jitter_factor: 0.25,
        }
    }
}

impl ReconnectConfig {
    pub fn validate(&self) -> Result<(), SdkError> {
        if self.initial_delay.is_zero() {
            return Err(SdkError::Config(
                "initial_delay must be greater than zero".to_string(),
            ));
        }
        if self.max_delay < self.initial_delay {
            return Err(SdkError::Config(
                "max_delay must be >= initial_delay".to_string(),
            ));
        }
        if self.multiplier < 1.0 {
            return Err(SdkError::Config(
                "multiplier must be >= 1.0".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(SdkError::Config(
                "jitter_factor must be in [0.0, 1.0]".to_string(),
            ));
        }
        Ok(())
    }
}

/// Session manager configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Streaming endpoint URL
    pub stream_url: String,
    /// Timeout for establishing the websocket connection
    pub connect_timeout: Duration,
    /// Grace window after the auth frame during which an explicit rejection
    /// is treated as fatal; the protocol sends no positive ack, so the
    /// session proceeds optimistically once the window elapses.
    pub auth_grace: Duration,
    /// Safety margin subtracted from token expiry
    pub expiry_skew: Duration,
    pub reconnect: ReconnectConfig,
}

impl SessionConfig {
    pub fn for_environment(env: Environment) -> Self {
        Self {
            stream_url: env.stream_url(),
            ..Default::default()
        }
    }

    pub fn validate(&self) -> Result<(), SdkError> {
        if !self.stream_url.starts_with("ws://") && !self.stream_url.starts_with("wss://") {
            return Err(SdkError::Config(
                "stream_url must be a ws:// or wss:// URL".to_string(),
            ));
        }
        if self.connect_timeout.is_zero() {
            return Err(SdkError::Config(
                "connect_timeout must be greater than zero".to_string(),
            ));
        }
        self.reconnect.validate()
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            stream_url: Environment::Demo.stream_url(),
            connect_timeout: Duration::from_secs(10),
            auth_grace: Duration::from_millis(500),
            expiry_skew: Duration::from_secs(30),
            reconnect: ReconnectConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_url_derived_from_rest_base() {
        assert_eq!(
            Environment::Demo.stream_url(),
            "wss://api-demo.topstep.com/ws"
        );
        assert_eq!(Environment::Live.stream_url(), "wss://api.topstep.com/ws");
    }

    #[test]
    fn default_session_config_is_valid() {
        assert!(SessionConfig::default().validate().is_ok());
    }

    #[test]
    fn rejects_non_websocket_stream_url() {
        let config = SessionConfig {
            stream_url: "https://api.topstep.com/ws".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_inverted_backoff_bounds() {
        let reconnect = ReconnectConfig {
            initial_delay: Duration::from_secs(60),
            max_delay: Duration::from_secs(30),
            ..Default::default()
        };
        assert!(reconnect.validate().is_err());
    }

    #[test]
    fn auth_config_validates_empty_fields() {
        assert!(AuthConfig::new("", "secret").validate().is_err());
        assert!(AuthConfig::new("id", "").validate().is_err());
        assert!(AuthConfig::new("id", "secret").validate().is_ok());
    }
}
