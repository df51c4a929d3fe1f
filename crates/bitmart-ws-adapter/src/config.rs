/*
[INPUT]:  YAML configuration file or programmatic overrides
[OUTPUT]: Parsed WebSocket client configuration and endpoint resolution
[POS]:    Configuration layer - client setup
[UPDATE]: When adding new configuration options or endpoints
*/

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::{Credentials, MessageSigner};
use crate::error::{BitmartError, Result};
use crate::types::ConnectionKey;

const SPOT_PUBLIC_URL: &str = "wss://ws-manager-compress.bitmart.com/api?protocol=1.1";
const SPOT_PRIVATE_URL: &str = "wss://ws-manager-compress.bitmart.com/user?protocol=1.1";
const FUTURES_PUBLIC_URL: &str = "wss://openapi-ws-v2.bitmart.com/api?protocol=1.1";
const FUTURES_PRIVATE_URL: &str = "wss://openapi-ws-v2.bitmart.com/user?protocol=1.1";

/// Configuration for the multiplexed WebSocket client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WsClientConfig {
    /// Required only for private connections
    #[serde(default)]
    pub credentials: Option<Credentials>,
    /// Validity window of the auth signature
    #[serde(default = "default_recv_window_ms")]
    pub recv_window_ms: u64,
    /// Replaces the production endpoint of every key
    #[serde(default)]
    pub ws_url: Option<String>,
    /// Per-key endpoint, takes precedence over `ws_url`
    #[serde(default)]
    pub url_overrides: HashMap<ConnectionKey, String>,
    /// Keys missing here send all topics in a single request
    #[serde(default)]
    pub max_topics_per_message: HashMap<ConnectionKey, usize>,
    /// Upper bound on opening a socket
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_heartbeat_interval_ms")]
    pub heartbeat_interval_ms: u64,
    #[serde(default = "default_pong_timeout_ms")]
    pub pong_timeout_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_reconnect_base_delay_ms")]
    pub reconnect_base_delay_ms: u64,
    #[serde(default = "default_reconnect_max_delay_ms")]
    pub reconnect_max_delay_ms: u64,
    #[serde(skip)]
    pub sign_message: MessageSigner,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            credentials: None,
            recv_window_ms: default_recv_window_ms(),
            ws_url: None,
            url_overrides: HashMap::new(),
            max_topics_per_message: HashMap::new(),
            connect_timeout_ms: default_connect_timeout_ms(),
            heartbeat_interval_ms: default_heartbeat_interval_ms(),
            pong_timeout_ms: default_pong_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            reconnect_base_delay_ms: default_reconnect_base_delay_ms(),
            reconnect_max_delay_ms: default_reconnect_max_delay_ms(),
            sign_message: MessageSigner::default(),
        }
    }
}

fn default_recv_window_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_heartbeat_interval_ms() -> u64 {
    10_000
}

fn default_pong_timeout_ms() -> u64 {
    1_000
}

fn default_auth_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_base_delay_ms() -> u64 {
    500
}

fn default_reconnect_max_delay_ms() -> u64 {
    30_000
}

impl WsClientConfig {
    /// Load configuration from YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let config: Self = serde_yaml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    pub fn with_sign_message(mut self, signer: MessageSigner) -> Self {
        self.sign_message = signer;
        self
    }

    pub fn with_max_topics_per_message(mut self, key: ConnectionKey, max: usize) -> Self {
        self.max_topics_per_message.insert(key, max);
        self
    }

    pub fn with_url_override(mut self, key: ConnectionKey, url: impl Into<String>) -> Self {
        self.url_overrides.insert(key, url.into());
        self
    }

    pub fn validate(&self) -> Result<()> {
        if let Some((key, _)) = self.max_topics_per_message.iter().find(|(_, max)| **max == 0) {
            return Err(BitmartError::Config(format!(
                "max_topics_per_message for {key} must be greater than zero"
            )));
        }
        if self.connect_timeout_ms == 0 {
            return Err(BitmartError::Config(
                "connect_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(BitmartError::Config(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.reconnect_base_delay_ms > self.reconnect_max_delay_ms {
            return Err(BitmartError::Config(
                "reconnect_base_delay_ms exceeds reconnect_max_delay_ms".to_string(),
            ));
        }
        Ok(())
    }

    /// Endpoint for a key: per-key override, then global override, then production.
    pub fn url_for(&self, key: ConnectionKey) -> Result<Url> {
        let raw = self
            .url_overrides
            .get(&key)
            .or(self.ws_url.as_ref())
            .map(String::as_str)
            .unwrap_or_else(|| production_url(key));

        Url::parse(raw).map_err(|e| BitmartError::UnresolvedEndpoint {
            key,
            reason: format!("{raw}: {e}"),
        })
    }

    pub fn max_topics_for(&self, key: ConnectionKey) -> Option<usize> {
        self.max_topics_per_message.get(&key).copied()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn pong_timeout(&self) -> Duration {
        Duration::from_millis(self.pong_timeout_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_millis(self.auth_timeout_ms)
    }
}

pub fn production_url(key: ConnectionKey) -> &'static str {
    match key {
        ConnectionKey::SpotPublic => SPOT_PUBLIC_URL,
        ConnectionKey::SpotPrivate => SPOT_PRIVATE_URL,
        ConnectionKey::FuturesPublic => FUTURES_PUBLIC_URL,
        ConnectionKey::FuturesPrivate => FUTURES_PRIVATE_URL,
    }
}
