use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::client::recovery::RetryConfig;
use crate::error::{ClientError, ClientResult};
use crate::transport::BackendKind;

const DEFAULT_ORIGIN: &str = "http://localhost:8080";

/// Serde helpers storing durations as integer milliseconds
pub mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Like [`duration_ms`] for optional durations
pub mod option_duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&(d.as_millis() as u64)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<Duration>, D::Error> {
        Ok(Option::<u64>::deserialize(deserializer)?.map(Duration::from_millis))
    }
}

/// Capture processing requested from the real-time primitives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AudioProcessing {
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl Default for AudioProcessing {
    fn default() -> Self {
        Self {
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Configuration for the signaling client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Origin of the hosting page; the session API lives under it
    pub server_origin: String,
    /// Backend to talk to
    pub backend: BackendKind,
    /// Session API path, defaults to the backend's path
    pub api_path: Option<String>,
    /// Prefix of generated user ids
    pub user_id_prefix: String,
    /// Reconnection policy
    pub retry: RetryConfig,
    /// Timeout of every HTTP call
    #[serde(rename = "request_timeout_ms", with = "duration_ms")]
    pub request_timeout: Duration,
    /// Timeout of transport establishment
    #[serde(rename = "connect_timeout_ms", with = "duration_ms")]
    pub connect_timeout: Duration,
    /// Escalate a peer-relay link that stays disconnected this long
    #[serde(rename = "disconnect_grace_ms", with = "option_duration_ms")]
    pub disconnect_grace: Option<Duration>,
    /// Capture processing
    pub audio: AudioProcessing,
    /// Capacity of the event broadcast channel
    pub event_capacity: usize,
}

impl ClientConfig {
    /// Create a new client configuration with defaults
    pub fn new() -> Self {
        Self {
            server_origin: DEFAULT_ORIGIN.to_string(),
            backend: BackendKind::PeerRelay,
            api_path: None,
            user_id_prefix: "user".to_string(),
            retry: RetryConfig::default(),
            request_timeout: Duration::from_secs(10),
            connect_timeout: Duration::from_secs(30),
            disconnect_grace: None,
            audio: AudioProcessing::default(),
            event_capacity: 64,
        }
    }

    /// Parse a configuration from TOML, filling unset keys with defaults
    pub fn from_toml_str(source: &str) -> ClientResult<Self> {
        let config: Self = toml::from_str(source)
            .map_err(|e| ClientError::invalid_configuration("toml", e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Set the hosting page origin
    pub fn with_server_origin(mut self, origin: impl Into<String>) -> Self {
        self.server_origin = origin.into();
        self
    }

    /// Set the backend
    pub fn with_backend(mut self, backend: BackendKind) -> Self {
        self.backend = backend;
        self
    }

    /// Override the session API path
    pub fn with_api_path(mut self, path: impl Into<String>) -> Self {
        self.api_path = Some(path.into());
        self
    }

    /// Set the reconnection policy
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Escalate long disconnections on the peer-relay backend
    pub fn with_disconnect_grace(mut self, grace: Duration) -> Self {
        self.disconnect_grace = Some(grace);
        self
    }

    pub fn with_audio(mut self, audio: AudioProcessing) -> Self {
        self.audio = audio;
        self
    }

    pub fn with_user_id_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.user_id_prefix = prefix.into();
        self
    }

    /// Base URL of the session API
    pub fn api_base_url(&self) -> ClientResult<Url> {
        let origin = Url::parse(&self.server_origin)
            .map_err(|e| ClientError::invalid_configuration("server_origin", e.to_string()))?;
        if origin.cannot_be_a_base() {
            return Err(ClientError::invalid_configuration(
                "server_origin",
                "must be an http(s) origin",
            ));
        }

        let path = self
            .api_path
            .as_deref()
            .unwrap_or_else(|| self.backend.default_api_path());
        origin
            .join(path)
            .map_err(|e| ClientError::invalid_configuration("api_path", e.to_string()))
    }

    /// Generate a user id for a new session
    pub fn next_user_id(&self) -> String {
        format!("{}-{}", self.user_id_prefix, Utc::now().timestamp_millis())
    }

    /// Reject configurations the client cannot run with
    pub fn validate(&self) -> ClientResult<()> {
        self.api_base_url()?;
        self.retry.validate()?;

        if self.user_id_prefix.is_empty() {
            return Err(ClientError::invalid_configuration("user_id_prefix", "must not be empty"));
        }
        if self.request_timeout.is_zero() {
            return Err(ClientError::invalid_configuration("request_timeout", "must be positive"));
        }
        if self.connect_timeout.is_zero() {
            return Err(ClientError::invalid_configuration("connect_timeout", "must be positive"));
        }
        if matches!(self.disconnect_grace, Some(grace) if grace.is_zero()) {
            return Err(ClientError::invalid_configuration("disconnect_grace", "must be positive when set"));
        }
        if self.event_capacity == 0 {
            return Err(ClientError::invalid_configuration("event_capacity", "must be positive"));
        }
        Ok(())
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}
