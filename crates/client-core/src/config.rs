//! Client configuration
//!
//! [`VertoConfig`] carries the credentials, media defaults and timer settings
//! of one client session. It can be built in code with the `with_*` builder
//! methods or loaded from TOML; every field has a default so partial files
//! are accepted.
//!
//! # Examples
//!
//! ```rust
//! use std::time::Duration;
//! use verto_client_core::config::VertoConfig;
//!
//! let config = VertoConfig::new()
//!     .with_login("1008@example.com", "1234")
//!     .with_socket_url("wss://example.com:8082")
//!     .with_ring_sleep(Duration::from_secs(4));
//!
//! assert_eq!(config.login.as_deref(), Some("1008@example.com"));
//! assert_eq!(config.ring_sleep(), Duration::from_secs(4));
//! assert!(config.validate().is_ok());
//! ```
//!
//! ```rust
//! use verto_client_core::config::{IceServers, VertoConfig};
//!
//! let config = VertoConfig::from_toml_str(r#"
//!     login = "1008@example.com"
//!     passwd = "1234"
//!     use_stereo = true
//!     ice_servers = true
//!     trying_timeout_ms = 10000
//! "#).unwrap();
//!
//! assert!(config.use_stereo);
//! assert_eq!(config.ice_servers, IceServers::Enabled(true));
//! assert_eq!(config.ring_sleep_ms, 6000);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{ClientError, ClientResult};

/// Default interval between ring indications
pub const DEFAULT_RING_SLEEP_MS: u64 = 6_000;

/// Default time an outbound call may stay in `trying`
pub const DEFAULT_TRYING_TIMEOUT_MS: u64 = 30_000;

/// Default live-array heartbeat period
pub const DEFAULT_HEARTBEAT_INTERVAL_MS: u64 = 30_000;

/// Default capacity of the client event broadcast channel
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// One STUN/TURN server entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
}

/// ICE server policy handed to the media engine
///
/// `false` disables ICE servers, `true` lets the media engine use its
/// built-in defaults and a list selects explicit servers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IceServers {
    Enabled(bool),
    Custom(Vec<IceServer>),
}

impl IceServers {
    pub fn is_enabled(&self) -> bool {
        match self {
            IceServers::Enabled(enabled) => *enabled,
            IceServers::Custom(servers) => !servers.is_empty(),
        }
    }
}

impl Default for IceServers {
    fn default() -> Self {
        IceServers::Enabled(false)
    }
}

/// Configuration of a Verto client session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VertoConfig {
    /// Login (usually `user@domain`)
    pub login: Option<String>,
    /// Password sent with the login request
    pub passwd: Option<String>,
    /// Server websocket URL, for the transport's benefit
    pub socket_url: Option<String>,
    /// Resume a prior session instead of generating a fresh id
    pub session_id: Option<String>,
    /// Element tag copied into every dialog's parameters
    pub tag: Option<String>,
    /// Ring tone resource; ring indication is only emitted when set
    pub ring_file: Option<String>,
    pub ring_sleep_ms: u64,
    pub ice_servers: IceServers,
    /// Default video flag for new dialogs
    pub use_video: bool,
    /// Default stereo flag for new dialogs
    pub use_stereo: bool,
    /// Opaque video constraints passed to the media engine
    pub video_params: Value,
    pub trying_timeout_ms: u64,
    pub heartbeat_interval_ms: u64,
    pub event_channel_capacity: usize,
}

impl VertoConfig {
    pub fn new() -> Self {
        Self {
            login: None,
            passwd: None,
            socket_url: None,
            session_id: None,
            tag: None,
            ring_file: None,
            ring_sleep_ms: DEFAULT_RING_SLEEP_MS,
            ice_servers: IceServers::default(),
            use_video: false,
            use_stereo: false,
            video_params: Value::Object(Default::default()),
            trying_timeout_ms: DEFAULT_TRYING_TIMEOUT_MS,
            heartbeat_interval_ms: DEFAULT_HEARTBEAT_INTERVAL_MS,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
        }
    }

    /// Parse a TOML document; missing keys take their defaults
    pub fn from_toml_str(s: &str) -> ClientResult<Self> {
        let config: VertoConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_login(mut self, login: impl Into<String>, passwd: impl Into<String>) -> Self {
        self.login = Some(login.into());
        self.passwd = Some(passwd.into());
        self
    }

    pub fn with_socket_url(mut self, url: impl Into<String>) -> Self {
        self.socket_url = Some(url.into());
        self
    }

    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub fn with_ring_file(mut self, ring_file: impl Into<String>) -> Self {
        self.ring_file = Some(ring_file.into());
        self
    }

    pub fn with_ring_sleep(mut self, sleep: Duration) -> Self {
        self.ring_sleep_ms = sleep.as_millis() as u64;
        self
    }

    pub fn with_ice_servers(mut self, ice_servers: IceServers) -> Self {
        self.ice_servers = ice_servers;
        self
    }

    pub fn with_video(mut self, enabled: bool) -> Self {
        self.use_video = enabled;
        self
    }

    pub fn with_stereo(mut self, enabled: bool) -> Self {
        self.use_stereo = enabled;
        self
    }

    pub fn with_video_params(mut self, params: Value) -> Self {
        self.video_params = params;
        self
    }

    pub fn with_trying_timeout(mut self, timeout: Duration) -> Self {
        self.trying_timeout_ms = timeout.as_millis() as u64;
        self
    }

    pub fn with_heartbeat_interval(mut self, interval: Duration) -> Self {
        self.heartbeat_interval_ms = interval.as_millis() as u64;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn ring_sleep(&self) -> Duration {
        Duration::from_millis(self.ring_sleep_ms)
    }

    pub fn trying_timeout(&self) -> Duration {
        Duration::from_millis(self.trying_timeout_ms)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    /// Reject settings that would spin timers or break the event channel
    pub fn validate(&self) -> ClientResult<()> {
        if self.ring_sleep_ms == 0 {
            return Err(ClientError::Configuration(
                "ring_sleep_ms must be greater than zero".to_string(),
            ));
        }
        if self.trying_timeout_ms == 0 {
            return Err(ClientError::Configuration(
                "trying_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 {
            return Err(ClientError::Configuration(
                "heartbeat_interval_ms must be greater than zero".to_string(),
            ));
        }
        if self.event_channel_capacity == 0 {
            return Err(ClientError::Configuration(
                "event_channel_capacity must be greater than zero".to_string(),
            ));
        }
        if self.login.is_some() != self.passwd.is_some() {
            return Err(ClientError::Configuration(
                "login and passwd must be set together".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for VertoConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_defaults() {
        let config = VertoConfig::default();
        assert_eq!(config.ring_sleep(), Duration::from_millis(6000));
        assert_eq!(config.trying_timeout(), Duration::from_secs(30));
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(30));
        assert_eq!(config.ice_servers, IceServers::Enabled(false));
        assert!(!config.use_video);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_custom_ice_servers_from_toml() {
        let config = VertoConfig::from_toml_str(
            r#"
            [[ice_servers]]
            urls = "stun:stun.example.com:3478"

            [[ice_servers]]
            urls = "turn:turn.example.com"
            username = "u"
            credential = "p"
            "#,
        )
        .unwrap();

        match &config.ice_servers {
            IceServers::Custom(servers) => {
                assert_eq!(servers.len(), 2);
                assert_eq!(servers[1].username.as_deref(), Some("u"));
            }
            other => panic!("unexpected ice servers: {:?}", other),
        }
        assert!(config.ice_servers.is_enabled());
    }

    #[test]
    fn test_validate_rejects_zero_timers() {
        let config = VertoConfig::new().with_ring_sleep(Duration::ZERO);
        assert!(matches!(
            config.validate(),
            Err(ClientError::Configuration(_))
        ));
    }

    #[test]
    fn test_validate_rejects_half_credentials() {
        let mut config = VertoConfig::new();
        config.login = Some("1008".into());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_toml_is_a_configuration_error() {
        let err = VertoConfig::from_toml_str("ring_sleep_ms = \"soon\"").unwrap_err();
        assert!(matches!(err, ClientError::Configuration(_)));
    }

    #[test]
    fn test_json_round_trip_keeps_video_params() {
        let config = VertoConfig::new().with_video_params(json!({"minWidth": 1280}));
        let value = serde_json::to_value(&config).unwrap();
        assert_eq!(value["video_params"]["minWidth"], 1280);
    }
}
