//! Session configuration.
//!
//! ```toml
//! signaling_url = "wss://rendezvous.example.org"
//! stun_servers = ["stun:stun.l.google.com:19302"]
//! data_channel_label = "multiplay-control"
//! capture_video = true
//! connect_timeout_ms = 10000
//!
//! [[turn_servers]]
//! urls = ["turn:turn.example.org:3478"]
//! username = "multiplay"
//! credential = "secret"
//! ```
//!
//! Every field has a serde default, so an empty document is a valid
//! configuration pointing at a rendezvous server on localhost.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::error::ConfigError;

/// Default rendezvous endpoint.
pub const DEFAULT_SIGNALING_URL: &str = "ws://127.0.0.1:9500";

/// Default public STUN server.
pub const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

/// Label of the control data channel.
pub const DEFAULT_DATA_CHANNEL_LABEL: &str = "multiplay-control";

/// Default limit on how long the signaling dial may take.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 10_000;

/// A TURN relay with credentials.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnServer {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

/// Everything the kernel needs to know before it starts a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// WebSocket URL of the rendezvous server.
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,

    #[serde(default = "default_stun_servers")]
    pub stun_servers: Vec<String>,

    #[serde(default)]
    pub turn_servers: Vec<TurnServer>,

    #[serde(default = "default_data_channel_label")]
    pub data_channel_label: String,

    /// When `false` the host never starts a capture, even if a surface is
    /// available. Useful for input-only sessions.
    #[serde(default = "default_capture_video")]
    pub capture_video: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

impl SessionConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrongly typed fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Same defaults, different rendezvous endpoint.
    pub fn with_signaling_url(url: impl Into<String>) -> Self {
        Self {
            signaling_url: url.into(),
            ..Self::default()
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            signaling_url: default_signaling_url(),
            stun_servers: default_stun_servers(),
            turn_servers: Vec::new(),
            data_channel_label: default_data_channel_label(),
            capture_video: default_capture_video(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}

fn default_signaling_url() -> String {
    DEFAULT_SIGNALING_URL.to_string()
}

fn default_stun_servers() -> Vec<String> {
    vec![DEFAULT_STUN_SERVER.to_string()]
}

fn default_data_channel_label() -> String {
    DEFAULT_DATA_CHANNEL_LABEL.to_string()
}

fn default_capture_video() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    DEFAULT_CONNECT_TIMEOUT_MS
}
