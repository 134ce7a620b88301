//! Rendezvous server configuration.
//!
//! Built from CLI arguments in `main.rs`, or loaded from a TOML file when
//! `--config` is given. Every field has a default so a partial file works.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default WebSocket listener port.
pub const DEFAULT_PORT: u16 = 9500;

/// Default cap on simultaneously open rooms.
pub const DEFAULT_MAX_ROOMS: usize = 10_000;

/// Errors raised while loading a configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
}

/// All runtime configuration for the rendezvous server.
///
/// # Example
///
/// ```rust
/// use multiplay_rendezvous::domain::RendezvousConfig;
///
/// let cfg = RendezvousConfig::default();
/// assert_eq!(cfg.bind_addr.port(), 9500);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RendezvousConfig {
    /// Address the WebSocket listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,

    /// Rooms beyond this count are refused until others close.
    #[serde(default = "default_max_rooms")]
    pub max_rooms: usize,
}

impl RendezvousConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] on malformed TOML or wrongly typed fields.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }
}

impl Default for RendezvousConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            max_rooms: default_max_rooms(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT)
}

fn default_max_rooms() -> usize {
    DEFAULT_MAX_ROOMS
}
