//! Session vocabulary shared by the kernel, the input bridge and the
//! rendezvous server.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Length of a room code in characters.
pub const ROOM_CODE_LEN: usize = 6;

/// The part this device plays in the current session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionRole {
    #[default]
    None,
    /// Runs the program, streams its output and applies remote input.
    Host,
    /// Watches the stream and sends input.
    Joiner,
}

/// Kernel connection state.
///
/// ```text
/// idle → signaling-connected → waiting-for-peer (host) | joining (joiner)
///      → peer-connected → connected → disconnected | failed → idle
/// ```
///
/// `error` is reachable from every state on an unrecoverable failure and
/// is followed by `idle` once teardown completes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConnectionState {
    #[default]
    Idle,
    SignalingConnected,
    WaitingForPeer,
    Joining,
    PeerConnected,
    Connected,
    Disconnected,
    Failed,
    Error,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::SignalingConnected => "signaling-connected",
            ConnectionState::WaitingForPeer => "waiting-for-peer",
            ConnectionState::Joining => "joining",
            ConnectionState::PeerConnected => "peer-connected",
            ConnectionState::Connected => "connected",
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Failed => "failed",
            ConnectionState::Error => "error",
        }
    }

    /// States that end a session. Each is followed by `idle`.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ConnectionState::Disconnected | ConnectionState::Failed | ConnectionState::Error
        )
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a string is not a valid room code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RoomCodeError {
    #[error("room code must be 6 characters, got {0}")]
    WrongLength(usize),

    #[error("room code may only contain ASCII letters and digits, found {0:?}")]
    InvalidCharacter(char),
}

/// Six-character room identifier handed out by the rendezvous server.
///
/// Codes are case-insensitive; the canonical form is upper case, so a code
/// typed as `abc123` joins room `ABC123`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Validates and normalises `input`. Surrounding whitespace is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RoomCodeError`] when the trimmed input is not exactly
    /// [`ROOM_CODE_LEN`] ASCII alphanumerics.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let trimmed = input.trim();
        if let Some(bad) = trimmed.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(RoomCodeError::InvalidCharacter(bad));
        }
        if trimmed.len() != ROOM_CODE_LEN {
            return Err(RoomCodeError::WrongLength(trimmed.len()));
        }
        Ok(Self(trimmed.to_ascii_uppercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Point-in-time view of the device's session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionSnapshot {
    pub role: SessionRole,
    pub room_code: Option<RoomCode>,
    pub connection_state: ConnectionState,
    pub peer_connected: bool,
}
