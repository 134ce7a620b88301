//! Error taxonomy for the session kernel.
//!
//! Every failure the kernel surfaces reaches the caller as
//! `SessionEvent::Error { code, message }`, where `code` is
//! [`SessionError::code`] and `message` is the `Display` text.

use multiplay_core::{ConnectionState, ProtocolError, RoomCodeError};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum SessionError {
    /// The rendezvous server could not be reached.
    #[error("could not reach signaling server: {0}")]
    SignalingConnect(String),

    /// The signaling connection ended while the session needed it.
    #[error("signaling connection closed")]
    SignalingClosed,

    /// Any other signaling failure, including sends on a closed transport.
    #[error("signaling error: {0}")]
    Signaling(String),

    #[error("could not join room {0}")]
    JoinFailed(String),

    /// Peer connection construction, SDP negotiation or data channel failure.
    #[error("peer connection error: {0}")]
    PeerConnection(String),

    #[error("media capture failed: {0}")]
    Capture(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    InvalidRoomCode(#[from] RoomCodeError),

    #[error("operation not allowed in state {0}")]
    InvalidState(ConnectionState),

    /// The session was disconnected or replaced while the operation was
    /// in flight. Never surfaced as an event.
    #[error("session was torn down before the operation completed")]
    Cancelled,
}

impl SessionError {
    /// Short machine string carried by the error event.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::SignalingConnect(_)
            | SessionError::SignalingClosed
            | SessionError::Signaling(_) => "signaling-error",
            SessionError::JoinFailed(_) => "join-failed",
            SessionError::PeerConnection(_) => "webrtc-error",
            SessionError::Capture(_) => "capture-error",
            SessionError::Protocol(_) => "protocol-error",
            SessionError::InvalidRoomCode(_) => "invalid-room-code",
            SessionError::InvalidState(_) => "invalid-state",
            SessionError::Cancelled => "cancelled",
        }
    }
}

impl From<ProtocolError> for SessionError {
    fn from(e: ProtocolError) -> Self {
        SessionError::Protocol(e.to_string())
    }
}

/// Errors raised while loading a session configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse session config: {0}")]
    Parse(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiplay_core::RoomCode;

    #[test]
    fn test_signaling_failures_share_one_code() {
        assert_eq!(SessionError::SignalingClosed.code(), "signaling-error");
        assert_eq!(
            SessionError::SignalingConnect("refused".into()).code(),
            "signaling-error"
        );
    }

    #[test]
    fn test_peer_failures_are_webrtc_errors() {
        let err = SessionError::PeerConnection("ice failed".into());
        assert_eq!(err.code(), "webrtc-error");
        assert_eq!(err.to_string(), "peer connection error: ice failed");
    }

    #[test]
    fn test_room_code_error_converts() {
        let err: SessionError = RoomCode::parse("x").unwrap_err().into();
        assert_eq!(err.code(), "invalid-room-code");
    }
}
