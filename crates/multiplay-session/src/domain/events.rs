//! Event vocabularies.
//!
//! - [`SessionEvent`] flows from the kernel to its caller.
//! - [`TransportEvent`] flows from a signaling socket to the kernel.
//! - [`PeerEvent`] flows from a peer connection to the kernel.

use std::fmt;

use multiplay_core::{ConnectionState, ControlEvent, IceCandidate, RoomCode, SignalingMessage};
use serde_json::Value;

/// What the kernel tells its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Host only: the room is open and its code can be shared.
    RoomCodeAvailable(RoomCode),
    /// Host only: a joiner entered the room.
    PeerJoined,
    ConnectionStateChanged(ConnectionState),
    /// A failure. Session-fatal ones are followed by a return to `idle`;
    /// a rejected room code is reported while idle and changes nothing.
    Error { code: &'static str, message: String },
    /// A remote input event arrived on the data channel.
    ControlReceived(ControlEvent),
    /// Program metadata pushed by the host.
    MetadataReceived(Value),
}

/// What a signaling socket reports.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    Message(SignalingMessage),
    /// The server closed the connection or the stream ended.
    Closed,
    Error(String),
}

/// Connectivity of the underlying peer connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PeerState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl fmt::Display for PeerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PeerState::New => "new",
            PeerState::Connecting => "connecting",
            PeerState::Connected => "connected",
            PeerState::Disconnected => "disconnected",
            PeerState::Failed => "failed",
            PeerState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// What a peer connection reports.
#[derive(Debug, Clone, PartialEq)]
pub enum PeerEvent {
    /// A locally gathered candidate to trickle to the remote side.
    LocalCandidate(IceCandidate),
    StateChanged(PeerState),
    ChannelOpen,
    ChannelClosed,
    /// One text message received on the control channel.
    ChannelMessage(String),
    ChannelError(String),
}
