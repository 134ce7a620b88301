//! Signaling envelopes exchanged with the rendezvous server.
//!
//! Every frame is a JSON object `{ "type": ..., "payload": ... }`. The
//! rendezvous server only pairs two connections into a room and relays
//! `signal` frames between them; it never looks inside an SDP or candidate.
//!
//! ```text
//! host                      server                     joiner
//!  | create ------------------> |                         |
//!  | <------- room-created{code}|                         |
//!  |                            | <------------ join{code} |
//!  | <-------------- peer-joined|                         |
//!  | signal{offer} ------------> | ----------> signal{offer}|
//!  | signal{answer} <----------- | <---------- signal{answer}
//!  | signal{candidate} <------> | <------> signal{candidate}
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::domain::session::RoomCode;

/// An ICE candidate as trickled between peers.
///
/// Field names on the wire follow the W3C `RTCIceCandidateInit` dictionary so
/// that browser peers can hand the object straight to `addIceCandidate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceCandidate {
    pub candidate: String,
    #[serde(rename = "sdpMid", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mid: Option<String>,
    #[serde(rename = "sdpMLineIndex", default, skip_serializing_if = "Option::is_none")]
    pub sdp_mline_index: Option<u16>,
    #[serde(
        rename = "usernameFragment",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub username_fragment: Option<String>,
}

impl IceCandidate {
    /// Creates a candidate with only the `candidate` attribute line set.
    pub fn new(candidate: impl Into<String>) -> Self {
        Self {
            candidate: candidate.into(),
            sdp_mid: None,
            sdp_mline_index: None,
            username_fragment: None,
        }
    }
}

/// Which half of the offer/answer exchange an SDP blob belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SdpType {
    Offer,
    Answer,
}

impl SdpType {
    pub fn as_str(self) -> &'static str {
        match self {
            SdpType::Offer => "offer",
            SdpType::Answer => "answer",
        }
    }
}

impl fmt::Display for SdpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A local or remote session description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionDescription {
    pub sdp_type: SdpType,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Offer,
            sdp: sdp.into(),
        }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self {
            sdp_type: SdpType::Answer,
            sdp: sdp.into(),
        }
    }
}

/// Payload of a `signal` frame.
///
/// The inner `type` discriminates offer, answer and candidate. Every variant
/// carries the room code so the server can route it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SignalPayload {
    Offer {
        sdp: String,
        #[serde(rename = "sdpType")]
        sdp_type: SdpType,
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
    },
    Answer {
        sdp: String,
        #[serde(rename = "sdpType")]
        sdp_type: SdpType,
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
    },
    Candidate {
        candidate: IceCandidate,
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
    },
}

impl SignalPayload {
    /// Wraps a session description in the matching offer or answer payload.
    pub fn description(description: SessionDescription, room_code: RoomCode) -> Self {
        let SessionDescription { sdp_type, sdp } = description;
        match sdp_type {
            SdpType::Offer => SignalPayload::Offer {
                sdp,
                sdp_type,
                room_code,
            },
            SdpType::Answer => SignalPayload::Answer {
                sdp,
                sdp_type,
                room_code,
            },
        }
    }

    /// The room this payload is addressed to.
    pub fn room_code(&self) -> &RoomCode {
        match self {
            SignalPayload::Offer { room_code, .. }
            | SignalPayload::Answer { room_code, .. }
            | SignalPayload::Candidate { room_code, .. } => room_code,
        }
    }

    /// Short name used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            SignalPayload::Offer { .. } => "offer",
            SignalPayload::Answer { .. } => "answer",
            SignalPayload::Candidate { .. } => "candidate",
        }
    }
}

/// Every frame on the signaling connection, in both directions.
///
/// `Unrecognized` never goes on the wire: the decoder produces it for frames
/// it cannot interpret, and receivers log and drop it.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "kebab-case")]
pub enum SignalingMessage {
    /// Client → server: open a new room with the sender as host.
    Create,
    /// Client → server: join an existing room as its guest.
    Join {
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
    },
    /// Server → host: the room exists and can be shared.
    RoomCreated {
        #[serde(rename = "roomCode")]
        room_code: RoomCode,
    },
    /// Server → host: a guest entered the room.
    PeerJoined,
    /// Server → remaining member: the other side left.
    PeerDisconnected,
    /// Server → joiner: the room does not exist or is full.
    JoinFailed,
    /// Both directions: relayed negotiation data.
    Signal(SignalPayload),
    #[serde(skip)]
    Unrecognized { raw: String, reason: String },
}

impl SignalingMessage {
    /// The wire `type` string, or `"unrecognized"`.
    pub fn message_type(&self) -> &'static str {
        match self {
            SignalingMessage::Create => "create",
            SignalingMessage::Join { .. } => "join",
            SignalingMessage::RoomCreated { .. } => "room-created",
            SignalingMessage::PeerJoined => "peer-joined",
            SignalingMessage::PeerDisconnected => "peer-disconnected",
            SignalingMessage::JoinFailed => "join-failed",
            SignalingMessage::Signal(_) => "signal",
            SignalingMessage::Unrecognized { .. } => "unrecognized",
        }
    }
}
