//! JSON codec for both wire protocols.
//!
//! Decoding is total: whatever arrives, the caller gets a typed value back.
//! Frames that cannot be interpreted (invalid JSON, a bare string, a missing
//! or unknown `type`, a payload of the wrong shape) become the protocol's
//! `Unrecognized` variant carrying the raw text and the reason, so receivers
//! can log and drop them without an error path.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::domain::session::RoomCode;
use crate::protocol::control::{
    ControlEvent, ControlMessage, PROJECT_METADATA_TYPE, REQUEST_METADATA_TYPE,
};
use crate::protocol::signaling::{SignalPayload, SignalingMessage};

/// Errors that can occur while encoding an outbound message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// `Unrecognized` values only ever come out of the decoder.
    #[error("cannot encode an unrecognized {0} message")]
    Unencodable(&'static str),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Deserialize)]
struct RoomCodePayload {
    #[serde(rename = "roomCode")]
    room_code: RoomCode,
}

// ── Signaling ─────────────────────────────────────────────────────────────────

/// Serializes a signaling message into one text frame.
///
/// # Errors
///
/// Returns [`ProtocolError::Unencodable`] for `Unrecognized`.
pub fn encode_signaling(msg: &SignalingMessage) -> Result<String, ProtocolError> {
    if let SignalingMessage::Unrecognized { .. } = msg {
        return Err(ProtocolError::Unencodable("signaling"));
    }
    Ok(serde_json::to_string(msg)?)
}

/// Parses one signaling text frame.
///
/// # Examples
///
/// ```rust
/// use multiplay_core::protocol::{decode_signaling, SignalingMessage};
///
/// let msg = decode_signaling(r#"{"type":"room-created","payload":{"roomCode":"ABC123"}}"#);
/// assert!(matches!(msg, SignalingMessage::RoomCreated { .. }));
///
/// let junk = decode_signaling("hello");
/// assert!(matches!(junk, SignalingMessage::Unrecognized { .. }));
/// ```
pub fn decode_signaling(text: &str) -> SignalingMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return unrecognized_signaling(text, format!("invalid JSON: {e}")),
    };
    let Some(kind) = value.get("type").and_then(Value::as_str) else {
        return unrecognized_signaling(text, "missing type field".to_string());
    };
    let payload = value.get("payload").cloned().unwrap_or(Value::Null);

    let parsed = match kind {
        "create" => Ok(SignalingMessage::Create),
        "peer-joined" => Ok(SignalingMessage::PeerJoined),
        "peer-disconnected" => Ok(SignalingMessage::PeerDisconnected),
        "join-failed" => Ok(SignalingMessage::JoinFailed),
        "join" => room_code_of(payload).map(|room_code| SignalingMessage::Join { room_code }),
        "room-created" => {
            room_code_of(payload).map(|room_code| SignalingMessage::RoomCreated { room_code })
        }
        "signal" => serde_json::from_value::<SignalPayload>(payload)
            .map(SignalingMessage::Signal)
            .map_err(|e| format!("bad signal payload: {e}")),
        other => Err(format!("unknown message type {other:?}")),
    };

    parsed.unwrap_or_else(|reason| unrecognized_signaling(text, reason))
}

fn room_code_of(payload: Value) -> Result<RoomCode, String> {
    serde_json::from_value::<RoomCodePayload>(payload)
        .map(|p| p.room_code)
        .map_err(|e| format!("bad roomCode payload: {e}"))
}

fn unrecognized_signaling(raw: &str, reason: String) -> SignalingMessage {
    SignalingMessage::Unrecognized {
        raw: raw.to_string(),
        reason,
    }
}

// ── Control ───────────────────────────────────────────────────────────────────

/// Serializes a data-channel message.
///
/// # Errors
///
/// Returns [`ProtocolError::Unencodable`] for `Unrecognized`.
pub fn encode_control(msg: &ControlMessage) -> Result<String, ProtocolError> {
    let text = match msg {
        ControlMessage::Input(event) => serde_json::to_string(event)?,
        ControlMessage::ProjectMetadata(payload) => serde_json::to_string(&serde_json::json!({
            "type": PROJECT_METADATA_TYPE,
            "payload": payload,
        }))?,
        ControlMessage::RequestMetadata => {
            serde_json::to_string(&serde_json::json!({ "type": REQUEST_METADATA_TYPE }))?
        }
        ControlMessage::Unrecognized { .. } => return Err(ProtocolError::Unencodable("control")),
    };
    Ok(text)
}

/// Parses one data-channel message.
pub fn decode_control(text: &str) -> ControlMessage {
    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(e) => return unrecognized_control(text, format!("invalid JSON: {e}")),
    };
    let kind = value.get("type").and_then(Value::as_str);

    match kind {
        Some(PROJECT_METADATA_TYPE) => {
            ControlMessage::ProjectMetadata(value.get("payload").cloned().unwrap_or(Value::Null))
        }
        Some(REQUEST_METADATA_TYPE) => ControlMessage::RequestMetadata,
        Some("keydown" | "keyup" | "mouse") => match serde_json::from_value::<ControlEvent>(value) {
            Ok(event) => match event.validate() {
                Ok(()) => ControlMessage::Input(event),
                Err(reason) => unrecognized_control(text, reason),
            },
            Err(e) => unrecognized_control(text, format!("bad control event: {e}")),
        },
        Some(other) => unrecognized_control(text, format!("unknown message type {other:?}")),
        None => unrecognized_control(text, "missing type field".to_string()),
    }
}

fn unrecognized_control(raw: &str, reason: String) -> ControlMessage {
    ControlMessage::Unrecognized {
        raw: raw.to_string(),
        reason,
    }
}
