//! Integration tests for wire compatibility with browser peers.
//!
//! The frames below are what a browser implementation of MultiPlay puts on
//! the wire. Decoding them through the public API must yield the expected
//! typed values, and our own encodings must be readable by the same code
//! paths (checked at the JSON value level, not byte for byte).

use multiplay_core::{
    decode_control, decode_signaling, encode_control, encode_signaling, ControlEvent,
    ControlEventType, ControlMessage, Coords, KeyMapper, MouseAction, RoomCode,
    SessionDescription, SignalPayload, SignalingMessage, Viewport,
};
use serde_json::{json, Value};

fn code(s: &str) -> RoomCode {
    RoomCode::parse(s).expect("fixture room code must be valid")
}

fn as_value(text: &str) -> Value {
    serde_json::from_str(text).expect("encoder must emit valid JSON")
}

#[test]
fn test_browser_host_create_and_room_created() {
    assert_eq!(
        as_value(&encode_signaling(&SignalingMessage::Create).unwrap()),
        json!({ "type": "create" })
    );
    let reply = decode_signaling(r#"{"type":"room-created","payload":{"roomCode":"ABC123"}}"#);
    assert_eq!(
        reply,
        SignalingMessage::RoomCreated {
            room_code: code("ABC123")
        }
    );
}

#[test]
fn test_offer_frame_matches_browser_shape() {
    let payload = SignalPayload::description(
        SessionDescription::offer("v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n"),
        code("ABC123"),
    );
    let text = encode_signaling(&SignalingMessage::Signal(payload.clone())).unwrap();
    assert_eq!(
        as_value(&text),
        json!({
            "type": "signal",
            "payload": {
                "type": "offer",
                "sdp": "v=0\r\no=- 1 2 IN IP4 127.0.0.1\r\n",
                "sdpType": "offer",
                "roomCode": "ABC123"
            }
        })
    );
    assert_eq!(decode_signaling(&text), SignalingMessage::Signal(payload));
}

#[test]
fn test_browser_candidate_frame_decodes() {
    let text = json!({
        "type": "signal",
        "payload": {
            "type": "candidate",
            "candidate": {
                "candidate": "candidate:842163049 1 udp 1677729535 203.0.113.7 46154 typ srflx",
                "sdpMid": "0",
                "sdpMLineIndex": 0,
                "usernameFragment": "f00d"
            },
            "roomCode": "ABC123"
        }
    })
    .to_string();

    let SignalingMessage::Signal(SignalPayload::Candidate {
        candidate,
        room_code,
    }) = decode_signaling(&text)
    else {
        panic!("expected a candidate signal");
    };
    assert_eq!(room_code, code("ABC123"));
    assert_eq!(candidate.username_fragment.as_deref(), Some("f00d"));
    assert!(candidate.candidate.contains("typ srflx"));

    let reencoded = encode_signaling(&SignalingMessage::Signal(SignalPayload::Candidate {
        candidate,
        room_code,
    }))
    .unwrap();
    assert_eq!(as_value(&reencoded), as_value(&text));
}

#[test]
fn test_legacy_variants_are_dropped_not_errors() {
    for legacy in [
        r#"{"type":"join-success","payload":{"roomCode":"ABC123"}}"#,
        r#"{"type":"sending-offer"}"#,
        "peer-joined",
    ] {
        assert!(matches!(
            decode_signaling(legacy),
            SignalingMessage::Unrecognized { .. }
        ));
    }
}

#[test]
fn test_browser_key_events_decode_and_map() {
    for (frame, expected_type, program_key) in [
        (r#"{"key":"ArrowUp","type":"keydown"}"#, ControlEventType::Keydown, "up arrow"),
        (r#"{"key":" ","type":"keyup"}"#, ControlEventType::Keyup, "space"),
        (r#"{"key":"w","type":"keydown"}"#, ControlEventType::Keydown, "W"),
    ] {
        let ControlMessage::Input(event) = decode_control(frame) else {
            panic!("{frame} should decode as input");
        };
        assert_eq!(event.event_type, expected_type);
        assert_eq!(KeyMapper::program_name(&event.key).as_deref(), Some(program_key));
    }
}

#[test]
fn test_pointer_sample_from_viewport_to_wire() {
    let viewport = Viewport::new(360.0, 270.0).unwrap();
    let point = viewport.to_stage(270.0, 67.5);
    let event = ControlEvent::mouse(MouseAction::Move, Some(Coords::from(point)));
    let text = encode_control(&ControlMessage::Input(event.clone())).unwrap();

    assert_eq!(
        as_value(&text),
        json!({ "key": "move", "type": "mouse", "coords": { "x": 120.0, "y": 90.0 } })
    );
    assert_eq!(decode_control(&text), ControlMessage::Input(event));
}

#[test]
fn test_metadata_push_from_browser_host() {
    let frame = json!({
        "type": "PROJECT_METADATA",
        "payload": {
            "title": "Maze Runner",
            "author": { "username": "someone" },
            "instructions": "Use the arrow keys",
            "description": "",
            "stats": { "loves": 12, "favorites": 4 },
            "history": { "created": "2024-01-01T00:00:00Z" }
        }
    });
    let ControlMessage::ProjectMetadata(payload) = decode_control(&frame.to_string()) else {
        panic!("expected metadata");
    };
    assert_eq!(payload, frame["payload"]);
}
