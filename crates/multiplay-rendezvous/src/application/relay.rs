//! Signaling router.
//!
//! | inbound            | outcome                                               |
//! |--------------------|-------------------------------------------------------|
//! | `create`           | `room-created{roomCode}` to the sender, or the sender |
//! |                    | is disconnected when the room cannot be opened        |
//! | `join{roomCode}`   | `peer-joined` to the host, or `join-failed` to sender |
//! | `signal{..}`       | the frame verbatim to the other member of the room    |
//! | disconnect         | `peer-disconnected` to the member left behind         |
//!
//! Anything else is logged and dropped.

use multiplay_core::{decode_signaling, encode_signaling, SignalingMessage};
use rand::Rng;
use tracing::{debug, error, info, warn};

use crate::domain::rooms::{ConnectionId, RoomRegistry};

/// What to do to one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Send one text frame.
    Text(String),
    /// Close the connection with this reason.
    Close(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub to: ConnectionId,
    pub outbound: Outbound,
}

impl Delivery {
    pub fn text(to: ConnectionId, text: impl Into<String>) -> Self {
        Self {
            to,
            outbound: Outbound::Text(text.into()),
        }
    }

    pub fn close(to: ConnectionId, reason: impl Into<String>) -> Self {
        Self {
            to,
            outbound: Outbound::Close(reason.into()),
        }
    }

    /// The frame text, unless this is a close.
    pub fn frame(&self) -> Option<&str> {
        match &self.outbound {
            Outbound::Text(text) => Some(text),
            Outbound::Close(_) => None,
        }
    }
}

/// Routes signaling frames between the members of each room.
#[derive(Debug, Default)]
pub struct RelayHub {
    rooms: RoomRegistry,
}

impl RelayHub {
    pub fn new(max_rooms: usize) -> Self {
        Self {
            rooms: RoomRegistry::new(max_rooms),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Handles one text frame received from `from`.
    pub fn handle_frame<R: Rng + ?Sized>(
        &mut self,
        from: ConnectionId,
        text: &str,
        rng: &mut R,
    ) -> Vec<Delivery> {
        let msg = decode_signaling(text);
        debug!(conn = %from, kind = msg.message_type(), "signaling frame");

        match msg {
            SignalingMessage::Create => match self.rooms.create_room(from, rng) {
                Ok(room_code) => {
                    info!(conn = %from, room = %room_code, "room created");
                    deliver(from, &SignalingMessage::RoomCreated { room_code })
                }
                // The protocol has no create-failed reply; dropping the
                // connection is what the client reports as a signaling error.
                Err(e) => {
                    warn!(conn = %from, "create refused; closing connection: {e}");
                    vec![Delivery::close(from, e.to_string())]
                }
            },
            SignalingMessage::Join { room_code } => match self.rooms.join_room(from, &room_code) {
                Ok(host) => {
                    info!(conn = %from, room = %room_code, "guest joined");
                    deliver(host, &SignalingMessage::PeerJoined)
                }
                Err(e) => {
                    info!(conn = %from, room = %room_code, "join refused: {e}");
                    deliver(from, &SignalingMessage::JoinFailed)
                }
            },
            SignalingMessage::Signal(payload) => {
                match self.rooms.peer_of(from, payload.room_code()) {
                    Some(peer) => vec![Delivery::text(peer, text)],
                    None => {
                        warn!(
                            conn = %from,
                            room = %payload.room_code(),
                            kind = payload.kind(),
                            "dropping signal: sender has no peer in that room"
                        );
                        Vec::new()
                    }
                }
            }
            SignalingMessage::Unrecognized { reason, .. } => {
                warn!(conn = %from, "dropping unrecognized frame: {reason}");
                Vec::new()
            }
            other => {
                warn!(
                    conn = %from,
                    kind = other.message_type(),
                    "dropping server-bound-only message type"
                );
                Vec::new()
            }
        }
    }

    /// Handles the closure of `conn`.
    pub fn handle_disconnect(&mut self, conn: ConnectionId) -> Vec<Delivery> {
        match self.rooms.leave(conn) {
            Some(remaining) => {
                info!(conn = %conn, peer = %remaining, "member left; notifying peer");
                deliver(remaining, &SignalingMessage::PeerDisconnected)
            }
            None => Vec::new(),
        }
    }
}

fn deliver(to: ConnectionId, msg: &SignalingMessage) -> Vec<Delivery> {
    match encode_signaling(msg) {
        Ok(text) => vec![Delivery::text(to, text)],
        Err(e) => {
            error!("failed to encode {}: {e}", msg.message_type());
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use multiplay_core::RoomCode;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use uuid::Uuid;

    struct Fixture {
        hub: RelayHub,
        rng: StdRng,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                hub: RelayHub::default(),
                rng: StdRng::seed_from_u64(42),
            }
        }

        fn send(&mut self, from: ConnectionId, text: &str) -> Vec<Delivery> {
            self.hub.handle_frame(from, text, &mut self.rng)
        }

        /// Creates a room hosted by `host` and returns its code.
        fn open_room(&mut self, host: ConnectionId) -> RoomCode {
            let out = self.send(host, r#"{"type":"create"}"#);
            match decode_signaling(out[0].frame().unwrap()) {
                SignalingMessage::RoomCreated { room_code } => room_code,
                other => panic!("expected room-created, got {other:?}"),
            }
        }
    }

    fn join_frame(code: &RoomCode) -> String {
        format!(r#"{{"type":"join","payload":{{"roomCode":"{code}"}}}}"#)
    }

    #[test]
    fn test_create_replies_to_sender() {
        let mut f = Fixture::new();
        let host = Uuid::new_v4();
        let out = f.send(host, r#"{"type":"create"}"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, host);
        assert!(out[0].frame().unwrap().contains("room-created"));
    }

    #[test]
    fn test_refused_create_closes_the_sender() {
        let mut hub = RelayHub::new(1);
        let mut rng = StdRng::seed_from_u64(1);
        let (first, second) = (Uuid::new_v4(), Uuid::new_v4());
        let create = r#"{"type":"create"}"#;
        assert!(hub.handle_frame(first, create, &mut rng)[0].frame().is_some());

        let out = hub.handle_frame(second, create, &mut rng);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, second);
        assert!(matches!(&out[0].outbound, Outbound::Close(reason) if reason.contains("limit")));
        assert_eq!(hub.rooms().room_count(), 1);
    }

    #[test]
    fn test_second_create_from_a_host_closes_it() {
        let mut f = Fixture::new();
        let host = Uuid::new_v4();
        f.open_room(host);
        let out = f.send(host, r#"{"type":"create"}"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, host);
        assert_eq!(out[0].frame(), None);
        assert_eq!(f.hub.rooms().room_count(), 1);
    }

    #[test]
    fn test_join_notifies_host_only() {
        let mut f = Fixture::new();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let code = f.open_room(host);

        let out = f.send(guest, &join_frame(&code));
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, host);
        assert_eq!(decode_signaling(out[0].frame().unwrap()), SignalingMessage::PeerJoined);
    }

    #[test]
    fn test_join_unknown_room_replies_join_failed() {
        let mut f = Fixture::new();
        let guest = Uuid::new_v4();
        let out = f.send(guest, r#"{"type":"join","payload":{"roomCode":"QQQQQQ"}}"#);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, guest);
        assert_eq!(decode_signaling(out[0].frame().unwrap()), SignalingMessage::JoinFailed);
    }

    #[test]
    fn test_signal_is_relayed_verbatim_to_peer() {
        let mut f = Fixture::new();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let code = f.open_room(host);
        f.send(guest, &join_frame(&code));

        let offer = format!(
            r#"{{"type":"signal","payload":{{"type":"offer","sdp":"v=0","sdpType":"offer","roomCode":"{code}","extra":1}}}}"#
        );
        let out = f.send(host, &offer);
        assert_eq!(out, vec![Delivery::text(guest, offer)]);
    }

    #[test]
    fn test_signal_from_outsider_is_dropped() {
        let mut f = Fixture::new();
        let (host, guest, outsider) = (Uuid::new_v4(), Uuid::new_v4(), Uuid::new_v4());
        let code = f.open_room(host);
        f.send(guest, &join_frame(&code));

        let frame = format!(
            r#"{{"type":"signal","payload":{{"type":"candidate","candidate":{{"candidate":"c"}},"roomCode":"{code}"}}}}"#
        );
        assert!(f.send(outsider, &frame).is_empty());
    }

    #[test]
    fn test_garbage_and_server_only_types_are_dropped() {
        let mut f = Fixture::new();
        let conn = Uuid::new_v4();
        assert!(f.send(conn, "not json").is_empty());
        assert!(f.send(conn, r#"{"type":"peer-joined"}"#).is_empty());
        assert!(f.send(conn, r#"{"type":"join-success"}"#).is_empty());
    }

    #[test]
    fn test_disconnect_notifies_remaining_member() {
        let mut f = Fixture::new();
        let (host, guest) = (Uuid::new_v4(), Uuid::new_v4());
        let code = f.open_room(host);
        f.send(guest, &join_frame(&code));

        let out = f.hub.handle_disconnect(guest);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].to, host);
        assert_eq!(
            decode_signaling(out[0].frame().unwrap()),
            SignalingMessage::PeerDisconnected
        );
        assert!(f.hub.handle_disconnect(Uuid::new_v4()).is_empty());
    }
}
