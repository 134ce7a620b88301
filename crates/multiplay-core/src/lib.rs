//! # multiplay-core
//!
//! Shared library for MultiPlay containing the signaling and control wire
//! protocols, the session domain types, the stage coordinate mapping and the
//! key translation table.
//!
//! It is used by the session kernel, the remote-input bridge and the
//! rendezvous server. It performs no I/O of its own.
//!
//! # Architecture overview (for beginners)
//!
//! MultiPlay lets one device host an interactive program while a second
//! device joins over the network and drives its keyboard and mouse. Two
//! protocols make that possible:
//!
//! - **`protocol::signaling`** – JSON envelopes `{type, payload}` exchanged with
//!   a rendezvous server before a direct peer link exists (room creation,
//!   peer discovery, SDP and ICE relay).
//!
//! - **`protocol::control`** – small JSON messages carried over the peer data
//!   channel once it is open (key presses, pointer moves, program metadata).
//!
//! - **`domain`** – the session state vocabulary (roles, connection states,
//!   room codes) and the mapping from a sender's viewport into the program's
//!   fixed 480×360 stage.
//!
//! - **`keymap`** – translation from the key identities a sender puts on the
//!   wire to the key names the running program understands.

pub mod domain;
pub mod keymap;
pub mod protocol;

pub use domain::session::{
    ConnectionState, RoomCode, RoomCodeError, SessionRole, SessionSnapshot, ROOM_CODE_LEN,
};
pub use domain::stage::{StagePoint, Viewport, STAGE_HEIGHT, STAGE_WIDTH};
pub use keymap::{KeyMapper, ProgramKey};
pub use protocol::codec::{
    decode_control, decode_signaling, encode_control, encode_signaling, ProtocolError,
};
pub use protocol::control::{ControlEvent, ControlEventType, ControlMessage, Coords, MouseAction};
pub use protocol::signaling::{
    IceCandidate, SdpType, SessionDescription, SignalPayload, SignalingMessage,
};
