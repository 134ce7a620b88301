//! Infrastructure layer for multiplay-session.
//!
//! - [`ws_signaling`]: signaling over a tokio-tungstenite WebSocket.
//! - [`rtc_peer`]: peer connections built on webrtc-rs.
//! - [`mock`]: in-memory adapters used by the tests.

pub mod mock;
pub mod rtc_peer;
pub mod ws_signaling;

pub use rtc_peer::RtcPeerConnector;
pub use ws_signaling::WsSignalingDialer;
