//! Wire protocols: signaling envelopes, data-channel control messages and
//! the JSON codec for both.

pub mod codec;
pub mod control;
pub mod signaling;

pub use codec::{decode_control, decode_signaling, encode_control, encode_signaling, ProtocolError};
pub use control::*;
pub use signaling::*;
