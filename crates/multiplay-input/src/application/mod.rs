//! Application layer for the remote-input bridge.
//!
//! - **`widgets`** – Sender side. Each widget keeps its own held-keys set
//!   and only ever emits an event when a key changes state.
//! - **`forward`** – The single outbound seam, [`forward::ControlSink`],
//!   implemented by the session kernel.
//! - **`receiver`** – Host side. Mirrors what the remote user holds and
//!   pushes a full snapshot into the program after every change.
//! - **`host`** – Ties the receiver's lifetime to the session's `connected`
//!   state.

pub mod forward;
pub mod host;
pub mod receiver;
pub mod widgets;
