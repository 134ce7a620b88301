//! multiplay-input library crate.
//!
//! The remote-input bridge. On the sending device, control widgets turn
//! gestures into edge-triggered `keydown`/`keyup` and pointer events and hand
//! them to the session kernel. On the host, a receiver context applies the
//! events that arrive over the data channel to the running program's
//! simulated keyboard and mouse.
//!
//! # Architecture
//!
//! ```text
//! gesture ─▶ widgets ─▶ forward (ControlSink) ─▶ SessionKernel ─▶ network
//!
//! network ─▶ SessionKernel ─▶ SessionEvent::ControlReceived
//!                                    │
//!                                    ▼
//!                 host::HostInputRouter ─▶ receiver::ReceiverContext
//!                                                   │
//!                                                   ▼
//!                                        ProgramInput (running program)
//! ```
//!
//! The bridge never touches the data channel itself; everything outbound
//! goes through [`application::forward::ControlSink`].

/// Application layer: widgets, receiver, forwarding and host routing.
pub mod application;

/// Infrastructure layer: recording adapters for tests.
pub mod infrastructure;

pub use application::forward::{forward_all, ControlSink};
pub use application::host::{HostInputRouter, DEFAULT_READY_TIMEOUT};
pub use application::receiver::{InputError, ProgramInput, ReceiverContext};
pub use application::widgets::{
    ButtonPad, DPad, Direction, DirectionKeys, HeldKeys, Joystick, PointerPad,
};
