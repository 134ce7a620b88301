//! multiplay-session library crate.
//!
//! Owns one MultiPlay session per device: the signaling connection to the
//! rendezvous server, the peer connection, the control data channel and the
//! captured media stream, driven by a single state machine.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! caller (UI, input bridge)
//!         │  start_host / join_room / disconnect / send_control_event
//!         ▼                                ▲ SessionEvent stream
//! [multiplay-session]
//!   ├── domain/            SessionConfig, SessionError, events
//!   ├── application/
//!   │     ├── ports        SignalingDialer, PeerConnector, CaptureSurface
//!   │     ├── transport    SignalingTransport (open/send/close)
//!   │     ├── candidates   ICE candidate queue-and-flush
//!   │     ├── kernel       SessionKernel state machine
//!   │     └── registry     one kernel per device
//!   └── infrastructure/
//!         ├── ws_signaling  tokio-tungstenite dialer
//!         ├── rtc_peer      webrtc-rs peer connection
//!         └── mock          in-memory dialer and peers for tests
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` talks to the outside world only through the traits in
//!   `application::ports`, so the kernel runs unchanged against real
//!   sockets or the in-memory mocks.
//! - `infrastructure` implements those traits.

/// Domain layer: configuration, errors and event types.
pub mod domain;

/// Application layer: transport, kernel and registry.
pub mod application;

/// Infrastructure layer: WebSocket and WebRTC adapters plus test doubles.
pub mod infrastructure;

pub use application::kernel::{KernelPorts, SessionKernel};
pub use application::registry::SessionRegistry;
pub use domain::config::SessionConfig;
pub use domain::error::SessionError;
pub use domain::events::SessionEvent;
