//! multiplay-rendezvous library crate.
//!
//! The rendezvous server exists only so that two devices that cannot yet
//! reach each other can exchange the few messages needed to set up a direct
//! peer connection. It pairs a host and a joiner into a room and relays
//! their `signal` frames verbatim.
//!
//! # Architecture
//!
//! ```text
//! host device ──┐                         ┌── joiner device
//!   (WebSocket) │                         │ (WebSocket)
//!               ▼                         ▼
//! [multiplay-rendezvous]
//!   ├── domain/           RoomRegistry, RendezvousConfig
//!   ├── application/      RelayHub: frame in → deliveries out
//!   └── infrastructure/
//!         └── ws_server/  accept loop and per-connection tasks
//! ```
//!
//! # Layer rules
//!
//! - `domain` does no I/O.
//! - `application` depends on `domain` and `multiplay-core` only and is
//!   synchronous, so the whole routing table can be unit-tested without
//!   sockets.
//! - `infrastructure` owns every socket and task.

/// Domain layer: rooms and configuration.
pub mod domain;

/// Application layer: signaling routing.
pub mod application;

/// Infrastructure layer: WebSocket server.
pub mod infrastructure;
