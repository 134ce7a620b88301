//! Infrastructure layer for multiplay-rendezvous.
//!
//! Binds the listener, upgrades connections to WebSocket, runs one task per
//! connection and delivers the frames the relay hub decides on.

pub mod ws_server;

pub use ws_server::{bind_listener, run_server, serve};
