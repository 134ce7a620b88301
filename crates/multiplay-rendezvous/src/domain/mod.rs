//! Domain layer for multiplay-rendezvous.
//!
//! Room bookkeeping and configuration. Nothing here touches a socket.

pub mod config;
pub mod rooms;

pub use config::{ConfigError, RendezvousConfig};
pub use rooms::{ConnectionId, RoomError, RoomRegistry};
