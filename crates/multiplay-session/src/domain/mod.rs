//! Domain layer for multiplay-session.
//!
//! Plain types shared by the kernel and its adapters: configuration, the
//! error taxonomy and the three event vocabularies (caller-facing session
//! events, transport events, peer events).

pub mod config;
pub mod error;
pub mod events;

pub use config::{SessionConfig, TurnServer};
pub use error::{ConfigError, SessionError};
pub use events::{PeerEvent, PeerState, SessionEvent, TransportEvent};
