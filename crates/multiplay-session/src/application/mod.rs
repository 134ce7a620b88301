//! Application layer for multiplay-session.
//!
//! The kernel and its helpers. Everything that touches a socket is reached
//! through the traits in [`ports`].

pub mod candidates;
pub mod kernel;
pub mod ports;
pub mod registry;
pub mod transport;

pub use candidates::CandidateQueue;
pub use kernel::{KernelPorts, SessionKernel};
pub use ports::{
    CaptureSurface, CaptureTracks, EncodedFrame, MediaCapture, PeerConnector, PeerLink,
    SignalingDialer, SignalingSocket,
};
pub use registry::SessionRegistry;
pub use transport::SignalingTransport;
