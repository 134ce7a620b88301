//! Application layer for multiplay-rendezvous.
//!
//! Decides, for every frame a connection sends and for every disconnect,
//! which connections receive which text and which are closed. Pure and
//! synchronous; the infrastructure layer performs the actual sends.

pub mod relay;

pub use relay::{Delivery, Outbound, RelayHub};
