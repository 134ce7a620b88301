//! Infrastructure layer for the remote-input bridge.
//!
//! The real [`ProgramInput`](crate::ProgramInput) lives with the program
//! runtime that embeds this crate; only recording adapters live here.

pub mod mock;
