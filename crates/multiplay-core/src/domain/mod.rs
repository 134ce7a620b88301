//! Domain types for MultiPlay.
//!
//! Pure values with no I/O: the vocabulary the session kernel uses to
//! describe itself, and the stage geometry the input bridge maps into.

/// Session role, connection state and room code.
pub mod session;

/// Viewport to stage coordinate mapping.
pub mod stage;
