//! Seams between the kernel and the outside world.
//!
//! The kernel never names a WebSocket or WebRTC type. It dials signaling
//! through a [`SignalingDialer`], builds peers through a [`PeerConnector`]
//! and asks a [`CaptureSurface`] for the rendered program output. The
//! production adapters live in `infrastructure::{ws_signaling, rtc_peer}`;
//! `infrastructure::mock` provides in-memory ones.
//!
//! Adapters report asynchronous happenings (inbound frames, state changes,
//! gathered candidates) through the unbounded sender handed to them at
//! construction, never by calling back into the kernel.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use multiplay_core::{IceCandidate, SessionDescription};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::domain::config::SessionConfig;
use crate::domain::error::SessionError;
use crate::domain::events::{PeerEvent, TransportEvent};

// ── Signaling ─────────────────────────────────────────────────────────────────

/// The send half of one live signaling connection.
#[async_trait]
pub trait SignalingSocket: Send {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError>;

    /// Closes the connection. Must tolerate being called on a dead socket.
    async fn close(&mut self);
}

/// Opens signaling connections.
#[async_trait]
pub trait SignalingDialer: Send + Sync {
    /// Connects to `url`. Every inbound frame, the closure and any read
    /// error of the new connection are reported on `events`.
    async fn dial(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn SignalingSocket>, SessionError>;
}

// ── Peer connection ───────────────────────────────────────────────────────────

/// One peer connection with at most one control data channel.
#[async_trait]
pub trait PeerLink: Send + Sync {
    /// Unique per constructed connection; never reused.
    fn id(&self) -> Uuid;

    /// Creates the unordered, unreliable control channel (host side).
    async fn create_data_channel(&self, label: &str) -> Result<(), SessionError>;

    /// Adds a video track fed from `frames` until the sender side closes.
    async fn attach_capture(
        &self,
        mime_type: &str,
        frames: mpsc::Receiver<EncodedFrame>,
    ) -> Result<(), SessionError>;

    /// Creates an offer and installs it as the local description.
    async fn create_offer(&self) -> Result<SessionDescription, SessionError>;

    /// Creates an answer and installs it as the local description.
    async fn create_answer(&self) -> Result<SessionDescription, SessionError>;

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SessionError>;

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError>;

    /// Sends one text message on the control channel.
    async fn send_text(&self, text: String) -> Result<(), SessionError>;

    async fn close(&self);
}

/// Builds peer connections.
#[async_trait]
pub trait PeerConnector: Send + Sync {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, SessionError>;
}

// ── Media capture ─────────────────────────────────────────────────────────────

/// One encoded video frame from the program's rendered surface.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    pub data: Bytes,
    pub duration: Duration,
}

/// Stop handle for every track of a capture.
///
/// The capture producer watches the paired receiver and stops encoding once
/// it flips to `true`.
#[derive(Debug)]
pub struct CaptureTracks {
    stop: watch::Sender<bool>,
}

impl CaptureTracks {
    pub fn channel() -> (Self, watch::Receiver<bool>) {
        let (stop, stopped) = watch::channel(false);
        (Self { stop }, stopped)
    }

    pub fn stop_all(&self) {
        self.stop.send_replace(true);
    }

    pub fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }
}

/// A running capture of the program's rendered output.
#[derive(Debug)]
pub struct MediaCapture {
    /// Codec of `frames`, e.g. `video/VP8`.
    pub mime_type: String,
    pub frames: mpsc::Receiver<EncodedFrame>,
    pub tracks: CaptureTracks,
}

/// The program's capturable rendered surface.
#[async_trait]
pub trait CaptureSurface: Send + Sync {
    async fn start_capture(&self) -> Result<MediaCapture, SessionError>;
}
