//! Signaling transport.
//!
//! Holds at most one live signaling connection to the rendezvous endpoint.
//! Inbound frames are delivered on the event sender registered when the
//! transport is built, which stays the same for the transport's lifetime.
//!
//! - [`SignalingTransport::open`] is idempotent: a second call while a
//!   socket is held does not dial again.
//! - [`SignalingTransport::send`] does not buffer. Sending before `open`
//!   resolves is an error.
//! - [`SignalingTransport::close`] may be called any number of times.

use std::sync::Arc;

use multiplay_core::{encode_signaling, SignalingMessage};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::ports::{SignalingDialer, SignalingSocket};
use crate::domain::error::SessionError;
use crate::domain::events::TransportEvent;

pub struct SignalingTransport {
    url: String,
    dialer: Arc<dyn SignalingDialer>,
    events: mpsc::UnboundedSender<TransportEvent>,
    socket: Option<Box<dyn SignalingSocket>>,
}

impl SignalingTransport {
    pub fn new(
        url: impl Into<String>,
        dialer: Arc<dyn SignalingDialer>,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Self {
        Self {
            url: url.into(),
            dialer,
            events,
            socket: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.socket.is_some()
    }

    /// Connects to the rendezvous endpoint unless already connected.
    ///
    /// # Errors
    ///
    /// Returns whatever the dialer reports; the transport stays closed.
    pub async fn open(&mut self) -> Result<(), SessionError> {
        if self.socket.is_some() {
            debug!(url = %self.url, "signaling transport already open");
            return Ok(());
        }
        let socket = self.dialer.dial(&self.url, self.events.clone()).await?;
        self.socket = Some(socket);
        info!(url = %self.url, "signaling transport open");
        Ok(())
    }

    /// Serializes and transmits one message.
    ///
    /// # Errors
    ///
    /// - [`SessionError::Signaling`] if the transport is not open or the
    ///   socket write fails.
    /// - [`SessionError::Protocol`] if the message cannot be encoded.
    pub async fn send(&mut self, msg: &SignalingMessage) -> Result<(), SessionError> {
        let Some(socket) = self.socket.as_mut() else {
            warn!(kind = msg.message_type(), "send on closed signaling transport");
            return Err(SessionError::Signaling("transport is not open".to_string()));
        };
        let text = encode_signaling(msg)?;
        debug!(kind = msg.message_type(), "signaling send");
        socket.send_text(text).await
    }

    /// Closes the connection if one is held.
    pub async fn close(&mut self) {
        if let Some(mut socket) = self.socket.take() {
            socket.close().await;
            info!(url = %self.url, "signaling transport closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::mock::MockSignalingDialer;

    fn transport(dialer: &Arc<MockSignalingDialer>) -> SignalingTransport {
        let (tx, _rx) = mpsc::unbounded_channel();
        SignalingTransport::new("ws://test", dialer.clone(), tx)
    }

    #[tokio::test]
    async fn test_open_twice_dials_once() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);

        transport.open().await.unwrap();
        transport.open().await.unwrap();

        assert!(transport.is_open());
        assert_eq!(dialer.dial_count(), 1);
    }

    #[tokio::test]
    async fn test_close_twice_is_safe() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);
        transport.open().await.unwrap();

        transport.close().await;
        transport.close().await;

        assert!(!transport.is_open());
        assert_eq!(dialer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_close_before_open_is_safe() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);
        transport.close().await;
        assert_eq!(dialer.close_count(), 0);
    }

    #[tokio::test]
    async fn test_send_before_open_is_rejected_not_buffered() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);

        let err = transport.send(&SignalingMessage::Create).await.unwrap_err();
        assert_eq!(err.code(), "signaling-error");

        transport.open().await.unwrap();
        assert!(dialer.sent_messages().is_empty());
    }

    #[tokio::test]
    async fn test_send_encodes_message() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);
        transport.open().await.unwrap();

        transport.send(&SignalingMessage::Create).await.unwrap();
        assert_eq!(dialer.sent_messages(), vec![SignalingMessage::Create]);
    }

    #[tokio::test]
    async fn test_failed_dial_leaves_transport_closed() {
        let dialer = Arc::new(MockSignalingDialer::failing());
        let mut transport = transport(&dialer);

        assert!(transport.open().await.is_err());
        assert!(!transport.is_open());
    }

    #[tokio::test]
    async fn test_reopen_after_close_dials_again() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let mut transport = transport(&dialer);
        transport.open().await.unwrap();
        transport.close().await;
        transport.open().await.unwrap();
        assert_eq!(dialer.dial_count(), 2);
    }
}
