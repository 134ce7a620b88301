//! Signaling over a WebSocket.
//!
//! Each dial opens one client connection with `tokio_tungstenite` and splits
//! it: the write half becomes the [`SignalingSocket`], the read half is
//! drained by a task that decodes every text frame and reports it on the
//! transport event channel. Binary frames are ignored; pings are answered by
//! tungstenite itself.

use async_trait::async_trait;
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use multiplay_core::decode_signaling;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::application::ports::{SignalingDialer, SignalingSocket};
use crate::domain::error::SessionError;
use crate::domain::events::TransportEvent;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;

/// Dials the rendezvous server over `ws://` or `wss://`.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsSignalingDialer;

impl WsSignalingDialer {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl SignalingDialer for WsSignalingDialer {
    async fn dial(
        &self,
        url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn SignalingSocket>, SessionError> {
        let (stream, _response) = connect_async(url)
            .await
            .map_err(|e| SessionError::SignalingConnect(e.to_string()))?;
        info!(url, "connected to signaling server");

        let (sink, mut source) = stream.split();
        let reader = tokio::spawn(async move {
            loop {
                let event = match source.next().await {
                    Some(Ok(Message::Text(text))) => TransportEvent::Message(decode_signaling(&text)),
                    Some(Ok(Message::Close(frame))) => {
                        debug!(?frame, "signaling server closed the connection");
                        TransportEvent::Closed
                    }
                    Some(Ok(_)) => continue,
                    Some(Err(e)) => {
                        warn!("signaling read error: {e}");
                        TransportEvent::Error(e.to_string())
                    }
                    None => TransportEvent::Closed,
                };
                let last = !matches!(event, TransportEvent::Message(_));
                if events.send(event).is_err() || last {
                    break;
                }
            }
        });

        Ok(Box::new(WsSignalingSocket { sink, reader }))
    }
}

struct WsSignalingSocket {
    sink: WsSink,
    reader: JoinHandle<()>,
}

#[async_trait]
impl SignalingSocket for WsSignalingSocket {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        self.sink
            .send(Message::Text(text))
            .await
            .map_err(|e| SessionError::Signaling(e.to_string()))
    }

    async fn close(&mut self) {
        // Stop reporting first so our own close is not seen as a server drop.
        self.reader.abort();
        if let Err(e) = self.sink.send(Message::Close(None)).await {
            debug!("close frame not sent: {e}");
        }
        let _ = self.sink.close().await;
    }
}

impl Drop for WsSignalingSocket {
    fn drop(&mut self) {
        self.reader.abort();
    }
}
