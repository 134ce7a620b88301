//! WebSocket server: accept loop and per-connection task management.
//!
//! Each accepted connection gets:
//!
//! 1. A [`ConnectionId`] and an outbound queue registered in the shared
//!    [`ServerState`].
//! 2. A writer task draining that queue into the WebSocket sink.
//! 3. A reader loop feeding every text frame through the [`RelayHub`] and
//!    pushing the resulting deliveries onto the target queues.
//!
//! A close delivery makes the writer send a close frame and stop; the
//! client's close reply then ends the reader loop.
//!
//! When the reader loop ends the queue is unregistered, the hub is told
//! about the disconnect, and the writer drains and closes the socket.
//!
//! Shutdown is triggered by clearing the shared `running` flag; the accept
//! loop polls it every 200 ms.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::Duration;

use anyhow::Context;
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tokio::time::timeout;
use tokio_tungstenite::{
    accept_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Error as WsError, Message as WsMessage,
    },
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::relay::{Delivery, Outbound, RelayHub};
use crate::domain::config::RendezvousConfig;
use crate::domain::rooms::ConnectionId;

/// How long one `accept()` may block before the shutdown flag is rechecked.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// State shared by every connection task.
struct ServerState {
    hub: RelayHub,
    outboxes: HashMap<ConnectionId, mpsc::UnboundedSender<Outbound>>,
}

type SharedState = Arc<Mutex<ServerState>>;

// ── Public API ────────────────────────────────────────────────────────────────

/// Binds the TCP listener for `addr`.
///
/// # Errors
///
/// Returns an error if the address is in use or not bindable.
pub async fn bind_listener(addr: SocketAddr) -> anyhow::Result<TcpListener> {
    TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind rendezvous listener on {addr}"))
}

/// Binds `config.bind_addr` and serves until `running` is cleared.
///
/// # Errors
///
/// Returns an error if the listener cannot be bound.
pub async fn run_server(config: RendezvousConfig, running: Arc<AtomicBool>) -> anyhow::Result<()> {
    let listener = bind_listener(config.bind_addr).await?;
    serve(listener, config, running).await
}

/// Runs the accept loop on an already-bound listener.
///
/// Split from [`run_server`] so callers can bind port 0 and learn the
/// chosen address before serving.
///
/// # Errors
///
/// Returns an error if the listener's local address cannot be read.
pub async fn serve(
    listener: TcpListener,
    config: RendezvousConfig,
    running: Arc<AtomicBool>,
) -> anyhow::Result<()> {
    let local_addr = listener
        .local_addr()
        .context("failed to read listener address")?;
    info!(addr = %local_addr, max_rooms = config.max_rooms, "rendezvous server listening");

    let state: SharedState = Arc::new(Mutex::new(ServerState {
        hub: RelayHub::new(config.max_rooms),
        outboxes: HashMap::new(),
    }));

    loop {
        if !running.load(Ordering::Relaxed) {
            info!("shutdown flag set; stopping accept loop");
            break;
        }

        match timeout(ACCEPT_POLL_INTERVAL, listener.accept()).await {
            Ok(Ok((stream, peer_addr))) => {
                debug!(peer = %peer_addr, "accepted connection");
                let state = Arc::clone(&state);
                tokio::spawn(async move {
                    handle_connection(stream, peer_addr, state).await;
                });
            }
            Ok(Err(e)) => {
                error!("accept error: {e}");
            }
            Err(_) => {}
        }
    }

    Ok(())
}

// ── Per-connection handler ────────────────────────────────────────────────────

async fn handle_connection(stream: TcpStream, peer_addr: SocketAddr, state: SharedState) {
    match run_connection(stream, peer_addr, state).await {
        Ok(()) => debug!(peer = %peer_addr, "connection closed"),
        Err(e) => warn!(peer = %peer_addr, "connection closed with error: {e:#}"),
    }
}

async fn run_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    state: SharedState,
) -> anyhow::Result<()> {
    let ws_stream = accept_async(stream)
        .await
        .with_context(|| format!("WebSocket handshake failed with {peer_addr}"))?;

    let conn_id: ConnectionId = Uuid::new_v4();
    info!(conn = %conn_id, peer = %peer_addr, "signaling client connected");

    let (mut ws_tx, mut ws_rx) = ws_stream.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
    state.lock().await.outboxes.insert(conn_id, out_tx);

    let writer = tokio::spawn(async move {
        while let Some(outbound) = out_rx.recv().await {
            let (message, last) = match outbound {
                Outbound::Text(text) => (WsMessage::Text(text), false),
                Outbound::Close(reason) => {
                    info!(conn = %conn_id, "closing connection: {reason}");
                    let frame = CloseFrame {
                        code: CloseCode::Policy,
                        reason: reason.into(),
                    };
                    (WsMessage::Close(Some(frame)), true)
                }
            };
            if ws_tx.send(message).await.is_err() {
                debug!(conn = %conn_id, "send failed; client gone");
                break;
            }
            if last {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    loop {
        let frame = match ws_rx.next().await {
            Some(Ok(frame)) => frame,
            Some(Err(WsError::ConnectionClosed | WsError::Protocol(_))) | None => break,
            Some(Err(e)) => {
                warn!(conn = %conn_id, "WebSocket error: {e}");
                break;
            }
        };

        match frame {
            WsMessage::Text(text) => {
                let deliveries = {
                    let mut guard = state.lock().await;
                    guard
                        .hub
                        .handle_frame(conn_id, &text, &mut rand::thread_rng())
                };
                dispatch(&state, deliveries).await;
            }
            WsMessage::Binary(_) => {
                warn!(conn = %conn_id, "dropping binary frame; signaling is text only");
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }

    let deliveries = {
        let mut guard = state.lock().await;
        guard.outboxes.remove(&conn_id);
        guard.hub.handle_disconnect(conn_id)
    };
    dispatch(&state, deliveries).await;
    let _ = writer.await;

    info!(conn = %conn_id, "signaling client disconnected");
    Ok(())
}

async fn dispatch(state: &SharedState, deliveries: Vec<Delivery>) {
    if deliveries.is_empty() {
        return;
    }
    let guard = state.lock().await;
    for Delivery { to, outbound } in deliveries {
        match guard.outboxes.get(&to) {
            Some(outbox) => {
                if outbox.send(outbound).is_err() {
                    debug!(conn = %to, "outbox closed; dropping frame");
                }
            }
            None => debug!(conn = %to, "no such connection; dropping frame"),
        }
    }
}
