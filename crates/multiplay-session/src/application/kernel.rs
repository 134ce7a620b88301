//! Session kernel: the per-device state machine.
//!
//! # Overview (for beginners)
//!
//! A MultiPlay session moves through these states:
//!
//! ```text
//! idle ─start_host─▶ signaling-connected ─room-created─▶ waiting-for-peer
//!                                                           │ peer-joined
//! idle ─join_room──▶ signaling-connected ─▶ joining          ▼
//!                                            │ offer    peer-connected
//!                                            └────────▶      │ peer reports connected
//!                                                            ▼
//!                                                        connected
//! any non-idle ─▶ disconnected | failed | error ─▶ idle
//! ```
//!
//! The host creates the room, and when a joiner arrives it builds the peer
//! connection, opens the control data channel, attaches the captured video
//! and sends an offer. The joiner answers. ICE candidates flow both ways
//! through the rendezvous server and are queued until the remote description
//! is in place.
//!
//! # Concurrency
//!
//! The kernel is a cheap `Clone` handle. All mutable state sits behind one
//! async mutex that is never held across network I/O. Each session gets an
//! *epoch* number; teardown bumps it, and every async continuation checks
//! its epoch before touching state, so late results from a session that no
//! longer exists are discarded instead of mutating the next one.
//!
//! Signaling frames and peer events are consumed by one pump task each,
//! which keeps per-source ordering.

use std::sync::Arc;

use multiplay_core::{
    decode_control, encode_control, ConnectionState, ControlEvent, ControlEventType,
    ControlMessage, Coords, IceCandidate, RoomCode, SessionDescription, SessionRole,
    SessionSnapshot, SignalPayload, SignalingMessage,
};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::application::candidates::CandidateQueue;
use crate::application::ports::{
    CaptureSurface, CaptureTracks, MediaCapture, PeerConnector, PeerLink, SignalingDialer,
};
use crate::application::transport::SignalingTransport;
use crate::domain::config::SessionConfig;
use crate::domain::error::SessionError;
use crate::domain::events::{PeerEvent, PeerState, SessionEvent, TransportEvent};

/// The adapters a kernel drives.
#[derive(Clone)]
pub struct KernelPorts {
    pub dialer: Arc<dyn SignalingDialer>,
    pub connector: Arc<dyn PeerConnector>,
    /// `None` disables video streaming on the host.
    pub capture: Option<Arc<dyn CaptureSurface>>,
}

type SharedTransport = Arc<Mutex<SignalingTransport>>;

#[derive(Default)]
struct KernelState {
    epoch: u64,
    role: SessionRole,
    room_code: Option<RoomCode>,
    connection_state: ConnectionState,
    peer_connected: bool,
    transport: Option<SharedTransport>,
    peer: Option<Arc<dyn PeerLink>>,
    channel_open: bool,
    candidates: CandidateQueue,
    capture: Option<CaptureTracks>,
    /// Survives teardown: it describes the program, not the session.
    project_metadata: Option<Value>,
}

impl KernelState {
    fn is_idle(&self) -> bool {
        self.role == SessionRole::None
            && self.connection_state == ConnectionState::Idle
            && self.transport.is_none()
            && self.peer.is_none()
    }

    /// Connected with an open control channel.
    fn channel_ready(&self) -> bool {
        self.connection_state == ConnectionState::Connected && self.channel_open
    }
}

struct Inner {
    config: SessionConfig,
    ports: KernelPorts,
    state: Mutex<KernelState>,
    events: mpsc::UnboundedSender<SessionEvent>,
}

/// Handle to one device's session state machine.
#[derive(Clone)]
pub struct SessionKernel {
    inner: Arc<Inner>,
}

impl SessionKernel {
    /// Builds an idle kernel and the stream of events it will emit.
    ///
    /// Callers outside this crate go through
    /// [`SessionRegistry::create`](crate::SessionRegistry::create), which
    /// keeps one kernel per device.
    pub(crate) fn new(
        config: SessionConfig,
        ports: KernelPorts,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let kernel = Self {
            inner: Arc::new(Inner {
                config,
                ports,
                state: Mutex::new(KernelState::default()),
                events,
            }),
        };
        (kernel, rx)
    }

    /// True when both handles drive the same kernel.
    pub fn same_kernel(&self, other: &SessionKernel) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // ── Queries ───────────────────────────────────────────────────────────────

    pub async fn snapshot(&self) -> SessionSnapshot {
        let st = self.inner.state.lock().await;
        SessionSnapshot {
            role: st.role,
            room_code: st.room_code.clone(),
            connection_state: st.connection_state,
            peer_connected: st.peer_connected,
        }
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.inner.state.lock().await.connection_state
    }

    /// Identity of the current peer connection, if one exists.
    pub async fn peer_id(&self) -> Option<Uuid> {
        self.inner.state.lock().await.peer.as_ref().map(|p| p.id())
    }

    // ── Operations ────────────────────────────────────────────────────────────

    /// Opens signaling and asks the rendezvous server for a new room.
    ///
    /// The room code arrives later as [`SessionEvent::RoomCodeAvailable`].
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] if a session is already active; the
    ///   active session is left untouched.
    /// - Signaling failures, which also end the new session with an error
    ///   event.
    pub async fn start_host(&self) -> Result<(), SessionError> {
        let epoch = self.begin(SessionRole::Host, None).await?;
        info!(epoch, "starting host session");
        let transport = self.connect_signaling(epoch).await?;
        self.send_on(epoch, &transport, &SignalingMessage::Create).await
    }

    /// Opens signaling and asks to join the room named by `code`.
    ///
    /// `code` is trimmed and upper-cased before use.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidState`] if a session is already active. The
    ///   code is not looked at and nothing is emitted.
    /// - [`SessionError::InvalidRoomCode`] before anything is dialled.
    /// - Signaling failures, which also end the session with an error event.
    pub async fn join_room(&self, code: &str) -> Result<(), SessionError> {
        {
            let st = self.inner.state.lock().await;
            if !st.is_idle() {
                return Err(SessionError::InvalidState(st.connection_state));
            }
        }
        let room_code = match RoomCode::parse(code) {
            Ok(room_code) => room_code,
            Err(e) => {
                let err = SessionError::from(e);
                warn!(input = code, "rejecting room code: {err}");
                self.emit(SessionEvent::Error {
                    code: err.code(),
                    message: err.to_string(),
                });
                return Err(err);
            }
        };
        let epoch = self
            .begin(SessionRole::Joiner, Some(room_code.clone()))
            .await?;
        info!(epoch, room = %room_code, "joining room");
        let transport = self.connect_signaling(epoch).await?;
        self.transition(epoch, ConnectionState::Joining).await;
        self.send_on(epoch, &transport, &SignalingMessage::Join { room_code })
            .await
    }

    /// Ends the session and returns to idle. A no-op when already idle.
    pub async fn disconnect(&self) {
        if self.teardown(None, ConnectionState::Idle, None).await {
            info!("session disconnected by caller");
        }
    }

    /// Sends one input event to the remote peer.
    ///
    /// Returns `false` and drops the event unless the session is connected
    /// with an open control channel. Never queues.
    pub async fn send_control_event(&self, event: ControlEvent) -> bool {
        let peer = {
            let st = self.inner.state.lock().await;
            if st.channel_ready() {
                st.peer.clone()
            } else {
                None
            }
        };
        let Some(peer) = peer else {
            debug!(key = %event.key, "control channel not open; dropping input");
            return false;
        };
        let text = match encode_control(&ControlMessage::Input(event)) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not encode control event: {e}");
                return false;
            }
        };
        match peer.send_text(text).await {
            Ok(()) => true,
            Err(e) => {
                warn!("control send failed: {e}");
                false
            }
        }
    }

    /// Convenience form of [`send_control_event`](Self::send_control_event).
    pub async fn send_control(
        &self,
        key: &str,
        event_type: ControlEventType,
        coords: Option<Coords>,
    ) -> bool {
        self.send_control_event(ControlEvent {
            key: key.to_string(),
            event_type,
            coords,
        })
        .await
    }

    /// Records the program's metadata and, on a connected host, pushes it
    /// to the joiner right away.
    pub async fn set_project_metadata(&self, metadata: Value) {
        let epoch = {
            let mut st = self.inner.state.lock().await;
            st.project_metadata = Some(metadata);
            st.epoch
        };
        self.push_metadata(epoch).await;
    }

    /// Joiner side: asks the host to resend its metadata. Returns `false`
    /// when the channel is not open.
    pub async fn request_metadata(&self) -> bool {
        let peer = {
            let st = self.inner.state.lock().await;
            if st.channel_ready() {
                st.peer.clone()
            } else {
                None
            }
        };
        let Some(peer) = peer else {
            return false;
        };
        match encode_control(&ControlMessage::RequestMetadata) {
            Ok(text) => peer.send_text(text).await.is_ok(),
            Err(e) => {
                warn!("could not encode metadata request: {e}");
                false
            }
        }
    }

    // ── Session lifecycle ─────────────────────────────────────────────────────

    async fn begin(
        &self,
        role: SessionRole,
        room_code: Option<RoomCode>,
    ) -> Result<u64, SessionError> {
        let mut st = self.inner.state.lock().await;
        if !st.is_idle() {
            return Err(SessionError::InvalidState(st.connection_state));
        }
        st.epoch += 1;
        st.role = role;
        st.room_code = room_code;
        st.candidates.reset();
        Ok(st.epoch)
    }

    async fn is_current(&self, epoch: u64) -> bool {
        self.inner.state.lock().await.epoch == epoch
    }

    async fn ensure_current(&self, epoch: u64) -> Result<(), SessionError> {
        if self.is_current(epoch).await {
            Ok(())
        } else {
            Err(SessionError::Cancelled)
        }
    }

    /// Moves to `next` if `epoch` is still current.
    async fn transition(&self, epoch: u64, next: ConnectionState) -> bool {
        let mut st = self.inner.state.lock().await;
        if st.epoch != epoch {
            return false;
        }
        if st.connection_state != next {
            info!(from = %st.connection_state, to = %next, "connection state");
            st.connection_state = next;
            self.emit(SessionEvent::ConnectionStateChanged(next));
        }
        true
    }

    /// Ends the session with an error event, if `epoch` is still current.
    async fn fail(&self, epoch: u64, err: SessionError) {
        if let SessionError::Cancelled = err {
            return;
        }
        if !self.teardown(Some(epoch), ConnectionState::Error, Some(&err)).await {
            debug!(epoch, "ignoring failure of a finished session: {err}");
        }
    }

    /// Routes a step's error: fails the session and hands the error back,
    /// or reports `Cancelled` when the session is already gone.
    async fn abort<T>(&self, epoch: u64, err: SessionError) -> Result<T, SessionError> {
        if matches!(err, SessionError::Cancelled) || !self.is_current(epoch).await {
            return Err(SessionError::Cancelled);
        }
        self.fail(epoch, err.clone()).await;
        Err(err)
    }

    /// Releases every session resource and returns to idle.
    ///
    /// With `expected` set, nothing happens unless that epoch is current.
    /// Emits `error` (if any), then `terminal` (unless it is `idle`), then
    /// `idle`. Returns `false` when there was nothing to tear down.
    async fn teardown(
        &self,
        expected: Option<u64>,
        terminal: ConnectionState,
        error: Option<&SessionError>,
    ) -> bool {
        let (transport, peer, capture) = {
            let mut st = self.inner.state.lock().await;
            if expected.is_some_and(|epoch| epoch != st.epoch) || st.is_idle() {
                return false;
            }
            st.epoch += 1;
            st.role = SessionRole::None;
            st.room_code = None;
            st.peer_connected = false;
            st.channel_open = false;
            st.candidates.reset();
            st.connection_state = ConnectionState::Idle;

            if let Some(err) = error {
                error!(code = err.code(), "session failed: {err}");
                self.emit(SessionEvent::Error {
                    code: err.code(),
                    message: err.to_string(),
                });
            }
            if terminal != ConnectionState::Idle {
                info!(state = %terminal, "session ended");
                self.emit(SessionEvent::ConnectionStateChanged(terminal));
            }
            self.emit(SessionEvent::ConnectionStateChanged(ConnectionState::Idle));
            (st.transport.take(), st.peer.take(), st.capture.take())
        };

        if let Some(capture) = capture {
            capture.stop_all();
        }
        if let Some(peer) = peer {
            debug!(peer = %peer.id(), "closing peer connection");
            peer.close().await;
        }
        if let Some(transport) = transport {
            transport.lock().await.close().await;
        }
        true
    }

    fn emit(&self, event: SessionEvent) {
        // The caller may have dropped the receiver; the session still runs.
        let _ = self.inner.events.send(event);
    }

    // ── Signaling ─────────────────────────────────────────────────────────────

    async fn connect_signaling(&self, epoch: u64) -> Result<SharedTransport, SessionError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut transport = SignalingTransport::new(
            self.inner.config.signaling_url.clone(),
            Arc::clone(&self.inner.ports.dialer),
            tx,
        );
        let limit = self.inner.config.connect_timeout();
        let opened = match tokio::time::timeout(limit, transport.open()).await {
            Ok(result) => result,
            Err(_) => Err(SessionError::SignalingConnect(format!(
                "timed out after {} ms",
                limit.as_millis()
            ))),
        };
        if let Err(e) = opened {
            return self.abort(epoch, e).await;
        }

        let transport = Arc::new(Mutex::new(transport));
        {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                drop(st);
                transport.lock().await.close().await;
                return Err(SessionError::Cancelled);
            }
            st.transport = Some(Arc::clone(&transport));
        }
        self.spawn_transport_pump(epoch, rx);
        self.transition(epoch, ConnectionState::SignalingConnected)
            .await;
        Ok(transport)
    }

    async fn send_on(
        &self,
        epoch: u64,
        transport: &SharedTransport,
        msg: &SignalingMessage,
    ) -> Result<(), SessionError> {
        let sent = transport.lock().await.send(msg).await;
        match sent {
            Ok(()) => Ok(()),
            Err(e) => self.abort(epoch, e).await,
        }
    }

    /// Sends on the current session's transport.
    async fn send_signal(&self, epoch: u64, payload: SignalPayload) -> Result<(), SessionError> {
        let transport = {
            let st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return Err(SessionError::Cancelled);
            }
            st.transport.clone().ok_or(SessionError::Cancelled)?
        };
        self.send_on(epoch, &transport, &SignalingMessage::Signal(payload))
            .await
    }

    fn spawn_transport_pump(&self, epoch: u64, mut rx: mpsc::UnboundedReceiver<TransportEvent>) {
        let kernel = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !kernel.is_current(epoch).await {
                    break;
                }
                kernel.on_transport_event(epoch, event).await;
            }
            debug!(epoch, "signaling pump finished");
        });
    }

    async fn on_transport_event(&self, epoch: u64, event: TransportEvent) {
        match event {
            TransportEvent::Message(msg) => self.on_signaling(epoch, msg).await,
            TransportEvent::Closed => self.fail(epoch, SessionError::SignalingClosed).await,
            TransportEvent::Error(e) => self.fail(epoch, SessionError::Signaling(e)).await,
        }
    }

    async fn on_signaling(&self, epoch: u64, msg: SignalingMessage) {
        let (role, state, room) = {
            let st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return;
            }
            (st.role, st.connection_state, st.room_code.clone())
        };
        debug!(kind = msg.message_type(), state = %state, "signaling frame");

        match msg {
            SignalingMessage::RoomCreated { room_code } => {
                if role != SessionRole::Host || state != ConnectionState::SignalingConnected {
                    warn!(state = %state, "unexpected room-created; dropping");
                    return;
                }
                let mut st = self.inner.state.lock().await;
                if st.epoch != epoch {
                    return;
                }
                info!(room = %room_code, "room created");
                st.room_code = Some(room_code.clone());
                st.connection_state = ConnectionState::WaitingForPeer;
                self.emit(SessionEvent::ConnectionStateChanged(
                    ConnectionState::WaitingForPeer,
                ));
                self.emit(SessionEvent::RoomCodeAvailable(room_code));
            }
            SignalingMessage::PeerJoined => {
                if role != SessionRole::Host || state != ConnectionState::WaitingForPeer {
                    warn!(state = %state, "unexpected peer-joined; dropping");
                    return;
                }
                info!("peer joined the room");
                self.emit(SessionEvent::PeerJoined);
                if let Err(e) = self.negotiate_as_host(epoch).await {
                    self.fail(epoch, e).await;
                }
            }
            SignalingMessage::JoinFailed => {
                if role != SessionRole::Joiner {
                    warn!("join-failed on a host session; dropping");
                    return;
                }
                let code = room.map(|r| r.to_string()).unwrap_or_default();
                self.fail(epoch, SessionError::JoinFailed(code)).await;
            }
            SignalingMessage::PeerDisconnected => {
                info!("remote peer left the room");
                self.teardown(Some(epoch), ConnectionState::Disconnected, None)
                    .await;
            }
            SignalingMessage::Signal(payload) => {
                if room.as_ref() != Some(payload.room_code()) {
                    warn!(
                        kind = payload.kind(),
                        room = %payload.room_code(),
                        "signal for another room; dropping"
                    );
                    return;
                }
                self.on_signal(epoch, role, state, payload).await;
            }
            SignalingMessage::Unrecognized { reason, .. } => {
                warn!("dropping unrecognized signaling frame: {reason}");
            }
            other @ (SignalingMessage::Create | SignalingMessage::Join { .. }) => {
                warn!(kind = other.message_type(), "server-bound frame received; dropping");
            }
        }
    }

    async fn on_signal(
        &self,
        epoch: u64,
        role: SessionRole,
        state: ConnectionState,
        payload: SignalPayload,
    ) {
        let result = match payload {
            SignalPayload::Offer { sdp, .. } => {
                let expected = matches!(
                    state,
                    ConnectionState::Joining | ConnectionState::PeerConnected
                );
                if role != SessionRole::Joiner || !expected {
                    warn!(state = %state, "unexpected offer; dropping");
                    return;
                }
                self.accept_offer(epoch, sdp).await
            }
            SignalPayload::Answer { sdp, .. } => {
                let expected = matches!(
                    state,
                    ConnectionState::PeerConnected | ConnectionState::Connected
                );
                if role != SessionRole::Host || !expected {
                    warn!(state = %state, "unexpected answer; dropping");
                    return;
                }
                self.accept_answer(epoch, sdp).await
            }
            SignalPayload::Candidate { candidate, .. } => {
                self.add_remote_candidate(epoch, candidate).await;
                Ok(())
            }
        };
        if let Err(e) = result {
            self.fail(epoch, e).await;
        }
    }

    // ── Negotiation ───────────────────────────────────────────────────────────

    /// Host: peer, data channel, capture, offer.
    async fn negotiate_as_host(&self, epoch: u64) -> Result<(), SessionError> {
        if !self.transition(epoch, ConnectionState::PeerConnected).await {
            return Err(SessionError::Cancelled);
        }
        let peer = self.ensure_peer(epoch).await?;
        peer.create_data_channel(&self.inner.config.data_channel_label)
            .await?;
        self.ensure_current(epoch).await?;
        self.start_capture(epoch, &peer).await?;

        let offer = peer.create_offer().await?;
        let room_code = self.current_room(epoch).await?;
        info!(peer = %peer.id(), "sending offer");
        self.send_signal(epoch, SignalPayload::description(offer, room_code))
            .await
    }

    /// Joiner: apply the offer, flush queued candidates, answer.
    async fn accept_offer(&self, epoch: u64, sdp: String) -> Result<(), SessionError> {
        if !self.transition(epoch, ConnectionState::PeerConnected).await {
            return Err(SessionError::Cancelled);
        }
        let peer = self.ensure_peer(epoch).await?;
        peer.set_remote_description(SessionDescription::offer(sdp))
            .await?;
        self.flush_candidates(epoch, &peer).await?;

        let answer = peer.create_answer().await?;
        let room_code = self.current_room(epoch).await?;
        info!(peer = %peer.id(), "sending answer");
        self.send_signal(epoch, SignalPayload::description(answer, room_code))
            .await
    }

    /// Host: apply the answer, flush queued candidates.
    async fn accept_answer(&self, epoch: u64, sdp: String) -> Result<(), SessionError> {
        let peer = {
            let st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return Err(SessionError::Cancelled);
            }
            st.peer.clone()
        };
        let Some(peer) = peer else {
            warn!("answer arrived before the peer connection exists; dropping");
            return Ok(());
        };
        peer.set_remote_description(SessionDescription::answer(sdp))
            .await?;
        self.flush_candidates(epoch, &peer).await
    }

    async fn current_room(&self, epoch: u64) -> Result<RoomCode, SessionError> {
        let st = self.inner.state.lock().await;
        if st.epoch != epoch {
            return Err(SessionError::Cancelled);
        }
        st.room_code
            .clone()
            .ok_or_else(|| SessionError::Protocol("no room code for this session".to_string()))
    }

    /// Returns the session's peer connection, building it on first use.
    async fn ensure_peer(&self, epoch: u64) -> Result<Arc<dyn PeerLink>, SessionError> {
        {
            let st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return Err(SessionError::Cancelled);
            }
            if let Some(peer) = &st.peer {
                return Ok(Arc::clone(peer));
            }
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let peer = self.inner.ports.connector.connect(&self.inner.config, tx).await?;
        {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                drop(st);
                peer.close().await;
                return Err(SessionError::Cancelled);
            }
            st.peer = Some(Arc::clone(&peer));
        }
        info!(peer = %peer.id(), "peer connection created");
        self.spawn_peer_pump(epoch, rx);
        Ok(peer)
    }

    async fn start_capture(
        &self,
        epoch: u64,
        peer: &Arc<dyn PeerLink>,
    ) -> Result<(), SessionError> {
        if !self.inner.config.capture_video {
            return Ok(());
        }
        let Some(surface) = self.inner.ports.capture.clone() else {
            debug!("no capture surface; streaming disabled");
            return Ok(());
        };
        let MediaCapture {
            mime_type,
            frames,
            tracks,
        } = surface.start_capture().await?;
        {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                tracks.stop_all();
                return Err(SessionError::Cancelled);
            }
            st.capture = Some(tracks);
        }
        info!(mime = %mime_type, "attaching captured video");
        peer.attach_capture(&mime_type, frames).await
    }

    // ── ICE candidates ────────────────────────────────────────────────────────

    async fn add_remote_candidate(&self, epoch: u64, candidate: IceCandidate) {
        let apply_now = {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return;
            }
            let peer = st.peer.clone();
            st.candidates
                .offer(candidate)
                .and_then(|c| peer.map(|p| (p, c)))
        };
        match apply_now {
            Some((peer, candidate)) => apply_candidate(&peer, candidate).await,
            None => debug!("remote candidate queued until remote description is set"),
        }
    }

    async fn flush_candidates(
        &self,
        epoch: u64,
        peer: &Arc<dyn PeerLink>,
    ) -> Result<(), SessionError> {
        let backlog = {
            let mut st = self.inner.state.lock().await;
            if st.epoch != epoch {
                return Err(SessionError::Cancelled);
            }
            st.candidates.mark_ready()
        };
        if !backlog.is_empty() {
            debug!(count = backlog.len(), "flushing queued candidates");
        }
        for candidate in backlog {
            apply_candidate(peer, candidate).await;
        }
        Ok(())
    }

    // ── Peer events ───────────────────────────────────────────────────────────

    fn spawn_peer_pump(&self, epoch: u64, mut rx: mpsc::UnboundedReceiver<PeerEvent>) {
        let kernel = self.clone();
        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                if !kernel.is_current(epoch).await {
                    break;
                }
                kernel.on_peer_event(epoch, event).await;
            }
            debug!(epoch, "peer pump finished");
        });
    }

    async fn on_peer_event(&self, epoch: u64, event: PeerEvent) {
        match event {
            PeerEvent::LocalCandidate(candidate) => {
                let room_code = match self.current_room(epoch).await {
                    Ok(room_code) => room_code,
                    Err(_) => return,
                };
                let payload = SignalPayload::Candidate {
                    candidate,
                    room_code,
                };
                if let Err(e) = self.send_signal(epoch, payload).await {
                    debug!("local candidate not sent: {e}");
                }
            }
            PeerEvent::StateChanged(PeerState::Connected) => {
                {
                    let mut st = self.inner.state.lock().await;
                    if st.epoch != epoch {
                        return;
                    }
                    st.peer_connected = true;
                    if st.connection_state != ConnectionState::Connected {
                        info!(from = %st.connection_state, "peer connected");
                        st.connection_state = ConnectionState::Connected;
                        self.emit(SessionEvent::ConnectionStateChanged(
                            ConnectionState::Connected,
                        ));
                    }
                }
                self.push_metadata(epoch).await;
            }
            PeerEvent::StateChanged(PeerState::Failed) => {
                warn!("peer connection failed");
                self.teardown(Some(epoch), ConnectionState::Failed, None)
                    .await;
            }
            PeerEvent::StateChanged(PeerState::Closed) => {
                info!("peer connection closed");
                self.teardown(Some(epoch), ConnectionState::Disconnected, None)
                    .await;
            }
            PeerEvent::StateChanged(other) => {
                debug!(state = %other, "peer state");
            }
            PeerEvent::ChannelOpen => {
                {
                    let mut st = self.inner.state.lock().await;
                    if st.epoch != epoch {
                        return;
                    }
                    st.channel_open = true;
                }
                info!("control channel open");
                self.push_metadata(epoch).await;
            }
            PeerEvent::ChannelClosed => {
                let mut st = self.inner.state.lock().await;
                if st.epoch == epoch {
                    st.channel_open = false;
                    info!("control channel closed");
                }
            }
            PeerEvent::ChannelMessage(text) => self.on_channel_message(epoch, &text).await,
            PeerEvent::ChannelError(e) => {
                self.fail(epoch, SessionError::PeerConnection(format!("data channel: {e}")))
                    .await;
            }
        }
    }

    async fn on_channel_message(&self, epoch: u64, text: &str) {
        match decode_control(text) {
            ControlMessage::Input(event) => {
                debug!(key = %event.key, kind = event.event_type.as_str(), "remote input");
                self.emit(SessionEvent::ControlReceived(event));
            }
            ControlMessage::ProjectMetadata(metadata) => {
                info!("project metadata received");
                self.emit(SessionEvent::MetadataReceived(metadata));
            }
            ControlMessage::RequestMetadata => self.push_metadata(epoch).await,
            ControlMessage::Unrecognized { reason, .. } => {
                warn!("dropping malformed control message: {reason}");
            }
        }
    }

    /// Host: sends the stored metadata when the channel is ready.
    async fn push_metadata(&self, epoch: u64) {
        let (peer, metadata) = {
            let st = self.inner.state.lock().await;
            if st.epoch != epoch || st.role != SessionRole::Host || !st.channel_ready() {
                return;
            }
            match (&st.peer, &st.project_metadata) {
                (Some(peer), Some(metadata)) => (Arc::clone(peer), metadata.clone()),
                _ => return,
            }
        };
        let text = match encode_control(&ControlMessage::ProjectMetadata(metadata)) {
            Ok(text) => text,
            Err(e) => {
                warn!("could not encode project metadata: {e}");
                return;
            }
        };
        match peer.send_text(text).await {
            Ok(()) => debug!("project metadata pushed"),
            Err(e) => warn!("project metadata push failed: {e}"),
        }
    }
}

/// Candidate failures are logged, never fatal.
async fn apply_candidate(peer: &Arc<dyn PeerLink>, candidate: IceCandidate) {
    if let Err(e) = peer.add_ice_candidate(candidate).await {
        warn!(peer = %peer.id(), "could not apply remote candidate: {e}");
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use multiplay_core::{MouseAction, SdpType};
    use serde_json::json;

    use super::*;
    use crate::infrastructure::mock::{
        wait_until, MockCaptureSurface, MockPeerConnector, MockPeerLink, MockSignalingDialer,
        PeerCall,
    };

    const WAIT: Duration = Duration::from_secs(2);

    struct Harness {
        kernel: SessionKernel,
        events: mpsc::UnboundedReceiver<SessionEvent>,
        dialer: Arc<MockSignalingDialer>,
        connector: Arc<MockPeerConnector>,
        capture: Arc<MockCaptureSurface>,
    }

    fn harness_with(dialer: MockSignalingDialer, connector: MockPeerConnector) -> Harness {
        harness_config(SessionConfig::default(), dialer, connector)
    }

    fn harness_config(
        config: SessionConfig,
        dialer: MockSignalingDialer,
        connector: MockPeerConnector,
    ) -> Harness {
        let dialer = Arc::new(dialer);
        let connector = Arc::new(connector);
        let capture = Arc::new(MockCaptureSurface::new());
        let ports = KernelPorts {
            dialer: dialer.clone(),
            connector: connector.clone(),
            capture: Some(capture.clone()),
        };
        let (kernel, events) = SessionKernel::new(config, ports);
        Harness {
            kernel,
            events,
            dialer,
            connector,
            capture,
        }
    }

    fn harness() -> Harness {
        harness_with(MockSignalingDialer::new(), MockPeerConnector::new())
    }

    fn code(s: &str) -> RoomCode {
        RoomCode::parse(s).unwrap()
    }

    async fn next_event(events: &mut mpsc::UnboundedReceiver<SessionEvent>) -> SessionEvent {
        tokio::time::timeout(WAIT, events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream closed")
    }

    /// Reads events until `wanted` shows up, returning everything read.
    async fn events_until(
        events: &mut mpsc::UnboundedReceiver<SessionEvent>,
        wanted: &SessionEvent,
    ) -> Vec<SessionEvent> {
        let mut seen = Vec::new();
        loop {
            let event = next_event(events).await;
            let done = &event == wanted;
            seen.push(event);
            if done {
                return seen;
            }
        }
    }

    fn state(s: ConnectionState) -> SessionEvent {
        SessionEvent::ConnectionStateChanged(s)
    }

    fn sent_signals(dialer: &MockSignalingDialer) -> Vec<SignalPayload> {
        dialer
            .sent_messages()
            .into_iter()
            .filter_map(|m| match m {
                SignalingMessage::Signal(p) => Some(p),
                _ => None,
            })
            .collect()
    }

    /// Drives a host to `connected` with an open channel.
    async fn connected_host(h: &mut Harness) -> Arc<MockPeerLink> {
        h.kernel.start_host().await.unwrap();
        h.dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("ABC123"),
        });
        events_until(&mut h.events, &SessionEvent::RoomCodeAvailable(code("ABC123"))).await;
        h.dialer.inject(SignalingMessage::PeerJoined);

        let dialer = h.dialer.clone();
        assert!(
            wait_until(
                || sent_signals(&dialer)
                    .iter()
                    .any(|p| matches!(p, SignalPayload::Offer { .. })),
                WAIT
            )
            .await
        );
        let peer = h.connector.last_peer().unwrap();
        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Answer {
            sdp: "answer".into(),
            sdp_type: SdpType::Answer,
            room_code: code("ABC123"),
        }));
        let probe = peer.clone();
        assert!(
            wait_until(
                || probe
                    .calls()
                    .contains(&PeerCall::SetRemoteDescription(SdpType::Answer)),
                WAIT
            )
            .await
        );
        peer.emit_connected();
        events_until(&mut h.events, &state(ConnectionState::Connected)).await;
        let kernel = h.kernel.clone();
        assert!(wait_until(|| kernel.try_channel_open(), WAIT).await);
        peer
    }

    impl SessionKernel {
        /// Non-blocking probe for tests.
        fn try_channel_open(&self) -> bool {
            self.inner
                .state
                .try_lock()
                .map(|st| st.channel_ready())
                .unwrap_or(false)
        }
    }

    // ── Host flow ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_start_host_sends_create_and_surfaces_room_code() {
        let mut h = harness();
        h.kernel.start_host().await.unwrap();

        assert_eq!(
            next_event(&mut h.events).await,
            state(ConnectionState::SignalingConnected)
        );
        assert_eq!(h.dialer.sent_messages(), vec![SignalingMessage::Create]);

        h.dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("XYZ789"),
        });
        assert_eq!(
            next_event(&mut h.events).await,
            state(ConnectionState::WaitingForPeer)
        );
        assert_eq!(
            next_event(&mut h.events).await,
            SessionEvent::RoomCodeAvailable(code("XYZ789"))
        );
        let snap = h.kernel.snapshot().await;
        assert_eq!(snap.role, SessionRole::Host);
        assert_eq!(snap.room_code, Some(code("XYZ789")));
        assert!(!snap.peer_connected);
    }

    #[tokio::test]
    async fn test_host_builds_channel_capture_and_offer_on_peer_joined() {
        let mut h = harness();
        let peer = connected_host(&mut h).await;

        let calls = peer.calls();
        assert_eq!(
            calls[0],
            PeerCall::CreateDataChannel("multiplay-control".to_string())
        );
        assert_eq!(calls[1], PeerCall::AttachCapture("video/VP8".to_string()));
        assert_eq!(calls[2], PeerCall::CreateOffer);
        assert!(calls.contains(&PeerCall::SetRemoteDescription(SdpType::Answer)));
        assert_eq!(h.capture.start_count(), 1);
        assert!(h.kernel.snapshot().await.peer_connected);
    }

    #[tokio::test]
    async fn test_capture_failure_is_a_capture_error() {
        let dialer = Arc::new(MockSignalingDialer::new());
        let connector = Arc::new(MockPeerConnector::new());
        let ports = KernelPorts {
            dialer: dialer.clone(),
            connector: connector.clone(),
            capture: Some(Arc::new(MockCaptureSurface::failing())),
        };
        let (kernel, mut events) = SessionKernel::new(SessionConfig::default(), ports);
        kernel.start_host().await.unwrap();
        dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("ABC123"),
        });
        dialer.inject(SignalingMessage::PeerJoined);

        let seen = events_until(&mut events, &state(ConnectionState::Idle)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SessionEvent::Error { code: "capture-error", .. }
        )));
        assert!(connector.last_peer().unwrap().is_closed());
    }

    #[tokio::test]
    async fn test_start_host_while_active_is_rejected() {
        let h = harness();
        h.kernel.start_host().await.unwrap();
        let err = h.kernel.start_host().await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert_eq!(h.dialer.dial_count(), 1);
        assert_eq!(
            h.kernel.connection_state().await,
            ConnectionState::SignalingConnected
        );
    }

    #[tokio::test]
    async fn test_signaling_connect_failure_surfaces_error_then_idle() {
        let mut h = harness_with(MockSignalingDialer::failing(), MockPeerConnector::new());
        let err = h.kernel.start_host().await.unwrap_err();
        assert_eq!(err.code(), "signaling-error");

        match next_event(&mut h.events).await {
            SessionEvent::Error { code, .. } => assert_eq!(code, "signaling-error"),
            other => panic!("expected error event, got {other:?}"),
        }
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Error));
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Idle));
        assert_eq!(h.kernel.snapshot().await, SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_signaling_connect_timeout_is_a_signaling_error() {
        let config = SessionConfig {
            connect_timeout_ms: 50,
            ..SessionConfig::default()
        };
        let mut h = harness_config(
            config,
            MockSignalingDialer::with_dial_delay(Duration::from_millis(500)),
            MockPeerConnector::new(),
        );
        let err = h.kernel.start_host().await.unwrap_err();
        assert!(matches!(err, SessionError::SignalingConnect(_)));

        let seen = events_until(&mut h.events, &state(ConnectionState::Idle)).await;
        assert!(matches!(
            seen[0],
            SessionEvent::Error { code: "signaling-error", .. }
        ));
        assert_eq!(seen[1], state(ConnectionState::Error));
        assert_eq!(h.dialer.dial_count(), 0);
        assert_eq!(h.kernel.snapshot().await, SessionSnapshot::default());
    }

    /// Creates a room and announces a joiner; returns once the peer exists
    /// or construction has been attempted.
    async fn host_with_joiner(h: &mut Harness) {
        h.kernel.start_host().await.unwrap();
        h.dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("ABC123"),
        });
        events_until(&mut h.events, &SessionEvent::RoomCodeAvailable(code("ABC123"))).await;
        h.dialer.inject(SignalingMessage::PeerJoined);
    }

    #[tokio::test]
    async fn test_peer_construction_failure_is_a_webrtc_error() {
        let mut h = harness_with(MockSignalingDialer::new(), MockPeerConnector::failing());
        host_with_joiner(&mut h).await;

        let seen = events_until(&mut h.events, &state(ConnectionState::Idle)).await;
        assert!(seen.contains(&state(ConnectionState::PeerConnected)));
        assert!(seen.iter().any(|e| matches!(
            e,
            SessionEvent::Error { code: "webrtc-error", .. }
        )));
        assert_eq!(h.connector.connect_count(), 0);
        assert_eq!(h.dialer.close_count(), 1);
        assert!(sent_signals(&h.dialer).is_empty());
    }

    #[tokio::test]
    async fn test_offer_failure_is_a_webrtc_error_and_releases_everything() {
        let mut h = harness_with(MockSignalingDialer::new(), MockPeerConnector::failing_offer());
        host_with_joiner(&mut h).await;

        let seen = events_until(&mut h.events, &state(ConnectionState::Idle)).await;
        let error_at = seen
            .iter()
            .position(|e| matches!(e, SessionEvent::Error { code: "webrtc-error", .. }))
            .expect("no webrtc-error event");
        assert_eq!(seen[error_at + 1], state(ConnectionState::Error));
        assert_eq!(seen[error_at + 2], state(ConnectionState::Idle));

        assert!(sent_signals(&h.dialer).is_empty());
        assert!(h.connector.last_peer().unwrap().is_closed());
        assert!(h.capture.all_stopped());
        assert_eq!(h.kernel.snapshot().await, SessionSnapshot::default());
    }

    #[tokio::test]
    async fn test_host_queues_candidates_until_answer_applied() {
        let mut h = harness();
        host_with_joiner(&mut h).await;
        let dialer = h.dialer.clone();
        assert!(
            wait_until(
                || sent_signals(&dialer)
                    .iter()
                    .any(|p| matches!(p, SignalPayload::Offer { .. })),
                WAIT
            )
            .await
        );
        events_until(&mut h.events, &state(ConnectionState::PeerConnected)).await;

        let first = IceCandidate::new("candidate:first");
        let second = IceCandidate::new("candidate:second");
        for candidate in [&first, &second] {
            h.dialer.inject(SignalingMessage::Signal(SignalPayload::Candidate {
                candidate: candidate.clone(),
                room_code: code("ABC123"),
            }));
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
        let peer = h.connector.last_peer().unwrap();
        assert!(peer.applied_candidates().is_empty());

        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Answer {
            sdp: "answer".into(),
            sdp_type: SdpType::Answer,
            room_code: code("ABC123"),
        }));
        let probe = peer.clone();
        assert!(wait_until(|| probe.applied_candidates().len() == 2, WAIT).await);

        assert_eq!(peer.applied_candidates(), vec![first.clone(), second]);
        assert_eq!(peer.rejected_candidates(), 0);
        let calls = peer.calls();
        let answer_at = calls
            .iter()
            .position(|c| *c == PeerCall::SetRemoteDescription(SdpType::Answer))
            .unwrap();
        let first_at = calls
            .iter()
            .position(|c| *c == PeerCall::AddIceCandidate(first.clone()))
            .unwrap();
        assert!(answer_at < first_at);
    }

    // ── Joiner flow ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_join_normalises_code_and_enters_joining() {
        let mut h = harness();
        h.kernel.join_room(" abc123 ").await.unwrap();

        assert_eq!(
            next_event(&mut h.events).await,
            state(ConnectionState::SignalingConnected)
        );
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Joining));
        assert_eq!(
            h.dialer.sent_messages(),
            vec![SignalingMessage::Join {
                room_code: code("ABC123")
            }]
        );
        assert_eq!(h.kernel.snapshot().await.role, SessionRole::Joiner);
    }

    #[tokio::test]
    async fn test_invalid_room_code_never_dials() {
        let mut h = harness();
        let err = h.kernel.join_room("AB").await.unwrap_err();
        assert_eq!(err.code(), "invalid-room-code");
        assert_eq!(h.dialer.dial_count(), 0);
        assert!(matches!(
            next_event(&mut h.events).await,
            SessionEvent::Error { code: "invalid-room-code", .. }
        ));
    }

    #[tokio::test]
    async fn test_invalid_room_code_during_active_session_is_invalid_state() {
        let mut h = harness();
        h.kernel.start_host().await.unwrap();
        events_until(&mut h.events, &state(ConnectionState::SignalingConnected)).await;

        let err = h.kernel.join_room("AB").await.unwrap_err();
        assert!(matches!(err, SessionError::InvalidState(_)));
        assert!(h.events.try_recv().is_err());
        assert_eq!(
            h.kernel.connection_state().await,
            ConnectionState::SignalingConnected
        );
    }

    #[tokio::test]
    async fn test_join_failed_ends_session_with_error() {
        let mut h = harness();
        h.kernel.join_room("ABC123").await.unwrap();
        h.dialer.inject(SignalingMessage::JoinFailed);

        let seen = events_until(&mut h.events, &state(ConnectionState::Idle)).await;
        assert!(seen.iter().any(|e| matches!(
            e,
            SessionEvent::Error { code: "join-failed", .. }
        )));
        assert_eq!(h.dialer.close_count(), 1);
    }

    #[tokio::test]
    async fn test_joiner_queues_candidates_until_offer_applied() {
        let mut h = harness();
        h.kernel.join_room("ABC123").await.unwrap();
        events_until(&mut h.events, &state(ConnectionState::Joining)).await;

        let early = IceCandidate::new("candidate:early");
        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Candidate {
            candidate: early.clone(),
            room_code: code("ABC123"),
        }));
        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Offer {
            sdp: "offer".into(),
            sdp_type: SdpType::Offer,
            room_code: code("ABC123"),
        }));
        let late = IceCandidate::new("candidate:late");
        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Candidate {
            candidate: late.clone(),
            room_code: code("ABC123"),
        }));

        let connector = h.connector.clone();
        assert!(
            wait_until(
                || connector
                    .last_peer()
                    .is_some_and(|p| p.applied_candidates().len() == 2),
                WAIT
            )
            .await
        );
        let peer = h.connector.last_peer().unwrap();
        assert_eq!(peer.applied_candidates(), vec![early, late]);
        assert_eq!(peer.rejected_candidates(), 0);

        let dialer = h.dialer.clone();
        assert!(
            wait_until(
                || sent_signals(&dialer)
                    .iter()
                    .any(|p| matches!(p, SignalPayload::Answer { .. })),
                WAIT
            )
            .await
        );
    }

    #[tokio::test]
    async fn test_signal_for_other_room_is_dropped() {
        let mut h = harness();
        h.kernel.join_room("ABC123").await.unwrap();
        events_until(&mut h.events, &state(ConnectionState::Joining)).await;

        h.dialer.inject(SignalingMessage::Signal(SignalPayload::Offer {
            sdp: "offer".into(),
            sdp_type: SdpType::Offer,
            room_code: code("ZZZ999"),
        }));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(h.connector.connect_count(), 0);
        assert_eq!(h.kernel.connection_state().await, ConnectionState::Joining);
    }

    #[tokio::test]
    async fn test_unrecognized_frame_is_dropped() {
        let mut h = harness();
        h.kernel.start_host().await.unwrap();
        h.dialer.inject(SignalingMessage::Unrecognized {
            raw: "{\"type\":\"sending-offer\"}".into(),
            reason: "unknown message type".into(),
        });
        h.dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("ABC123"),
        });
        events_until(&mut h.events, &SessionEvent::RoomCodeAvailable(code("ABC123"))).await;
        assert_eq!(
            h.kernel.connection_state().await,
            ConnectionState::WaitingForPeer
        );
    }

    // ── Control channel ───────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_control_send_requires_open_channel() {
        let h = harness();
        assert!(!h.kernel.send_control_event(ControlEvent::keydown("w")).await);
        h.kernel.start_host().await.unwrap();
        assert!(!h.kernel.send_control_event(ControlEvent::keydown("w")).await);
    }

    #[tokio::test]
    async fn test_control_event_sent_and_received_when_connected() {
        let mut h = harness();
        let peer = connected_host(&mut h).await;

        assert!(
            h.kernel
                .send_control(
                    "down",
                    ControlEventType::Mouse,
                    Some(Coords { x: 1.0, y: 2.0 })
                )
                .await
        );
        let sent = peer.sent_texts();
        assert_eq!(
            decode_control(sent.last().unwrap()),
            ControlMessage::Input(ControlEvent::mouse(
                MouseAction::Down,
                Some(Coords { x: 1.0, y: 2.0 })
            ))
        );

        peer.emit(PeerEvent::ChannelMessage(
            r#"{"key":"W","type":"keydown"}"#.to_string(),
        ));
        peer.emit(PeerEvent::ChannelMessage("not json".to_string()));
        assert_eq!(
            next_event(&mut h.events).await,
            SessionEvent::ControlReceived(ControlEvent::keydown("W"))
        );
    }

    #[tokio::test]
    async fn test_host_pushes_metadata_when_ready_and_on_request() {
        let mut h = harness();
        h.kernel.set_project_metadata(json!({"title": "Maze"})).await;
        let peer = connected_host(&mut h).await;

        let peer_probe = peer.clone();
        assert!(wait_until(|| peer_probe.sent_texts().len() == 1, WAIT).await);
        assert_eq!(
            decode_control(&peer.sent_texts()[0]),
            ControlMessage::ProjectMetadata(json!({"title": "Maze"}))
        );

        peer.emit(PeerEvent::ChannelMessage(
            r#"{"type":"request-metadata"}"#.to_string(),
        ));
        let peer_probe = peer.clone();
        assert!(wait_until(|| peer_probe.sent_texts().len() == 2, WAIT).await);
    }

    // ── Teardown ──────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn test_disconnect_releases_everything_and_allows_restart() {
        let mut h = harness();
        let first = connected_host(&mut h).await;

        h.kernel.disconnect().await;
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Idle));
        assert!(first.is_closed());
        assert!(h.capture.all_stopped());
        assert_eq!(h.dialer.close_count(), 1);
        assert_eq!(h.kernel.snapshot().await, SessionSnapshot::default());
        assert!(h.kernel.peer_id().await.is_none());

        let second = connected_host(&mut h).await;
        assert_ne!(first.id(), second.id());
        assert_eq!(h.dialer.dial_count(), 2);
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_a_no_op() {
        let mut h = harness();
        h.kernel.disconnect().await;
        h.kernel.disconnect().await;
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_disconnect_mid_negotiation_discards_late_offer() {
        let mut h = harness_with(
            MockSignalingDialer::new(),
            MockPeerConnector::with_offer_delay(Duration::from_millis(100)),
        );
        h.kernel.start_host().await.unwrap();
        h.dialer.inject(SignalingMessage::RoomCreated {
            room_code: code("ABC123"),
        });
        h.dialer.inject(SignalingMessage::PeerJoined);
        events_until(&mut h.events, &state(ConnectionState::PeerConnected)).await;
        let connector = h.connector.clone();
        assert!(wait_until(|| connector.connect_count() == 1, WAIT).await);

        h.kernel.disconnect().await;
        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(sent_signals(&h.dialer).is_empty());
        assert_eq!(h.kernel.snapshot().await, SessionSnapshot::default());
        assert!(h.connector.last_peer().unwrap().is_closed());
        assert!(!h
            .events
            .try_recv()
            .is_ok_and(|e| matches!(e, SessionEvent::Error { .. })));
    }

    #[tokio::test]
    async fn test_events_from_previous_session_are_ignored() {
        let mut h = harness();
        let old = connected_host(&mut h).await;
        h.kernel.disconnect().await;
        events_until(&mut h.events, &state(ConnectionState::Idle)).await;

        h.kernel.start_host().await.unwrap();
        events_until(&mut h.events, &state(ConnectionState::SignalingConnected)).await;
        old.emit(PeerEvent::StateChanged(PeerState::Failed));
        old.emit(PeerEvent::ChannelMessage(
            r#"{"key":"W","type":"keydown"}"#.to_string(),
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(h.events.try_recv().is_err());
        assert_eq!(
            h.kernel.connection_state().await,
            ConnectionState::SignalingConnected
        );
    }

    #[tokio::test]
    async fn test_peer_failure_emits_failed_then_idle() {
        let mut h = harness();
        let peer = connected_host(&mut h).await;
        peer.emit(PeerEvent::StateChanged(PeerState::Failed));
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Failed));
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Idle));
    }

    #[tokio::test]
    async fn test_remote_leaving_is_a_disconnect_not_an_error() {
        let mut h = harness();
        connected_host(&mut h).await;
        h.dialer.inject(SignalingMessage::PeerDisconnected);
        assert_eq!(
            next_event(&mut h.events).await,
            state(ConnectionState::Disconnected)
        );
        assert_eq!(next_event(&mut h.events).await, state(ConnectionState::Idle));
    }

    #[tokio::test]
    async fn test_signaling_loss_is_an_error() {
        let mut h = harness();
        h.kernel.start_host().await.unwrap();
        h.dialer.inject_event(TransportEvent::Closed);
        let seen = events_until(&mut h.events, &state(ConnectionState::Idle)).await;
        assert!(seen.contains(&state(ConnectionState::Error)));
    }
}
