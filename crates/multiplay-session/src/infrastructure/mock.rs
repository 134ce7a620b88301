//! In-memory adapters for tests and demos.
//!
//! - [`MockSignalingDialer`] records every frame the kernel sends and lets a
//!   test push frames as if the rendezvous server had sent them.
//! - [`MockPeerConnector`] hands out [`MockPeerLink`]s that record every
//!   call and reject ICE candidates added before the remote description,
//!   like a real stack does.
//! - [`LoopbackPeerConnector`] pairs two peers in memory so two kernels can
//!   negotiate with each other and exchange data-channel messages.
//! - [`MockCaptureSurface`] produces captures whose stop signal can be
//!   inspected.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use multiplay_core::{decode_signaling, IceCandidate, SdpType, SessionDescription, SignalingMessage};
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::application::ports::{
    CaptureSurface, CaptureTracks, EncodedFrame, MediaCapture, PeerConnector, PeerLink,
    SignalingDialer, SignalingSocket,
};
use crate::domain::config::SessionConfig;
use crate::domain::error::SessionError;
use crate::domain::events::{PeerEvent, PeerState, TransportEvent};

/// Polls `condition` every few milliseconds until it holds or `limit`
/// elapses. Returns the final value of the condition.
pub async fn wait_until<F: Fn() -> bool>(condition: F, limit: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ── Signaling ─────────────────────────────────────────────────────────────────

#[derive(Default)]
struct SignalingLog {
    sent: Vec<SignalingMessage>,
    dial_count: usize,
    close_count: usize,
    inbound: Option<mpsc::UnboundedSender<TransportEvent>>,
}

/// Recording signaling dialer.
#[derive(Default)]
pub struct MockSignalingDialer {
    log: Arc<Mutex<SignalingLog>>,
    fail: bool,
    dial_delay: Duration,
}

impl MockSignalingDialer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every dial fails with a connect error.
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Every dial takes `delay` before succeeding.
    pub fn with_dial_delay(delay: Duration) -> Self {
        Self {
            dial_delay: delay,
            ..Self::default()
        }
    }

    pub fn dial_count(&self) -> usize {
        self.lock().dial_count
    }

    pub fn close_count(&self) -> usize {
        self.lock().close_count
    }

    /// Every message sent on any socket from this dialer, decoded.
    pub fn sent_messages(&self) -> Vec<SignalingMessage> {
        self.lock().sent.clone()
    }

    /// Delivers `msg` on the most recently dialled connection.
    pub fn inject(&self, msg: SignalingMessage) {
        self.inject_event(TransportEvent::Message(msg));
    }

    pub fn inject_event(&self, event: TransportEvent) {
        if let Some(inbound) = &self.lock().inbound {
            let _ = inbound.send(event);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SignalingLog> {
        self.log.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl SignalingDialer for MockSignalingDialer {
    async fn dial(
        &self,
        _url: &str,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Box<dyn SignalingSocket>, SessionError> {
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }
        if self.fail {
            return Err(SessionError::SignalingConnect("connection refused".to_string()));
        }
        let mut log = self.lock();
        log.dial_count += 1;
        log.inbound = Some(events);
        Ok(Box::new(MockSignalingSocket {
            log: Arc::clone(&self.log),
            closed: false,
        }))
    }
}

struct MockSignalingSocket {
    log: Arc<Mutex<SignalingLog>>,
    closed: bool,
}

#[async_trait]
impl SignalingSocket for MockSignalingSocket {
    async fn send_text(&mut self, text: String) -> Result<(), SessionError> {
        if self.closed {
            return Err(SessionError::Signaling("socket closed".to_string()));
        }
        let msg = decode_signaling(&text);
        self.log.lock().unwrap_or_else(|e| e.into_inner()).sent.push(msg);
        Ok(())
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.log.lock().unwrap_or_else(|e| e.into_inner()).close_count += 1;
        }
    }
}

// ── Recording peers ───────────────────────────────────────────────────────────

/// One call made on a [`MockPeerLink`].
#[derive(Debug, Clone, PartialEq)]
pub enum PeerCall {
    CreateDataChannel(String),
    AttachCapture(String),
    CreateOffer,
    CreateAnswer,
    SetRemoteDescription(SdpType),
    AddIceCandidate(IceCandidate),
    SendText(String),
    Close,
}

/// Recording peer connection.
pub struct MockPeerLink {
    id: Uuid,
    events: mpsc::UnboundedSender<PeerEvent>,
    calls: Mutex<Vec<PeerCall>>,
    remote_set: AtomicBool,
    closed: AtomicBool,
    rejected_candidates: AtomicUsize,
    offer_delay: Duration,
    fail_offer: bool,
}

impl MockPeerLink {
    pub fn calls(&self) -> Vec<PeerCall> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Candidates accepted by `add_ice_candidate`, in order.
    pub fn applied_candidates(&self) -> Vec<IceCandidate> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PeerCall::AddIceCandidate(c) => Some(c),
                _ => None,
            })
            .collect()
    }

    /// Candidates refused because no remote description was set yet.
    pub fn rejected_candidates(&self) -> usize {
        self.rejected_candidates.load(Ordering::SeqCst)
    }

    pub fn sent_texts(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                PeerCall::SendText(text) => Some(text),
                _ => None,
            })
            .collect()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Reports `event` to the kernel as if the underlying stack raised it.
    pub fn emit(&self, event: PeerEvent) {
        let _ = self.events.send(event);
    }

    /// Shorthand for a connected peer with an open channel.
    pub fn emit_connected(&self) {
        self.emit(PeerEvent::StateChanged(PeerState::Connected));
        self.emit(PeerEvent::ChannelOpen);
    }

    fn record(&self, call: PeerCall) {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(call);
    }
}

#[async_trait]
impl PeerLink for MockPeerLink {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn create_data_channel(&self, label: &str) -> Result<(), SessionError> {
        self.record(PeerCall::CreateDataChannel(label.to_string()));
        Ok(())
    }

    async fn attach_capture(
        &self,
        mime_type: &str,
        _frames: mpsc::Receiver<EncodedFrame>,
    ) -> Result<(), SessionError> {
        self.record(PeerCall::AttachCapture(mime_type.to_string()));
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        if !self.offer_delay.is_zero() {
            tokio::time::sleep(self.offer_delay).await;
        }
        if self.fail_offer {
            return Err(SessionError::PeerConnection("offer creation failed".to_string()));
        }
        self.record(PeerCall::CreateOffer);
        Ok(SessionDescription::offer(format!("mock-offer-{}", self.id)))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        self.record(PeerCall::CreateAnswer);
        Ok(SessionDescription::answer(format!("mock-answer-{}", self.id)))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.record(PeerCall::SetRemoteDescription(description.sdp_type));
        self.remote_set.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        if !self.remote_set.load(Ordering::SeqCst) {
            self.rejected_candidates.fetch_add(1, Ordering::SeqCst);
            return Err(SessionError::PeerConnection(
                "remote description not set".to_string(),
            ));
        }
        self.record(PeerCall::AddIceCandidate(candidate));
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), SessionError> {
        if self.is_closed() {
            return Err(SessionError::PeerConnection("peer closed".to_string()));
        }
        self.record(PeerCall::SendText(text));
        Ok(())
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.record(PeerCall::Close);
        }
    }
}

/// Hands out [`MockPeerLink`]s and remembers each one.
#[derive(Default)]
pub struct MockPeerConnector {
    peers: Mutex<Vec<Arc<MockPeerLink>>>,
    fail_connect: bool,
    fail_offer: bool,
    offer_delay: Duration,
}

impl MockPeerConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Peer construction itself fails.
    pub fn failing() -> Self {
        Self {
            fail_connect: true,
            ..Self::default()
        }
    }

    /// Peers fail to create an offer.
    pub fn failing_offer() -> Self {
        Self {
            fail_offer: true,
            ..Self::default()
        }
    }

    /// Peers take `delay` to create an offer.
    pub fn with_offer_delay(delay: Duration) -> Self {
        Self {
            offer_delay: delay,
            ..Self::default()
        }
    }

    pub fn peers(&self) -> Vec<Arc<MockPeerLink>> {
        self.peers.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_peer(&self) -> Option<Arc<MockPeerLink>> {
        self.peers().last().cloned()
    }

    pub fn connect_count(&self) -> usize {
        self.peers().len()
    }
}

#[async_trait]
impl PeerConnector for MockPeerConnector {
    async fn connect(
        &self,
        _config: &SessionConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, SessionError> {
        if self.fail_connect {
            return Err(SessionError::PeerConnection(
                "could not allocate peer connection".to_string(),
            ));
        }
        let peer = Arc::new(MockPeerLink {
            id: Uuid::new_v4(),
            events,
            calls: Mutex::new(Vec::new()),
            remote_set: AtomicBool::new(false),
            closed: AtomicBool::new(false),
            rejected_candidates: AtomicUsize::new(0),
            offer_delay: self.offer_delay,
            fail_offer: self.fail_offer,
        });
        self.peers
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::clone(&peer));
        Ok(peer)
    }
}

// ── Loopback peers ────────────────────────────────────────────────────────────

struct LoopbackSlot {
    id: Uuid,
    events: mpsc::UnboundedSender<PeerEvent>,
    local_set: bool,
    remote_set: bool,
    connected: bool,
    closed: bool,
}

#[derive(Default)]
struct LoopbackHub {
    slots: Vec<LoopbackSlot>,
}

impl LoopbackHub {
    fn index_of(&self, id: Uuid) -> Option<usize> {
        self.slots.iter().position(|s| s.id == id)
    }

    /// The most recently created open peer other than `id`.
    fn partner_of(&self, id: Uuid) -> Option<usize> {
        self.slots.iter().rposition(|s| s.id != id && !s.closed)
    }

    /// Connects `id` and its partner once both have both descriptions.
    fn try_connect(&mut self, id: Uuid) {
        let (Some(me), Some(other)) = (self.index_of(id), self.partner_of(id)) else {
            return;
        };
        let ready = |s: &LoopbackSlot| s.local_set && s.remote_set && !s.connected && !s.closed;
        if !(ready(&self.slots[me]) && ready(&self.slots[other])) {
            return;
        }
        for idx in [me, other] {
            let slot = &mut self.slots[idx];
            slot.connected = true;
            let _ = slot.events.send(PeerEvent::StateChanged(PeerState::Connected));
            let _ = slot.events.send(PeerEvent::ChannelOpen);
        }
    }
}

/// Pairs peers created through clones of the same connector.
#[derive(Clone, Default)]
pub struct LoopbackPeerConnector {
    hub: Arc<Mutex<LoopbackHub>>,
}

impl LoopbackPeerConnector {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PeerConnector for LoopbackPeerConnector {
    async fn connect(
        &self,
        _config: &SessionConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, SessionError> {
        let id = Uuid::new_v4();
        self.hub
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .slots
            .push(LoopbackSlot {
                id,
                events,
                local_set: false,
                remote_set: false,
                connected: false,
                closed: false,
            });
        Ok(Arc::new(LoopbackPeer {
            id,
            hub: Arc::clone(&self.hub),
        }))
    }
}

struct LoopbackPeer {
    id: Uuid,
    hub: Arc<Mutex<LoopbackHub>>,
}

impl LoopbackPeer {
    fn with_hub<T>(&self, f: impl FnOnce(&mut LoopbackHub, usize) -> T) -> Result<T, SessionError> {
        let mut hub = self.hub.lock().unwrap_or_else(|e| e.into_inner());
        let me = hub
            .index_of(self.id)
            .ok_or_else(|| SessionError::PeerConnection("unknown loopback peer".to_string()))?;
        Ok(f(&mut hub, me))
    }

    fn set_local(&self, sdp_type: SdpType) -> Result<SessionDescription, SessionError> {
        let id = self.id;
        self.with_hub(|hub, me| {
            let slot = &mut hub.slots[me];
            slot.local_set = true;
            let _ = slot.events.send(PeerEvent::LocalCandidate(IceCandidate {
                candidate: format!("candidate:loopback 1 udp 1 127.0.0.1 9 typ host {id}"),
                sdp_mid: Some("0".to_string()),
                sdp_mline_index: Some(0),
                username_fragment: None,
            }));
            hub.try_connect(id);
        })?;
        Ok(SessionDescription {
            sdp_type,
            sdp: format!("loopback-{}-{id}", sdp_type.as_str()),
        })
    }
}

#[async_trait]
impl PeerLink for LoopbackPeer {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn create_data_channel(&self, _label: &str) -> Result<(), SessionError> {
        Ok(())
    }

    async fn attach_capture(
        &self,
        _mime_type: &str,
        _frames: mpsc::Receiver<EncodedFrame>,
    ) -> Result<(), SessionError> {
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        self.set_local(SdpType::Offer)
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        self.set_local(SdpType::Answer)
    }

    async fn set_remote_description(
        &self,
        _description: SessionDescription,
    ) -> Result<(), SessionError> {
        let id = self.id;
        self.with_hub(|hub, me| {
            hub.slots[me].remote_set = true;
            hub.try_connect(id);
        })
    }

    async fn add_ice_candidate(&self, _candidate: IceCandidate) -> Result<(), SessionError> {
        let remote_set = self.with_hub(|hub, me| hub.slots[me].remote_set)?;
        if remote_set {
            Ok(())
        } else {
            Err(SessionError::PeerConnection(
                "remote description not set".to_string(),
            ))
        }
    }

    async fn send_text(&self, text: String) -> Result<(), SessionError> {
        let id = self.id;
        self.with_hub(|hub, me| {
            if !hub.slots[me].connected || hub.slots[me].closed {
                return Err(SessionError::PeerConnection("channel not open".to_string()));
            }
            let other = hub
                .partner_of(id)
                .ok_or_else(|| SessionError::PeerConnection("no partner".to_string()))?;
            let _ = hub.slots[other].events.send(PeerEvent::ChannelMessage(text));
            Ok(())
        })?
    }

    async fn close(&self) {
        let id = self.id;
        let _ = self.with_hub(|hub, me| {
            if hub.slots[me].closed {
                return;
            }
            let partner = hub.partner_of(id);
            let was_connected = hub.slots[me].connected;
            hub.slots[me].closed = true;
            if let (true, Some(other)) = (was_connected, partner) {
                let _ = hub.slots[other]
                    .events
                    .send(PeerEvent::StateChanged(PeerState::Closed));
            }
        });
    }
}

// ── Capture ───────────────────────────────────────────────────────────────────

/// Capture surface whose captures produce no frames.
#[derive(Default)]
pub struct MockCaptureSurface {
    starts: AtomicUsize,
    fail: bool,
    stop_signals: Mutex<Vec<watch::Receiver<bool>>>,
}

impl MockCaptureSurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }

    /// True when every capture started so far has been told to stop.
    pub fn all_stopped(&self) -> bool {
        self.stop_signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .all(|rx| *rx.borrow())
    }
}

#[async_trait]
impl CaptureSurface for MockCaptureSurface {
    async fn start_capture(&self) -> Result<MediaCapture, SessionError> {
        if self.fail {
            return Err(SessionError::Capture("surface not available".to_string()));
        }
        self.starts.fetch_add(1, Ordering::SeqCst);
        let (tracks, stopped) = CaptureTracks::channel();
        self.stop_signals
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(stopped);
        let (_frames_tx, frames) = mpsc::channel(1);
        Ok(MediaCapture {
            mime_type: "video/VP8".to_string(),
            frames,
            tracks,
        })
    }
}
