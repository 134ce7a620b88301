//! Peer connections on webrtc-rs.
//!
//! [`RtcPeerConnector`] builds one `RTCPeerConnection` per session with the
//! default codecs and interceptors, the configured STUN and TURN servers,
//! and handlers that translate every callback into a [`PeerEvent`]. The
//! control channel is unordered with zero retransmits: a late key event is
//! worth less than the next one.

use std::sync::Arc;
use std::sync::Mutex as StdMutex;

use async_trait::async_trait;
use multiplay_core::{IceCandidate, SdpType, SessionDescription};
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_init::RTCDataChannelInit;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::media::Sample;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;

use crate::application::ports::{EncodedFrame, PeerConnector, PeerLink};
use crate::domain::config::SessionConfig;
use crate::domain::error::SessionError;
use crate::domain::events::{PeerEvent, PeerState};

fn rtc_error(context: &'static str) -> impl FnOnce(webrtc::Error) -> SessionError {
    move |e| SessionError::PeerConnection(format!("{context}: {e}"))
}

/// STUN entries first, then TURN entries with their credentials.
fn ice_servers(config: &SessionConfig) -> Vec<RTCIceServer> {
    let stun = config.stun_servers.iter().map(|url| RTCIceServer {
        urls: vec![url.clone()],
        ..Default::default()
    });
    let turn = config.turn_servers.iter().map(|turn| RTCIceServer {
        urls: turn.urls.clone(),
        username: turn.username.clone(),
        credential: turn.credential.clone(),
        ..Default::default()
    });
    stun.chain(turn).collect()
}

fn peer_state(state: RTCPeerConnectionState) -> Option<PeerState> {
    match state {
        RTCPeerConnectionState::New => Some(PeerState::New),
        RTCPeerConnectionState::Connecting => Some(PeerState::Connecting),
        RTCPeerConnectionState::Connected => Some(PeerState::Connected),
        RTCPeerConnectionState::Disconnected => Some(PeerState::Disconnected),
        RTCPeerConnectionState::Failed => Some(PeerState::Failed),
        RTCPeerConnectionState::Closed => Some(PeerState::Closed),
        _ => None,
    }
}

/// Builds webrtc-rs peer connections.
#[derive(Debug, Default, Clone, Copy)]
pub struct RtcPeerConnector;

impl RtcPeerConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PeerConnector for RtcPeerConnector {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: mpsc::UnboundedSender<PeerEvent>,
    ) -> Result<Arc<dyn PeerLink>, SessionError> {
        let mut media_engine = MediaEngine::default();
        media_engine
            .register_default_codecs()
            .map_err(rtc_error("register codecs"))?;
        let registry = register_default_interceptors(Registry::new(), &mut media_engine)
            .map_err(rtc_error("register interceptors"))?;
        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers: ice_servers(config),
                ..Default::default()
            })
            .await
            .map_err(rtc_error("create peer connection"))?;

        let link = RtcPeerLink {
            id: Uuid::new_v4(),
            pc: Arc::new(pc),
            channel: Arc::new(RwLock::new(None)),
            events,
            capture_task: StdMutex::new(None),
        };
        link.install_handlers();
        info!(peer = %link.id, "webrtc peer connection built");
        Ok(Arc::new(link))
    }
}

pub struct RtcPeerLink {
    id: Uuid,
    pc: Arc<RTCPeerConnection>,
    channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    events: mpsc::UnboundedSender<PeerEvent>,
    capture_task: StdMutex<Option<JoinHandle<()>>>,
}

impl RtcPeerLink {
    fn install_handlers(&self) {
        let events = self.events.clone();
        let id = self.id;
        self.pc
            .on_peer_connection_state_change(Box::new(move |s: RTCPeerConnectionState| {
                if let Some(state) = peer_state(s) {
                    info!(peer = %id, %state, "peer connection state");
                    let _ = events.send(PeerEvent::StateChanged(state));
                }
                Box::pin(async {})
            }));

        let events = self.events.clone();
        self.pc
            .on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
                // `None` marks the end of gathering.
                if let Some(candidate) = candidate {
                    match candidate.to_json() {
                        Ok(init) => {
                            let _ = events.send(PeerEvent::LocalCandidate(IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                                username_fragment: init.username_fragment,
                            }));
                        }
                        Err(e) => warn!("could not serialize local candidate: {e}"),
                    }
                }
                Box::pin(async {})
            }));

        // Joiner side: the host opens the channel.
        let events = self.events.clone();
        let slot = Arc::clone(&self.channel);
        self.pc
            .on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let events = events.clone();
                let slot = Arc::clone(&slot);
                Box::pin(async move {
                    info!(label = dc.label(), "remote data channel announced");
                    wire_channel(&dc, &events);
                    *slot.write().await = Some(dc);
                })
            }));
    }
}

/// Forwards a channel's lifecycle and text messages as peer events.
fn wire_channel(dc: &Arc<RTCDataChannel>, events: &mpsc::UnboundedSender<PeerEvent>) {
    let tx = events.clone();
    dc.on_open(Box::new(move || {
        let _ = tx.send(PeerEvent::ChannelOpen);
        Box::pin(async {})
    }));

    let tx = events.clone();
    dc.on_close(Box::new(move || {
        let _ = tx.send(PeerEvent::ChannelClosed);
        Box::pin(async {})
    }));

    let tx = events.clone();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        if msg.is_string {
            match String::from_utf8(msg.data.to_vec()) {
                Ok(text) => {
                    let _ = tx.send(PeerEvent::ChannelMessage(text));
                }
                Err(e) => warn!("dropping non-utf8 control message: {e}"),
            }
        } else {
            debug!(len = msg.data.len(), "ignoring binary control message");
        }
        Box::pin(async {})
    }));

    let tx = events.clone();
    dc.on_error(Box::new(move |e: webrtc::Error| {
        let _ = tx.send(PeerEvent::ChannelError(e.to_string()));
        Box::pin(async {})
    }));

    if dc.ready_state() == RTCDataChannelState::Open {
        let _ = events.send(PeerEvent::ChannelOpen);
    }
}

fn to_rtc(description: SessionDescription) -> Result<RTCSessionDescription, SessionError> {
    match description.sdp_type {
        SdpType::Offer => RTCSessionDescription::offer(description.sdp),
        SdpType::Answer => RTCSessionDescription::answer(description.sdp),
    }
    .map_err(rtc_error("invalid session description"))
}

#[async_trait]
impl PeerLink for RtcPeerLink {
    fn id(&self) -> Uuid {
        self.id
    }

    async fn create_data_channel(&self, label: &str) -> Result<(), SessionError> {
        let init = RTCDataChannelInit {
            ordered: Some(false),
            max_retransmits: Some(0),
            ..Default::default()
        };
        let dc = self
            .pc
            .create_data_channel(label, Some(init))
            .await
            .map_err(rtc_error("create data channel"))?;
        wire_channel(&dc, &self.events);
        *self.channel.write().await = Some(dc);
        info!(peer = %self.id, label, "control channel created");
        Ok(())
    }

    async fn attach_capture(
        &self,
        mime_type: &str,
        mut frames: mpsc::Receiver<EncodedFrame>,
    ) -> Result<(), SessionError> {
        let track = Arc::new(TrackLocalStaticSample::new(
            RTCRtpCodecCapability {
                mime_type: mime_type.to_string(),
                ..Default::default()
            },
            "multiplay-video".to_string(),
            "multiplay-stage".to_string(),
        ));
        let sender = self
            .pc
            .add_track(Arc::clone(&track) as Arc<dyn TrackLocal + Send + Sync>)
            .await
            .map_err(rtc_error("add video track"))?;

        let id = self.id;
        let task = tokio::spawn(async move {
            let rtcp = tokio::spawn(async move {
                let mut buf = vec![0u8; 1500];
                while sender.read(&mut buf).await.is_ok() {}
            });
            let mut written: u64 = 0;
            while let Some(frame) = frames.recv().await {
                let sample = Sample {
                    data: frame.data,
                    duration: frame.duration,
                    ..Default::default()
                };
                if let Err(e) = track.write_sample(&sample).await {
                    debug!(peer = %id, "video sample dropped: {e}");
                } else {
                    written += 1;
                }
            }
            rtcp.abort();
            debug!(peer = %id, written, "capture stream ended");
        });
        if let Some(previous) = self
            .capture_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .replace(task)
        {
            previous.abort();
        }
        Ok(())
    }

    async fn create_offer(&self) -> Result<SessionDescription, SessionError> {
        let offer = self
            .pc
            .create_offer(None)
            .await
            .map_err(rtc_error("create offer"))?;
        self.pc
            .set_local_description(offer.clone())
            .await
            .map_err(rtc_error("set local offer"))?;
        Ok(SessionDescription::offer(offer.sdp))
    }

    async fn create_answer(&self) -> Result<SessionDescription, SessionError> {
        let answer = self
            .pc
            .create_answer(None)
            .await
            .map_err(rtc_error("create answer"))?;
        self.pc
            .set_local_description(answer.clone())
            .await
            .map_err(rtc_error("set local answer"))?;
        Ok(SessionDescription::answer(answer.sdp))
    }

    async fn set_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), SessionError> {
        self.pc
            .set_remote_description(to_rtc(description)?)
            .await
            .map_err(rtc_error("set remote description"))
    }

    async fn add_ice_candidate(&self, candidate: IceCandidate) -> Result<(), SessionError> {
        let init = RTCIceCandidateInit {
            candidate: candidate.candidate,
            sdp_mid: candidate.sdp_mid,
            sdp_mline_index: candidate.sdp_mline_index,
            username_fragment: candidate.username_fragment,
        };
        self.pc
            .add_ice_candidate(init)
            .await
            .map_err(rtc_error("add ice candidate"))
    }

    async fn send_text(&self, text: String) -> Result<(), SessionError> {
        let channel = self.channel.read().await.clone();
        match channel {
            Some(dc) if dc.ready_state() == RTCDataChannelState::Open => dc
                .send_text(text)
                .await
                .map(|_| ())
                .map_err(rtc_error("send on control channel")),
            _ => Err(SessionError::PeerConnection(
                "control channel is not open".to_string(),
            )),
        }
    }

    async fn close(&self) {
        if let Some(task) = self
            .capture_task
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take()
        {
            task.abort();
        }
        if let Err(e) = self.pc.close().await {
            warn!(peer = %self.id, "peer connection close failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::TurnServer;

    #[test]
    fn test_ice_servers_lists_stun_then_turn() {
        let mut config = SessionConfig::default();
        config.turn_servers.push(TurnServer {
            urls: vec!["turn:relay.example.org:3478".to_string()],
            username: "player".to_string(),
            credential: "secret".to_string(),
        });

        let servers = ice_servers(&config);

        assert_eq!(servers.len(), 2);
        assert_eq!(servers[0].urls, vec!["stun:stun.l.google.com:19302".to_string()]);
        assert!(servers[0].username.is_empty());
        assert_eq!(servers[1].username, "player");
        assert_eq!(servers[1].credential, "secret");
    }

    #[test]
    fn test_peer_state_maps_every_known_state() {
        assert_eq!(
            peer_state(RTCPeerConnectionState::Connected),
            Some(PeerState::Connected)
        );
        assert_eq!(
            peer_state(RTCPeerConnectionState::Failed),
            Some(PeerState::Failed)
        );
        assert_eq!(peer_state(RTCPeerConnectionState::Unspecified), None);
    }

    #[tokio::test]
    async fn test_send_before_channel_exists_is_an_error() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let link = RtcPeerConnector::new()
            .connect(&SessionConfig::default(), tx)
            .await
            .unwrap();
        let err = link.send_text("hello".to_string()).await.unwrap_err();
        assert_eq!(err.code(), "webrtc-error");
        link.close().await;
    }
}
