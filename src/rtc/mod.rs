//! WebRTC transport backend
//!
//! Production [`PeerBackend`] built on the `webrtc` crate. One
//! [`WebRtcPeerBackend`] wraps one `RTCPeerConnection`; its callbacks are
//! translated into [`BackendEvent`]s for the registry. The application
//! feeds captured frames into the sample tracks exposed by
//! [`WebRtcPeerBackend::sample_track`].

use crate::config::EngineConfig;
use crate::media::{LocalTrack, TrackKind};
use crate::peer::{BackendEvent, PeerBackend, PeerBackendFactory, TransportState};
use crate::signaling::{IceCandidate, SessionDescription};
use crate::{Error, Result};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS, MIME_TYPE_VP8};
use webrtc::api::APIBuilder;
use webrtc::data_channel::data_channel_message::DataChannelMessage;
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;
use webrtc::ice_transport::ice_candidate::{RTCIceCandidate, RTCIceCandidateInit};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::{RTCRtpCodecCapability, RTPCodecType};
use webrtc::rtp_transceiver::rtp_receiver::RTCRtpReceiver;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::rtp_transceiver::RTCRtpTransceiver;
use webrtc::track::track_local::track_local_static_sample::TrackLocalStaticSample;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;
use uuid::Uuid;

fn rtc_err(e: webrtc::Error) -> Error {
    Error::WebRtcError(e.to_string())
}

fn codec_for(kind: TrackKind) -> RTCRtpCodecCapability {
    RTCRtpCodecCapability {
        mime_type: match kind {
            TrackKind::Audio => MIME_TYPE_OPUS.to_owned(),
            TrackKind::Video => MIME_TYPE_VP8.to_owned(),
        },
        ..Default::default()
    }
}

fn map_transport_state(state: RTCPeerConnectionState) -> Option<TransportState> {
    match state {
        RTCPeerConnectionState::Connecting => Some(TransportState::Connecting),
        RTCPeerConnectionState::Connected => Some(TransportState::Connected),
        RTCPeerConnectionState::Disconnected => Some(TransportState::Disconnected),
        RTCPeerConnectionState::Failed => Some(TransportState::Failed),
        RTCPeerConnectionState::Closed => Some(TransportState::Closed),
        RTCPeerConnectionState::New | RTCPeerConnectionState::Unspecified => None,
    }
}

/// One WebRTC peer connection behind the [`PeerBackend`] trait
pub struct WebRtcPeerBackend {
    user_id: String,
    stream_id: String,
    pc: Arc<RTCPeerConnection>,
    data_channel: Arc<RwLock<Option<Arc<RTCDataChannel>>>>,
    senders: RwLock<HashMap<TrackKind, Arc<RTCRtpSender>>>,
    sample_tracks: RwLock<HashMap<TrackKind, Arc<TrackLocalStaticSample>>>,
}

impl WebRtcPeerBackend {
    /// Sample track the application writes captured frames into
    pub async fn sample_track(&self, kind: TrackKind) -> Option<Arc<TrackLocalStaticSample>> {
        self.sample_tracks.read().await.get(&kind).map(Arc::clone)
    }

    async fn make_sample_track(&self, source: &LocalTrack) -> Arc<dyn TrackLocal + Send + Sync> {
        let track = Arc::new(TrackLocalStaticSample::new(
            codec_for(source.kind()),
            source.id().to_string(),
            self.stream_id.clone(),
        ));
        self.sample_tracks
            .write()
            .await
            .insert(source.kind(), Arc::clone(&track));
        track
    }

}

fn register_channel(
    user_id: &str,
    dc: &Arc<RTCDataChannel>,
    events: &mpsc::UnboundedSender<BackendEvent>,
) {
    let open_events = events.clone();
    let open_user = user_id.to_string();
    dc.on_open(Box::new(move || {
        let _ = open_events.send(BackendEvent::ChannelOpen {
            user_id: open_user.clone(),
        });
        Box::pin(async {})
    }));

    let message_events = events.clone();
    let message_user = user_id.to_string();
    dc.on_message(Box::new(move |msg: DataChannelMessage| {
        let _ = message_events.send(BackendEvent::ChannelMessage {
            user_id: message_user.clone(),
            payload: msg.data,
        });
        Box::pin(async {})
    }));
}

#[async_trait]
impl PeerBackend for WebRtcPeerBackend {
    async fn create_offer(&self) -> Result<SessionDescription> {
        let offer = self.pc.create_offer(None).await.map_err(rtc_err)?;
        let sdp = offer.sdp.clone();
        self.pc
            .set_local_description(offer)
            .await
            .map_err(rtc_err)?;
        Ok(SessionDescription::offer(sdp))
    }

    async fn create_answer(&self, offer: SessionDescription) -> Result<SessionDescription> {
        let remote = RTCSessionDescription::offer(offer.sdp).map_err(rtc_err)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(rtc_err)?;

        let answer = self.pc.create_answer(None).await.map_err(rtc_err)?;
        let sdp = answer.sdp.clone();
        self.pc
            .set_local_description(answer)
            .await
            .map_err(rtc_err)?;
        Ok(SessionDescription::answer(sdp))
    }

    async fn apply_answer(&self, answer: SessionDescription) -> Result<()> {
        let remote = RTCSessionDescription::answer(answer.sdp).map_err(rtc_err)?;
        self.pc
            .set_remote_description(remote)
            .await
            .map_err(rtc_err)
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.pc
            .add_ice_candidate(RTCIceCandidateInit {
                candidate: candidate.candidate,
                sdp_mid: candidate.sdp_mid,
                sdp_mline_index: candidate.sdp_mline_index,
                username_fragment: None,
            })
            .await
            .map_err(rtc_err)
    }

    async fn attach_tracks(&self, audio: Arc<LocalTrack>, video: Arc<LocalTrack>) -> Result<()> {
        for source in [audio, video] {
            let local = self.make_sample_track(&source).await;
            let sender = self.pc.add_track(local).await.map_err(rtc_err)?;
            self.senders.write().await.insert(source.kind(), sender);
        }
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        let sender = self
            .senders
            .read()
            .await
            .get(&TrackKind::Video)
            .map(Arc::clone)
            .ok_or_else(|| Error::WebRtcError("no video sender to replace".to_string()))?;

        let local = self.make_sample_track(&track).await;
        sender.replace_track(Some(local)).await.map_err(rtc_err)?;
        debug!(
            "Replaced outgoing video track for peer {} with {}",
            self.user_id,
            track.id()
        );
        Ok(())
    }

    async fn channel_open(&self) -> bool {
        match self.data_channel.read().await.as_ref() {
            Some(dc) => dc.ready_state() == RTCDataChannelState::Open,
            None => false,
        }
    }

    async fn send_channel(&self, payload: Bytes) -> Result<()> {
        let dc = self
            .data_channel
            .read()
            .await
            .as_ref()
            .map(Arc::clone)
            .ok_or_else(|| Error::DataChannelError("control channel not open".to_string()))?;
        dc.send(&payload)
            .await
            .map(|_| ())
            .map_err(|e| Error::DataChannelError(e.to_string()))
    }

    async fn close(&self) -> Result<()> {
        self.pc.close().await.map_err(rtc_err)
    }
}

/// Factory producing [`WebRtcPeerBackend`]s from one engine configuration
pub struct WebRtcFactory {
    config: EngineConfig,
}

impl WebRtcFactory {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    fn rtc_configuration(&self) -> RTCConfiguration {
        RTCConfiguration {
            ice_servers: self
                .config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl PeerBackendFactory for WebRtcFactory {
    async fn create(
        &self,
        user_id: &str,
        initiator: bool,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<Arc<dyn PeerBackend>> {
        let mut media_engine = MediaEngine::default();
        media_engine.register_default_codecs().map_err(rtc_err)?;
        let api = APIBuilder::new().with_media_engine(media_engine).build();
        let pc = Arc::new(
            api.new_peer_connection(self.rtc_configuration())
                .await
                .map_err(rtc_err)?,
        );

        let backend = Arc::new(WebRtcPeerBackend {
            user_id: user_id.to_string(),
            stream_id: Uuid::new_v4().to_string(),
            pc: Arc::clone(&pc),
            data_channel: Arc::new(RwLock::new(None)),
            senders: RwLock::new(HashMap::new()),
            sample_tracks: RwLock::new(HashMap::new()),
        });

        let candidate_events = events.clone();
        let candidate_user = user_id.to_string();
        pc.on_ice_candidate(Box::new(move |candidate: Option<RTCIceCandidate>| {
            let events = candidate_events.clone();
            let user_id = candidate_user.clone();
            Box::pin(async move {
                let Some(candidate) = candidate else {
                    debug!("ICE gathering complete for peer {}", user_id);
                    return;
                };
                match candidate.to_json() {
                    Ok(init) => {
                        let _ = events.send(BackendEvent::LocalCandidate {
                            user_id,
                            candidate: IceCandidate {
                                candidate: init.candidate,
                                sdp_mid: init.sdp_mid,
                                sdp_mline_index: init.sdp_mline_index,
                            },
                        });
                    }
                    Err(e) => warn!("Failed to serialize candidate for {}: {}", user_id, e),
                }
            })
        }));

        let state_events = events.clone();
        let state_user = user_id.to_string();
        pc.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            if let Some(state) = map_transport_state(state) {
                let _ = state_events.send(BackendEvent::TransportState {
                    user_id: state_user.clone(),
                    state,
                });
            }
            Box::pin(async {})
        }));

        let track_events = events.clone();
        let track_user = user_id.to_string();
        pc.on_track(Box::new(
            move |track: Arc<TrackRemote>,
                  _receiver: Arc<RTCRtpReceiver>,
                  _transceiver: Arc<RTCRtpTransceiver>| {
                let kind = match track.kind() {
                    RTPCodecType::Audio => TrackKind::Audio,
                    RTPCodecType::Video => TrackKind::Video,
                    RTPCodecType::Unspecified => return Box::pin(async {}),
                };
                let _ = track_events.send(BackendEvent::RemoteTrack {
                    user_id: track_user.clone(),
                    stream_id: track.stream_id().to_string(),
                    track_id: track.id().to_string(),
                    kind,
                });
                Box::pin(async {})
            },
        ));

        if initiator {
            let dc = pc
                .create_data_channel(&self.config.channel_label, None)
                .await
                .map_err(rtc_err)?;
            register_channel(user_id, &dc, &events);
            *backend.data_channel.write().await = Some(dc);
        } else {
            let slot = Arc::clone(&backend.data_channel);
            let channel_user = user_id.to_string();
            let channel_events = events;
            pc.on_data_channel(Box::new(move |dc: Arc<RTCDataChannel>| {
                let slot = Arc::clone(&slot);
                register_channel(&channel_user, &dc, &channel_events);
                Box::pin(async move {
                    *slot.write().await = Some(dc);
                })
            }));
        }

        Ok(backend)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codec_selection() {
        assert_eq!(codec_for(TrackKind::Audio).mime_type, MIME_TYPE_OPUS);
        assert_eq!(codec_for(TrackKind::Video).mime_type, MIME_TYPE_VP8);
    }

    #[test]
    fn test_transport_state_mapping() {
        assert_eq!(
            map_transport_state(RTCPeerConnectionState::Connected),
            Some(TransportState::Connected)
        );
        assert_eq!(
            map_transport_state(RTCPeerConnectionState::Failed),
            Some(TransportState::Failed)
        );
        assert_eq!(map_transport_state(RTCPeerConnectionState::New), None);
    }

    #[tokio::test]
    async fn test_factory_ice_configuration() {
        let factory = WebRtcFactory::new(EngineConfig::default());
        let config = factory.rtc_configuration();
        assert!(!config.ice_servers.is_empty());
        assert!(config.ice_servers[0].urls[0].starts_with("stun:"));
    }
}
