//! Shared fixtures for session integration tests
//!
//! Provides an in-memory signaling hub, a mock capture source and a mock
//! transport mesh so whole multi-participant sessions run inside one test
//! process with no network or media stack.

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use stagemesh::{
    BackendEvent, EngineConfig, Error, IceCandidate, LocalTrack, MediaConstraints, MediaSource,
    PeerBackend, PeerBackendFactory, Result, SessionCoordinator, SessionDescription, SignalEvent,
    SignalMessage, SignalPayload, SignalTarget, SignalingPort, TrackKind, TransportState,
};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, Mutex};

pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "stagemesh=debug".into()),
        )
        .with_test_writer()
        .try_init();
}

/// Engine config with fast restarts so failure tests finish quickly
pub fn test_config() -> EngineConfig {
    EngineConfig {
        restart_backoff: std::time::Duration::from_millis(10),
        ..EngineConfig::default()
    }
}

/// Capture source producing plain in-memory tracks
pub struct MockMediaSource;

#[async_trait]
impl MediaSource for MockMediaSource {
    async fn open_input(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<(Arc<LocalTrack>, Arc<LocalTrack>)> {
        Ok((
            LocalTrack::new(TrackKind::Audio, "microphone"),
            LocalTrack::new(TrackKind::Video, "camera"),
        ))
    }

    async fn open_screen(&self) -> Result<Arc<LocalTrack>> {
        Ok(LocalTrack::new(TrackKind::Video, "screen"))
    }
}

/// Capture source that refuses permission
pub struct DeniedMediaSource;

#[async_trait]
impl MediaSource for DeniedMediaSource {
    async fn open_input(
        &self,
        _constraints: &MediaConstraints,
    ) -> Result<(Arc<LocalTrack>, Arc<LocalTrack>)> {
        Err(Error::MediaAccessDenied("user refused".to_string()))
    }

    async fn open_screen(&self) -> Result<Arc<LocalTrack>> {
        Err(Error::MediaAccessDenied("user refused".to_string()))
    }
}

/// One direction of a mocked transport link
pub struct MockPeerBackend {
    owner: String,
    peer: String,
    net: Arc<MeshNet>,
    events: mpsc::UnboundedSender<BackendEvent>,
    pub applied_candidates: StdMutex<Vec<IceCandidate>>,
    pub replaced_tracks: StdMutex<Vec<String>>,
    channel_open: AtomicBool,
    closed: AtomicBool,
}

impl MockPeerBackend {
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn counterpart(&self) -> Option<Arc<MockPeerBackend>> {
        self.net.backend(&self.peer, &self.owner)
    }

    /// Emit the event burst one end sees when its link comes up
    fn come_up(&self) {
        self.channel_open.store(true, Ordering::Release);
        let _ = self.events.send(BackendEvent::TransportState {
            user_id: self.peer.clone(),
            state: TransportState::Connected,
        });
        for kind in [TrackKind::Audio, TrackKind::Video] {
            let _ = self.events.send(BackendEvent::RemoteTrack {
                user_id: self.peer.clone(),
                stream_id: format!("stream:{}", self.peer),
                track_id: format!("{}-{}", self.peer, kind.as_str()),
                kind,
            });
        }
        let _ = self.events.send(BackendEvent::ChannelOpen {
            user_id: self.peer.clone(),
        });
    }

    fn emit_local_candidates(&self) {
        for n in 0..2 {
            let _ = self.events.send(BackendEvent::LocalCandidate {
                user_id: self.peer.clone(),
                candidate: IceCandidate {
                    candidate: format!(
                        "candidate:{}:{n} 1 udp 2130706431 192.0.2.1 54321 typ host",
                        self.owner
                    ),
                    sdp_mid: Some("0".to_string()),
                    sdp_mline_index: Some(0),
                },
            });
        }
    }
}

#[async_trait]
impl PeerBackend for MockPeerBackend {
    async fn create_offer(&self) -> Result<SessionDescription> {
        self.emit_local_candidates();
        Ok(SessionDescription::offer(format!("v=0 offer:{}", self.owner)))
    }

    async fn create_answer(&self, _offer: SessionDescription) -> Result<SessionDescription> {
        self.emit_local_candidates();
        Ok(SessionDescription::answer(format!(
            "v=0 answer:{}",
            self.owner
        )))
    }

    async fn apply_answer(&self, _answer: SessionDescription) -> Result<()> {
        // The offering side applying the answer completes the link
        self.come_up();
        if let Some(counterpart) = self.counterpart() {
            counterpart.come_up();
        }
        Ok(())
    }

    async fn add_candidate(&self, candidate: IceCandidate) -> Result<()> {
        self.applied_candidates.lock().unwrap().push(candidate);
        Ok(())
    }

    async fn attach_tracks(&self, _audio: Arc<LocalTrack>, _video: Arc<LocalTrack>) -> Result<()> {
        Ok(())
    }

    async fn replace_video_track(&self, track: Arc<LocalTrack>) -> Result<()> {
        self.replaced_tracks
            .lock()
            .unwrap()
            .push(track.id().to_string());
        Ok(())
    }

    async fn channel_open(&self) -> bool {
        self.channel_open.load(Ordering::Acquire)
    }

    async fn send_channel(&self, payload: Bytes) -> Result<()> {
        let counterpart = self
            .counterpart()
            .ok_or_else(|| Error::DataChannelError("link torn down".to_string()))?;
        let _ = counterpart.events.send(BackendEvent::ChannelMessage {
            user_id: self.owner.clone(),
            payload,
        });
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::Release);
        self.channel_open.store(false, Ordering::Release);
        self.net.remove(&self.owner, &self.peer);
        Ok(())
    }
}

/// Shared view of every mocked link in the test mesh
#[derive(Default)]
pub struct MeshNet {
    links: StdMutex<HashMap<(String, String), Arc<MockPeerBackend>>>,
}

impl MeshNet {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn backend(&self, owner: &str, peer: &str) -> Option<Arc<MockPeerBackend>> {
        self.links
            .lock()
            .unwrap()
            .get(&(owner.to_string(), peer.to_string()))
            .map(Arc::clone)
    }

    fn insert(&self, backend: Arc<MockPeerBackend>) {
        self.links.lock().unwrap().insert(
            (backend.owner.clone(), backend.peer.clone()),
            backend,
        );
    }

    fn remove(&self, owner: &str, peer: &str) {
        self.links
            .lock()
            .unwrap()
            .remove(&(owner.to_string(), peer.to_string()));
    }

    /// Simulate a transport failure on the link between two participants
    pub fn fail(&self, a: &str, b: &str) {
        for (owner, peer) in [(a, b), (b, a)] {
            if let Some(backend) = self.backend(owner, peer) {
                backend.channel_open.store(false, Ordering::Release);
                let _ = backend.events.send(BackendEvent::TransportState {
                    user_id: backend.peer.clone(),
                    state: TransportState::Failed,
                });
            }
        }
    }
}

/// Factory wiring each created backend into the shared [`MeshNet`]
pub struct MockPeerFactory {
    owner: String,
    net: Arc<MeshNet>,
}

impl MockPeerFactory {
    pub fn new(owner: impl Into<String>, net: Arc<MeshNet>) -> Arc<Self> {
        Arc::new(Self {
            owner: owner.into(),
            net,
        })
    }
}

#[async_trait]
impl PeerBackendFactory for MockPeerFactory {
    async fn create(
        &self,
        user_id: &str,
        _initiator: bool,
        events: mpsc::UnboundedSender<BackendEvent>,
    ) -> Result<Arc<dyn PeerBackend>> {
        let backend = Arc::new(MockPeerBackend {
            owner: self.owner.clone(),
            peer: user_id.to_string(),
            net: Arc::clone(&self.net),
            events,
            applied_candidates: StdMutex::new(Vec::new()),
            replaced_tracks: StdMutex::new(Vec::new()),
            channel_open: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        });
        self.net.insert(Arc::clone(&backend));
        Ok(backend)
    }
}

/// In-memory signaling hub delivering events straight into coordinators
#[derive(Default)]
pub struct SignalHub {
    participants: Mutex<HashMap<String, Arc<SessionCoordinator>>>,
    present: Mutex<HashSet<String>>,
}

impl SignalHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register the coordinator that consumes events addressed to `user_id`
    pub async fn attach(&self, user_id: &str, coordinator: Arc<SessionCoordinator>) {
        self.participants
            .lock()
            .await
            .insert(user_id.to_string(), coordinator);
    }

    async fn deliver(&self, to: &str, event: SignalEvent) {
        let target = self.participants.lock().await.get(to).map(Arc::clone);
        if let Some(coordinator) = target {
            coordinator.handle_signal(event).await;
        }
    }

    async fn broadcast(&self, from: &str, event: SignalEvent) {
        let targets: Vec<String> = self
            .present
            .lock()
            .await
            .iter()
            .filter(|u| u.as_str() != from)
            .cloned()
            .collect();
        for target in targets {
            self.deliver(&target, event.clone()).await;
        }
    }
}

/// One participant's handle onto the [`SignalHub`]
pub struct MemorySignaling {
    hub: Arc<SignalHub>,
    user: StdMutex<Option<String>>,
}

impl MemorySignaling {
    pub fn new(hub: Arc<SignalHub>) -> Arc<Self> {
        Arc::new(Self {
            hub,
            user: StdMutex::new(None),
        })
    }

    fn user(&self) -> Result<String> {
        self.user
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| Error::SignalingUnavailable("port not open".to_string()))
    }
}

#[async_trait]
impl SignalingPort for MemorySignaling {
    async fn open(&self, _session_id: &str, user_id: &str) -> Result<Vec<String>> {
        *self.user.lock().unwrap() = Some(user_id.to_string());
        let mut present = self.hub.present.lock().await;
        let roster = present.iter().cloned().collect();
        present.insert(user_id.to_string());
        Ok(roster)
    }

    async fn send(&self, message: SignalMessage) -> Result<()> {
        let from = self.user()?;
        match (message.to, message.payload) {
            (SignalTarget::Broadcast, SignalPayload::Join) => {
                self.hub
                    .broadcast(&from, SignalEvent::UserJoined { user_id: from.clone() })
                    .await;
            }
            (SignalTarget::Broadcast, SignalPayload::Leave) => {
                self.hub
                    .broadcast(&from, SignalEvent::UserLeft { user_id: from.clone() })
                    .await;
            }
            (SignalTarget::Peer(to), SignalPayload::Offer { description }) => {
                self.hub
                    .deliver(
                        &to,
                        SignalEvent::Offer {
                            user_id: from,
                            description,
                        },
                    )
                    .await;
            }
            (SignalTarget::Peer(to), SignalPayload::Answer { description }) => {
                self.hub
                    .deliver(
                        &to,
                        SignalEvent::Answer {
                            user_id: from,
                            description,
                        },
                    )
                    .await;
            }
            (SignalTarget::Peer(to), SignalPayload::IceCandidate { candidate }) => {
                self.hub
                    .deliver(
                        &to,
                        SignalEvent::IceCandidate {
                            user_id: from,
                            candidate,
                        },
                    )
                    .await;
            }
            (SignalTarget::Peer(to), SignalPayload::Control { payload }) => {
                self.hub
                    .deliver(
                        &to,
                        SignalEvent::Control {
                            user_id: from,
                            payload,
                        },
                    )
                    .await;
            }
            (SignalTarget::Broadcast, SignalPayload::Control { payload }) => {
                self.hub
                    .broadcast(
                        &from,
                        SignalEvent::Control {
                            user_id: from.clone(),
                            payload,
                        },
                    )
                    .await;
            }
            _ => {}
        }
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        // Drop the guard before touching the async hub lock
        let user = self.user.lock().unwrap().take();
        if let Some(user) = user {
            self.hub.present.lock().await.remove(&user);
        }
        Ok(())
    }
}

/// Signaling port whose open always fails
pub struct UnreachableSignaling;

#[async_trait]
impl SignalingPort for UnreachableSignaling {
    async fn open(&self, _session_id: &str, _user_id: &str) -> Result<Vec<String>> {
        Err(Error::SignalingUnavailable("connection refused".to_string()))
    }

    async fn send(&self, _message: SignalMessage) -> Result<()> {
        Err(Error::SignalingUnavailable("connection refused".to_string()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
