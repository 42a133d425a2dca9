//! Simulated peer transport
//!
//! Behaves like an echo peer: once the remote answer lands the connection
//! reports `connecting` then `connected` and a remote stream mirroring the
//! attached outbound tracks arrives. `close()` emits no events, matching the
//! platform contract the drop-injection path relies on.
//!
//! [`SimPeerTransport::inject_connection_state`] lets tests raise organic
//! `disconnected`/`failed` signals at will.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::broadcast;
use tracing::debug;
use uuid::Uuid;

use peerline_call_core::{
    CallError, CallResult, IceServer, MediaStream, MediaTrack, PeerConnectionState, PeerId,
    PeerTransport, SdpKind, SessionDescription, TrackSender, TransportEvent, TransportFactory,
};

/// Builds [`SimPeerTransport`]s and keeps handles for test introspection
pub struct SimTransportFactory {
    created: Mutex<Vec<Arc<SimPeerTransport>>>,
}

impl SimTransportFactory {
    pub fn new() -> Self {
        Self { created: Mutex::new(Vec::new()) }
    }

    /// Number of transports built so far
    pub fn created_count(&self) -> usize {
        self.created.lock().expect("factory lock poisoned").len()
    }

    /// The most recently built transport
    pub fn last(&self) -> Option<Arc<SimPeerTransport>> {
        self.created.lock().expect("factory lock poisoned").last().cloned()
    }
}

impl Default for SimTransportFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransportFactory for SimTransportFactory {
    async fn create(&self, ice_servers: &[IceServer]) -> CallResult<Arc<dyn PeerTransport>> {
        let transport = Arc::new(SimPeerTransport::new(ice_servers));
        self.created.lock().expect("factory lock poisoned").push(transport.clone());
        Ok(transport)
    }
}

/// Simulated [`PeerTransport`]
pub struct SimPeerTransport {
    id: PeerId,
    ice_servers: Vec<IceServer>,
    state: Mutex<PeerConnectionState>,
    senders: Mutex<Vec<Arc<TrackSender>>>,
    local_description: Mutex<Option<SessionDescription>>,
    remote_description: Mutex<Option<SessionDescription>>,
    events: broadcast::Sender<TransportEvent>,
}

impl SimPeerTransport {
    pub fn new(ice_servers: &[IceServer]) -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            id: Uuid::new_v4(),
            ice_servers: ice_servers.to_vec(),
            state: Mutex::new(PeerConnectionState::New),
            senders: Mutex::new(Vec::new()),
            local_description: Mutex::new(None),
            remote_description: Mutex::new(None),
            events,
        }
    }

    /// ICE servers this transport was constructed with
    pub fn ice_servers(&self) -> &[IceServer] {
        &self.ice_servers
    }

    pub fn local_description(&self) -> Option<SessionDescription> {
        self.local_description.lock().expect("description lock poisoned").clone()
    }

    pub fn remote_description(&self) -> Option<SessionDescription> {
        self.remote_description.lock().expect("description lock poisoned").clone()
    }

    /// Emit an arbitrary connection state, as a flaky network would
    pub fn inject_connection_state(&self, state: PeerConnectionState) {
        self.transition(state);
    }

    fn transition(&self, state: PeerConnectionState) {
        *self.state.lock().expect("state lock poisoned") = state;
        let _ = self.events.send(TransportEvent::ConnectionStateChanged(state));
    }

    fn ensure_open(&self) -> CallResult<()> {
        let state = *self.state.lock().expect("state lock poisoned");
        if state == PeerConnectionState::Closed {
            return Err(CallError::transport_failed("peer connection is closed"));
        }
        Ok(())
    }

    fn echo_remote_stream(&self) -> MediaStream {
        let tracks = self
            .senders
            .lock()
            .expect("senders lock poisoned")
            .iter()
            .map(|sender| MediaTrack::new(sender.kind(), None))
            .collect();
        MediaStream::new(tracks)
    }
}

#[async_trait]
impl PeerTransport for SimPeerTransport {
    fn id(&self) -> PeerId {
        self.id
    }

    fn connection_state(&self) -> PeerConnectionState {
        *self.state.lock().expect("state lock poisoned")
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.events.subscribe()
    }

    async fn create_offer(&self) -> CallResult<SessionDescription> {
        self.ensure_open()?;
        let session_id: u32 = rand::random();
        let mut sdp = format!("v=0\r\no=- {session_id} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
        for sender in self.senders.lock().expect("senders lock poisoned").iter() {
            match sender.kind() {
                peerline_call_core::TrackKind::Audio => {
                    sdp.push_str("m=audio 9 UDP/TLS/RTP/SAVPF 111\r\n");
                }
                peerline_call_core::TrackKind::Video => {
                    sdp.push_str("m=video 9 UDP/TLS/RTP/SAVPF 96\r\n");
                }
            }
        }
        Ok(SessionDescription::offer(sdp))
    }

    async fn set_local_description(&self, desc: SessionDescription) -> CallResult<()> {
        self.ensure_open()?;
        if desc.kind != SdpKind::Offer {
            return Err(CallError::negotiation_failed("local description must be an offer"));
        }
        *self.local_description.lock().expect("description lock poisoned") = Some(desc);
        Ok(())
    }

    async fn set_remote_description(&self, desc: SessionDescription) -> CallResult<()> {
        self.ensure_open()?;
        if desc.kind != SdpKind::Answer {
            return Err(CallError::negotiation_failed("remote description must be an answer"));
        }
        *self.remote_description.lock().expect("description lock poisoned") = Some(desc);

        // answer applied: the simulated link comes up and echoes media back
        debug!(peer = %self.id, "remote description set, connecting");
        self.transition(PeerConnectionState::Connecting);
        self.transition(PeerConnectionState::Connected);
        let _ = self
            .events
            .send(TransportEvent::TrackReceived(self.echo_remote_stream()));
        Ok(())
    }

    async fn add_track(&self, track: MediaTrack) -> CallResult<Arc<TrackSender>> {
        self.ensure_open()?;
        let sender = Arc::new(TrackSender::new(track));
        self.senders.lock().expect("senders lock poisoned").push(sender.clone());
        Ok(sender)
    }

    fn senders(&self) -> Vec<Arc<TrackSender>> {
        self.senders.lock().expect("senders lock poisoned").clone()
    }

    async fn close(&self) {
        // no event, mirroring RTCPeerConnection.close()
        *self.state.lock().expect("state lock poisoned") = PeerConnectionState::Closed;
    }
}
