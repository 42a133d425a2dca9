//! Peer transport seam
//!
//! [`PeerTransport`] is the surface the connection controller drives:
//! offer/answer description handling, track attachment, lifecycle events.
//! The controller owns the transport exclusively; everything else sees only
//! the opaque [`PeerId`][crate::session::PeerId] published in the session.
//!
//! Transport events arrive on a broadcast channel. The controller subscribes
//! once per transport instance and detaches the subscription when the
//! transport is replaced during reconnection, so a superseded connection can
//! never corrupt session state.

use std::sync::Arc;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::CallResult;
use crate::media::{MediaStream, MediaTrack, TrackKind};
use crate::session::PeerId;

/// Default public STUN servers used for every peer connection
pub const DEFAULT_STUN_SERVERS: [&str; 2] =
    ["stun:stun.l.google.com:19302", "stun:stun1.l.google.com:19302"];

/// One ICE server entry. The URLs are opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IceServer {
    pub urls: Vec<String>,
}

impl IceServer {
    pub fn stun(url: impl Into<String>) -> Self {
        Self { urls: vec![url.into()] }
    }
}

/// The fixed default ICE server set
pub fn default_ice_servers() -> Vec<IceServer> {
    DEFAULT_STUN_SERVERS.iter().map(|url| IceServer::stun(*url)).collect()
}

/// Lifecycle state reported by the underlying transport
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeerConnectionState {
    New,
    Connecting,
    Connected,
    Disconnected,
    Failed,
    Closed,
}

impl PeerConnectionState {
    /// States the controller treats as a connection loss
    pub fn is_loss(&self) -> bool {
        matches!(self, PeerConnectionState::Disconnected | PeerConnectionState::Failed)
    }
}

/// Offer or answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SdpKind {
    Offer,
    Answer,
}

/// A session description exchanged during negotiation
#[derive(Debug, Clone)]
pub struct SessionDescription {
    pub kind: SdpKind,
    pub sdp: String,
}

impl SessionDescription {
    pub fn offer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Offer, sdp: sdp.into() }
    }

    pub fn answer(sdp: impl Into<String>) -> Self {
        Self { kind: SdpKind::Answer, sdp: sdp.into() }
    }
}

/// Events emitted by a live transport
#[derive(Debug, Clone)]
pub enum TransportEvent {
    ConnectionStateChanged(PeerConnectionState),
    /// Remote media became available; updates the session's remote stream
    /// without touching the call status
    TrackReceived(MediaStream),
}

/// Outbound track slot on a transport. Supports in-place replacement so a
/// camera switch needs no renegotiation.
#[derive(Debug)]
pub struct TrackSender {
    id: Uuid,
    kind: TrackKind,
    track: Mutex<Option<MediaTrack>>,
}

impl TrackSender {
    pub fn new(track: MediaTrack) -> Self {
        Self { id: Uuid::new_v4(), kind: track.kind(), track: Mutex::new(Some(track)) }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Kind of track this slot carries; fixed at creation
    pub fn kind(&self) -> TrackKind {
        self.kind
    }

    pub fn track(&self) -> Option<MediaTrack> {
        self.track.lock().expect("track sender lock poisoned").clone()
    }

    /// Swap the outbound track without renegotiation
    pub fn replace_track(&self, track: Option<MediaTrack>) {
        *self.track.lock().expect("track sender lock poisoned") = track;
    }
}

/// Seam to one peer connection instance
#[async_trait]
pub trait PeerTransport: Send + Sync {
    fn id(&self) -> PeerId;

    fn connection_state(&self) -> PeerConnectionState;

    /// Subscribe to lifecycle events. Called once per transport instance.
    fn subscribe(&self) -> broadcast::Receiver<TransportEvent>;

    async fn create_offer(&self) -> CallResult<SessionDescription>;

    async fn set_local_description(&self, desc: SessionDescription) -> CallResult<()>;

    async fn set_remote_description(&self, desc: SessionDescription) -> CallResult<()>;

    /// Attach an outbound track; must happen before offer creation
    async fn add_track(&self, track: MediaTrack) -> CallResult<Arc<TrackSender>>;

    fn senders(&self) -> Vec<Arc<TrackSender>>;

    /// Close the connection. Emits no events and is safe to call repeatedly.
    async fn close(&self);
}

/// Builds fresh transports; one per call attempt and per reconnection
#[async_trait]
pub trait TransportFactory: Send + Sync {
    async fn create(&self, ice_servers: &[IceServer]) -> CallResult<Arc<dyn PeerTransport>>;
}
