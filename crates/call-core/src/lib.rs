//! Call-core: two-party real-time call session engine
//!
//! This crate turns a noisy, asynchronous set of connection-state signals
//! into a deterministic sequence of user-facing call states, and recovers a
//! dropped session within bounded limits without leaking resources.
//!
//! ## Layer Separation
//! ```text
//! CallClient -> {ConnectionController, RetryOrchestrator} -> SessionStore
//!                        |
//!                        v
//!          {MediaProvider, TransportFactory, NegotiationProvider}
//! ```
//!
//! Call-core focuses on:
//! - The call session state machine and its atomic, observable transitions
//! - The offer/answer handshake over a pluggable transport seam
//! - Bounded countdown-driven reconnection after a connection loss
//! - Track-level mute and camera switching without renegotiation
//!
//! Platform capture, real transports and signaling live behind the provider
//! traits; `peerline-media-sim` supplies simulated implementations.

pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod media;
pub mod negotiation;
pub mod retry;
pub mod session;
pub mod transport;

// Public API exports
pub use client::{CallClient, CallClientBuilder};
pub use config::CallConfig;
pub use connection::{ConnectionController, FaultSchedule};
pub use error::{CallError, CallResult, ErrorKind};
pub use media::{
    acquire_local_media, DeviceId, MediaConstraints, MediaDeviceInfo, MediaDeviceKind,
    MediaProvider, MediaStream, MediaTrack, PlatformMediaError, TrackKind,
};
pub use negotiation::{NegotiationPeer, NegotiationProvider, Scenario};
pub use retry::{RetryOrchestrator, RetryPolicy};
pub use session::{
    CallSession, CallSettings, CallStatus, ErrorEntry, PeerId, ResolutionTier, RetryState,
    ScenarioState, SessionEvent, SessionStore, COUNTDOWN_START, MAX_RETRY_ATTEMPTS,
};
pub use transport::{
    default_ice_servers, IceServer, PeerConnectionState, PeerTransport, SdpKind,
    SessionDescription, TrackSender, TransportEvent, TransportFactory,
};

/// Call-core version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
