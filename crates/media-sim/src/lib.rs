//! Media-sim: simulated platform providers for the Peerline call core
//!
//! Implements the call-core provider seams without touching real hardware or
//! networks: a capture stack with a configurable device table and failure
//! injection, an echo peer transport, and a scenario-driven negotiation
//! provider. Together they let every call-core state - including connection
//! drops and retry exhaustion - be reached deterministically under tokio's
//! paused clock.

pub mod media;
pub mod negotiation;
pub mod transport;

pub use media::SimMediaProvider;
pub use negotiation::SimNegotiationProvider;
pub use transport::{SimPeerTransport, SimTransportFactory};
