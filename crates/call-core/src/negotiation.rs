//! Negotiation provider seam
//!
//! Given a local offer, a negotiation peer produces the remote answer. The
//! provider brackets a signaling session: [`NegotiationProvider::start`] when
//! a call begins, [`NegotiationProvider::shutdown`] when it ends. Both are
//! safe to call redundantly.
//!
//! The [`Scenario`] selects how the peer behaves - the real counterpart
//! answers normally, the simulated one injects delays, drops or pass-through
//! per scenario.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{CallError, CallResult};
use crate::transport::SessionDescription;

/// Behavior selector accepted at call start
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Scenario {
    /// Answer immediately, echo media back
    #[default]
    Basic,
    /// Inject a delay before the answer arrives
    PoorConnection,
    /// Connect normally, then autonomously drop the connection after a fixed
    /// delay so the reconnection path can be observed
    ConnectionDrop,
    /// Pass media and data channels through unmodified
    ScreenShare,
}

impl std::fmt::Display for Scenario {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Scenario::Basic => "basic",
            Scenario::PoorConnection => "poor-connection",
            Scenario::ConnectionDrop => "connection-drop",
            Scenario::ScreenShare => "screen-share",
        };
        f.write_str(s)
    }
}

impl std::str::FromStr for Scenario {
    type Err = CallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "basic" => Ok(Scenario::Basic),
            "poor-connection" => Ok(Scenario::PoorConnection),
            "connection-drop" => Ok(Scenario::ConnectionDrop),
            "screen-share" => Ok(Scenario::ScreenShare),
            other => Err(CallError::internal(format!("unknown scenario: {other}"))),
        }
    }
}

/// One negotiation counterpart, built per call attempt
#[async_trait]
pub trait NegotiationPeer: Send + Sync {
    /// Produce the remote answer for a local offer
    async fn answer_offer(&self, offer: &SessionDescription) -> CallResult<SessionDescription>;
}

/// Seam to the signaling side
#[async_trait]
pub trait NegotiationProvider: Send + Sync {
    /// Open the signaling session; idempotent
    async fn start(&self) -> CallResult<()>;

    /// Build the counterpart peer for this scenario. Called per handshake,
    /// including every reconnection attempt.
    async fn build_peer(&self, scenario: Scenario) -> CallResult<Box<dyn NegotiationPeer>>;

    /// Release the signaling session; idempotent
    async fn shutdown(&self) -> CallResult<()>;
}
