//! Client configuration
//!
//! Defaults match the behavior of the reference deployment: the fixed public
//! STUN pair, three reconnection attempts with a three second countdown, and
//! a three second injected drop for the `connection-drop` scenario.

use serde::{Deserialize, Serialize};

use crate::connection::FaultSchedule;
use crate::retry::RetryPolicy;
use crate::session::CallSettings;
use crate::transport::{default_ice_servers, IceServer};

/// Configuration for a [`CallClient`][crate::client::CallClient]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// ICE servers handed to every peer connection
    pub ice_servers: Vec<IceServer>,

    /// Reconnection attempt policy
    pub retry: RetryPolicy,

    /// Timing of the `connection-drop` scenario's injected fault
    pub fault: FaultSchedule,

    /// Initial media settings for the session
    pub settings: CallSettings,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ice_servers: default_ice_servers(),
            retry: RetryPolicy::default(),
            fault: FaultSchedule::default(),
            settings: CallSettings::default(),
        }
    }
}
