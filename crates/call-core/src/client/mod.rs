//! High-level call client
//!
//! [`CallClient`] is the single public entry point: it assembles the session
//! store, connection controller and retry orchestrator, and exposes the
//! command surface callers drive. It performs no state-machine logic of its
//! own - every command delegates, and failures surface through the session
//! error log plus the returned [`CallResult`].
//!
//! # Basic Call Flow
//!
//! ```rust,no_run
//! # use peerline_call_core::{CallClient, CallStatus, Scenario};
//! # async fn example(client: CallClient) -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = client.subscribe();
//!
//! client.start_call(Scenario::Basic).await?;
//!
//! loop {
//!     session.changed().await?;
//!     let snapshot = session.borrow().clone();
//!     match snapshot.status {
//!         CallStatus::Connected => break,
//!         CallStatus::Disconnected => return Err("call setup failed".into()),
//!         _ => {}
//!     }
//! }
//!
//! client.toggle_audio().await?;
//! client.end_call().await?;
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::CallClientBuilder;

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::error;

use crate::connection::ConnectionController;
use crate::error::CallResult;
use crate::media::MediaConstraints;
use crate::negotiation::Scenario;
use crate::session::{CallSession, CallStatus, SessionStore};

/// Facade over the call session core
pub struct CallClient {
    store: Arc<SessionStore>,
    controller: Arc<ConnectionController>,
    device_watcher: JoinHandle<()>,
}

impl CallClient {
    pub fn builder() -> CallClientBuilder {
        CallClientBuilder::new()
    }

    pub(crate) fn new(
        store: Arc<SessionStore>,
        controller: Arc<ConnectionController>,
        device_watcher: JoinHandle<()>,
    ) -> Self {
        Self { store, controller, device_watcher }
    }

    /// Start a call under the given scenario
    pub async fn start_call(&self, scenario: Scenario) -> CallResult<()> {
        self.controller.start_call(scenario).await.map_err(|e| {
            error!(error = %e, %scenario, "failed to start call");
            e
        })
    }

    /// Flip the outbound audio mute flag
    pub async fn toggle_audio(&self) -> CallResult<()> {
        self.controller.toggle_audio().await
    }

    /// Flip the outbound video mute flag
    pub async fn toggle_video(&self) -> CallResult<()> {
        self.controller.toggle_video().await
    }

    /// Cycle to the next video input device, if more than one exists
    pub async fn switch_camera(&self) -> CallResult<()> {
        self.controller.switch_camera().await.map_err(|e| {
            error!(error = %e, "camera switch failed");
            e
        })
    }

    /// Re-acquire local media under new constraints
    pub async fn update_media_constraints(
        &self,
        constraints: &MediaConstraints,
    ) -> CallResult<()> {
        self.controller.update_media_constraints(constraints).await.map_err(|e| {
            error!(error = %e, "media constraint update failed");
            e
        })
    }

    /// End the call and release every resource; safe to call repeatedly
    pub async fn end_call(&self) -> CallResult<()> {
        self.controller.end_call().await
    }

    /// Read-only subscription to the session
    pub fn subscribe(&self) -> watch::Receiver<CallSession> {
        self.store.subscribe()
    }

    /// Current session snapshot
    pub fn session(&self) -> CallSession {
        self.store.snapshot()
    }

    /// Current call status
    pub fn status(&self) -> CallStatus {
        self.store.status()
    }
}

impl Drop for CallClient {
    fn drop(&mut self) {
        self.device_watcher.abort();
    }
}

impl std::fmt::Debug for CallClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallClient")
            .field("status", &self.status())
            .finish()
    }
}
