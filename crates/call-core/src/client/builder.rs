//! Builder for assembling a call client
//!
//! Providers are injected explicitly; there is no ambient platform lookup.
//! The builder wires the session store into the connection controller and
//! retry orchestrator, primes the device list and starts the device-change
//! watcher.

use std::sync::Arc;

use tracing::warn;

use crate::client::CallClient;
use crate::config::CallConfig;
use crate::connection::{ConnectionController, FaultSchedule};
use crate::error::{CallError, CallResult};
use crate::media::MediaProvider;
use crate::negotiation::NegotiationProvider;
use crate::retry::{RetryOrchestrator, RetryPolicy};
use crate::session::{SessionEvent, SessionStore};
use crate::transport::{IceServer, TransportFactory};

/// Builder for a [`CallClient`]
pub struct CallClientBuilder {
    config: CallConfig,
    media: Option<Arc<dyn MediaProvider>>,
    transports: Option<Arc<dyn TransportFactory>>,
    negotiation: Option<Arc<dyn NegotiationProvider>>,
}

impl CallClientBuilder {
    pub fn new() -> Self {
        Self {
            config: CallConfig::default(),
            media: None,
            transports: None,
            negotiation: None,
        }
    }

    /// Replace the whole configuration
    pub fn config(mut self, config: CallConfig) -> Self {
        self.config = config;
        self
    }

    /// Set the ICE servers handed to every peer connection
    pub fn ice_servers(mut self, servers: Vec<IceServer>) -> Self {
        self.config.ice_servers = servers;
        self
    }

    /// Set the reconnection policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry = policy;
        self
    }

    /// Set the `connection-drop` fault timing
    pub fn fault_schedule(mut self, fault: FaultSchedule) -> Self {
        self.config.fault = fault;
        self
    }

    /// Inject the platform capture stack
    pub fn media_provider(mut self, provider: Arc<dyn MediaProvider>) -> Self {
        self.media = Some(provider);
        self
    }

    /// Inject the peer transport factory
    pub fn transport_factory(mut self, factory: Arc<dyn TransportFactory>) -> Self {
        self.transports = Some(factory);
        self
    }

    /// Inject the signaling side
    pub fn negotiation_provider(mut self, provider: Arc<dyn NegotiationProvider>) -> Self {
        self.negotiation = Some(provider);
        self
    }

    /// Assemble the client
    pub async fn build(self) -> CallResult<CallClient> {
        let media = self.media.ok_or(CallError::MissingProvider { name: "media" })?;
        let transports = self
            .transports
            .ok_or(CallError::MissingProvider { name: "transport" })?;
        let negotiation = self
            .negotiation
            .ok_or(CallError::MissingProvider { name: "negotiation" })?;

        let store = Arc::new(SessionStore::new());
        if self.config.settings != Default::default() {
            store.dispatch(SessionEvent::SettingsChanged(self.config.settings.clone()));
        }

        // prime the device list, then keep it fresh on change notifications
        match media.enumerate_devices().await {
            Ok(devices) => store.dispatch(SessionEvent::DevicesChanged(devices)),
            Err(error) => warn!(error = %error, "initial device enumeration failed"),
        }
        let device_watcher = spawn_device_watcher(store.clone(), media.clone());

        let retry = RetryOrchestrator::new(store.clone(), self.config.retry.clone());
        let controller = ConnectionController::new(
            store.clone(),
            media,
            transports,
            negotiation,
            self.config.ice_servers.clone(),
            self.config.fault,
            retry,
        );

        Ok(CallClient::new(store, controller, device_watcher))
    }
}

impl Default for CallClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

fn spawn_device_watcher(
    store: Arc<SessionStore>,
    media: Arc<dyn MediaProvider>,
) -> tokio::task::JoinHandle<()> {
    let mut changes = media.subscribe_device_changes();
    tokio::spawn(async move {
        loop {
            match changes.recv().await {
                Ok(()) => match media.enumerate_devices().await {
                    Ok(devices) => store.dispatch(SessionEvent::DevicesChanged(devices)),
                    Err(error) => warn!(error = %error, "device enumeration failed"),
                },
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}
