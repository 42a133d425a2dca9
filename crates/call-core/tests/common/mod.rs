//! Shared harness for the integration suites
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use peerline_call_core::{CallClient, CallSession, CallStatus};
use peerline_media_sim::{SimMediaProvider, SimNegotiationProvider, SimTransportFactory};

pub struct SimHarness {
    pub client: CallClient,
    pub media: Arc<SimMediaProvider>,
    pub transports: Arc<SimTransportFactory>,
    pub negotiation: Arc<SimNegotiationProvider>,
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("peerline_call_core=debug,peerline_media_sim=debug")
        .with_test_writer()
        .try_init();
}

/// Client wired to the simulated platform with default devices
pub async fn sim_harness() -> SimHarness {
    sim_harness_with_media(Arc::new(SimMediaProvider::new())).await
}

pub async fn sim_harness_with_media(media: Arc<SimMediaProvider>) -> SimHarness {
    init_tracing();
    let transports = Arc::new(SimTransportFactory::new());
    let negotiation = Arc::new(SimNegotiationProvider::new());
    let client = CallClient::builder()
        .media_provider(media.clone())
        .transport_factory(transports.clone())
        .negotiation_provider(negotiation.clone())
        .build()
        .await
        .expect("failed to build client");
    SimHarness { client, media, transports, negotiation }
}

/// Wait until the published status equals `status`, or panic after the
/// (virtual-clock friendly) timeout
pub async fn wait_for_status(rx: &mut watch::Receiver<CallSession>, status: CallStatus) {
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if rx.borrow().status == status {
                return;
            }
            rx.changed().await.expect("session store closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for status {status}"));
}

/// Wait until `predicate` holds for the published session
pub async fn wait_for<F>(rx: &mut watch::Receiver<CallSession>, what: &str, mut predicate: F)
where
    F: FnMut(&CallSession) -> bool,
{
    tokio::time::timeout(Duration::from_secs(60), async {
        loop {
            if predicate(&rx.borrow()) {
                return;
            }
            rx.changed().await.expect("session store closed");
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {what}"));
}
