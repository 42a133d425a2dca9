//! Watch the reconnection controller ride out an injected connection drop.
//!
//! The `connection-drop` scenario connects, then autonomously kills the
//! connection after three seconds. The retry countdown and the second
//! handshake print as they happen.

use std::sync::Arc;

use anyhow::Result;

use peerline_call_core::{CallClient, CallStatus, Scenario};
use peerline_media_sim::{SimMediaProvider, SimNegotiationProvider, SimTransportFactory};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("peerline_call_core=info,peerline_media_sim=info")
        .init();

    let client = CallClient::builder()
        .media_provider(Arc::new(SimMediaProvider::new()))
        .transport_factory(Arc::new(SimTransportFactory::new()))
        .negotiation_provider(Arc::new(SimNegotiationProvider::new()))
        .build()
        .await?;

    let mut session = client.subscribe();
    client.start_call(Scenario::ConnectionDrop).await?;

    let mut saw_retry = false;
    let mut last_line = String::new();
    loop {
        session.changed().await?;
        let snapshot = session.borrow().clone();

        let line = if snapshot.retry.is_retrying {
            format!(
                "status: {} (attempt {}/{}, reconnecting in {}s)",
                snapshot.status,
                snapshot.retry.current_attempt,
                snapshot.retry.max_attempts,
                snapshot.retry.countdown,
            )
        } else {
            format!("status: {}", snapshot.status)
        };
        if line != last_line {
            println!("{line}");
            last_line = line;
        }

        match snapshot.status {
            CallStatus::Connected if saw_retry => {
                println!("recovered after the drop");
                break;
            }
            CallStatus::Retrying => saw_retry = true,
            CallStatus::Disconnected => anyhow::bail!("reconnection gave up"),
            _ => {}
        }
    }

    client.end_call().await?;
    Ok(())
}
