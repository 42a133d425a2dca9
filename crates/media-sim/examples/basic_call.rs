//! Minimal end-to-end call over the simulated platform.
//!
//! Run with an optional scenario argument:
//! `cargo run --example basic_call -- poor-connection`

use std::sync::Arc;

use anyhow::Result;

use peerline_call_core::{CallClient, CallStatus, Scenario};
use peerline_media_sim::{SimMediaProvider, SimNegotiationProvider, SimTransportFactory};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("peerline_call_core=info,peerline_media_sim=info")
        .init();

    let scenario = match std::env::args().nth(1) {
        Some(arg) => arg.parse::<Scenario>()?,
        None => Scenario::Basic,
    };

    let client = CallClient::builder()
        .media_provider(Arc::new(SimMediaProvider::new()))
        .transport_factory(Arc::new(SimTransportFactory::new()))
        .negotiation_provider(Arc::new(SimNegotiationProvider::new()))
        .build()
        .await?;

    let mut session = client.subscribe();
    println!("starting {scenario} call");
    client.start_call(scenario).await?;

    loop {
        session.changed().await?;
        let snapshot = session.borrow().clone();
        println!("status: {}", snapshot.status);
        match snapshot.status {
            CallStatus::Connected => break,
            CallStatus::Disconnected => {
                anyhow::bail!("call setup failed: {:?}", snapshot.errors);
            }
            _ => {}
        }
    }

    client.toggle_audio().await?;
    let settings = client.session().settings;
    println!("settings after mute: {}", serde_json::to_string_pretty(&settings)?);

    client.end_call().await?;
    println!("final status: {}", client.status());
    Ok(())
}
