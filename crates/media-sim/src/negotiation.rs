//! Simulated negotiation provider
//!
//! Produces scenario-shaped answers: immediate echo for `basic` and
//! `connection-drop`, a delayed answer for `poor-connection`, and a
//! pass-through answer for `screen-share`. Answer failures can be injected
//! to drive the core's reconnection loop to exhaustion.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use peerline_call_core::{
    CallError, CallResult, NegotiationPeer, NegotiationProvider, Scenario, SdpKind,
    SessionDescription,
};

const DEFAULT_POOR_CONNECTION_DELAY: Duration = Duration::from_secs(2);

struct NegotiationInner {
    started: AtomicBool,
    fail_answers: AtomicBool,
    answer_delay: Mutex<Duration>,
    peers_built: AtomicUsize,
}

/// Simulated [`NegotiationProvider`]
pub struct SimNegotiationProvider {
    inner: Arc<NegotiationInner>,
}

impl SimNegotiationProvider {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(NegotiationInner {
                started: AtomicBool::new(false),
                fail_answers: AtomicBool::new(false),
                answer_delay: Mutex::new(DEFAULT_POOR_CONNECTION_DELAY),
                peers_built: AtomicUsize::new(0),
            }),
        }
    }

    /// Delay injected before `poor-connection` answers
    pub fn set_answer_delay(&self, delay: Duration) {
        *self.inner.answer_delay.lock().expect("delay lock poisoned") = delay;
    }

    /// Make every subsequent answer fail, as a dead signaling path would.
    /// Takes effect for peers that were already built.
    pub fn set_fail_answers(&self, fail: bool) {
        self.inner.fail_answers.store(fail, Ordering::SeqCst);
    }

    /// How many negotiation peers were built; one per handshake attempt
    pub fn peers_built(&self) -> usize {
        self.inner.peers_built.load(Ordering::SeqCst)
    }

    pub fn is_started(&self) -> bool {
        self.inner.started.load(Ordering::SeqCst)
    }
}

impl Default for SimNegotiationProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NegotiationProvider for SimNegotiationProvider {
    async fn start(&self) -> CallResult<()> {
        self.inner.started.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn build_peer(&self, scenario: Scenario) -> CallResult<Box<dyn NegotiationPeer>> {
        if !self.is_started() {
            return Err(CallError::negotiation_failed("negotiation session not started"));
        }
        self.inner.peers_built.fetch_add(1, Ordering::SeqCst);
        debug!(%scenario, "building negotiation peer");
        Ok(Box::new(SimNegotiationPeer { scenario, inner: self.inner.clone() }))
    }

    async fn shutdown(&self) -> CallResult<()> {
        self.inner.started.store(false, Ordering::SeqCst);
        Ok(())
    }
}

struct SimNegotiationPeer {
    scenario: Scenario,
    inner: Arc<NegotiationInner>,
}

#[async_trait]
impl NegotiationPeer for SimNegotiationPeer {
    async fn answer_offer(&self, offer: &SessionDescription) -> CallResult<SessionDescription> {
        if offer.kind != SdpKind::Offer {
            return Err(CallError::negotiation_failed("expected an offer"));
        }
        // signaling always costs at least one scheduler turn
        tokio::task::yield_now().await;
        if self.inner.fail_answers.load(Ordering::SeqCst) {
            return Err(CallError::negotiation_failed("simulated signaling failure"));
        }

        if self.scenario == Scenario::PoorConnection {
            let delay = *self.inner.answer_delay.lock().expect("delay lock poisoned");
            debug!(?delay, "delaying answer");
            tokio::time::sleep(delay).await;
        }

        Ok(SessionDescription::answer(echo_answer(
            &offer.sdp,
            self.scenario == Scenario::ScreenShare,
        )))
    }
}

/// Mirror the offer's media sections back as an answer
fn echo_answer(offer_sdp: &str, pass_through: bool) -> String {
    let session_id: u32 = rand::random();
    let mut sdp = format!("v=0\r\no=- {session_id} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\n");
    for line in offer_sdp.lines() {
        let line = line.trim_end();
        if line.starts_with("m=") {
            sdp.push_str(line);
            sdp.push_str("\r\n");
        }
    }
    if pass_through {
        sdp.push_str("m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\n");
        sdp.push_str("a=mid:screen-share\r\n");
    }
    sdp
}
