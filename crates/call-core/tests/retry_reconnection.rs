//! Integration tests for the reconnection state machine
//!
//! All timing runs under tokio's paused clock, so the one-second countdown
//! cadence executes instantly and deterministically.

mod common;

use std::time::Duration;

use peerline_call_core::{CallStatus, ErrorKind, PeerConnectionState, PeerTransport, Scenario};

use common::{sim_harness, wait_for, wait_for_status};

#[tokio::test(start_paused = true)]
async fn organic_loss_recovers_with_observable_countdown() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
    assert_eq!(h.transports.created_count(), 1);

    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Failed);
    wait_for_status(&mut rx, CallStatus::Retrying).await;

    let snapshot = rx.borrow().clone();
    assert!(snapshot.retry.is_retrying);
    assert_eq!(snapshot.retry.current_attempt, 1);
    assert_eq!(snapshot.retry.countdown, 3, "countdown always starts at 3");

    // every decrement is a distinct observable update
    let mut seen = vec![snapshot.retry.countdown];
    while rx.borrow().status != CallStatus::Connected {
        rx.changed().await.unwrap();
        let s = rx.borrow().clone();
        if s.retry.is_retrying && seen.last() != Some(&s.retry.countdown) {
            seen.push(s.retry.countdown);
        }
    }
    assert_eq!(seen, vec![3, 2, 1, 0]);

    // reconnected: retry state fully cleared
    let session = rx.borrow().clone();
    assert_eq!(session.retry.current_attempt, 0);
    assert!(!session.retry.is_retrying);
    assert_eq!(session.retry.countdown, 3);
    assert_eq!(h.transports.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn attempts_cap_at_three_then_give_up() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    // every reconnection handshake will fail at the answer
    h.negotiation.set_fail_answers(true);
    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Failed);

    let mut max_attempt = 0;
    loop {
        rx.changed().await.unwrap();
        let s = rx.borrow().clone();
        max_attempt = max_attempt.max(s.retry.current_attempt);
        if s.status == CallStatus::Disconnected {
            break;
        }
    }

    let session = rx.borrow().clone();
    assert_eq!(max_attempt, 3, "attempts never exceed the cap");
    assert_eq!(session.retry.current_attempt, 0, "counter resets on give-up");
    assert!(!session.retry.is_retrying);
    // give-up is a full teardown: handles dropped, dead transport closed
    assert!(session.local_stream.is_none());
    assert!(session.peer_connection.is_none());
    assert_eq!(
        h.transports.last().unwrap().connection_state(),
        PeerConnectionState::Closed
    );
    // one transport per call attempt: the original plus three retries
    assert_eq!(h.transports.created_count(), 4);
    assert_eq!(h.negotiation.peers_built(), 4);
    // each failed handshake is on the log
    let connection_errors = session
        .errors
        .iter()
        .filter(|e| e.kind == ErrorKind::Connection)
        .count();
    assert!(connection_errors >= 3, "got {connection_errors} connection errors");

    // terminal, not fatal: the user can start over manually
    h.client.start_call(Scenario::Basic).await.unwrap_err();
    h.negotiation.set_fail_answers(false);
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
}

#[tokio::test(start_paused = true)]
async fn success_on_a_later_attempt_resets_the_counter() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    h.negotiation.set_fail_answers(true);
    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Disconnected);

    // let attempt 1 fail, then heal the signaling path during attempt 2
    wait_for(&mut rx, "second attempt", |s| s.retry.current_attempt == 2).await;
    h.negotiation.set_fail_answers(false);

    wait_for_status(&mut rx, CallStatus::Connected).await;
    let session = rx.borrow().clone();
    assert_eq!(session.retry.current_attempt, 0);
    assert!(!session.retry.is_retrying);
}

#[tokio::test(start_paused = true)]
async fn countdown_restarts_at_three_on_every_attempt() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    h.negotiation.set_fail_answers(true);
    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Failed);

    let mut attempt_starts = Vec::new();
    let mut last_attempt = 0;
    loop {
        rx.changed().await.unwrap();
        let s = rx.borrow().clone();
        if s.retry.is_retrying && s.retry.current_attempt != last_attempt {
            last_attempt = s.retry.current_attempt;
            attempt_starts.push(s.retry.countdown);
        }
        if s.status == CallStatus::Disconnected {
            break;
        }
    }
    assert_eq!(attempt_starts, vec![3, 3, 3]);
}

#[tokio::test(start_paused = true)]
async fn end_call_during_countdown_cancels_the_retry() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Failed);
    wait_for_status(&mut rx, CallStatus::Retrying).await;

    h.client.end_call().await.unwrap();
    let session = h.client.session();
    assert_eq!(session.status, CallStatus::Disconnected);
    assert!(!session.retry.is_retrying);
    assert_eq!(session.retry.current_attempt, 0);

    // nothing fires after teardown: no countdown, no reconnection
    let transports_before = h.transports.created_count();
    tokio::time::sleep(Duration::from_secs(30)).await;
    let session = h.client.session();
    assert_eq!(session.status, CallStatus::Disconnected);
    assert!(!session.retry.is_retrying);
    assert_eq!(session.retry.countdown, 3);
    assert_eq!(h.transports.created_count(), transports_before);
}

#[tokio::test(start_paused = true)]
async fn countdown_ticks_on_a_one_second_cadence() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    h.transports
        .last()
        .unwrap()
        .inject_connection_state(PeerConnectionState::Failed);
    wait_for_status(&mut rx, CallStatus::Retrying).await;

    let started = tokio::time::Instant::now();
    wait_for(&mut rx, "countdown to reach zero", |s| {
        s.retry.is_retrying && s.retry.countdown == 0
    })
    .await;
    let elapsed = started.elapsed();
    assert!(
        elapsed >= Duration::from_secs(3),
        "countdown finished too fast: {elapsed:?}"
    );
    assert!(
        elapsed < Duration::from_secs(4),
        "countdown ran long: {elapsed:?}"
    );
}
