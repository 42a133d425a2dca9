//! Integration tests for the fault-injection scenarios

mod common;

use std::time::Duration;

use peerline_call_core::{CallStatus, Scenario};

use common::{sim_harness, wait_for, wait_for_status};

#[tokio::test(start_paused = true)]
async fn connection_drop_recovers_autonomously() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    h.client.start_call(Scenario::ConnectionDrop).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
    assert_eq!(h.transports.created_count(), 1);

    // no external network event: the injected fault drives the loss path
    wait_for_status(&mut rx, CallStatus::Retrying).await;
    let session = rx.borrow().clone();
    assert_eq!(session.retry.current_attempt, 1);
    assert_eq!(session.retry.countdown, 3);

    wait_for_status(&mut rx, CallStatus::Connected).await;
    let session = rx.borrow().clone();
    assert_eq!(session.retry.current_attempt, 0);
    assert!(!session.retry.is_retrying);
    assert_eq!(h.transports.created_count(), 2);

    // the fault fires once per call, not once per connection
    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(h.client.status(), CallStatus::Connected);
    assert_eq!(h.transports.created_count(), 2);
}

#[tokio::test(start_paused = true)]
async fn connection_drop_happens_within_the_fault_window() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    h.client.start_call(Scenario::ConnectionDrop).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    let connected_at = tokio::time::Instant::now();
    wait_for_status(&mut rx, CallStatus::Retrying).await;
    let elapsed = connected_at.elapsed();
    // drop after 3s plus a 500ms settle
    assert!(elapsed >= Duration::from_secs(3), "dropped too early: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(5), "dropped too late: {elapsed:?}");
}

#[tokio::test(start_paused = true)]
async fn ending_the_call_disarms_a_pending_drop() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    h.client.start_call(Scenario::ConnectionDrop).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
    h.client.end_call().await.unwrap();

    tokio::time::sleep(Duration::from_secs(30)).await;
    let session = h.client.session();
    assert_eq!(session.status, CallStatus::Disconnected);
    assert!(!session.retry.is_retrying);
    assert_eq!(h.transports.created_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn poor_connection_answers_late_but_connects() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    let started = tokio::time::Instant::now();
    h.client.start_call(Scenario::PoorConnection).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    // the injected signaling delay dominates setup time
    assert!(started.elapsed() >= Duration::from_secs(2));
    assert_eq!(h.client.session().scenario.kind, Scenario::PoorConnection);
}

#[tokio::test]
async fn screen_share_connects_with_pass_through_answer() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    h.client.start_call(Scenario::ScreenShare).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
    wait_for(&mut rx, "remote stream", |s| s.remote_stream.is_some()).await;

    let session = h.client.session();
    assert_eq!(session.scenario.kind, Scenario::ScreenShare);
    assert!(session.scenario.active);
}
