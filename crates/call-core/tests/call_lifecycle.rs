//! Integration tests for the basic call lifecycle
//!
//! Connect flow, mute toggling, device updates and idempotent teardown over
//! the simulated platform.

mod common;

use peerline_call_core::{CallError, CallStatus, PeerTransport, Scenario, TrackKind};
use peerline_media_sim::SimMediaProvider;

use common::{sim_harness, wait_for, wait_for_status};

#[tokio::test]
async fn basic_call_reaches_connected_through_expected_statuses() {
    let h = sim_harness().await;
    assert_eq!(h.client.status(), CallStatus::Idle);

    let mut rx = h.client.subscribe();
    let recorder = tokio::spawn(async move {
        let mut statuses = Vec::new();
        loop {
            let status = rx.borrow_and_update().status;
            if statuses.last() != Some(&status) {
                statuses.push(status);
            }
            if status == CallStatus::Connected {
                return statuses;
            }
            if rx.changed().await.is_err() {
                return statuses;
            }
        }
    });

    h.client.start_call(Scenario::Basic).await.unwrap();
    let statuses = recorder.await.unwrap();
    assert_eq!(
        statuses,
        vec![
            CallStatus::RequestingPermissions,
            CallStatus::Connecting,
            CallStatus::Connected,
        ]
    );

    let session = h.client.session();
    assert!(session.local_stream.is_some());
    assert!(session.peer_connection.is_some());
    assert!(session.scenario.active);
    assert_eq!(session.scenario.kind, Scenario::Basic);
    assert!(session.errors.is_empty());
    assert_eq!(h.transports.created_count(), 1);
    assert_eq!(h.negotiation.peers_built(), 1);
}

#[tokio::test]
async fn remote_stream_arrives_without_status_change() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();

    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
    wait_for(&mut rx, "remote stream", |s| s.remote_stream.is_some()).await;

    let session = h.client.session();
    let remote = session.remote_stream.unwrap();
    // echo peer mirrors our audio+video
    assert_eq!(remote.tracks().len(), 2);
    assert_eq!(session.status, CallStatus::Connected);
}

#[tokio::test]
async fn toggle_audio_flips_settings_and_track_state() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    let track = h
        .transports
        .last()
        .unwrap()
        .senders()
        .into_iter()
        .find(|s| s.kind() == TrackKind::Audio)
        .unwrap()
        .track()
        .unwrap();
    assert!(track.is_enabled());
    assert!(h.client.session().settings.audio_enabled);

    // odd number of toggles: negated
    for _ in 0..3 {
        h.client.toggle_audio().await.unwrap();
    }
    assert!(!h.client.session().settings.audio_enabled);
    assert!(!track.is_enabled());
    assert!(!track.is_stopped(), "mute must not stop the track");

    // even it out: back to the original
    h.client.toggle_audio().await.unwrap();
    assert!(h.client.session().settings.audio_enabled);
    assert!(track.is_enabled());

    // video was never touched
    assert!(h.client.session().settings.video_enabled);
}

#[tokio::test]
async fn toggle_video_mirrors_track_enabled_state() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    let track = h
        .transports
        .last()
        .unwrap()
        .senders()
        .into_iter()
        .find(|s| s.kind() == TrackKind::Video)
        .unwrap()
        .track()
        .unwrap();

    h.client.toggle_video().await.unwrap();
    assert!(!h.client.session().settings.video_enabled);
    assert!(!track.is_enabled());

    h.client.toggle_video().await.unwrap();
    assert!(h.client.session().settings.video_enabled);
    assert!(track.is_enabled());
}

#[tokio::test]
async fn end_call_releases_everything_and_is_idempotent() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    let local = h.client.session().local_stream.unwrap();
    assert!(h.negotiation.is_started());

    h.client.end_call().await.unwrap();
    let session = h.client.session();
    assert_eq!(session.status, CallStatus::Disconnected);
    assert!(session.local_stream.is_none());
    assert!(session.remote_stream.is_none());
    assert!(session.peer_connection.is_none());
    assert!(!session.scenario.active);
    assert!(!session.retry.is_retrying);
    assert!(local.tracks().iter().all(|t| t.is_stopped()));
    assert!(!h.negotiation.is_started());

    // a second end must not fail or change the outcome
    h.client.end_call().await.unwrap();
    assert_eq!(h.client.status(), CallStatus::Disconnected);
}

#[tokio::test]
async fn starting_while_connected_is_a_state_error() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;

    let err = h.client.start_call(Scenario::Basic).await.unwrap_err();
    assert!(matches!(err, CallError::InvalidCallState { .. }));
    assert_eq!(h.client.status(), CallStatus::Connected);

    // a finished call can be restarted
    h.client.end_call().await.unwrap();
    h.client.start_call(Scenario::Basic).await.unwrap();
    wait_for_status(&mut rx, CallStatus::Connected).await;
}

#[tokio::test]
async fn device_changes_refresh_the_session_list() {
    let h = sim_harness().await;
    let mut rx = h.client.subscribe();
    assert_eq!(h.client.session().devices.len(), 3);

    h.media.set_devices(SimMediaProvider::dual_camera_devices());
    wait_for(&mut rx, "device list refresh", |s| s.devices.len() == 4).await;
}
