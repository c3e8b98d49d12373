// SPDX-License-Identifier: MIT

//! Moving-edge forced fixes (with cooldown) and sync retry behavior.

mod common;

use std::time::Duration;

use aegis_tracker::models::{AlertState, TrackingProfile};
use aegis_tracker::sdk::mock::MockCall;
use aegis_tracker::sdk::SdkEvent;
use common::{harness, login, open_alert, settle};

async fn activate(h: &common::Harness) {
    login(h, "u1", "tok-1").await;
    h.alerts.set(AlertState {
        alerting: vec![open_alert(1, "u1")],
    });
    settle().await;
    assert_eq!(
        h.controller.current_profile().await,
        Some(TrackingProfile::Active)
    );
}

fn emit_moving_edge(h: &common::Harness) {
    h.sdk.set_moving(true);
    h.sdk.emit(SdkEvent::MotionChange {
        is_moving: true,
        location: None,
    });
}

#[tokio::test(start_paused = true)]
async fn test_moving_edge_triggers_fix_and_sync() {
    let h = harness().await;
    activate(&h).await;

    let fixes_before = h.sdk.position_requests().len();
    let syncs_before = h.sdk.calls_matching(|c| matches!(c, MockCall::Sync));

    emit_moving_edge(&h);
    settle().await;

    let requests = h.sdk.position_requests();
    assert_eq!(requests.len(), fixes_before + 1);
    let edge_fix = requests.last().expect("edge fix requested");
    assert!(edge_fix.persist);
    assert_eq!(
        h.sdk.calls_matching(|c| matches!(c, MockCall::Sync)),
        syncs_before + 1
    );
}

#[tokio::test(start_paused = true)]
async fn test_second_edge_within_cooldown_is_noop() {
    let h = harness().await;
    activate(&h).await;

    emit_moving_edge(&h);
    settle().await;
    let fixes_after_first = h.sdk.position_requests().len();

    tokio::time::advance(Duration::from_secs(60)).await;
    emit_moving_edge(&h);
    settle().await;

    assert_eq!(
        h.sdk.position_requests().len(),
        fixes_after_first,
        "edge within 5-minute cooldown must not force a fix"
    );

    // Past the cooldown the next edge fires again.
    tokio::time::advance(Duration::from_secs(5 * 60)).await;
    emit_moving_edge(&h);
    settle().await;

    assert_eq!(h.sdk.position_requests().len(), fixes_after_first + 1);
}

#[tokio::test(start_paused = true)]
async fn test_moving_edge_ignored_while_idle() {
    let h = harness().await;
    login(&h, "u1", "tok-1").await;
    assert_eq!(h.controller.current_profile().await, Some(TrackingProfile::Idle));

    let fixes_before = h.sdk.position_requests().len();
    emit_moving_edge(&h);
    settle().await;

    assert_eq!(h.sdk.position_requests().len(), fixes_before);
}

#[tokio::test(start_paused = true)]
async fn test_sync_retries_then_succeeds() {
    let h = harness().await;
    // Fail the first two sync attempts of the login (user-switch) sequence.
    h.sdk.fail_next_syncs(2);

    login(&h, "u1", "tok-1").await;

    // Three attempts total, each preceded by a queue-depth snapshot.
    assert_eq!(h.sdk.calls_matching(|c| matches!(c, MockCall::Sync)), 3);
    assert_eq!(h.sdk.calls_matching(|c| matches!(c, MockCall::GetCount)), 3);
    // The failure never escaped: setup completed normally.
    assert_eq!(h.controller.current_profile().await, Some(TrackingProfile::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_sync_gives_up_after_three_attempts() {
    let h = harness().await;
    h.sdk.fail_next_syncs(5);

    login(&h, "u1", "tok-1").await;

    assert_eq!(h.sdk.calls_matching(|c| matches!(c, MockCall::Sync)), 3);
    // Exhaustion degrades, it does not crash or block the profile.
    assert_eq!(h.controller.current_profile().await, Some(TrackingProfile::Idle));
}

#[tokio::test(start_paused = true)]
async fn test_fix_failure_does_not_block_sync() {
    let h = harness().await;
    h.sdk.fail_next_positions(1);

    login(&h, "u1", "tok-1").await;

    // The forced fix failed but the sync sequence still ran.
    assert_eq!(h.sdk.calls_matching(|c| matches!(c, MockCall::Sync)), 1);
    assert_eq!(h.controller.current_profile().await, Some(TrackingProfile::Idle));
}
