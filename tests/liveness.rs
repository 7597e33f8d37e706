//! Integration tests for heartbeat scheduling and the liveness timeout.

mod common;

use std::time::{Duration, Instant};

use amqpwire::{ConnectionState, EngineError};
use common::{SentFrame, decode_sent, feed, heartbeat_frame, open_connection};

#[test]
fn a_heartbeat_is_sent_after_one_interval_of_send_silence() {
    let mut conn = open_connection();
    let t0 = Instant::now();
    conn.tick(t0);
    assert!(conn.handler().sent.is_empty());

    conn.tick(t0 + Duration::from_secs(59));
    assert!(conn.handler().sent.is_empty());

    conn.tick(t0 + Duration::from_secs(61));
    let sent = decode_sent(&conn.handler_mut().drain_sent());
    assert_eq!(sent, vec![SentFrame::Heartbeat]);
}

#[test]
fn the_deadline_reflects_the_negotiated_interval() {
    let mut conn = open_connection();
    let t0 = Instant::now();
    conn.tick(t0);
    assert_eq!(conn.next_deadline(), Some(t0 + Duration::from_secs(60)));
}

#[test]
fn two_intervals_of_silence_kill_the_connection() {
    let mut conn = open_connection();
    let t0 = Instant::now();
    conn.tick(t0);

    conn.tick(t0 + Duration::from_secs(121));
    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(
        conn.handler().errors.as_slice(),
        [EngineError::HeartbeatTimeout { silent }] if *silent >= Duration::from_secs(120)
    ));
    assert_eq!(conn.handler().closed, 1);
}

#[test]
fn a_received_heartbeat_frame_defers_the_timeout() {
    let mut conn = open_connection();
    let t0 = Instant::now();
    conn.tick(t0);

    feed(&mut conn, &heartbeat_frame());
    assert_eq!(conn.handler().heartbeats, 1);

    // The mark is folded at this tick, so the timeout counts from here.
    conn.tick(t0 + Duration::from_secs(100));
    conn.tick(t0 + Duration::from_secs(219));
    assert_eq!(conn.state(), ConnectionState::Open);

    conn.tick(t0 + Duration::from_secs(221));
    assert_eq!(conn.state(), ConnectionState::Closed);
}

#[test]
fn outgoing_traffic_resets_the_send_timer() {
    let mut conn = open_connection();
    let t0 = Instant::now();
    conn.tick(t0);

    // Any transmitted frame counts as send activity.
    assert!(conn.open_channel().is_some());
    conn.tick(t0 + Duration::from_secs(50));
    conn.handler_mut().drain_sent();

    conn.tick(t0 + Duration::from_secs(100));
    assert!(conn.handler().sent.is_empty(), "no heartbeat needed yet");
}
