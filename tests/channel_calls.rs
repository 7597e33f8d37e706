//! Integration tests for channel lifecycle and synchronous call matching.

mod common;

use amqpwire::{
    ChannelLifecycle,
    ConnectionState,
    EngineError,
    FieldTable,
    Method,
    QueueOptions,
    method::{
        channel::{ChannelMethod, Close},
        queue::{DeclareOk, QueueMethod},
    },
};
use common::{SentFrame, decode_sent, feed, method_frame, open_channel, open_connection};

#[test]
fn channel_open_is_confirmed_by_the_server() {
    let mut conn = open_connection();
    let id = conn.open_channel().expect("first channel id");
    assert_eq!(id, 1);
    assert_eq!(conn.channel_state(id), ChannelLifecycle::Opening);

    let sent = decode_sent(&conn.handler_mut().drain_sent());
    assert!(matches!(
        sent.as_slice(),
        [SentFrame::Method(1, Method::Channel(ChannelMethod::Open { .. }))]
    ));

    feed(
        &mut conn,
        &method_frame(
            id,
            &Method::Channel(ChannelMethod::OpenOk {
                channel_id: Vec::new(),
            }),
        ),
    );
    assert_eq!(conn.channel_state(id), ChannelLifecycle::Open);
    assert_eq!(conn.handler().channels_open, vec![id]);
}

#[test]
fn replies_resolve_calls_in_send_order() {
    let mut conn = open_connection();
    let id = open_channel(&mut conn);

    assert!(conn.declare_queue(id, "jobs", QueueOptions::default()));
    assert!(conn.bind_queue(id, "jobs", "work", "jobs.#", FieldTable::new()));

    feed(
        &mut conn,
        &method_frame(
            id,
            &Method::Queue(QueueMethod::DeclareOk(DeclareOk {
                queue: "jobs".to_owned(),
                message_count: 7,
                consumer_count: 1,
            })),
        ),
    );
    feed(&mut conn, &method_frame(id, &Method::Queue(QueueMethod::BindOk)));

    assert_eq!(
        conn.handler().queues_declared,
        vec![(id, "jobs".to_owned(), 7, 1)]
    );
    assert!(conn.handler().errors.is_empty());
}

#[test]
fn a_reply_out_of_order_tears_the_connection_down() {
    let mut conn = open_connection();
    let id = open_channel(&mut conn);

    assert!(conn.declare_queue(id, "jobs", QueueOptions::default()));
    // BindOk cannot answer the pending declare.
    feed(&mut conn, &method_frame(id, &Method::Queue(QueueMethod::BindOk)));

    assert_eq!(conn.state(), ConnectionState::Closed);
    assert!(matches!(
        conn.handler().errors.as_slice(),
        [EngineError::ProtocolViolation { .. }]
    ));
}

#[test]
fn traffic_on_one_channel_never_touches_another() {
    let mut conn = open_connection();
    let first = open_channel(&mut conn);
    let second = open_channel(&mut conn);

    assert!(conn.declare_queue(first, "a", QueueOptions::default()));
    assert!(conn.declare_queue(second, "b", QueueOptions::default()));

    // The second channel answers before the first.
    feed(
        &mut conn,
        &method_frame(
            second,
            &Method::Queue(QueueMethod::DeclareOk(DeclareOk {
                queue: "b".to_owned(),
                message_count: 0,
                consumer_count: 0,
            })),
        ),
    );
    feed(
        &mut conn,
        &method_frame(
            first,
            &Method::Queue(QueueMethod::DeclareOk(DeclareOk {
                queue: "a".to_owned(),
                message_count: 0,
                consumer_count: 0,
            })),
        ),
    );

    assert_eq!(
        conn.handler().queues_declared,
        vec![
            (second, "b".to_owned(), 0, 0),
            (first, "a".to_owned(), 0, 0),
        ]
    );
    assert!(conn.handler().errors.is_empty());
}

#[test]
fn local_channel_close_round_trips() {
    let mut conn = open_connection();
    let id = open_channel(&mut conn);

    assert!(conn.close_channel(id));
    assert_eq!(conn.channel_state(id), ChannelLifecycle::Closing);
    let sent = decode_sent(&conn.handler_mut().drain_sent());
    assert!(matches!(
        sent.as_slice(),
        [SentFrame::Method(
            1,
            Method::Channel(ChannelMethod::Close(Close { reply_code: 200, .. }))
        )]
    ));

    feed(&mut conn, &method_frame(id, &Method::Channel(ChannelMethod::CloseOk)));
    assert_eq!(conn.channel_state(id), ChannelLifecycle::Closed);
    assert_eq!(conn.handler().channels_closed, vec![id]);

    // The id is reusable only now that the close is confirmed.
    assert_eq!(conn.open_channel(), Some(id));
}

#[test]
fn peer_channel_close_reports_a_channel_error_and_spares_the_rest() {
    let mut conn = open_connection();
    let failing = open_channel(&mut conn);
    let surviving = open_channel(&mut conn);

    let close = method_frame(
        failing,
        &Method::Channel(ChannelMethod::Close(Close {
            reply_code: 406,
            reply_text: "precondition failed".to_owned(),
            failing_class: 50,
            failing_method: 10,
        })),
    );
    feed(&mut conn, &close);

    assert_eq!(conn.channel_state(failing), ChannelLifecycle::Closed);
    assert_eq!(conn.channel_state(surviving), ChannelLifecycle::Open);
    assert_eq!(conn.state(), ConnectionState::Open);
    assert_eq!(
        conn.handler().channel_errors,
        vec![(
            failing,
            EngineError::Channel {
                code: 406,
                text: "precondition failed".to_owned(),
            }
        )]
    );
    // The close was acknowledged on the wire.
    let sent = decode_sent(&conn.handler_mut().drain_sent());
    assert!(matches!(
        sent.as_slice(),
        [SentFrame::Method(1, Method::Channel(ChannelMethod::CloseOk))]
    ));
}

#[test]
fn connection_close_fails_pending_calls_on_every_channel() {
    let mut conn = open_connection();
    let first = open_channel(&mut conn);
    let second = open_channel(&mut conn);
    assert!(conn.declare_queue(first, "a", QueueOptions::default()));
    assert!(conn.declare_queue(second, "b", QueueOptions::default()));

    assert!(conn.close());

    assert_eq!(conn.channel_state(first), ChannelLifecycle::Closed);
    assert_eq!(conn.channel_state(second), ChannelLifecycle::Closed);
    assert_eq!(
        conn.handler().call_failures,
        vec![
            (first, EngineError::ConnectionClosing),
            (second, EngineError::ConnectionClosing),
        ]
    );
    assert_eq!(conn.handler().channels_closed, vec![first, second]);
    assert!(!conn.close());
}

#[test]
fn late_frames_for_a_released_channel_are_discarded() {
    let mut conn = open_connection();
    let id = open_channel(&mut conn);
    assert!(conn.close_channel(id));
    feed(&mut conn, &method_frame(id, &Method::Channel(ChannelMethod::CloseOk)));

    // A server reply racing the close must not kill the connection.
    feed(
        &mut conn,
        &method_frame(
            id,
            &Method::Queue(QueueMethod::DeclareOk(DeclareOk {
                queue: "late".to_owned(),
                message_count: 0,
                consumer_count: 0,
            })),
        ),
    );
    assert_eq!(conn.state(), ConnectionState::Open);
    assert!(conn.handler().errors.is_empty());
}
