//! Unit tests for the channel state machine and content assembly.

use rstest::rstest;

use super::{ChannelEvent, ChannelLifecycle, ChannelState, Expect};
use crate::{
    error::EngineError,
    method::{
        basic::{self, BasicMethod},
        channel::{self, ChannelMethod},
        properties::{BasicProperties, ContentHeader},
        queue::{DeclareOk, QueueMethod},
    },
    qos::QosScope,
};

fn open_channel(id: u16) -> ChannelState {
    let mut ch = ChannelState::opening(id);
    let mut out = Vec::new();
    ch.handle_channel_method(
        ChannelMethod::OpenOk {
            channel_id: Vec::new(),
        },
        &mut out,
    )
    .expect("open-ok accepted");
    assert_eq!(out, vec![ChannelEvent::Opened]);
    ch
}

fn deliver(tag: u64) -> BasicMethod {
    BasicMethod::Deliver(basic::Deliver {
        consumer_tag: "ctag-1".into(),
        delivery_tag: tag,
        redelivered: false,
        exchange: "logs".into(),
        routing_key: "info".into(),
    })
}

#[test]
fn open_ok_moves_opening_to_open() {
    let ch = open_channel(1);
    assert_eq!(ch.lifecycle(), ChannelLifecycle::Open);
    assert_eq!(ch.pending_calls(), 0);
}

#[test]
fn replies_resolve_in_fifo_order() {
    let mut ch = open_channel(1);
    ch.push_expect(Expect::QueueDeclareOk);
    ch.push_expect(Expect::QueueBindOk);
    ch.push_expect(Expect::ConsumeOk);

    let mut out = Vec::new();
    ch.handle_queue_method(
        QueueMethod::DeclareOk(DeclareOk {
            queue: "jobs".into(),
            message_count: 3,
            consumer_count: 0,
        }),
        &mut out,
    )
    .expect("first reply");
    ch.handle_queue_method(QueueMethod::BindOk, &mut out)
        .expect("second reply");
    ch.handle_basic_method(
        BasicMethod::ConsumeOk {
            consumer_tag: "ctag-1".into(),
        },
        &mut out,
    )
    .expect("third reply");

    assert_eq!(
        out,
        vec![
            ChannelEvent::QueueDeclared {
                queue: "jobs".into(),
                messages: 3,
                consumers: 0,
            },
            ChannelEvent::QueueBound,
            ChannelEvent::ConsumerStarted {
                consumer_tag: "ctag-1".into(),
            },
        ]
    );
    assert_eq!(ch.pending_calls(), 0);
    assert_eq!(ch.consumer_tags().collect::<Vec<_>>(), ["ctag-1"]);
}

#[test]
fn reply_not_matching_oldest_pending_call_is_a_violation() {
    let mut ch = open_channel(1);
    ch.push_expect(Expect::QueueDeclareOk);
    let mut out = Vec::new();
    let err = ch
        .handle_queue_method(QueueMethod::BindOk, &mut out)
        .expect_err("wrong reply shape");
    assert!(matches!(err, EngineError::ProtocolViolation { .. }));
}

#[test]
fn unsolicited_reply_is_a_violation() {
    let mut ch = open_channel(1);
    let mut out = Vec::new();
    let err = ch
        .handle_queue_method(QueueMethod::BindOk, &mut out)
        .expect_err("nothing pending");
    assert!(matches!(err, EngineError::ProtocolViolation { .. }));
}

#[test]
fn content_assembles_across_split_body_frames() {
    let mut ch = open_channel(1);
    let mut out = Vec::new();
    ch.handle_basic_method(deliver(9), &mut out).expect("announced");
    ch.handle_header(
        ContentHeader::basic(11, BasicProperties::default()),
        &mut out,
    )
    .expect("header accepted");
    ch.handle_body(b"hello ", &mut out).expect("first chunk");
    assert!(out.is_empty());
    ch.handle_body(b"world", &mut out).expect("second chunk");

    let [ChannelEvent::Delivered(delivery)] = out.as_slice() else {
        panic!("expected one delivery, got {out:?}");
    };
    assert_eq!(delivery.delivery_tag, 9);
    assert_eq!(&delivery.message.body[..], b"hello world");
}

#[test]
fn zero_size_header_completes_with_empty_body() {
    let mut ch = open_channel(1);
    let mut out = Vec::new();
    ch.handle_basic_method(deliver(1), &mut out).expect("announced");
    ch.handle_header(
        ContentHeader::basic(0, BasicProperties::default()),
        &mut out,
    )
    .expect("header accepted");
    let [ChannelEvent::Delivered(delivery)] = out.as_slice() else {
        panic!("expected one delivery, got {out:?}");
    };
    assert!(delivery.message.body.is_empty());
}

#[test]
fn body_overrunning_declared_size_is_a_violation() {
    let mut ch = open_channel(1);
    let mut out = Vec::new();
    ch.handle_basic_method(deliver(1), &mut out).expect("announced");
    ch.handle_header(
        ContentHeader::basic(4, BasicProperties::default()),
        &mut out,
    )
    .expect("header accepted");
    let err = ch
        .handle_body(b"too long", &mut out)
        .expect_err("overrun");
    assert!(matches!(err, EngineError::ProtocolViolation { .. }));
}

#[rstest]
#[case::body_without_header(true)]
#[case::header_without_method(false)]
fn content_frames_out_of_order_are_violations(#[case] body: bool) {
    let mut ch = open_channel(1);
    let mut out = Vec::new();
    let err = if body {
        ch.handle_body(b"stray", &mut out).expect_err("stray body")
    } else {
        ch.handle_header(
            ContentHeader::basic(1, BasicProperties::default()),
            &mut out,
        )
        .expect_err("stray header")
    };
    assert!(matches!(err, EngineError::ProtocolViolation { .. }));
}

#[test]
fn local_close_fails_pending_calls_with_channel_closing() {
    let mut ch = open_channel(1);
    ch.push_expect(Expect::QueueDeclareOk);
    ch.push_expect(Expect::ConsumeOk);
    let mut out = Vec::new();
    ch.begin_close(&mut out);
    ch.push_expect(Expect::CloseOk);

    assert_eq!(ch.lifecycle(), ChannelLifecycle::Closing);
    assert_eq!(
        out,
        vec![
            ChannelEvent::CallFailed {
                error: EngineError::ChannelClosing,
            };
            2
        ]
    );

    out.clear();
    ch.handle_channel_method(ChannelMethod::CloseOk, &mut out)
        .expect("close-ok accepted");
    assert_eq!(ch.lifecycle(), ChannelLifecycle::Closed);
    assert_eq!(out, vec![ChannelEvent::CloseConfirmed]);
}

#[test]
fn peer_close_with_error_code_surfaces_a_channel_error() {
    let mut ch = open_channel(1);
    ch.push_expect(Expect::QueueDeclareOk);
    let mut out = Vec::new();
    ch.handle_channel_method(
        ChannelMethod::Close(channel::Close {
            reply_code: 406,
            reply_text: "precondition failed".into(),
            failing_class: 50,
            failing_method: 10,
        }),
        &mut out,
    )
    .expect("peer close accepted");

    assert_eq!(ch.lifecycle(), ChannelLifecycle::Closed);
    assert_eq!(
        out,
        vec![
            ChannelEvent::CallFailed {
                error: EngineError::ChannelClosing,
            },
            ChannelEvent::ClosedByPeer {
                error: Some(EngineError::Channel {
                    code: 406,
                    text: "precondition failed".into(),
                }),
            },
        ]
    );
}

#[test]
fn get_resolves_on_either_get_ok_or_get_empty() {
    let mut ch = open_channel(1);
    ch.push_expect(Expect::Get);
    let mut out = Vec::new();
    ch.handle_basic_method(
        BasicMethod::GetEmpty {
            cluster_id: String::new(),
        },
        &mut out,
    )
    .expect("empty reply accepted");
    assert_eq!(out, vec![ChannelEvent::FetchEmpty]);

    ch.push_expect(Expect::Get);
    out.clear();
    ch.handle_basic_method(
        BasicMethod::GetOk(basic::GetOk {
            delivery_tag: 2,
            redelivered: false,
            exchange: String::new(),
            routing_key: "jobs".into(),
            message_count: 0,
        }),
        &mut out,
    )
    .expect("get-ok accepted");
    ch.handle_header(
        ContentHeader::basic(2, BasicProperties::default()),
        &mut out,
    )
    .expect("header accepted");
    ch.handle_body(b"ok", &mut out).expect("body accepted");
    let [ChannelEvent::Fetched(fetched)] = out.as_slice() else {
        panic!("expected a fetch, got {out:?}");
    };
    assert_eq!(fetched.delivery_tag, 2);
}

#[test]
fn channel_qos_ack_promotes_channel_scope_tracker() {
    let mut ch = open_channel(1);
    assert!(ch.qos_mut().request(crate::qos::QosSettings {
        prefetch_size: 0,
        prefetch_count: 16,
    }));
    ch.push_expect(Expect::QosOk {
        scope: QosScope::Channel,
    });
    let mut out = Vec::new();
    ch.handle_basic_method(BasicMethod::QosOk, &mut out)
        .expect("qos-ok accepted");
    assert_eq!(
        out,
        vec![ChannelEvent::QosConfirmed {
            scope: QosScope::Channel,
        }]
    );
    assert_eq!(ch.qos().active().prefetch_count, 16);
}
