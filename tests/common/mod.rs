//! Shared utilities for integration tests: a recording handler, wire-frame
//! builders playing the server side of the conversation, and helpers that
//! drive a connection through the handshake.

#![allow(
    dead_code,
    reason = "shared test utilities are not used by all test binaries"
)]

use amqpwire::{
    BasicProperties,
    ChannelId,
    Connection,
    ConnectionHandler,
    ConnectionState,
    Delivery,
    EngineError,
    FetchedMessage,
    FieldTable,
    Method,
    ReturnedMessage,
    frame::{self, FrameKind, FrameStream, PROTOCOL_PREAMBLE},
    method::{
        channel::ChannelMethod,
        connection::{ConnectionMethod, OpenOk, Start, Tune},
        properties::ContentHeader,
    },
};
use bytes::{Bytes, BytesMut};

/// Handler that records every callback for later assertions.
#[derive(Debug, Default)]
pub struct Recorder {
    pub sent: Vec<u8>,
    pub ready: bool,
    pub closed: u32,
    pub errors: Vec<EngineError>,
    pub heartbeats: u32,
    pub channels_open: Vec<ChannelId>,
    pub channels_closed: Vec<ChannelId>,
    pub channel_errors: Vec<(ChannelId, EngineError)>,
    pub flow_changes: Vec<(ChannelId, bool)>,
    pub call_failures: Vec<(ChannelId, EngineError)>,
    pub consumers_started: Vec<(ChannelId, String)>,
    pub consumers_cancelled: Vec<(ChannelId, String)>,
    pub queues_declared: Vec<(ChannelId, String, u32, u32)>,
    pub deliveries: Vec<(ChannelId, Delivery)>,
    pub returns: Vec<(ChannelId, ReturnedMessage)>,
    pub fetches: Vec<(ChannelId, FetchedMessage)>,
    pub fetch_empties: Vec<ChannelId>,
}

impl ConnectionHandler for Recorder {
    fn on_data(&mut self, data: &[u8]) { self.sent.extend_from_slice(data); }

    fn on_ready(&mut self) { self.ready = true; }

    fn on_closed(&mut self) { self.closed += 1; }

    fn on_error(&mut self, error: &EngineError) { self.errors.push(error.clone()); }

    fn on_heartbeat(&mut self) { self.heartbeats += 1; }

    fn on_channel_open(&mut self, channel: ChannelId) { self.channels_open.push(channel); }

    fn on_channel_closed(&mut self, channel: ChannelId) { self.channels_closed.push(channel); }

    fn on_channel_error(&mut self, channel: ChannelId, error: &EngineError) {
        self.channel_errors.push((channel, error.clone()));
    }

    fn on_channel_flow(&mut self, channel: ChannelId, active: bool) {
        self.flow_changes.push((channel, active));
    }

    fn on_call_failed(&mut self, channel: ChannelId, error: &EngineError) {
        self.call_failures.push((channel, error.clone()));
    }

    fn on_consumer_started(&mut self, channel: ChannelId, consumer_tag: &str) {
        self.consumers_started.push((channel, consumer_tag.to_owned()));
    }

    fn on_consumer_cancelled(&mut self, channel: ChannelId, consumer_tag: &str) {
        self.consumers_cancelled.push((channel, consumer_tag.to_owned()));
    }

    fn on_queue_declared(&mut self, channel: ChannelId, queue: &str, messages: u32, consumers: u32) {
        self.queues_declared
            .push((channel, queue.to_owned(), messages, consumers));
    }

    fn on_delivery(&mut self, channel: ChannelId, delivery: &Delivery) {
        self.deliveries.push((channel, delivery.clone()));
    }

    fn on_returned(&mut self, channel: ChannelId, returned: &ReturnedMessage) {
        self.returns.push((channel, returned.clone()));
    }

    fn on_fetched(&mut self, channel: ChannelId, fetched: &FetchedMessage) {
        self.fetches.push((channel, fetched.clone()));
    }

    fn on_fetch_empty(&mut self, channel: ChannelId) { self.fetch_empties.push(channel); }
}

impl Recorder {
    /// Take and clear everything written to the wire so far.
    pub fn drain_sent(&mut self) -> Vec<u8> { std::mem::take(&mut self.sent) }
}

/// A decoded frame the client transmitted, for assertions.
#[derive(Debug, PartialEq)]
pub enum SentFrame {
    Method(u16, Method),
    Header(u16, ContentHeader),
    Body(u16, Vec<u8>),
    Heartbeat,
}

/// Decode the client's outgoing byte stream into frames, skipping the
/// protocol preamble if present.
pub fn decode_sent(bytes: &[u8]) -> Vec<SentFrame> {
    let rest = bytes
        .strip_prefix(PROTOCOL_PREAMBLE.as_slice())
        .unwrap_or(bytes);
    let mut stream = FrameStream::new(rest, 0);
    let mut frames = Vec::new();
    while let Some(frame) = stream.next_frame().expect("client wrote a valid frame") {
        frames.push(match frame.kind {
            FrameKind::Method => SentFrame::Method(
                frame.channel,
                Method::decode(frame.payload).expect("client wrote a valid method"),
            ),
            FrameKind::Header => SentFrame::Header(
                frame.channel,
                ContentHeader::decode(frame.payload).expect("client wrote a valid header"),
            ),
            FrameKind::Body => SentFrame::Body(frame.channel, frame.payload.to_vec()),
            FrameKind::Heartbeat => SentFrame::Heartbeat,
        });
    }
    assert_eq!(stream.consumed(), rest.len(), "client wrote only whole frames");
    frames
}

/// Encode one server-side method frame.
pub fn method_frame(channel: u16, method: &Method) -> Vec<u8> {
    let mut payload = BytesMut::new();
    method.encode(&mut payload).expect("test method encodes");
    let mut buf = BytesMut::new();
    frame::write_frame(&mut buf, FrameKind::Method, channel, &payload);
    buf.to_vec()
}

/// Encode a server-side content-header frame.
pub fn header_frame(channel: u16, body_size: u64, properties: BasicProperties) -> Vec<u8> {
    let mut payload = BytesMut::new();
    ContentHeader::basic(body_size, properties)
        .encode(&mut payload)
        .expect("test header encodes");
    let mut buf = BytesMut::new();
    frame::write_frame(&mut buf, FrameKind::Header, channel, &payload);
    buf.to_vec()
}

/// Encode a server-side content-body frame.
pub fn body_frame(channel: u16, chunk: &[u8]) -> Vec<u8> {
    let mut buf = BytesMut::new();
    frame::write_frame(&mut buf, FrameKind::Body, channel, chunk);
    buf.to_vec()
}

/// Encode a heartbeat frame.
pub fn heartbeat_frame() -> Vec<u8> {
    let mut buf = BytesMut::new();
    frame::write_heartbeat(&mut buf);
    buf.to_vec()
}

/// The server greeting offering PLAIN authentication.
pub fn server_start() -> Vec<u8> {
    method_frame(
        0,
        &Method::Connection(ConnectionMethod::Start(Start {
            version_major: 0,
            version_minor: 9,
            server_properties: FieldTable::new(),
            mechanisms: Bytes::from_static(b"PLAIN AMQPLAIN"),
            locales: Bytes::from_static(b"en_US"),
        })),
    )
}

/// The server tune proposal.
pub fn server_tune(channel_max: u16, frame_max: u32, heartbeat: u16) -> Vec<u8> {
    method_frame(
        0,
        &Method::Connection(ConnectionMethod::Tune(Tune {
            channel_max,
            frame_max,
            heartbeat,
        })),
    )
}

/// The server's open confirmation.
pub fn server_open_ok() -> Vec<u8> {
    method_frame(
        0,
        &Method::Connection(ConnectionMethod::OpenOk(OpenOk {
            known_hosts: String::new(),
        })),
    )
}

/// Feed `bytes`, asserting the engine consumes them whole.
pub fn feed(conn: &mut Connection<Recorder>, bytes: &[u8]) {
    let consumed = conn.parse(bytes);
    assert_eq!(consumed, bytes.len(), "engine consumed whole frames");
}

/// Drive a fresh connection through the full handshake with default
/// options against a permissive server.
pub fn open_connection() -> Connection<Recorder> {
    let mut conn = Connection::new(Recorder::default());
    feed(&mut conn, &server_start());
    feed(&mut conn, &server_tune(0, 131_072, 60));
    feed(&mut conn, &server_open_ok());
    assert_eq!(conn.state(), ConnectionState::Open);
    assert!(conn.handler().ready);
    conn.handler_mut().drain_sent();
    conn
}

/// Open a channel and confirm it from the server side.
pub fn open_channel(conn: &mut Connection<Recorder>) -> ChannelId {
    let id = conn.open_channel().expect("channel id available");
    feed(
        conn,
        &method_frame(
            id,
            &Method::Channel(ChannelMethod::OpenOk {
                channel_id: Vec::new(),
            }),
        ),
    );
    assert!(conn.handler().channels_open.contains(&id));
    conn.handler_mut().drain_sent();
    id
}
