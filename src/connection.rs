//! The connection: handshake, frame dispatch, and the channel registry.
//!
//! A [`Connection`] owns no socket and spawns no tasks. Construction
//! transmits the protocol preamble through the handler; from then on the
//! caller feeds received bytes into [`parse`](Connection::parse) and drives
//! time through [`tick`](Connection::tick). Every state change happens
//! synchronously inside one of those calls, on the caller's thread.
//!
//! `parse` is stateless across calls: it consumes whole frames and reports
//! how many bytes it used, and the caller re-presents the unconsumed tail
//! prepended to whatever arrives next. Frames are routed by channel id —
//! 0 is the connection itself, everything else goes through the registry to
//! its channel state machine, whose resulting events are applied here:
//! acknowledgement frames are transmitted and handler callbacks invoked.

use std::time::Instant;

use bytes::BytesMut;
use tracing::{debug, warn};

use crate::{
    channel::{ChannelEvent, ChannelId, ChannelLifecycle, ChannelState, Expect},
    codec::FieldTable,
    error::EngineError,
    frame::{
        FRAME_OVERHEAD,
        Frame,
        FrameKind,
        FrameStream,
        PROTOCOL_PREAMBLE,
        write_frame,
        write_heartbeat,
    },
    handler::ConnectionHandler,
    heartbeat::{HeartbeatDue, HeartbeatMonitor},
    login::ConnectionOptions,
    message::Message,
    method::{
        Method,
        basic::{self, BasicMethod},
        channel::{self, ChannelMethod},
        connection::{self, ConnectionMethod},
        exchange,
        properties::ContentHeader,
        queue,
    },
    qos::{QosScope, QosSettings, QosTracker},
};

mod channels;


use channels::ChannelRegistry;

/// Largest frame either peer may transmit before the tune completes.
const HANDSHAKE_FRAME_LIMIT: usize = 4096;

/// Externally visible connection state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    /// Preamble sent; the greeting, tune, and open exchange is in flight.
    Handshaking,
    /// Accepting application traffic.
    Open,
    /// Close requested locally; draining until the peer confirms.
    Closing,
    /// Terminal; nothing further will be transmitted or reported.
    Closed,
}

/// Limits agreed during the tune exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NegotiatedLimits {
    /// Highest usable channel id.
    pub channel_max: u16,
    /// Largest total frame size either peer may transmit.
    pub frame_max: u32,
    /// Heartbeat interval in seconds; 0 means heartbeats are off.
    pub heartbeat: u16,
}

/// Flags and arguments of an exchange declaration.
#[derive(Clone, Debug, Default)]
pub struct ExchangeOptions {
    /// Only check for existence, do not create.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Delete once no queue is bound.
    pub auto_delete: bool,
    /// Unusable by publishers.
    pub internal: bool,
    /// Do not wait for the confirmation.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Flags and arguments of a queue declaration.
#[derive(Clone, Debug, Default)]
pub struct QueueOptions {
    /// Only check for existence, do not create.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Restrict the queue to this connection.
    pub exclusive: bool,
    /// Delete once the last consumer is gone.
    pub auto_delete: bool,
    /// Do not wait for the confirmation.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Flags and arguments of a consume request.
#[derive(Clone, Debug, Default)]
pub struct ConsumeOptions {
    /// Do not deliver messages published on this connection.
    pub no_local: bool,
    /// Deliveries need no acknowledgement.
    pub no_ack: bool,
    /// Refuse other consumers on the queue.
    pub exclusive: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Phase {
    AwaitStart,
    AwaitTune,
    AwaitOpenOk,
    Open,
    Closing,
    Closed,
}

/// A protocol connection multiplexing channels over one byte stream.
pub struct Connection<H: ConnectionHandler> {
    handler: H,
    options: ConnectionOptions,
    phase: Phase,
    /// Whether the peer's optional preamble echo has been dealt with.
    preamble_checked: bool,
    limits: Option<NegotiatedLimits>,
    channels: ChannelRegistry,
    /// Connection-wide prefetch negotiation state.
    qos: QosTracker,
    /// Channel carrying the in-flight connection-wide QoS request.
    qos_channel: Option<ChannelId>,
    heartbeat: HeartbeatMonitor,
    /// Tuned interval awaiting the first tick, which knows the time.
    pending_heartbeat: Option<u16>,
}

impl<H: ConnectionHandler> Connection<H> {
    /// Open a connection with the default options.
    ///
    /// Transmits the protocol preamble through the handler immediately.
    pub fn new(handler: H) -> Self { Self::with_options(handler, ConnectionOptions::default()) }

    /// Open a connection with explicit credentials and tune proposals.
    pub fn with_options(mut handler: H, options: ConnectionOptions) -> Self {
        handler.on_data(&PROTOCOL_PREAMBLE);
        let mut heartbeat = HeartbeatMonitor::new(Instant::now());
        heartbeat.mark_sent();
        Self {
            handler,
            options,
            phase: Phase::AwaitStart,
            preamble_checked: false,
            limits: None,
            channels: ChannelRegistry::new(),
            qos: QosTracker::default(),
            qos_channel: None,
            heartbeat,
            pending_heartbeat: None,
        }
    }

    /// The handler driving this connection.
    pub const fn handler(&self) -> &H { &self.handler }

    /// Mutable access to the handler.
    pub fn handler_mut(&mut self) -> &mut H { &mut self.handler }

    /// Current externally visible state.
    #[must_use]
    pub const fn state(&self) -> ConnectionState {
        match self.phase {
            Phase::AwaitStart | Phase::AwaitTune | Phase::AwaitOpenOk => {
                ConnectionState::Handshaking
            }
            Phase::Open => ConnectionState::Open,
            Phase::Closing => ConnectionState::Closing,
            Phase::Closed => ConnectionState::Closed,
        }
    }

    /// Limits agreed during the tune exchange, once it happened.
    #[must_use]
    pub const fn negotiated(&self) -> Option<NegotiatedLimits> { self.limits }

    /// Lifecycle of a channel; `Closed` for ids never assigned.
    #[must_use]
    pub fn channel_state(&self, channel: ChannelId) -> ChannelLifecycle {
        self.channels
            .get(channel)
            .map_or(ChannelLifecycle::Closed, ChannelState::lifecycle)
    }

    /// Feed received bytes into the connection.
    ///
    /// Returns how many bytes were consumed into complete frames; the
    /// caller must re-present the unconsumed remainder, prepended to new
    /// data, on the next call. A return of `data.len()` after a fatal
    /// error means the bytes were discarded; once the connection is
    /// closed, `parse` consumes nothing.
    pub fn parse(&mut self, data: &[u8]) -> usize {
        if self.phase == Phase::Closed {
            return 0;
        }
        let mut offset = 0;
        if !self.preamble_checked {
            if data.first() == Some(&b'A') {
                if data.len() < PROTOCOL_PREAMBLE.len() {
                    return 0;
                }
                if data[..PROTOCOL_PREAMBLE.len()] != PROTOCOL_PREAMBLE {
                    self.fatal(EngineError::violation(
                        "peer preamble demands an unsupported protocol version",
                    ));
                    return data.len();
                }
                offset = PROTOCOL_PREAMBLE.len();
            }
            self.preamble_checked = true;
        }
        let mut stream = FrameStream::new(&data[offset..], self.frame_limit());
        loop {
            match stream.next_frame() {
                Ok(Some(frame)) => {
                    self.heartbeat.mark_received();
                    if let Err(error) = self.dispatch(&frame) {
                        self.fatal(error);
                        return data.len();
                    }
                    if self.phase == Phase::Closed {
                        // The peer closed us; the rest of the buffer is moot.
                        return data.len();
                    }
                }
                Ok(None) => return offset + stream.consumed(),
                Err(frame_error) => {
                    self.fatal(EngineError::MalformedFrame(frame_error));
                    return data.len();
                }
            }
        }
    }

    /// Request a clean shutdown.
    ///
    /// Transmits a close method, administratively closes every channel
    /// (failing their pending calls with [`EngineError::ConnectionClosing`])
    /// and enters `Closing` until the peer confirms. Returns `false` when a
    /// close is already in progress or done.
    pub fn close(&mut self) -> bool {
        if matches!(self.phase, Phase::Closing | Phase::Closed) {
            return false;
        }
        let method = Method::Connection(ConnectionMethod::Close(connection::Close {
            reply_code: 200,
            reply_text: "normal shutdown".to_owned(),
            failing_class: 0,
            failing_method: 0,
        }));
        let _ = self.send_method(0, &method);
        self.teardown_channels(&EngineError::ConnectionClosing);
        self.phase = Phase::Closing;
        true
    }

    /// Negotiate connection-wide prefetch limits.
    ///
    /// The request rides the lowest-numbered open channel with the global
    /// flag set. Returns `false` when the connection is not open, no
    /// channel is open to carry it, or a previous connection-wide
    /// negotiation is still unacknowledged.
    pub fn set_qos(&mut self, prefetch_size: u32, prefetch_count: u16) -> bool {
        if self.phase != Phase::Open {
            return false;
        }
        let Some(carrier) = self.channels.lowest_open() else {
            debug!("qos request refused: no open channel to carry it");
            return false;
        };
        let settings = QosSettings {
            prefetch_size,
            prefetch_count,
        };
        if !self.qos.request(settings) {
            return false;
        }
        let method = Method::Basic(BasicMethod::Qos(basic::Qos {
            prefetch_size,
            prefetch_count,
            global: true,
        }));
        if self.send_method(carrier, &method).is_err() {
            self.qos.abandon();
            return false;
        }
        if let Some(ch) = self.channels.get_mut(carrier) {
            ch.push_expect(Expect::QosOk {
                scope: QosScope::Connection,
            });
        }
        self.qos_channel = Some(carrier);
        true
    }

    /// Connection-wide prefetch limits currently in force.
    #[must_use]
    pub const fn qos(&self) -> QosSettings { self.qos.active() }

    /// Advance time-based work to `now`.
    ///
    /// Transmits a heartbeat after one interval of send silence and tears
    /// the connection down after two intervals without any received frame.
    pub fn tick(&mut self, now: Instant) {
        if let Some(interval) = self.pending_heartbeat.take() {
            self.heartbeat.arm(interval, now);
        }
        if self.phase == Phase::Closed {
            return;
        }
        match self.heartbeat.tick(now) {
            HeartbeatDue::Idle => {}
            HeartbeatDue::Send => {
                let mut buf = BytesMut::new();
                write_heartbeat(&mut buf);
                self.handler.on_data(&buf);
                self.heartbeat.mark_sent();
            }
            HeartbeatDue::Timeout => {
                let silent = self.heartbeat.receive_silence(now);
                self.fatal(EngineError::HeartbeatTimeout { silent });
            }
        }
    }

    /// The next instant [`tick`](Self::tick) can have work to do.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> { self.heartbeat.next_deadline() }

    /// Open a new channel, returning its id.
    ///
    /// The channel is usable for further calls only once the handler sees
    /// `on_channel_open`. Returns `None` when the connection is not open or
    /// every id up to the tuned limit is taken.
    pub fn open_channel(&mut self) -> Option<ChannelId> {
        if self.phase != Phase::Open {
            return None;
        }
        let id = self.channels.allocate()?;
        let method = Method::Channel(ChannelMethod::Open {
            out_of_band: String::new(),
        });
        if self.send_method(id, &method).is_err() {
            self.channels.release(id);
            return None;
        }
        Some(id)
    }

    /// Close one channel, failing its pending calls with
    /// [`EngineError::ChannelClosing`].
    pub fn close_channel(&mut self, channel: ChannelId) -> bool {
        if self.phase != Phase::Open {
            return false;
        }
        let Some(ch) = self.channels.get_mut(channel) else {
            return false;
        };
        if !matches!(
            ch.lifecycle(),
            ChannelLifecycle::Open | ChannelLifecycle::Opening
        ) {
            return false;
        }
        let mut events = Vec::new();
        ch.begin_close(&mut events);
        ch.push_expect(Expect::CloseOk);
        let method = Method::Channel(ChannelMethod::Close(channel::Close {
            reply_code: 200,
            reply_text: "normal shutdown".to_owned(),
            failing_class: 0,
            failing_method: 0,
        }));
        let _ = self.send_method(channel, &method);
        self.abandon_connection_qos_on(channel);
        self.apply_events(channel, events);
        true
    }

    /// Declare an exchange.
    pub fn declare_exchange(
        &mut self,
        channel: ChannelId,
        name: &str,
        kind: &str,
        options: ExchangeOptions,
    ) -> bool {
        let expect = (!options.no_wait).then_some(Expect::ExchangeDeclareOk);
        let method = Method::Exchange(exchange::ExchangeMethod::Declare(exchange::Declare {
            ticket: 0,
            exchange: name.to_owned(),
            kind: kind.to_owned(),
            passive: options.passive,
            durable: options.durable,
            auto_delete: options.auto_delete,
            internal: options.internal,
            no_wait: options.no_wait,
            arguments: options.arguments,
        }));
        self.sync_call(channel, &method, expect)
    }

    /// Delete an exchange.
    pub fn delete_exchange(&mut self, channel: ChannelId, name: &str, if_unused: bool) -> bool {
        let method = Method::Exchange(exchange::ExchangeMethod::Delete(exchange::Delete {
            ticket: 0,
            exchange: name.to_owned(),
            if_unused,
            no_wait: false,
        }));
        self.sync_call(channel, &method, Some(Expect::ExchangeDeleteOk))
    }

    /// Declare a queue; an empty name asks the server to generate one,
    /// reported through `on_queue_declared`.
    pub fn declare_queue(&mut self, channel: ChannelId, name: &str, options: QueueOptions) -> bool {
        let expect = (!options.no_wait).then_some(Expect::QueueDeclareOk);
        let method = Method::Queue(queue::QueueMethod::Declare(queue::Declare {
            ticket: 0,
            queue: name.to_owned(),
            passive: options.passive,
            durable: options.durable,
            exclusive: options.exclusive,
            auto_delete: options.auto_delete,
            no_wait: options.no_wait,
            arguments: options.arguments,
        }));
        self.sync_call(channel, &method, expect)
    }

    /// Bind a queue to an exchange.
    pub fn bind_queue(
        &mut self,
        channel: ChannelId,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> bool {
        let method = Method::Queue(queue::QueueMethod::Bind(queue::Bind {
            ticket: 0,
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            no_wait: false,
            arguments,
        }));
        self.sync_call(channel, &method, Some(Expect::QueueBindOk))
    }

    /// Remove a queue-to-exchange binding.
    pub fn unbind_queue(
        &mut self,
        channel: ChannelId,
        queue: &str,
        exchange: &str,
        routing_key: &str,
        arguments: FieldTable,
    ) -> bool {
        let method = Method::Queue(queue::QueueMethod::Unbind(queue::Unbind {
            ticket: 0,
            queue: queue.to_owned(),
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            arguments,
        }));
        self.sync_call(channel, &method, Some(Expect::QueueUnbindOk))
    }

    /// Drop every message currently in a queue.
    pub fn purge_queue(&mut self, channel: ChannelId, queue: &str) -> bool {
        let method = Method::Queue(queue::QueueMethod::Purge(queue::Purge {
            ticket: 0,
            queue: queue.to_owned(),
            no_wait: false,
        }));
        self.sync_call(channel, &method, Some(Expect::QueuePurgeOk))
    }

    /// Delete a queue.
    pub fn delete_queue(
        &mut self,
        channel: ChannelId,
        queue: &str,
        if_unused: bool,
        if_empty: bool,
    ) -> bool {
        let method = Method::Queue(queue::QueueMethod::Delete(queue::Delete {
            ticket: 0,
            queue: queue.to_owned(),
            if_unused,
            if_empty,
            no_wait: false,
        }));
        self.sync_call(channel, &method, Some(Expect::QueueDeleteOk))
    }

    /// Start a consumer on a queue.
    ///
    /// An empty `consumer_tag` asks the server to generate one; the
    /// effective tag arrives through `on_consumer_started`.
    pub fn consume(
        &mut self,
        channel: ChannelId,
        queue: &str,
        consumer_tag: &str,
        options: ConsumeOptions,
    ) -> bool {
        let method = Method::Basic(BasicMethod::Consume(basic::Consume {
            ticket: 0,
            queue: queue.to_owned(),
            consumer_tag: consumer_tag.to_owned(),
            no_local: options.no_local,
            no_ack: options.no_ack,
            exclusive: options.exclusive,
            no_wait: false,
            arguments: options.arguments,
        }));
        self.sync_call(channel, &method, Some(Expect::ConsumeOk))
    }

    /// Cancel a consumer.
    pub fn cancel(&mut self, channel: ChannelId, consumer_tag: &str) -> bool {
        let method = Method::Basic(BasicMethod::Cancel {
            consumer_tag: consumer_tag.to_owned(),
            no_wait: false,
        });
        self.sync_call(channel, &method, Some(Expect::CancelOk))
    }

    /// Publish a message.
    ///
    /// The body is fragmented into body frames that respect the negotiated
    /// frame size. Publishing is asynchronous: a failure surfaces later as
    /// a returned message (with `mandatory`/`immediate`) or a channel error.
    pub fn publish(
        &mut self,
        channel: ChannelId,
        exchange: &str,
        routing_key: &str,
        mandatory: bool,
        immediate: bool,
        message: &Message,
    ) -> bool {
        if self.phase != Phase::Open || !self.channels.get(channel).is_some_and(ChannelState::is_open)
        {
            return false;
        }
        let method = Method::Basic(BasicMethod::Publish(basic::Publish {
            ticket: 0,
            exchange: exchange.to_owned(),
            routing_key: routing_key.to_owned(),
            mandatory,
            immediate,
        }));
        let mut wire = BytesMut::new();
        let mut payload = BytesMut::new();
        if method.encode(&mut payload).is_err() {
            return false;
        }
        write_frame(&mut wire, FrameKind::Method, channel, &payload);
        let header = ContentHeader::basic(message.body.len() as u64, message.properties.clone());
        payload.clear();
        if header.encode(&mut payload).is_err() {
            return false;
        }
        write_frame(&mut wire, FrameKind::Header, channel, &payload);
        let chunk_len = body_chunk_len(self.frame_limit(), message.body.len());
        for chunk in message.body.chunks(chunk_len) {
            write_frame(&mut wire, FrameKind::Body, channel, chunk);
        }
        self.handler.on_data(&wire);
        self.heartbeat.mark_sent();
        true
    }

    /// Acknowledge a delivery, or with `multiple` everything up to it.
    pub fn ack(&mut self, channel: ChannelId, delivery_tag: u64, multiple: bool) -> bool {
        let method = Method::Basic(BasicMethod::Ack {
            delivery_tag,
            multiple,
        });
        self.sync_call(channel, &method, None)
    }

    /// Reject a delivery, optionally asking the server to requeue it.
    pub fn reject(&mut self, channel: ChannelId, delivery_tag: u64, requeue: bool) -> bool {
        let method = Method::Basic(BasicMethod::Reject {
            delivery_tag,
            requeue,
        });
        self.sync_call(channel, &method, None)
    }

    /// Negatively acknowledge a delivery, or with `multiple` everything up
    /// to it.
    pub fn nack(
        &mut self,
        channel: ChannelId,
        delivery_tag: u64,
        multiple: bool,
        requeue: bool,
    ) -> bool {
        let method = Method::Basic(BasicMethod::Nack {
            delivery_tag,
            multiple,
            requeue,
        });
        self.sync_call(channel, &method, None)
    }

    /// Fetch a single message synchronously.
    ///
    /// The outcome arrives as `on_fetched` or `on_fetch_empty`.
    pub fn get(&mut self, channel: ChannelId, queue: &str, no_ack: bool) -> bool {
        let method = Method::Basic(BasicMethod::Get {
            ticket: 0,
            queue: queue.to_owned(),
            no_ack,
        });
        self.sync_call(channel, &method, Some(Expect::Get))
    }

    /// Ask the server to redeliver all unacknowledged messages.
    pub fn recover(&mut self, channel: ChannelId, requeue: bool) -> bool {
        let method = Method::Basic(BasicMethod::Recover { requeue });
        self.sync_call(channel, &method, Some(Expect::RecoverOk))
    }

    /// Negotiate per-channel prefetch limits.
    pub fn set_channel_qos(
        &mut self,
        channel: ChannelId,
        prefetch_size: u32,
        prefetch_count: u16,
    ) -> bool {
        if self.phase != Phase::Open {
            return false;
        }
        let settings = QosSettings {
            prefetch_size,
            prefetch_count,
        };
        {
            let Some(ch) = self.channels.get_mut(channel) else {
                return false;
            };
            if !ch.is_open() || !ch.qos_mut().request(settings) {
                return false;
            }
        }
        let method = Method::Basic(BasicMethod::Qos(basic::Qos {
            prefetch_size,
            prefetch_count,
            global: false,
        }));
        if self.send_method(channel, &method).is_err() {
            if let Some(ch) = self.channels.get_mut(channel) {
                ch.qos_mut().abandon();
            }
            return false;
        }
        if let Some(ch) = self.channels.get_mut(channel) {
            ch.push_expect(Expect::QosOk {
                scope: QosScope::Channel,
            });
        }
        true
    }

    /// Ask the peer to pause (`active == false`) or resume content
    /// delivery on a channel.
    pub fn set_flow(&mut self, channel: ChannelId, active: bool) -> bool {
        let method = Method::Channel(ChannelMethod::Flow { active });
        self.sync_call(channel, &method, Some(Expect::FlowOk))
    }

    /// Transmit a method on an open channel, registering its expected
    /// reply. The shared shape of every channel-scoped call.
    fn sync_call(&mut self, channel: ChannelId, method: &Method, expect: Option<Expect>) -> bool {
        if self.phase != Phase::Open
            || !self.channels.get(channel).is_some_and(ChannelState::is_open)
        {
            return false;
        }
        if self.send_method(channel, method).is_err() {
            return false;
        }
        if let (Some(expect), Some(ch)) = (expect, self.channels.get_mut(channel)) {
            ch.push_expect(expect);
        }
        true
    }

    /// Encode and transmit one method frame.
    fn send_method(&mut self, channel: u16, method: &Method) -> Result<(), EngineError> {
        let mut payload = BytesMut::new();
        method.encode(&mut payload).map_err(|e| {
            EngineError::violation(format!(
                "cannot encode method {}.{}: {e}",
                method.class_id(),
                method.method_id()
            ))
        })?;
        let mut frame = BytesMut::with_capacity(payload.len() + FRAME_OVERHEAD);
        write_frame(&mut frame, FrameKind::Method, channel, &payload);
        self.handler.on_data(&frame);
        self.heartbeat.mark_sent();
        Ok(())
    }

    /// Frame-size limit for the decoder. Until the tune completes the
    /// protocol pins every frame to the 4096-byte handshake minimum, so a
    /// corrupt length field cannot stall `parse` waiting for gigabytes.
    fn frame_limit(&self) -> usize {
        self.limits.map_or(HANDSHAKE_FRAME_LIMIT, |l| {
            usize::try_from(l.frame_max).unwrap_or(usize::MAX)
        })
    }

    /// Route one decoded frame. Any returned error is fatal.
    fn dispatch(&mut self, frame: &Frame<'_>) -> Result<(), EngineError> {
        match frame.kind {
            FrameKind::Heartbeat => {
                if frame.channel != 0 {
                    return Err(EngineError::violation(format!(
                        "heartbeat on channel {}",
                        frame.channel
                    )));
                }
                self.handler.on_heartbeat();
                Ok(())
            }
            FrameKind::Method => {
                let method = Method::decode(frame.payload).map_err(EngineError::MalformedMethod)?;
                if frame.channel == 0 {
                    let Method::Connection(m) = method else {
                        return Err(EngineError::violation(format!(
                            "class {} method on the connection channel",
                            method.class_id()
                        )));
                    };
                    self.handle_connection_method(m)
                } else {
                    self.dispatch_channel_method(frame.channel, method)
                }
            }
            FrameKind::Header => {
                if frame.channel == 0 {
                    return Err(EngineError::violation("content header on channel 0"));
                }
                let header =
                    ContentHeader::decode(frame.payload).map_err(EngineError::MalformedMethod)?;
                self.channel_dispatch(frame.channel, |ch, out| ch.handle_header(header, out))
            }
            FrameKind::Body => {
                if frame.channel == 0 {
                    return Err(EngineError::violation("content body on channel 0"));
                }
                self.channel_dispatch(frame.channel, |ch, out| ch.handle_body(frame.payload, out))
            }
        }
    }

    fn dispatch_channel_method(
        &mut self,
        channel: ChannelId,
        method: Method,
    ) -> Result<(), EngineError> {
        match method {
            Method::Connection(m) => Err(EngineError::violation(format!(
                "connection method {} on channel {channel}",
                m.method_id()
            ))),
            Method::Channel(m) => {
                self.channel_dispatch(channel, |ch, out| ch.handle_channel_method(m, out))
            }
            Method::Exchange(m) => {
                self.channel_dispatch(channel, |ch, out| ch.handle_exchange_method(m, out))
            }
            Method::Queue(m) => {
                self.channel_dispatch(channel, |ch, out| ch.handle_queue_method(m, out))
            }
            Method::Basic(m) => {
                self.channel_dispatch(channel, |ch, out| ch.handle_basic_method(m, out))
            }
        }
    }

    /// Hand a frame to its channel and apply the resulting events.
    ///
    /// Frames for ids not in the registry are late traffic for a scope that
    /// already closed; they are accepted and discarded.
    fn channel_dispatch<F>(&mut self, channel: ChannelId, f: F) -> Result<(), EngineError>
    where
        F: FnOnce(&mut ChannelState, &mut Vec<ChannelEvent>) -> Result<(), EngineError>,
    {
        let mut events = Vec::new();
        match self.channels.get_mut(channel) {
            Some(ch) => f(ch, &mut events)?,
            None => {
                debug!(channel, "frame for a closed channel discarded");
                return Ok(());
            }
        }
        self.apply_events(channel, events);
        Ok(())
    }

    /// Turn channel events into frames to transmit and handler callbacks.
    fn apply_events(&mut self, channel: ChannelId, events: Vec<ChannelEvent>) {
        for event in events {
            match event {
                ChannelEvent::Opened => self.handler.on_channel_open(channel),
                ChannelEvent::ClosedByPeer { error } => {
                    let _ = self.send_method(channel, &Method::Channel(ChannelMethod::CloseOk));
                    self.channels.release(channel);
                    self.abandon_connection_qos_on(channel);
                    match error {
                        Some(error) => self.handler.on_channel_error(channel, &error),
                        None => self.handler.on_channel_closed(channel),
                    }
                }
                ChannelEvent::CloseConfirmed => {
                    self.channels.release(channel);
                    self.abandon_connection_qos_on(channel);
                    self.handler.on_channel_closed(channel);
                }
                ChannelEvent::FlowRequested { active } => {
                    let _ =
                        self.send_method(channel, &Method::Channel(ChannelMethod::FlowOk { active }));
                    self.handler.on_channel_flow(channel, active);
                }
                ChannelEvent::FlowConfirmed { active } => {
                    self.handler.on_channel_flow(channel, active);
                }
                ChannelEvent::QosConfirmed { scope } => {
                    if scope == QosScope::Connection {
                        self.qos.acknowledge();
                        self.qos_channel = None;
                        debug!(settings = ?self.qos.active(), "connection qos in force");
                    }
                }
                ChannelEvent::QueueDeclared {
                    queue,
                    messages,
                    consumers,
                } => {
                    self.handler
                        .on_queue_declared(channel, &queue, messages, consumers);
                }
                ChannelEvent::QueueBound => debug!(channel, "queue bound"),
                ChannelEvent::QueueUnbound => debug!(channel, "queue unbound"),
                ChannelEvent::QueuePurged { messages } => {
                    debug!(channel, messages, "queue purged");
                }
                ChannelEvent::QueueDeleted { messages } => {
                    debug!(channel, messages, "queue deleted");
                }
                ChannelEvent::ExchangeDeclared => debug!(channel, "exchange declared"),
                ChannelEvent::ExchangeDeleted => debug!(channel, "exchange deleted"),
                ChannelEvent::ConsumerStarted { consumer_tag } => {
                    self.handler.on_consumer_started(channel, &consumer_tag);
                }
                ChannelEvent::ConsumerCancelled { consumer_tag } => {
                    self.handler.on_consumer_cancelled(channel, &consumer_tag);
                }
                ChannelEvent::RecoverConfirmed => debug!(channel, "recover confirmed"),
                ChannelEvent::CallFailed { error } => {
                    self.handler.on_call_failed(channel, &error);
                }
                ChannelEvent::Delivered(delivery) => self.handler.on_delivery(channel, &delivery),
                ChannelEvent::Returned(returned) => self.handler.on_returned(channel, &returned),
                ChannelEvent::Fetched(fetched) => self.handler.on_fetched(channel, &fetched),
                ChannelEvent::FetchEmpty => self.handler.on_fetch_empty(channel),
            }
        }
    }

    fn handle_connection_method(&mut self, method: ConnectionMethod) -> Result<(), EngineError> {
        match method {
            ConnectionMethod::Start(start) => self.on_start(&start),
            ConnectionMethod::Secure(_) => self.on_secure(),
            ConnectionMethod::Tune(tune) => self.on_tune(tune),
            ConnectionMethod::OpenOk(_) => self.on_open_ok(),
            ConnectionMethod::Close(close) => self.on_peer_close(close),
            ConnectionMethod::CloseOk => self.on_close_ok(),
            other @ (ConnectionMethod::StartOk(_)
            | ConnectionMethod::SecureOk(_)
            | ConnectionMethod::TuneOk(_)
            | ConnectionMethod::Open(_)) => Err(EngineError::violation(format!(
                "server sent client-only connection method {}",
                other.method_id()
            ))),
        }
    }

    fn on_start(&mut self, start: &connection::Start) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitStart {
            return Err(EngineError::violation("greeting outside the handshake"));
        }
        if (start.version_major, start.version_minor) != (0, 9) {
            return Err(EngineError::violation(format!(
                "server speaks protocol version {}-{}",
                start.version_major, start.version_minor
            )));
        }
        if !start.mechanisms.split(|b| *b == b' ').any(|m| m == b"PLAIN") {
            return Err(EngineError::violation(
                "server does not offer the PLAIN authentication mechanism",
            ));
        }
        let mut client_properties = FieldTable::new();
        client_properties.insert("product", env!("CARGO_PKG_NAME"));
        client_properties.insert("version", env!("CARGO_PKG_VERSION"));
        client_properties.insert("platform", "rust");
        let method = Method::Connection(ConnectionMethod::StartOk(connection::StartOk {
            client_properties,
            mechanism: "PLAIN".to_owned(),
            response: self.options.login.plain_response().into(),
            locale: "en_US".to_owned(),
        }));
        self.send_method(0, &method)?;
        self.phase = Phase::AwaitTune;
        Ok(())
    }

    fn on_secure(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitTune {
            return Err(EngineError::violation("challenge outside the handshake"));
        }
        // PLAIN has a single round; repeat the credentials.
        let method = Method::Connection(ConnectionMethod::SecureOk(connection::SecureOk {
            response: self.options.login.plain_response().into(),
        }));
        self.send_method(0, &method)
    }

    fn on_tune(&mut self, tune: connection::Tune) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitTune {
            return Err(EngineError::violation("tune outside the handshake"));
        }
        let limits = NegotiatedLimits {
            channel_max: negotiate(self.options.channel_max, tune.channel_max),
            frame_max: negotiate(self.options.frame_max, tune.frame_max),
            heartbeat: negotiate(self.options.heartbeat, tune.heartbeat),
        };
        debug!(?limits, "tune agreed");
        let method = Method::Connection(ConnectionMethod::TuneOk(connection::TuneOk {
            channel_max: limits.channel_max,
            frame_max: limits.frame_max,
            heartbeat: limits.heartbeat,
        }));
        self.send_method(0, &method)?;
        self.limits = Some(limits);
        self.channels.set_limit(limits.channel_max);
        self.pending_heartbeat = Some(limits.heartbeat);
        let open = Method::Connection(ConnectionMethod::Open(connection::Open {
            virtual_host: self.options.vhost.clone(),
            capabilities: String::new(),
            insist: false,
        }));
        self.send_method(0, &open)?;
        self.phase = Phase::AwaitOpenOk;
        Ok(())
    }

    fn on_open_ok(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::AwaitOpenOk {
            return Err(EngineError::violation("open-ok outside the handshake"));
        }
        self.phase = Phase::Open;
        debug!("connection open");
        self.handler.on_ready();
        Ok(())
    }

    /// The peer closed us; acknowledge, tear down, and report.
    fn on_peer_close(&mut self, close: connection::Close) -> Result<(), EngineError> {
        let _ = self.send_method(0, &Method::Connection(ConnectionMethod::CloseOk));
        self.teardown_channels(&EngineError::ConnectionClosing);
        self.phase = Phase::Closed;
        if close.reply_code != 200 {
            let error = EngineError::Connection {
                code: close.reply_code,
                text: close.reply_text,
            };
            warn!(%error, "connection closed by the peer");
            self.handler.on_error(&error);
        }
        self.handler.on_closed();
        Ok(())
    }

    fn on_close_ok(&mut self) -> Result<(), EngineError> {
        if self.phase != Phase::Closing {
            return Err(EngineError::violation("unsolicited close confirmation"));
        }
        self.phase = Phase::Closed;
        self.handler.on_closed();
        Ok(())
    }

    /// Force every channel closed, failing their pending calls with
    /// `error`, and report each closure.
    fn teardown_channels(&mut self, error: &EngineError) {
        for mut ch in self.channels.drain() {
            let id = ch.id();
            let mut events = Vec::new();
            ch.force_close(error, &mut events);
            self.apply_events(id, events);
            self.handler.on_channel_closed(id);
        }
        self.qos.abandon();
        self.qos_channel = None;
    }

    /// Drop the connection-wide QoS negotiation if its carrier died.
    fn abandon_connection_qos_on(&mut self, channel: ChannelId) {
        if self.qos_channel == Some(channel) {
            self.qos.abandon();
            self.qos_channel = None;
        }
    }

    /// Report a fatal error exactly once and reach the terminal state.
    fn fatal(&mut self, error: EngineError) {
        if self.phase == Phase::Closed {
            return;
        }
        warn!(%error, "fatal connection error");
        self.teardown_channels(&EngineError::ConnectionClosing);
        self.phase = Phase::Closed;
        self.handler.on_error(&error);
        self.handler.on_closed();
    }
}

/// Body-frame chunk size for a publish under `frame_limit` (0 when the
/// negotiation landed on "unlimited"). The payload length field on the
/// wire is 32 bits, so even an unlimited negotiation caps each chunk
/// there.
fn body_chunk_len(frame_limit: usize, body_len: usize) -> usize {
    let length_field_max = usize::try_from(u32::MAX).unwrap_or(usize::MAX);
    match frame_limit {
        0 => body_len.clamp(1, length_field_max),
        limit => limit.saturating_sub(FRAME_OVERHEAD).max(1),
    }
}

/// Merge one tune value with the server's: 0 means "no preference" on
/// either side, otherwise the smaller bound wins.
fn negotiate<T: Ord + Copy + Default>(client: T, server: T) -> T {
    let none = T::default();
    if client == none {
        server
    } else if server == none {
        client
    } else {
        client.min(server)
    }
}
