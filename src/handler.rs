//! The outward-facing callback surface of the engine.
//!
//! The engine owns no socket: every byte it wants on the wire goes through
//! [`ConnectionHandler::on_data`], and every protocol event it observes is
//! reported through the remaining callbacks. Only `on_data` is mandatory;
//! the rest default to no-ops so a caller implements exactly the events it
//! cares about. All callbacks run synchronously inside `parse`, `close`,
//! `set_qos`, or `tick` on the caller's thread.

use crate::{
    channel::ChannelId,
    error::EngineError,
    message::{Delivery, FetchedMessage, ReturnedMessage},
};

/// Receives transmit requests and protocol events from a connection.
pub trait ConnectionHandler {
    /// Encoded bytes that must be transmitted to the server.
    fn on_data(&mut self, data: &[u8]);

    /// The handshake finished; the connection accepts application traffic.
    fn on_ready(&mut self) {}

    /// The connection reached its terminal closed state.
    fn on_closed(&mut self) {}

    /// A fatal connection-level error. Reported exactly once.
    fn on_error(&mut self, error: &EngineError) { let _ = error; }

    /// A heartbeat frame arrived from the peer.
    fn on_heartbeat(&mut self) {}

    /// A channel finished opening.
    fn on_channel_open(&mut self, channel: ChannelId) { let _ = channel; }

    /// A channel reached its closed state without an error.
    fn on_channel_closed(&mut self, channel: ChannelId) { let _ = channel; }

    /// A channel failed; the channel is closed, the connection survives.
    fn on_channel_error(&mut self, channel: ChannelId, error: &EngineError) {
        let _ = (channel, error);
    }

    /// The peer paused or resumed content flow on a channel.
    fn on_channel_flow(&mut self, channel: ChannelId, active: bool) {
        let _ = (channel, active);
    }

    /// A pending synchronous call failed because its scope is closing.
    fn on_call_failed(&mut self, channel: ChannelId, error: &EngineError) {
        let _ = (channel, error);
    }

    /// A consumer was confirmed by the server.
    fn on_consumer_started(&mut self, channel: ChannelId, consumer_tag: &str) {
        let _ = (channel, consumer_tag);
    }

    /// A consumer cancellation was confirmed by the server.
    fn on_consumer_cancelled(&mut self, channel: ChannelId, consumer_tag: &str) {
        let _ = (channel, consumer_tag);
    }

    /// A queue declaration was confirmed.
    fn on_queue_declared(&mut self, channel: ChannelId, queue: &str, messages: u32, consumers: u32) {
        let _ = (channel, queue, messages, consumers);
    }

    /// A complete message was delivered to a consumer.
    fn on_delivery(&mut self, channel: ChannelId, delivery: &Delivery) {
        let _ = (channel, delivery);
    }

    /// A published message came back as undeliverable.
    fn on_returned(&mut self, channel: ChannelId, returned: &ReturnedMessage) {
        let _ = (channel, returned);
    }

    /// A synchronous get produced a message.
    fn on_fetched(&mut self, channel: ChannelId, fetched: &FetchedMessage) {
        let _ = (channel, fetched);
    }

    /// A synchronous get found the queue empty.
    fn on_fetch_empty(&mut self, channel: ChannelId) { let _ = channel; }
}
