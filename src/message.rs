//! Assembled messages and their routing envelopes.

use bytes::Bytes;

use crate::method::properties::BasicProperties;

/// A fully assembled message: properties plus the complete body.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Message {
    /// Optional per-message metadata from the content header.
    pub properties: BasicProperties,
    /// The complete body, reassembled across body frames.
    pub body: Bytes,
}

impl Message {
    /// Build a message from a body with default properties.
    #[must_use]
    pub fn from_body(body: impl Into<Bytes>) -> Self {
        Self {
            properties: BasicProperties::default(),
            body: body.into(),
        }
    }
}

/// A message pushed to a consumer.
#[derive(Clone, Debug, PartialEq)]
pub struct Delivery {
    /// Tag of the consumer the message was delivered to.
    pub consumer_tag: String,
    /// Channel-scoped tag used to acknowledge the delivery.
    pub delivery_tag: u64,
    /// Whether the server delivered this message before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
    /// The message itself.
    pub message: Message,
}

/// A published message bounced back as undeliverable.
#[derive(Clone, Debug, PartialEq)]
pub struct ReturnedMessage {
    /// Reply code explaining the return.
    pub reply_code: u16,
    /// Human-readable reason.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
    /// The message itself.
    pub message: Message,
}

/// A message fetched with a synchronous get.
#[derive(Clone, Debug, PartialEq)]
pub struct FetchedMessage {
    /// Channel-scoped tag used to acknowledge the fetch.
    pub delivery_tag: u64,
    /// Whether the server delivered this message before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
    /// Messages left in the queue after this one.
    pub message_count: u32,
    /// The message itself.
    pub message: Message,
}
