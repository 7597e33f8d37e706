#![doc(html_root_url = "https://docs.rs/amqpwire/latest")]
//! Public API for the `amqpwire` library.
//!
//! This crate is the sans-io client engine of the AMQP 0-9-1 wire
//! protocol: an incremental frame decoder, typed method codecs, and the
//! connection, channel, QoS, and heartbeat state machines. It owns no
//! socket and no clock; the caller feeds it received bytes, drives time
//! explicitly, and receives encoded bytes and protocol events through a
//! [`ConnectionHandler`].

pub mod channel;
pub mod codec;
pub mod connection;
pub mod error;
pub mod frame;
pub mod handler;
pub mod heartbeat;
pub mod login;
pub mod message;
pub mod method;
pub mod qos;

pub use channel::{ChannelId, ChannelLifecycle};
pub use codec::{CodecError, FieldArray, FieldTable, FieldValue};
pub use connection::{
    Connection,
    ConnectionState,
    ConsumeOptions,
    ExchangeOptions,
    NegotiatedLimits,
    QueueOptions,
};
pub use error::EngineError;
pub use frame::{Frame, FrameError, FrameKind, FrameStream};
pub use handler::ConnectionHandler;
pub use heartbeat::{HeartbeatDue, HeartbeatMonitor};
pub use login::{ConnectionOptions, Login};
pub use message::{Delivery, FetchedMessage, Message, ReturnedMessage};
pub use method::{Method, MethodError, properties::BasicProperties};
pub use qos::{QosScope, QosSettings};
