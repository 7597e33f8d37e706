//! Typed protocol methods and their argument codecs.
//!
//! A method frame's payload is a two-byte class id, a two-byte method id,
//! then arguments whose shape is fully determined by that pair. Decoding is
//! a closed match over the defined classes and methods: an id outside the
//! set, a short argument list, or trailing bytes all make the frame
//! malformed. There is no open-ended dispatch, so adding a method to the
//! protocol forces every match site to handle it.

use bytes::BytesMut;
use thiserror::Error;

use crate::codec::{CodecError, Cursor, write_u16};

pub mod basic;
pub mod channel;
pub mod connection;
pub mod exchange;
pub mod properties;
pub mod queue;


/// Wire class id of the connection class.
pub const CLASS_CONNECTION: u16 = 10;
/// Wire class id of the channel class.
pub const CLASS_CHANNEL: u16 = 20;
/// Wire class id of the exchange class.
pub const CLASS_EXCHANGE: u16 = 40;
/// Wire class id of the queue class.
pub const CLASS_QUEUE: u16 = 50;
/// Wire class id of the basic (content) class.
pub const CLASS_BASIC: u16 = 60;

/// Errors raised while turning a method-frame payload into a typed method.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum MethodError {
    /// The class id is outside the defined set.
    #[error("unknown class id {class}")]
    UnknownClass {
        /// Offending class id.
        class: u16,
    },

    /// The method id is not defined for its class.
    #[error("unknown method id {method} in class {class}")]
    UnknownMethod {
        /// Class the method id was read for.
        class: u16,
        /// Offending method id.
        method: u16,
    },

    /// The argument bytes do not decode as the method's declared shape.
    #[error("malformed method arguments")]
    Arguments(#[from] CodecError),

    /// Bytes were left over after the full argument list was decoded.
    #[error("{left} trailing bytes after the arguments of {class}.{method}")]
    TrailingBytes {
        /// Class id of the decoded method.
        class: u16,
        /// Method id of the decoded method.
        method: u16,
        /// Number of undecoded bytes.
        left: usize,
    },
}

/// Any method of the supported protocol classes.
#[derive(Clone, Debug, PartialEq)]
pub enum Method {
    /// Connection-management methods; legal only on channel 0.
    Connection(connection::ConnectionMethod),
    /// Channel lifecycle and flow methods.
    Channel(channel::ChannelMethod),
    /// Exchange administration methods.
    Exchange(exchange::ExchangeMethod),
    /// Queue administration methods.
    Queue(queue::QueueMethod),
    /// Content interchange methods.
    Basic(basic::BasicMethod),
}

impl Method {
    /// Decode a complete method-frame payload.
    ///
    /// The payload must be fully present; truncation here means the frame
    /// itself lied about its contents, so every failure is terminal.
    ///
    /// # Errors
    /// Returns a [`MethodError`] for unknown ids, malformed arguments, or
    /// trailing bytes.
    pub fn decode(payload: &[u8]) -> Result<Self, MethodError> {
        let mut cur = Cursor::new(payload);
        let class = cur.read_u16()?;
        let method_id = cur.read_u16()?;
        let method = match class {
            CLASS_CONNECTION => {
                Self::Connection(connection::ConnectionMethod::decode(method_id, &mut cur)?)
            }
            CLASS_CHANNEL => Self::Channel(channel::ChannelMethod::decode(method_id, &mut cur)?),
            CLASS_EXCHANGE => {
                Self::Exchange(exchange::ExchangeMethod::decode(method_id, &mut cur)?)
            }
            CLASS_QUEUE => Self::Queue(queue::QueueMethod::decode(method_id, &mut cur)?),
            CLASS_BASIC => Self::Basic(basic::BasicMethod::decode(method_id, &mut cur)?),
            class => return Err(MethodError::UnknownClass { class }),
        };
        if !cur.is_exhausted() {
            return Err(MethodError::TrailingBytes {
                class,
                method: method_id,
                left: cur.remaining(),
            });
        }
        Ok(method)
    }

    /// Encode this method as a method-frame payload (ids plus arguments).
    ///
    /// # Errors
    /// Returns a [`CodecError`] when an argument exceeds its length prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        write_u16(dst, self.class_id());
        write_u16(dst, self.method_id());
        match self {
            Self::Connection(m) => m.encode(dst),
            Self::Channel(m) => m.encode(dst),
            Self::Exchange(m) => m.encode(dst),
            Self::Queue(m) => m.encode(dst),
            Self::Basic(m) => m.encode(dst),
        }
    }

    /// Class id of this method.
    #[must_use]
    pub const fn class_id(&self) -> u16 {
        match self {
            Self::Connection(_) => CLASS_CONNECTION,
            Self::Channel(_) => CLASS_CHANNEL,
            Self::Exchange(_) => CLASS_EXCHANGE,
            Self::Queue(_) => CLASS_QUEUE,
            Self::Basic(_) => CLASS_BASIC,
        }
    }

    /// Method id of this method within its class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Connection(m) => m.method_id(),
            Self::Channel(m) => m.method_id(),
            Self::Exchange(m) => m.method_id(),
            Self::Queue(m) => m.method_id(),
            Self::Basic(m) => m.method_id(),
        }
    }
}

/// Test a bit inside a packed flags byte.
pub(crate) const fn flag(flags: u8, bit: u8) -> bool { flags & (1 << bit) != 0 }

/// Set a bit inside a packed flags byte when `on` holds.
pub(crate) const fn pack(flags: u8, bit: u8, on: bool) -> u8 {
    if on { flags | (1 << bit) } else { flags }
}
