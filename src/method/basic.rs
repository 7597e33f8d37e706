//! Basic-class methods: content interchange, acknowledgement, and QoS.

use bytes::BytesMut;

use super::{MethodError, flag, pack};
use crate::codec::{
    CodecError,
    Cursor,
    FieldTable,
    write_short_str,
    write_u8,
    write_u16,
    write_u32,
    write_u64,
};

/// Flow-control (prefetch) request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Qos {
    /// Prefetch window in octets; 0 means no size limit.
    pub prefetch_size: u32,
    /// Prefetch window in messages; 0 means no count limit.
    pub prefetch_count: u16,
    /// Apply to the whole connection instead of one channel.
    pub global: bool,
}

/// Request to start a consumer on a queue.
#[derive(Clone, Debug, PartialEq)]
pub struct Consume {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue to consume from.
    pub queue: String,
    /// Consumer tag; empty asks the server to generate one.
    pub consumer_tag: String,
    /// Do not deliver messages published on this connection.
    pub no_local: bool,
    /// Deliver without expecting acknowledgements.
    pub no_ack: bool,
    /// Request exclusive consumer access.
    pub exclusive: bool,
    /// Do not send a reply.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Request to publish a message; content frames follow.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Publish {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Exchange to publish to; empty is the default exchange.
    pub exchange: String,
    /// Routing key for the exchange.
    pub routing_key: String,
    /// Return the message when it cannot be routed.
    pub mandatory: bool,
    /// Return the message when it cannot be delivered immediately.
    pub immediate: bool,
}

/// Server notice that a published message came back; content follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Return {
    /// Reply code explaining the return.
    pub reply_code: u16,
    /// Human-readable reason.
    pub reply_text: String,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
}

/// Server delivery to a consumer; content follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Deliver {
    /// Tag of the consumer receiving the message.
    pub consumer_tag: String,
    /// Channel-scoped delivery tag for acknowledgement.
    pub delivery_tag: u64,
    /// Whether the message was delivered before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
}

/// Successful reply to a synchronous get; content follows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GetOk {
    /// Channel-scoped delivery tag for acknowledgement.
    pub delivery_tag: u64,
    /// Whether the message was delivered before.
    pub redelivered: bool,
    /// Exchange the message was published to.
    pub exchange: String,
    /// Routing key the message carried.
    pub routing_key: String,
    /// Messages left in the queue after this one.
    pub message_count: u32,
}

/// Basic-class method variants.
#[derive(Clone, Debug, PartialEq)]
pub enum BasicMethod {
    /// Set prefetch limits (id 10).
    Qos(Qos),
    /// Prefetch limits confirmed (id 11).
    QosOk,
    /// Start a consumer (id 20).
    Consume(Consume),
    /// Consumer started (id 21).
    ConsumeOk {
        /// Tag identifying the consumer.
        consumer_tag: String,
    },
    /// Cancel a consumer (id 30).
    Cancel {
        /// Tag of the consumer to cancel.
        consumer_tag: String,
        /// Do not send a reply.
        no_wait: bool,
    },
    /// Consumer cancelled (id 31).
    CancelOk {
        /// Tag of the cancelled consumer.
        consumer_tag: String,
    },
    /// Publish a message (id 40).
    Publish(Publish),
    /// Published message returned as undeliverable (id 50).
    Return(Return),
    /// Message delivered to a consumer (id 60).
    Deliver(Deliver),
    /// Synchronously fetch one message (id 70).
    Get {
        /// Deprecated access ticket; always 0.
        ticket: u16,
        /// Queue to fetch from.
        queue: String,
        /// Fetch without expecting an acknowledgement.
        no_ack: bool,
    },
    /// Fetched message follows (id 71).
    GetOk(GetOk),
    /// Queue was empty (id 72).
    GetEmpty {
        /// Deprecated cluster identifier.
        cluster_id: String,
    },
    /// Acknowledge one or more deliveries (id 80).
    Ack {
        /// Delivery to acknowledge; 0 with `multiple` means everything.
        delivery_tag: u64,
        /// Also acknowledge all earlier outstanding deliveries.
        multiple: bool,
    },
    /// Reject a single delivery (id 90).
    Reject {
        /// Delivery to reject.
        delivery_tag: u64,
        /// Put the message back on the queue instead of discarding it.
        requeue: bool,
    },
    /// Redeliver unacknowledged messages (id 110).
    Recover {
        /// Requeue instead of redelivering to the same consumer.
        requeue: bool,
    },
    /// Recovery confirmed (id 111).
    RecoverOk,
    /// Negatively acknowledge one or more deliveries (id 120).
    Nack {
        /// Delivery to reject; 0 with `multiple` means everything.
        delivery_tag: u64,
        /// Also reject all earlier outstanding deliveries.
        multiple: bool,
        /// Put the messages back on the queue.
        requeue: bool,
    },
}

impl BasicMethod {
    /// Decode the arguments of the basic method `method_id`.
    ///
    /// # Errors
    /// Returns [`MethodError::UnknownMethod`] for an undefined id, or a
    /// codec error for malformed arguments.
    pub fn decode(method_id: u16, cur: &mut Cursor<'_>) -> Result<Self, MethodError> {
        match method_id {
            10 => Ok(Self::Qos(Qos {
                prefetch_size: cur.read_u32()?,
                prefetch_count: cur.read_u16()?,
                global: cur.read_u8()? & 0x01 != 0,
            })),
            11 => Ok(Self::QosOk),
            20 => {
                let ticket = cur.read_u16()?;
                let queue = cur.read_short_str()?.to_owned();
                let consumer_tag = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Consume(Consume {
                    ticket,
                    queue,
                    consumer_tag,
                    no_local: flag(flags, 0),
                    no_ack: flag(flags, 1),
                    exclusive: flag(flags, 2),
                    no_wait: flag(flags, 3),
                    arguments: FieldTable::decode(cur)?,
                }))
            }
            21 => Ok(Self::ConsumeOk {
                consumer_tag: cur.read_short_str()?.to_owned(),
            }),
            30 => Ok(Self::Cancel {
                consumer_tag: cur.read_short_str()?.to_owned(),
                no_wait: cur.read_u8()? & 0x01 != 0,
            }),
            31 => Ok(Self::CancelOk {
                consumer_tag: cur.read_short_str()?.to_owned(),
            }),
            40 => {
                let ticket = cur.read_u16()?;
                let exchange = cur.read_short_str()?.to_owned();
                let routing_key = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Publish(Publish {
                    ticket,
                    exchange,
                    routing_key,
                    mandatory: flag(flags, 0),
                    immediate: flag(flags, 1),
                }))
            }
            50 => Ok(Self::Return(Return {
                reply_code: cur.read_u16()?,
                reply_text: cur.read_short_str()?.to_owned(),
                exchange: cur.read_short_str()?.to_owned(),
                routing_key: cur.read_short_str()?.to_owned(),
            })),
            60 => Ok(Self::Deliver(Deliver {
                consumer_tag: cur.read_short_str()?.to_owned(),
                delivery_tag: cur.read_u64()?,
                redelivered: cur.read_u8()? & 0x01 != 0,
                exchange: cur.read_short_str()?.to_owned(),
                routing_key: cur.read_short_str()?.to_owned(),
            })),
            70 => Ok(Self::Get {
                ticket: cur.read_u16()?,
                queue: cur.read_short_str()?.to_owned(),
                no_ack: cur.read_u8()? & 0x01 != 0,
            }),
            71 => Ok(Self::GetOk(GetOk {
                delivery_tag: cur.read_u64()?,
                redelivered: cur.read_u8()? & 0x01 != 0,
                exchange: cur.read_short_str()?.to_owned(),
                routing_key: cur.read_short_str()?.to_owned(),
                message_count: cur.read_u32()?,
            })),
            72 => Ok(Self::GetEmpty {
                cluster_id: cur.read_short_str()?.to_owned(),
            }),
            80 => Ok(Self::Ack {
                delivery_tag: cur.read_u64()?,
                multiple: cur.read_u8()? & 0x01 != 0,
            }),
            90 => Ok(Self::Reject {
                delivery_tag: cur.read_u64()?,
                requeue: cur.read_u8()? & 0x01 != 0,
            }),
            110 => Ok(Self::Recover {
                requeue: cur.read_u8()? & 0x01 != 0,
            }),
            111 => Ok(Self::RecoverOk),
            120 => {
                let delivery_tag = cur.read_u64()?;
                let flags = cur.read_u8()?;
                Ok(Self::Nack {
                    delivery_tag,
                    multiple: flag(flags, 0),
                    requeue: flag(flags, 1),
                })
            }
            method => Err(MethodError::UnknownMethod {
                class: super::CLASS_BASIC,
                method,
            }),
        }
    }

    /// Encode the arguments of this method.
    ///
    /// # Errors
    /// Returns a [`CodecError`] when a string argument exceeds its prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        match self {
            Self::Qos(m) => {
                write_u32(dst, m.prefetch_size);
                write_u16(dst, m.prefetch_count);
                write_u8(dst, u8::from(m.global));
            }
            Self::Consume(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                write_short_str(dst, &m.consumer_tag)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.no_local);
                flags = pack(flags, 1, m.no_ack);
                flags = pack(flags, 2, m.exclusive);
                flags = pack(flags, 3, m.no_wait);
                write_u8(dst, flags);
                m.arguments.encode(dst)?;
            }
            Self::ConsumeOk { consumer_tag } | Self::CancelOk { consumer_tag } => {
                write_short_str(dst, consumer_tag)?;
            }
            Self::Cancel {
                consumer_tag,
                no_wait,
            } => {
                write_short_str(dst, consumer_tag)?;
                write_u8(dst, u8::from(*no_wait));
            }
            Self::Publish(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.mandatory);
                flags = pack(flags, 1, m.immediate);
                write_u8(dst, flags);
            }
            Self::Return(m) => {
                write_u16(dst, m.reply_code);
                write_short_str(dst, &m.reply_text)?;
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
            }
            Self::Deliver(m) => {
                write_short_str(dst, &m.consumer_tag)?;
                write_u64(dst, m.delivery_tag);
                write_u8(dst, u8::from(m.redelivered));
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
            }
            Self::Get {
                ticket,
                queue,
                no_ack,
            } => {
                write_u16(dst, *ticket);
                write_short_str(dst, queue)?;
                write_u8(dst, u8::from(*no_ack));
            }
            Self::GetOk(m) => {
                write_u64(dst, m.delivery_tag);
                write_u8(dst, u8::from(m.redelivered));
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
                write_u32(dst, m.message_count);
            }
            Self::GetEmpty { cluster_id } => write_short_str(dst, cluster_id)?,
            Self::Ack {
                delivery_tag,
                multiple,
            } => {
                write_u64(dst, *delivery_tag);
                write_u8(dst, u8::from(*multiple));
            }
            Self::Reject {
                delivery_tag,
                requeue,
            } => {
                write_u64(dst, *delivery_tag);
                write_u8(dst, u8::from(*requeue));
            }
            Self::Recover { requeue } => write_u8(dst, u8::from(*requeue)),
            Self::Nack {
                delivery_tag,
                multiple,
                requeue,
            } => {
                write_u64(dst, *delivery_tag);
                let mut flags = 0;
                flags = pack(flags, 0, *multiple);
                flags = pack(flags, 1, *requeue);
                write_u8(dst, flags);
            }
            Self::QosOk | Self::RecoverOk => {}
        }
        Ok(())
    }

    /// Method id within the basic class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Qos(_) => 10,
            Self::QosOk => 11,
            Self::Consume(_) => 20,
            Self::ConsumeOk { .. } => 21,
            Self::Cancel { .. } => 30,
            Self::CancelOk { .. } => 31,
            Self::Publish(_) => 40,
            Self::Return(_) => 50,
            Self::Deliver(_) => 60,
            Self::Get { .. } => 70,
            Self::GetOk(_) => 71,
            Self::GetEmpty { .. } => 72,
            Self::Ack { .. } => 80,
            Self::Reject { .. } => 90,
            Self::Recover { .. } => 110,
            Self::RecoverOk => 111,
            Self::Nack { .. } => 120,
        }
    }
}
