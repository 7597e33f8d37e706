//! Queue-class methods: declaring, binding, purging, and deleting queues.

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
};

/// Arguments of a queue declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Declare {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue name; empty asks the server to generate one.
    pub queue: String,
    /// Only check for existence, do not create.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Only accessible to this connection; deleted when it closes.
    pub exclusive: bool,
    /// Delete once the last consumer cancels.
    pub auto_delete: bool,
    /// Do not send a reply.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Confirmation of a queue declaration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeclareOk {
    /// Actual queue name, relevant when the server generated it.
    pub queue: String,
    /// Number of messages present in the queue.
    pub message_count: u32,
    /// Number of active consumers on the queue.
    pub consumer_count: u32,
}

/// Arguments of a queue-to-exchange binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Bind {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue to bind.
    pub queue: String,
    /// Exchange to bind to.
    pub exchange: String,
    /// Routing key selecting which messages reach the queue.
    pub routing_key: String,
    /// Do not send a reply.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Arguments removing a queue-to-exchange binding.
#[derive(Clone, Debug, PartialEq)]
pub struct Unbind {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue to unbind.
    pub queue: String,
    /// Exchange to unbind from.
    pub exchange: String,
    /// Routing key of the binding to remove.
    pub routing_key: String,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Arguments of a queue purge.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Purge {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue to purge.
    pub queue: String,
    /// Do not send a reply.
    pub no_wait: bool,
}

/// Arguments of a queue deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delete {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Queue to delete.
    pub queue: String,
    /// Only delete when no consumer is active.
    pub if_unused: bool,
    /// Only delete when the queue is empty.
    pub if_empty: bool,
    /// Do not send a reply.
    pub no_wait: bool,
}

/// Queue-class method variants.
#[derive(Clone, Debug, PartialEq)]
pub enum QueueMethod {
    /// Declare a queue (id 10).
    Declare(Declare),
    /// Declaration confirmed (id 11).
    DeclareOk(DeclareOk),
    /// Bind a queue (id 20).
    Bind(Bind),
    /// Binding confirmed (id 21).
    BindOk,
    /// Purge a queue (id 30).
    Purge(Purge),
    /// Purge confirmed (id 31) with the number of removed messages.
    PurgeOk {
        /// Messages removed by the purge.
        message_count: u32,
    },
    /// Delete a queue (id 40).
    Delete(Delete),
    /// Deletion confirmed (id 41) with the number of removed messages.
    DeleteOk {
        /// Messages dropped with the queue.
        message_count: u32,
    },
    /// Remove a binding (id 50).
    Unbind(Unbind),
    /// Unbinding confirmed (id 51).
    UnbindOk,
}

impl QueueMethod {
    /// Decode the arguments of the queue method `method_id`.
    ///
    /// # Errors
    /// Returns [`MethodError::UnknownMethod`] for an undefined id, or a
    /// codec error for malformed arguments.
    pub fn decode(method_id: u16, cur: &mut Cursor<'_>) -> Result<Self, MethodError> {
        match method_id {
            10 => {
                let ticket = cur.read_u16()?;
                let queue = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Declare(Declare {
                    ticket,
                    queue,
                    passive: flag(flags, 0),
                    durable: flag(flags, 1),
                    exclusive: flag(flags, 2),
                    auto_delete: flag(flags, 3),
                    no_wait: flag(flags, 4),
                    arguments: FieldTable::decode(cur)?,
                }))
            }
            11 => Ok(Self::DeclareOk(DeclareOk {
                queue: cur.read_short_str()?.to_owned(),
                message_count: cur.read_u32()?,
                consumer_count: cur.read_u32()?,
            })),
            20 => {
                let ticket = cur.read_u16()?;
                let queue = cur.read_short_str()?.to_owned();
                let exchange = cur.read_short_str()?.to_owned();
                let routing_key = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Bind(Bind {
                    ticket,
                    queue,
                    exchange,
                    routing_key,
                    no_wait: flag(flags, 0),
                    arguments: FieldTable::decode(cur)?,
                }))
            }
            21 => Ok(Self::BindOk),
            30 => {
                let ticket = cur.read_u16()?;
                let queue = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Purge(Purge {
                    ticket,
                    queue,
                    no_wait: flag(flags, 0),
                }))
            }
            31 => Ok(Self::PurgeOk {
                message_count: cur.read_u32()?,
            }),
            40 => {
                let ticket = cur.read_u16()?;
                let queue = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Delete(Delete {
                    ticket,
                    queue,
                    if_unused: flag(flags, 0),
                    if_empty: flag(flags, 1),
                    no_wait: flag(flags, 2),
                }))
            }
            41 => Ok(Self::DeleteOk {
                message_count: cur.read_u32()?,
            }),
            50 => Ok(Self::Unbind(Unbind {
                ticket: cur.read_u16()?,
                queue: cur.read_short_str()?.to_owned(),
                exchange: cur.read_short_str()?.to_owned(),
                routing_key: cur.read_short_str()?.to_owned(),
                arguments: FieldTable::decode(cur)?,
            })),
            51 => Ok(Self::UnbindOk),
            method => Err(MethodError::UnknownMethod {
                class: super::CLASS_QUEUE,
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
            Self::Declare(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.passive);
                flags = pack(flags, 1, m.durable);
                flags = pack(flags, 2, m.exclusive);
                flags = pack(flags, 3, m.auto_delete);
                flags = pack(flags, 4, m.no_wait);
                write_u8(dst, flags);
                m.arguments.encode(dst)?;
            }
            Self::DeclareOk(m) => {
                write_short_str(dst, &m.queue)?;
                write_u32(dst, m.message_count);
                write_u32(dst, m.consumer_count);
            }
            Self::Bind(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
                write_u8(dst, pack(0, 0, m.no_wait));
                m.arguments.encode(dst)?;
            }
            Self::Purge(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                write_u8(dst, pack(0, 0, m.no_wait));
            }
            Self::Delete(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.if_unused);
                flags = pack(flags, 1, m.if_empty);
                flags = pack(flags, 2, m.no_wait);
                write_u8(dst, flags);
            }
            Self::Unbind(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.queue)?;
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.routing_key)?;
                m.arguments.encode(dst)?;
            }
            Self::PurgeOk { message_count } | Self::DeleteOk { message_count } => {
                write_u32(dst, *message_count);
            }
            Self::BindOk | Self::UnbindOk => {}
        }
        Ok(())
    }

    /// Method id within the queue class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Declare(_) => 10,
            Self::DeclareOk(_) => 11,
            Self::Bind(_) => 20,
            Self::BindOk => 21,
            Self::Purge(_) => 30,
            Self::PurgeOk { .. } => 31,
            Self::Delete(_) => 40,
            Self::DeleteOk { .. } => 41,
            Self::Unbind(_) => 50,
            Self::UnbindOk => 51,
        }
    }
}
