//! Exchange-class methods: declaring and deleting exchanges.

use bytes::BytesMut;

use super::{MethodError, flag, pack};
use crate::codec::{CodecError, Cursor, FieldTable, write_short_str, write_u8, write_u16};

/// Arguments of an exchange declaration.
#[derive(Clone, Debug, PartialEq)]
pub struct Declare {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Exchange name.
    pub exchange: String,
    /// Exchange type, for example `direct`, `fanout`, `topic`.
    pub kind: String,
    /// Only check for existence, do not create.
    pub passive: bool,
    /// Survive a broker restart.
    pub durable: bool,
    /// Delete once no queue is bound.
    pub auto_delete: bool,
    /// Unusable by publishers, only for exchange-to-exchange binding.
    pub internal: bool,
    /// Do not send a reply.
    pub no_wait: bool,
    /// Implementation-specific arguments.
    pub arguments: FieldTable,
}

/// Arguments of an exchange deletion.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Delete {
    /// Deprecated access ticket; always 0.
    pub ticket: u16,
    /// Exchange name.
    pub exchange: String,
    /// Only delete when no queue is bound.
    pub if_unused: bool,
    /// Do not send a reply.
    pub no_wait: bool,
}

/// Exchange-class method variants.
#[derive(Clone, Debug, PartialEq)]
pub enum ExchangeMethod {
    /// Declare an exchange (id 10).
    Declare(Declare),
    /// Declaration confirmed (id 11).
    DeclareOk,
    /// Delete an exchange (id 20).
    Delete(Delete),
    /// Deletion confirmed (id 21).
    DeleteOk,
}

impl ExchangeMethod {
    /// Decode the arguments of the exchange method `method_id`.
    ///
    /// # Errors
    /// Returns [`MethodError::UnknownMethod`] for an undefined id, or a
    /// codec error for malformed arguments.
    pub fn decode(method_id: u16, cur: &mut Cursor<'_>) -> Result<Self, MethodError> {
        match method_id {
            10 => {
                let ticket = cur.read_u16()?;
                let exchange = cur.read_short_str()?.to_owned();
                let kind = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Declare(Declare {
                    ticket,
                    exchange,
                    kind,
                    passive: flag(flags, 0),
                    durable: flag(flags, 1),
                    auto_delete: flag(flags, 2),
                    internal: flag(flags, 3),
                    no_wait: flag(flags, 4),
                    arguments: FieldTable::decode(cur)?,
                }))
            }
            11 => Ok(Self::DeclareOk),
            20 => {
                let ticket = cur.read_u16()?;
                let exchange = cur.read_short_str()?.to_owned();
                let flags = cur.read_u8()?;
                Ok(Self::Delete(Delete {
                    ticket,
                    exchange,
                    if_unused: flag(flags, 0),
                    no_wait: flag(flags, 1),
                }))
            }
            21 => Ok(Self::DeleteOk),
            method => Err(MethodError::UnknownMethod {
                class: super::CLASS_EXCHANGE,
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
                write_short_str(dst, &m.exchange)?;
                write_short_str(dst, &m.kind)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.passive);
                flags = pack(flags, 1, m.durable);
                flags = pack(flags, 2, m.auto_delete);
                flags = pack(flags, 3, m.internal);
                flags = pack(flags, 4, m.no_wait);
                write_u8(dst, flags);
                m.arguments.encode(dst)?;
            }
            Self::Delete(m) => {
                write_u16(dst, m.ticket);
                write_short_str(dst, &m.exchange)?;
                let mut flags = 0;
                flags = pack(flags, 0, m.if_unused);
                flags = pack(flags, 1, m.no_wait);
                write_u8(dst, flags);
            }
            Self::DeclareOk | Self::DeleteOk => {}
        }
        Ok(())
    }

    /// Method id within the exchange class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Declare(_) => 10,
            Self::DeclareOk => 11,
            Self::Delete(_) => 20,
            Self::DeleteOk => 21,
        }
    }
}
