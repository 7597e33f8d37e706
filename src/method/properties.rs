//! Content headers and the optional message properties behind them.
//!
//! A content-header frame announces the total body size of a message and
//! carries up to fourteen optional properties gated by a 16-bit flag word:
//! a property's field is present in the payload exactly when its flag bit is
//! set, in descending bit order starting at bit 15.

use bytes::BytesMut;

use super::MethodError;
use crate::codec::{
    CodecError,
    Cursor,
    FieldTable,
    write_short_str,
    write_u8,
    write_u16,
    write_u64,
    write_timestamp,
};

const FLAG_CONTENT_TYPE: u16 = 1 << 15;
const FLAG_CONTENT_ENCODING: u16 = 1 << 14;
const FLAG_HEADERS: u16 = 1 << 13;
const FLAG_DELIVERY_MODE: u16 = 1 << 12;
const FLAG_PRIORITY: u16 = 1 << 11;
const FLAG_CORRELATION_ID: u16 = 1 << 10;
const FLAG_REPLY_TO: u16 = 1 << 9;
const FLAG_EXPIRATION: u16 = 1 << 8;
const FLAG_MESSAGE_ID: u16 = 1 << 7;
const FLAG_TIMESTAMP: u16 = 1 << 6;
const FLAG_TYPE: u16 = 1 << 5;
const FLAG_USER_ID: u16 = 1 << 4;
const FLAG_APP_ID: u16 = 1 << 3;
const FLAG_CLUSTER_ID: u16 = 1 << 2;

/// Optional per-message metadata carried in a content header.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct BasicProperties {
    /// MIME content type of the body.
    pub content_type: Option<String>,
    /// MIME content encoding of the body.
    pub content_encoding: Option<String>,
    /// Application headers.
    pub headers: Option<FieldTable>,
    /// 1 for transient, 2 for persistent.
    pub delivery_mode: Option<u8>,
    /// Priority, 0 to 9.
    pub priority: Option<u8>,
    /// Application correlation identifier.
    pub correlation_id: Option<String>,
    /// Address to reply to.
    pub reply_to: Option<String>,
    /// Message expiration specification.
    pub expiration: Option<String>,
    /// Application message identifier.
    pub message_id: Option<String>,
    /// Message timestamp, POSIX seconds.
    pub timestamp: Option<u64>,
    /// Application message type name.
    pub message_type: Option<String>,
    /// Creating user id.
    pub user_id: Option<String>,
    /// Creating application id.
    pub app_id: Option<String>,
    /// Deprecated cluster id.
    pub cluster_id: Option<String>,
}

impl BasicProperties {
    fn flags(&self) -> u16 {
        let mut flags = 0;
        let mut set = |on: bool, bit: u16| {
            if on {
                flags |= bit;
            }
        };
        set(self.content_type.is_some(), FLAG_CONTENT_TYPE);
        set(self.content_encoding.is_some(), FLAG_CONTENT_ENCODING);
        set(self.headers.is_some(), FLAG_HEADERS);
        set(self.delivery_mode.is_some(), FLAG_DELIVERY_MODE);
        set(self.priority.is_some(), FLAG_PRIORITY);
        set(self.correlation_id.is_some(), FLAG_CORRELATION_ID);
        set(self.reply_to.is_some(), FLAG_REPLY_TO);
        set(self.expiration.is_some(), FLAG_EXPIRATION);
        set(self.message_id.is_some(), FLAG_MESSAGE_ID);
        set(self.timestamp.is_some(), FLAG_TIMESTAMP);
        set(self.message_type.is_some(), FLAG_TYPE);
        set(self.user_id.is_some(), FLAG_USER_ID);
        set(self.app_id.is_some(), FLAG_APP_ID);
        set(self.cluster_id.is_some(), FLAG_CLUSTER_ID);
        flags
    }
}

/// Decoded content-header frame payload.
#[derive(Clone, Debug, PartialEq)]
pub struct ContentHeader {
    /// Class of the content; basic content uses class 60.
    pub class_id: u16,
    /// Total size in bytes of the body frames that follow.
    pub body_size: u64,
    /// Optional message properties.
    pub properties: BasicProperties,
}

impl ContentHeader {
    /// Build a header for basic content of `body_size` bytes.
    #[must_use]
    pub const fn basic(body_size: u64, properties: BasicProperties) -> Self {
        Self {
            class_id: super::CLASS_BASIC,
            body_size,
            properties,
        }
    }

    /// Decode a complete content-header frame payload.
    ///
    /// # Errors
    /// Returns a [`MethodError`] when the payload is malformed or leaves
    /// trailing bytes.
    pub fn decode(payload: &[u8]) -> Result<Self, MethodError> {
        let mut cur = Cursor::new(payload);
        let class_id = cur.read_u16()?;
        let _weight = cur.read_u16()?;
        let body_size = cur.read_u64()?;
        let flags = cur.read_u16()?;

        let mut short = |bit: u16, cur: &mut Cursor<'_>| -> Result<Option<String>, CodecError> {
            if flags & bit == 0 {
                Ok(None)
            } else {
                Ok(Some(cur.read_short_str()?.to_owned()))
            }
        };

        let content_type = short(FLAG_CONTENT_TYPE, &mut cur)?;
        let content_encoding = short(FLAG_CONTENT_ENCODING, &mut cur)?;
        let headers = if flags & FLAG_HEADERS == 0 {
            None
        } else {
            Some(FieldTable::decode(&mut cur)?)
        };
        let delivery_mode = if flags & FLAG_DELIVERY_MODE == 0 {
            None
        } else {
            Some(cur.read_u8()?)
        };
        let priority = if flags & FLAG_PRIORITY == 0 {
            None
        } else {
            Some(cur.read_u8()?)
        };
        let correlation_id = short(FLAG_CORRELATION_ID, &mut cur)?;
        let reply_to = short(FLAG_REPLY_TO, &mut cur)?;
        let expiration = short(FLAG_EXPIRATION, &mut cur)?;
        let message_id = short(FLAG_MESSAGE_ID, &mut cur)?;
        let timestamp = if flags & FLAG_TIMESTAMP == 0 {
            None
        } else {
            Some(cur.read_timestamp()?)
        };
        let message_type = short(FLAG_TYPE, &mut cur)?;
        let user_id = short(FLAG_USER_ID, &mut cur)?;
        let app_id = short(FLAG_APP_ID, &mut cur)?;
        let cluster_id = short(FLAG_CLUSTER_ID, &mut cur)?;

        if !cur.is_exhausted() {
            return Err(MethodError::TrailingBytes {
                class: class_id,
                method: 0,
                left: cur.remaining(),
            });
        }

        Ok(Self {
            class_id,
            body_size,
            properties: BasicProperties {
                content_type,
                content_encoding,
                headers,
                delivery_mode,
                priority,
                correlation_id,
                reply_to,
                expiration,
                message_id,
                timestamp,
                message_type,
                user_id,
                app_id,
                cluster_id,
            },
        })
    }

    /// Encode this header as a content-header frame payload.
    ///
    /// # Errors
    /// Returns a [`CodecError`] when a property string exceeds its prefix.
    pub fn encode(&self, dst: &mut BytesMut) -> Result<(), CodecError> {
        let p = &self.properties;
        write_u16(dst, self.class_id);
        write_u16(dst, 0); // weight, unused
        write_u64(dst, self.body_size);
        write_u16(dst, p.flags());

        let mut short = |value: &Option<String>, dst: &mut BytesMut| -> Result<(), CodecError> {
            if let Some(value) = value {
                write_short_str(dst, value)?;
            }
            Ok(())
        };

        short(&p.content_type, dst)?;
        short(&p.content_encoding, dst)?;
        if let Some(headers) = &p.headers {
            headers.encode(dst)?;
        }
        if let Some(mode) = p.delivery_mode {
            write_u8(dst, mode);
        }
        if let Some(priority) = p.priority {
            write_u8(dst, priority);
        }
        short(&p.correlation_id, dst)?;
        short(&p.reply_to, dst)?;
        short(&p.expiration, dst)?;
        short(&p.message_id, dst)?;
        if let Some(ts) = p.timestamp {
            write_timestamp(dst, ts);
        }
        short(&p.message_type, dst)?;
        short(&p.user_id, dst)?;
        short(&p.app_id, dst)?;
        short(&p.cluster_id, dst)?;
        Ok(())
    }
}
