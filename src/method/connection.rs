//! Connection-class methods: handshake, tuning, and teardown.
//!
//! These methods always travel on channel 0. The Start/StartOk, optional
//! Secure/SecureOk, Tune/TuneOk, Open/OpenOk sequence forms the handshake;
//! Close/CloseOk end the connection from either side.

use bytes::{Bytes, BytesMut};

use super::MethodError;
use crate::codec::{
    CodecError,
    Cursor,
    FieldTable,
    write_long_str,
    write_short_str,
    write_u8,
    write_u16,
    write_u32,
};

/// Server greeting opening the handshake.
#[derive(Clone, Debug, PartialEq)]
pub struct Start {
    /// Major protocol version the server speaks.
    pub version_major: u8,
    /// Minor protocol version the server speaks.
    pub version_minor: u8,
    /// Server capabilities and product information.
    pub server_properties: FieldTable,
    /// Space-separated SASL mechanism names.
    pub mechanisms: Bytes,
    /// Space-separated locale names.
    pub locales: Bytes,
}

/// Client reply to [`Start`] selecting a mechanism and locale.
#[derive(Clone, Debug, PartialEq)]
pub struct StartOk {
    /// Client capabilities and product information.
    pub client_properties: FieldTable,
    /// Selected SASL mechanism name.
    pub mechanism: String,
    /// Opaque SASL response for the selected mechanism.
    pub response: Bytes,
    /// Selected locale.
    pub locale: String,
}

/// Additional SASL challenge from the server.
#[derive(Clone, Debug, PartialEq)]
pub struct Secure {
    /// Mechanism-specific challenge bytes.
    pub challenge: Bytes,
}

/// Client answer to a [`Secure`] challenge.
#[derive(Clone, Debug, PartialEq)]
pub struct SecureOk {
    /// Mechanism-specific response bytes.
    pub response: Bytes,
}

/// Server proposal of connection limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Tune {
    /// Highest channel id the server allows; 0 means no limit.
    pub channel_max: u16,
    /// Largest total frame size the server allows; 0 means no limit.
    pub frame_max: u32,
    /// Desired heartbeat interval in seconds; 0 disables heartbeats.
    pub heartbeat: u16,
}

/// Client confirmation of the negotiated limits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TuneOk {
    /// Negotiated channel limit.
    pub channel_max: u16,
    /// Negotiated frame size limit.
    pub frame_max: u32,
    /// Negotiated heartbeat interval in seconds.
    pub heartbeat: u16,
}

/// Client request to open a virtual host.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Open {
    /// Virtual host path to attach to.
    pub virtual_host: String,
    /// Deprecated capability list; always empty.
    pub capabilities: String,
    /// Deprecated insist flag.
    pub insist: bool,
}

/// Server confirmation that the virtual host is open.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenOk {
    /// Deprecated known-hosts list.
    pub known_hosts: String,
}

/// Request to close the connection, from either peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Close {
    /// Reply code; 200 is a normal shutdown.
    pub reply_code: u16,
    /// Human-readable close reason.
    pub reply_text: String,
    /// Class id of the method that caused the close, or 0.
    pub failing_class: u16,
    /// Method id of the method that caused the close, or 0.
    pub failing_method: u16,
}

/// Connection-class method variants.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionMethod {
    /// Server greeting (id 10).
    Start(Start),
    /// Client greeting reply (id 11).
    StartOk(StartOk),
    /// SASL challenge (id 20).
    Secure(Secure),
    /// SASL challenge reply (id 21).
    SecureOk(SecureOk),
    /// Limit proposal (id 30).
    Tune(Tune),
    /// Limit confirmation (id 31).
    TuneOk(TuneOk),
    /// Virtual host open request (id 40).
    Open(Open),
    /// Virtual host open confirmation (id 41).
    OpenOk(OpenOk),
    /// Close request (id 50).
    Close(Close),
    /// Close confirmation (id 51).
    CloseOk,
}

impl ConnectionMethod {
    /// Decode the arguments of the connection method `method_id`.
    ///
    /// # Errors
    /// Returns [`MethodError::UnknownMethod`] for an undefined id, or a
    /// codec error for malformed arguments.
    pub fn decode(method_id: u16, cur: &mut Cursor<'_>) -> Result<Self, MethodError> {
        match method_id {
            10 => Ok(Self::Start(Start {
                version_major: cur.read_u8()?,
                version_minor: cur.read_u8()?,
                server_properties: FieldTable::decode(cur)?,
                mechanisms: Bytes::copy_from_slice(cur.read_long_str()?),
                locales: Bytes::copy_from_slice(cur.read_long_str()?),
            })),
            11 => Ok(Self::StartOk(StartOk {
                client_properties: FieldTable::decode(cur)?,
                mechanism: cur.read_short_str()?.to_owned(),
                response: Bytes::copy_from_slice(cur.read_long_str()?),
                locale: cur.read_short_str()?.to_owned(),
            })),
            20 => Ok(Self::Secure(Secure {
                challenge: Bytes::copy_from_slice(cur.read_long_str()?),
            })),
            21 => Ok(Self::SecureOk(SecureOk {
                response: Bytes::copy_from_slice(cur.read_long_str()?),
            })),
            30 => Ok(Self::Tune(Tune {
                channel_max: cur.read_u16()?,
                frame_max: cur.read_u32()?,
                heartbeat: cur.read_u16()?,
            })),
            31 => Ok(Self::TuneOk(TuneOk {
                channel_max: cur.read_u16()?,
                frame_max: cur.read_u32()?,
                heartbeat: cur.read_u16()?,
            })),
            40 => Ok(Self::Open(Open {
                virtual_host: cur.read_short_str()?.to_owned(),
                capabilities: cur.read_short_str()?.to_owned(),
                insist: cur.read_u8()? & 0x01 != 0,
            })),
            41 => Ok(Self::OpenOk(OpenOk {
                known_hosts: cur.read_short_str()?.to_owned(),
            })),
            50 => Ok(Self::Close(Close {
                reply_code: cur.read_u16()?,
                reply_text: cur.read_short_str()?.to_owned(),
                failing_class: cur.read_u16()?,
                failing_method: cur.read_u16()?,
            })),
            51 => Ok(Self::CloseOk),
            method => Err(MethodError::UnknownMethod {
                class: super::CLASS_CONNECTION,
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
            Self::Start(m) => {
                write_u8(dst, m.version_major);
                write_u8(dst, m.version_minor);
                m.server_properties.encode(dst)?;
                write_long_str(dst, &m.mechanisms)?;
                write_long_str(dst, &m.locales)?;
            }
            Self::StartOk(m) => {
                m.client_properties.encode(dst)?;
                write_short_str(dst, &m.mechanism)?;
                write_long_str(dst, &m.response)?;
                write_short_str(dst, &m.locale)?;
            }
            Self::Secure(m) => write_long_str(dst, &m.challenge)?,
            Self::SecureOk(m) => write_long_str(dst, &m.response)?,
            Self::Tune(m) => {
                write_u16(dst, m.channel_max);
                write_u32(dst, m.frame_max);
                write_u16(dst, m.heartbeat);
            }
            Self::TuneOk(m) => {
                write_u16(dst, m.channel_max);
                write_u32(dst, m.frame_max);
                write_u16(dst, m.heartbeat);
            }
            Self::Open(m) => {
                write_short_str(dst, &m.virtual_host)?;
                write_short_str(dst, &m.capabilities)?;
                write_u8(dst, u8::from(m.insist));
            }
            Self::OpenOk(m) => write_short_str(dst, &m.known_hosts)?,
            Self::Close(m) => {
                write_u16(dst, m.reply_code);
                write_short_str(dst, &m.reply_text)?;
                write_u16(dst, m.failing_class);
                write_u16(dst, m.failing_method);
            }
            Self::CloseOk => {}
        }
        Ok(())
    }

    /// Method id within the connection class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Start(_) => 10,
            Self::StartOk(_) => 11,
            Self::Secure(_) => 20,
            Self::SecureOk(_) => 21,
            Self::Tune(_) => 30,
            Self::TuneOk(_) => 31,
            Self::Open(_) => 40,
            Self::OpenOk(_) => 41,
            Self::Close(_) => 50,
            Self::CloseOk => 51,
        }
    }
}
