//! Channel-class methods: per-channel lifecycle and flow control.

use bytes::BytesMut;

use super::MethodError;
use crate::codec::{CodecError, Cursor, write_short_str, write_u8, write_u16};

/// Request to close a channel, from either peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Close {
    /// Reply code; 200 is a normal close.
    pub reply_code: u16,
    /// Human-readable close reason.
    pub reply_text: String,
    /// Class id of the method that caused the close, or 0.
    pub failing_class: u16,
    /// Method id of the method that caused the close, or 0.
    pub failing_method: u16,
}

/// Channel-class method variants.
#[derive(Clone, Debug, PartialEq)]
pub enum ChannelMethod {
    /// Open a channel (id 10); the argument is a deprecated string.
    Open {
        /// Deprecated out-of-band setting; always empty.
        out_of_band: String,
    },
    /// Channel opened (id 11).
    OpenOk {
        /// Deprecated channel identifier blob.
        channel_id: Vec<u8>,
    },
    /// Ask the peer to pause or resume content delivery (id 20).
    Flow {
        /// Whether the peer may send content.
        active: bool,
    },
    /// Flow change confirmed (id 21).
    FlowOk {
        /// Whether content will flow.
        active: bool,
    },
    /// Close request (id 40).
    Close(Close),
    /// Close confirmation (id 41).
    CloseOk,
}

impl ChannelMethod {
    /// Decode the arguments of the channel method `method_id`.
    ///
    /// # Errors
    /// Returns [`MethodError::UnknownMethod`] for an undefined id, or a
    /// codec error for malformed arguments.
    pub fn decode(method_id: u16, cur: &mut Cursor<'_>) -> Result<Self, MethodError> {
        match method_id {
            10 => Ok(Self::Open {
                out_of_band: cur.read_short_str()?.to_owned(),
            }),
            11 => Ok(Self::OpenOk {
                channel_id: cur.read_long_str()?.to_vec(),
            }),
            20 => Ok(Self::Flow {
                active: cur.read_u8()? & 0x01 != 0,
            }),
            21 => Ok(Self::FlowOk {
                active: cur.read_u8()? & 0x01 != 0,
            }),
            40 => Ok(Self::Close(Close {
                reply_code: cur.read_u16()?,
                reply_text: cur.read_short_str()?.to_owned(),
                failing_class: cur.read_u16()?,
                failing_method: cur.read_u16()?,
            })),
            41 => Ok(Self::CloseOk),
            method => Err(MethodError::UnknownMethod {
                class: super::CLASS_CHANNEL,
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
            Self::Open { out_of_band } => write_short_str(dst, out_of_band)?,
            Self::OpenOk { channel_id } => {
                crate::codec::write_long_str(dst, channel_id)?;
            }
            Self::Flow { active } | Self::FlowOk { active } => {
                write_u8(dst, u8::from(*active));
            }
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

    /// Method id within the channel class.
    #[must_use]
    pub const fn method_id(&self) -> u16 {
        match self {
            Self::Open { .. } => 10,
            Self::OpenOk { .. } => 11,
            Self::Flow { .. } => 20,
            Self::FlowOk { .. } => 21,
            Self::Close(_) => 40,
            Self::CloseOk => 41,
        }
    }
}
