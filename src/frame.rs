//! Frame boundary detection and framing for the AMQP wire format.
//!
//! Every frame on the wire is shaped as a one-byte type, a two-byte channel
//! id, a four-byte payload length, the payload, and a closing end marker.
//! [`FrameStream`] pulls complete frames out of a presented byte region
//! without copying and reports how many bytes it consumed, so the caller can
//! re-present the unconsumed remainder together with new data later. A
//! partial frame is an ordinary "need more data" result, never an error.

use bytes::{BufMut, BytesMut};
use thiserror::Error;

use crate::codec::{Cursor, write_u16, write_u32, write_u8};


/// Closing marker byte every frame must end with.
pub const FRAME_END: u8 = 0xCE;

/// Bytes of frame overhead around the payload (header plus end marker).
pub const FRAME_OVERHEAD: usize = 8;

/// Fixed preamble the client transmits before any frame: `"AMQP"` followed
/// by the protocol version 0-9-1.
pub const PROTOCOL_PREAMBLE: [u8; 8] = *b"AMQP\x00\x00\x09\x01";

/// Frame types defined by the protocol.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries one encoded method.
    Method,
    /// Content header announcing body size and message properties.
    Header,
    /// A chunk of content body.
    Body,
    /// Liveness probe with an empty payload.
    Heartbeat,
}

impl FrameKind {
    /// Wire value of this frame type.
    #[must_use]
    pub const fn wire_value(self) -> u8 {
        match self {
            Self::Method => 1,
            Self::Header => 2,
            Self::Body => 3,
            Self::Heartbeat => 8,
        }
    }

    const fn from_wire(value: u8) -> Result<Self, FrameError> {
        match value {
            1 => Ok(Self::Method),
            2 => Ok(Self::Header),
            3 => Ok(Self::Body),
            8 => Ok(Self::Heartbeat),
            value => Err(FrameError::UnknownKind { value }),
        }
    }
}

/// A complete frame borrowed from the input region.
///
/// Frames are transient: they live only long enough to be dispatched into a
/// typed method or content event.
#[derive(Clone, Copy, Debug)]
pub struct Frame<'a> {
    /// Frame type tag.
    pub kind: FrameKind,
    /// Channel the frame belongs to; 0 is the connection itself.
    pub channel: u16,
    /// Raw payload bytes between the header and the end marker.
    pub payload: &'a [u8],
}

/// Wire-level framing errors. All of them are fatal for the connection.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    /// The type byte is outside the defined set.
    #[error("unknown frame type {value:#04x}")]
    UnknownKind {
        /// The offending type byte.
        value: u8,
    },

    /// The byte after the payload is not the end marker.
    #[error("bad frame-end marker {actual:#04x}, expected {FRAME_END:#04x}")]
    BadEndMarker {
        /// Byte found where the marker should be.
        actual: u8,
    },

    /// The declared frame size exceeds the negotiated maximum.
    #[error("frame of {size} bytes exceeds the negotiated maximum of {max}")]
    Oversized {
        /// Total frame size implied by the length field.
        size: usize,
        /// Negotiated maximum frame size.
        max: usize,
    },
}

/// Pull-based decoder over one presented byte region.
///
/// `next_frame` yields complete frames until the region is exhausted or only
/// a partial frame remains; [`consumed`](Self::consumed) then tells the
/// caller how many bytes were turned into frames and may be discarded.
#[derive(Debug)]
pub struct FrameStream<'a> {
    cur: Cursor<'a>,
    consumed: usize,
    /// Negotiated maximum total frame size; 0 disables the check.
    frame_max: usize,
}

impl<'a> FrameStream<'a> {
    /// Create a stream over `buf`, enforcing `frame_max` (0 = unlimited).
    #[must_use]
    pub const fn new(buf: &'a [u8], frame_max: usize) -> Self {
        Self {
            cur: Cursor::new(buf),
            consumed: 0,
            frame_max,
        }
    }

    /// Bytes consumed into complete frames so far.
    #[must_use]
    pub const fn consumed(&self) -> usize { self.consumed }

    /// Decode the next complete frame.
    ///
    /// Returns `Ok(None)` when the remaining bytes hold less than one whole
    /// frame; the cursor stays put so the caller can re-present them later.
    ///
    /// # Errors
    /// Returns a [`FrameError`] when the bytes at the cursor cannot be a
    /// valid frame. The stream must not be used further after an error.
    pub fn next_frame(&mut self) -> Result<Option<Frame<'a>>, FrameError> {
        let mut probe = self.cur.clone();
        let Ok(kind_byte) = probe.read_u8() else {
            return Ok(None);
        };
        let kind = FrameKind::from_wire(kind_byte)?;
        let (Ok(channel), Ok(len)) = (probe.read_u16(), probe.read_u32()) else {
            return Ok(None);
        };
        let len = len as usize;
        let total = len.saturating_add(FRAME_OVERHEAD);
        if self.frame_max != 0 && total > self.frame_max {
            return Err(FrameError::Oversized {
                size: total,
                max: self.frame_max,
            });
        }
        let Ok(payload) = probe.take(len) else {
            return Ok(None);
        };
        let marker = match probe.read_u8() {
            Ok(marker) => marker,
            Err(_) => return Ok(None),
        };
        if marker != FRAME_END {
            return Err(FrameError::BadEndMarker { actual: marker });
        }
        self.cur = probe;
        self.consumed += total;
        Ok(Some(Frame {
            kind,
            channel,
            payload,
        }))
    }
}

/// Wrap an already-encoded payload into a complete frame.
pub fn write_frame(dst: &mut BytesMut, kind: FrameKind, channel: u16, payload: &[u8]) {
    write_u8(dst, kind.wire_value());
    write_u16(dst, channel);
    write_u32(dst, u32::try_from(payload.len()).unwrap_or(u32::MAX));
    dst.put_slice(payload);
    write_u8(dst, FRAME_END);
}

/// Encode a heartbeat frame; always rides channel 0 with an empty payload.
pub fn write_heartbeat(dst: &mut BytesMut) { write_frame(dst, FrameKind::Heartbeat, 0, &[]); }
