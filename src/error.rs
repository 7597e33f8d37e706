//! Canonical error taxonomy of the engine.
//!
//! Truncated input never appears here: the decode layers report it and
//! `parse` turns it into a smaller consumed-byte count. Everything below is
//! a real failure. Frame- and protocol-level errors are fatal for the
//! connection; a [`EngineError::Channel`] only tears down its channel; the
//! two `*Closing` variants are synthetic, delivered to pending calls whose
//! scope is being torn down so they are never left hanging.

use std::time::Duration;

use thiserror::Error;

use crate::{frame::FrameError, method::MethodError};

/// Errors surfaced through the connection handler.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum EngineError {
    /// The byte stream is not a valid frame sequence. Fatal.
    #[error("malformed frame")]
    MalformedFrame(#[source] FrameError),

    /// A frame was well-delimited but its payload did not decode. Fatal.
    #[error("malformed frame payload")]
    MalformedMethod(#[source] MethodError),

    /// A valid frame arrived that is illegal in the current state. Fatal.
    #[error("protocol violation: {context}")]
    ProtocolViolation {
        /// What made the frame illegal.
        context: String,
    },

    /// The server reported a failure scoped to one channel.
    #[error("channel error {code}: {text}")]
    Channel {
        /// Server reply code.
        code: u16,
        /// Server-supplied reason.
        text: String,
    },

    /// The server closed the whole connection with an error code.
    #[error("connection error {code}: {text}")]
    Connection {
        /// Server reply code.
        code: u16,
        /// Server-supplied reason.
        text: String,
    },

    /// The connection began closing while this call was outstanding.
    #[error("connection is closing")]
    ConnectionClosing,

    /// The channel began closing while this call was outstanding.
    #[error("channel is closing")]
    ChannelClosing,

    /// No frame was received within twice the heartbeat interval. Fatal.
    #[error("heartbeat timeout after {silent:?} of silence")]
    HeartbeatTimeout {
        /// How long the receive side has been silent.
        silent: Duration,
    },
}

impl EngineError {
    /// Whether this error forces the whole connection closed.
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MalformedFrame(_)
                | Self::MalformedMethod(_)
                | Self::ProtocolViolation { .. }
                | Self::Connection { .. }
                | Self::HeartbeatTimeout { .. }
        )
    }

    pub(crate) fn violation(context: impl Into<String>) -> Self {
        Self::ProtocolViolation {
            context: context.into(),
        }
    }
}
