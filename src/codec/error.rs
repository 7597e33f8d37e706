//! Error types for the primitive wire codec.
//!
//! Decoding distinguishes two failure families: [`CodecError::TruncatedInput`]
//! means the presented bytes simply end too early and the same decode will
//! succeed once more data arrives; every other variant means the bytes are
//! wrong and re-presenting them can never help. Callers that stream data must
//! treat `TruncatedInput` as a retry signal, not an error.

use thiserror::Error;

/// Errors raised while decoding or encoding AMQP primitive types.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    /// Fewer bytes remain than the requested type requires.
    ///
    /// The cursor is left at the offset where decoding began, so the caller
    /// can retry from the same position once more bytes are available.
    #[error("input truncated at offset {at}: need {need} more bytes")]
    TruncatedInput {
        /// Offset at which the failed read started.
        at: usize,
        /// Additional bytes required beyond what was available.
        need: usize,
    },

    /// A field-table or field-array value carries an unrecognised type tag.
    #[error("unknown field value tag {tag:#04x}")]
    UnknownTag {
        /// The offending tag byte.
        tag: u8,
    },

    /// A short string holds bytes that are not valid UTF-8.
    #[error("short string is not valid UTF-8")]
    InvalidUtf8,

    /// A string or byte region is too long for its length prefix.
    #[error("value of {len} bytes exceeds the {max}-byte limit of its length prefix")]
    ValueTooLong {
        /// Actual byte length of the value.
        len: usize,
        /// Maximum the prefix can express.
        max: usize,
    },

    /// A length-prefixed region declares more content than it holds.
    ///
    /// Raised when a nested table or array runs out of bytes *inside* a
    /// region whose outer length prefix was satisfied; more input cannot fix
    /// the inconsistency, so this is a hard error rather than truncation.
    #[error("length-prefixed region of {declared} bytes ends mid-value")]
    LengthOverrun {
        /// Byte length the region declared for itself.
        declared: usize,
    },
}

impl CodecError {
    /// Whether this error only signals that more input is needed.
    #[must_use]
    pub const fn is_truncated(&self) -> bool { matches!(self, Self::TruncatedInput { .. }) }
}
