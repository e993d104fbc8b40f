//! Error types and handling for the structural delta engine.
//!
//! This module defines all error types used throughout the crate, following
//! the same shape throughout: one broad umbrella enum per concern, each
//! variant either carrying its own message or wrapping a narrower error via
//! `#[from]`.

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level error type for the structural delta engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Errors raised while computing or applying a delta.
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// Errors raised while replaying a delta against a target.
    #[error("apply error: {0}")]
    Apply(#[from] ApplyError),

    /// Errors raised while encoding or decoding the binary wire format.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// Errors raised while loading configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// Invalid input that doesn't fit a more specific category.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Errors raised by the diff engine (C5).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    /// The configured recursion budget was exhausted.
    #[error("recursion budget exhausted at depth {depth}")]
    BudgetExceeded {
        /// Depth at which the budget ran out.
        depth: u32,
    },
}

/// Errors raised by the applicator (C6).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ApplyError {
    /// `SetMember`'s value was incompatible with the declared member kind.
    #[error("shape mismatch on member {member_index} ({kind}): {reason}")]
    ShapeMismatch {
        /// Member index the mismatch occurred on.
        member_index: u32,
        /// Human-readable name of the member's declared kind.
        kind: &'static str,
        /// Why the descriptor rejected the assignment.
        reason: &'static str,
    },

    /// A sequence index was out of range and the caller asked for strict
    /// bounds instead of the default no-op policy (§4.6).
    #[error("sequence index {index} out of range on member {member_index} (len {len})")]
    OutOfRange {
        /// Member index the op targeted.
        member_index: u32,
        /// The offending index.
        index: u32,
        /// Current length of the sequence.
        len: usize,
    },
}

/// Errors raised by the binary codec (C8).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodecError {
    /// Magic bytes didn't match, or the header mode didn't match what the
    /// caller asked to decode (headered vs. headerless).
    #[error("invalid header at offset {offset}")]
    InvalidHeader {
        /// Byte offset at which the header check failed.
        offset: usize,
    },

    /// The version byte was greater than the highest version this build
    /// understands.
    #[error("unsupported version {version} (max supported {max_supported})")]
    UnsupportedVersion {
        /// Version byte read from the stream.
        version: u8,
        /// Highest version this build can decode.
        max_supported: u8,
    },

    /// An operation kind or value tag byte was not recognised.
    #[error("unknown tag {tag:#04x} at offset {offset}")]
    UnknownTag {
        /// The unrecognised tag byte.
        tag: u8,
        /// Byte offset at which the tag was read.
        offset: usize,
    },

    /// The input ended before a complete field/record could be read.
    #[error("unexpected end of input at offset {offset}, needed {needed} more byte(s)")]
    Truncated {
        /// Byte offset at which the short read was detected.
        offset: usize,
        /// Number of additional bytes that were required.
        needed: usize,
    },

    /// A decoder safety cap was exceeded.
    #[error("bound exceeded: {bound} (limit {limit}, got {actual})")]
    BoundExceeded {
        /// Which bound was exceeded.
        bound: &'static str,
        /// The configured limit.
        limit: usize,
        /// The value that exceeded it.
        actual: usize,
    },

    /// A string field was not valid UTF-8.
    #[error("invalid UTF-8 string at offset {offset}")]
    InvalidString {
        /// Byte offset at which the string starts.
        offset: usize,
    },
}

impl Error {
    /// Construct a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Construct an invalid-input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether this error reflects a malformed wire payload (as opposed to
    /// an engine- or apply-side mistake).
    pub fn is_decode_error(&self) -> bool {
        matches!(self, Error::Codec(_))
    }
}
