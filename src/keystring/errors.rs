//! KeyString codec errors
//!
//! These are entry-scoped: callers convert them into a decode error for
//! the single index entry being processed.

use thiserror::Error;

/// Failure while encoding or decoding one index entry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyStringError {
    #[error("key truncated at byte {offset}")]
    Truncated { offset: usize },

    #[error("unknown type tag 0x{tag:02x} at byte {offset}")]
    UnknownTag { tag: u8, offset: usize },

    #[error("invalid escape sequence at byte {offset}")]
    InvalidEscape { offset: usize },

    #[error("expected end marker at byte {offset}, found 0x{found:02x}")]
    MissingEnd { offset: usize, found: u8 },

    #[error("{count} unexpected trailing bytes")]
    TrailingBytes { count: usize },

    #[error("invalid type bits: {0}")]
    InvalidTypeBits(String),

    #[error("record id missing from {0}")]
    MissingRecordId(&'static str),

    #[error("invalid UTF-8 in string value")]
    InvalidUtf8,

    #[error("values of type {0} cannot be indexed")]
    UnsupportedType(String),

    #[error("cannot index parallel arrays {first} and {second}")]
    ParallelArrays { first: String, second: String },

    #[error("key has {actual} values but pattern has {expected} fields")]
    ArityMismatch { expected: usize, actual: usize },

    #[error("key helper output malformed: {0}")]
    HelperOutput(String),
}

/// Result type for codec operations
pub type KeyStringResult<T> = Result<T, KeyStringError>;
