//! Error types for codec operations

use thiserror::Error;

/// Error type for codec operations
#[derive(Error, Debug, PartialEq, Eq)]
pub enum Error {
    #[error("unexpected end of buffer")]
    EndOfBuffer,
    #[error("extra data found: {0} bytes")]
    ExtraData(usize),
    #[error("invalid bool")]
    InvalidBool,
    #[error("invalid presence tag: {0}")]
    InvalidTag(u8),
    #[error("invalid utf8 string")]
    InvalidUtf8,
    #[error("invalid data in {0}: {1}")]
    Invalid(&'static str, &'static str), // context, message
}
