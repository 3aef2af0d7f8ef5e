//! Error types for frame and event parsing

use thiserror::Error;

/// Errors that can occur while parsing a single record
///
/// A `ParseError` never aborts a batch: callers skip the offending record
/// and keep going.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// Nothing to parse
    #[error("empty record")]
    Empty,

    /// Timestamp could not be parsed
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// Unknown verb token
    #[error("invalid verb: {0}")]
    InvalidVerb(String),

    /// Sequence number is neither `---` nor three digits
    #[error("invalid sequence number: {0}")]
    InvalidSequence(String),

    /// Device address is not `NN:NNNNNN` or the sentinel
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Opcode is not four hex digits
    #[error("invalid code: {0}")]
    InvalidCode(String),

    /// Declared payload length is not three digits
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Payload is not an even-length hex string
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// Frame structure is wrong (token count, trailing data)
    #[error("invalid frame: {0}")]
    InvalidFrame(String),

    /// A required event field is missing
    #[error("missing field: {0}")]
    MissingField(&'static str),
}
