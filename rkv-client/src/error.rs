//! # Client Errors
//!
//! Purpose: Separate failures that abort a call from outcomes that are carried
//! on a [`Reply`](crate::Reply) status.
//!
//! ## Design Principles
//! 1. **Status First**: Network failures, timeouts and server error replies are
//!    reply statuses, not `Err` values.
//! 2. **Fail Fast**: Malformed frames surface as [`ClientError::Protocol`] and
//!    are never reconciled into a reply.
//! 3. **Construction Is Strict**: Address, dial and auth failures during pool
//!    construction are returned to the caller.

use thiserror::Error;

/// Result type for the sync client.
pub type ClientResult<T> = Result<T, ClientError>;

/// Errors surfaced by the sync client.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or IO failure while dialing during construction.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// RESP framing or parse error.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// Address could not be resolved into a socket address.
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Server rejected the AUTH handshake of a freshly dialed connection.
    #[error("auth failed")]
    Auth,

    /// Payload could not be decoded into the requested structure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Frames that cannot be reconciled with the RESP grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Line did not carry a type tag.
    #[error("empty line")]
    EmptyLine,

    /// First byte of a frame is not one of `+ - : $ *`.
    #[error("invalid type tag {0:#04x}")]
    InvalidTag(u8),

    /// Line or bulk payload was not terminated by CRLF.
    #[error("missing CRLF terminator")]
    MissingCrlf,

    /// Length field is not a decimal integer >= -1.
    #[error("invalid length field")]
    InvalidLength,

    /// Bulk string declares more bytes than the configured limit.
    #[error("bulk length {len} exceeds limit {limit}")]
    BulkTooLarge { len: usize, limit: usize },

    /// Arrays nest deeper than the configured limit.
    #[error("array nesting exceeds depth {0}")]
    DepthExceeded(usize),
}

/// Failure while reading one reply frame.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Transport failed or hit its deadline mid-frame.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Bytes on the wire do not form a valid frame.
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Argument value that has no wire form.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("bad argument: unsupported {0} value")]
pub struct BadArgument(pub &'static str);
