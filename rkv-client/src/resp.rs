//! # RESP2 Encoding and Parsing
//!
//! Purpose: Encode commands as arrays of bulk strings and decode one reply
//! frame at a time from a buffered stream.
//!
//! ## Design Principles
//! 1. **Closed Argument Set**: [`Arg`] lists every value that has a wire form;
//!    dynamic values are checked once at the boundary.
//! 2. **Buffer Reuse**: Caller provides buffers to avoid per-call allocations.
//! 3. **Binary-Safe**: Bulk strings are treated as raw bytes.
//! 4. **Bounded Recursion**: Arrays recurse per element, capped by
//!    [`CodecConfig::max_depth`].
//!
//! ## Frame Grammar
//!
//! ```text
//! +<text>\r\n            simple string
//! -<text>\r\n            error
//! :<digits>\r\n          integer
//! $<len>\r\n<bytes>\r\n  bulk string ($-1 is null)
//! *<count>\r\n<frames>   array (*-1 is null)
//! ```

use std::borrow::Cow;
use std::io::{self, BufRead, Read};

use bytes::Bytes;
use serde::Deserialize;

use crate::error::{BadArgument, DecodeError, ParseError};
use crate::reply::Reply;

const CRLF: &[u8] = b"\r\n";
const BULK_CHUNK: usize = 64 * 1024;

/// Limits applied while decoding replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Maximum number of arrays a frame may be nested in.
    pub max_depth: usize,
    /// Largest bulk string accepted, in bytes.
    pub max_bulk_len: usize,
}

impl Default for CodecConfig {
    fn default() -> Self {
        CodecConfig {
            max_depth: 32,
            max_bulk_len: 512 * 1024 * 1024,
        }
    }
}

/// One command argument.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    /// Sent unmodified.
    Bytes(Bytes),
    Str(String),
    Int(i64),
    Uint(u64),
    Float(f64),
    /// Kept apart from `Float` so it formats with `f32` precision.
    Float32(f32),
    /// Sent as `1` or `0`.
    Bool(bool),
    /// Sent as an empty bulk string.
    Null,
}

impl Arg {
    /// Wire form of the argument.
    pub fn as_wire(&self) -> Cow<'_, [u8]> {
        match self {
            Arg::Bytes(data) => Cow::Borrowed(data.as_ref()),
            Arg::Str(text) => Cow::Borrowed(text.as_bytes()),
            Arg::Int(value) => Cow::Owned(value.to_string().into_bytes()),
            Arg::Uint(value) => Cow::Owned(value.to_string().into_bytes()),
            Arg::Float(value) => Cow::Owned(value.to_string().into_bytes()),
            Arg::Float32(value) => Cow::Owned(value.to_string().into_bytes()),
            Arg::Bool(true) => Cow::Borrowed(&b"1"[..]),
            Arg::Bool(false) => Cow::Borrowed(&b"0"[..]),
            Arg::Null => Cow::Borrowed(&b""[..]),
        }
    }
}

macro_rules! arg_from {
    ($variant:ident as $target:ty: $($source:ty),+) => {
        $(
            impl From<$source> for Arg {
                fn from(value: $source) -> Self {
                    Arg::$variant(value as $target)
                }
            }
        )+
    };
}

arg_from!(Int as i64: i8, i16, i32, i64, isize);
arg_from!(Uint as u64: u8, u16, u32, u64, usize);

impl From<f64> for Arg {
    fn from(value: f64) -> Self {
        Arg::Float(value)
    }
}

impl From<f32> for Arg {
    fn from(value: f32) -> Self {
        Arg::Float32(value)
    }
}

impl From<bool> for Arg {
    fn from(value: bool) -> Self {
        Arg::Bool(value)
    }
}

impl From<()> for Arg {
    fn from(_: ()) -> Self {
        Arg::Null
    }
}

impl From<String> for Arg {
    fn from(value: String) -> Self {
        Arg::Str(value)
    }
}

impl From<&str> for Arg {
    fn from(value: &str) -> Self {
        Arg::Str(value.to_owned())
    }
}

impl From<&String> for Arg {
    fn from(value: &String) -> Self {
        Arg::Str(value.clone())
    }
}

impl From<Bytes> for Arg {
    fn from(value: Bytes) -> Self {
        Arg::Bytes(value)
    }
}

impl From<Vec<u8>> for Arg {
    fn from(value: Vec<u8>) -> Self {
        Arg::Bytes(Bytes::from(value))
    }
}

impl From<&[u8]> for Arg {
    fn from(value: &[u8]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<const N: usize> From<&[u8; N]> for Arg {
    fn from(value: &[u8; N]) -> Self {
        Arg::Bytes(Bytes::copy_from_slice(value))
    }
}

impl<T: Into<Arg>> From<Option<T>> for Arg {
    fn from(value: Option<T>) -> Self {
        value.map_or(Arg::Null, Into::into)
    }
}

impl TryFrom<serde_json::Value> for Arg {
    type Error = BadArgument;

    fn try_from(value: serde_json::Value) -> Result<Self, Self::Error> {
        use serde_json::Value;

        match value {
            Value::Null => Ok(Arg::Null),
            Value::Bool(flag) => Ok(Arg::Bool(flag)),
            Value::String(text) => Ok(Arg::Str(text)),
            Value::Number(number) => {
                if let Some(value) = number.as_i64() {
                    Ok(Arg::Int(value))
                } else if let Some(value) = number.as_u64() {
                    Ok(Arg::Uint(value))
                } else {
                    number.as_f64().map(Arg::Float).ok_or(BadArgument("number"))
                }
            }
            Value::Array(_) => Err(BadArgument("array")),
            Value::Object(_) => Err(BadArgument("object")),
        }
    }
}

/// Builds a `Vec<Arg>` from values of mixed types.
///
/// ```
/// use rkv_client::{args, Arg};
///
/// let list: Vec<Arg> = args!["key", 42, 1.5, true];
/// assert_eq!(list.len(), 4);
/// ```
#[macro_export]
macro_rules! args {
    () => {
        ::std::vec::Vec::<$crate::Arg>::new()
    };
    ($($value:expr),+ $(,)?) => {
        ::std::vec![$($crate::Arg::from($value)),+]
    };
}

/// Encodes a RESP2 array command into the provided buffer.
pub fn encode_command(cmd: &str, args: &[Arg], out: &mut Vec<u8>) {
    out.push(b'*');
    push_usize(out, args.len() + 1);
    out.extend_from_slice(CRLF);
    push_bulk(out, cmd.as_bytes());
    for arg in args {
        push_bulk(out, &arg.as_wire());
    }
}

/// Reads exactly one reply frame from the buffered reader.
pub fn read_reply<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    config: &CodecConfig,
) -> Result<Reply, DecodeError> {
    read_frame(reader, line_buf, config, 0)
}

fn read_frame<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    config: &CodecConfig,
    depth: usize,
) -> Result<Reply, DecodeError> {
    read_line(reader, line_buf)?;
    let (&tag, field) = line_buf.split_first().ok_or(ParseError::EmptyLine)?;

    match tag {
        b'-' => Ok(Reply::server_error(Bytes::copy_from_slice(field))),
        b'+' | b':' => Ok(Reply::from_frame(
            Some(Bytes::copy_from_slice(field)),
            1,
            Vec::new(),
        )),
        b'$' => {
            let len = parse_length(field)?;
            read_bulk(reader, len, config)
        }
        b'*' => {
            let count = parse_length(field)?;
            read_array(reader, line_buf, count, config, depth)
        }
        other => Err(ParseError::InvalidTag(other).into()),
    }
}

fn read_bulk<R: BufRead>(reader: &mut R, len: i64, config: &CodecConfig) -> Result<Reply, DecodeError> {
    if len < 0 {
        return Ok(Reply::from_frame(None, 0, Vec::new()));
    }
    let len = len as usize;
    if len > config.max_bulk_len {
        return Err(ParseError::BulkTooLarge {
            len,
            limit: config.max_bulk_len,
        }
        .into());
    }

    // The buffer grows with the bytes that actually arrive, so a declared
    // length alone never reserves more than one chunk.
    let framed = len + CRLF.len();
    let mut data = Vec::with_capacity(framed.min(BULK_CHUNK));
    reader.by_ref().take(framed as u64).read_to_end(&mut data)?;
    if data.len() < framed {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "bulk string cut short").into());
    }
    if !data.ends_with(CRLF) {
        return Err(ParseError::MissingCrlf.into());
    }
    data.truncate(len);

    Ok(Reply::from_frame(Some(Bytes::from(data)), 1, Vec::new()))
}

fn read_array<R: BufRead>(
    reader: &mut R,
    line_buf: &mut Vec<u8>,
    count: i64,
    config: &CodecConfig,
    depth: usize,
) -> Result<Reply, DecodeError> {
    if count <= 0 {
        return Ok(Reply::from_frame(None, count, Vec::new()));
    }
    if depth >= config.max_depth {
        return Err(ParseError::DepthExceeded(config.max_depth).into());
    }

    // Cap the up-front reservation; the declared count comes off the wire.
    let mut items = Vec::with_capacity((count as usize).min(1024));
    for _ in 0..count {
        items.push(read_frame(reader, line_buf, config, depth + 1)?);
    }
    Ok(Reply::from_frame(None, count, items))
}

fn read_line<R: BufRead>(reader: &mut R, buf: &mut Vec<u8>) -> Result<(), DecodeError> {
    buf.clear();
    reader.read_until(b'\n', buf)?;
    if buf.last() != Some(&b'\n') {
        return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "connection closed mid-frame").into());
    }
    if !buf.ends_with(CRLF) {
        return Err(ParseError::MissingCrlf.into());
    }
    buf.truncate(buf.len() - CRLF.len());
    Ok(())
}

/// Parses a decimal length field; only `-1` is accepted below zero.
fn parse_length(data: &[u8]) -> Result<i64, ParseError> {
    let (negative, digits) = match data.split_first() {
        Some((b'-', rest)) => (true, rest),
        _ => (false, data),
    };
    if digits.is_empty() {
        return Err(ParseError::InvalidLength);
    }

    let mut value: i64 = 0;
    for &b in digits {
        if !b.is_ascii_digit() {
            return Err(ParseError::InvalidLength);
        }
        value = value
            .checked_mul(10)
            .and_then(|value| value.checked_add((b - b'0') as i64))
            .ok_or(ParseError::InvalidLength)?;
    }

    match (negative, value) {
        (false, value) => Ok(value),
        (true, 1) => Ok(-1),
        (true, _) => Err(ParseError::InvalidLength),
    }
}

fn push_bulk(out: &mut Vec<u8>, data: &[u8]) {
    out.push(b'$');
    push_usize(out, data.len());
    out.extend_from_slice(CRLF);
    out.extend_from_slice(data);
    out.extend_from_slice(CRLF);
}

fn push_usize(out: &mut Vec<u8>, mut value: usize) {
    // Write digits into a small stack buffer to avoid heap allocations.
    let mut buf = [0u8; 20];
    let mut len = 0;
    if value == 0 {
        buf[0] = b'0';
        len = 1;
    } else {
        while value > 0 {
            buf[len] = b'0' + (value % 10) as u8;
            value /= 10;
            len += 1;
        }
    }
    for idx in (0..len).rev() {
        out.push(buf[idx]);
    }
}
