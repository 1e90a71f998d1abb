//! # Reply Values
//!
//! Purpose: Carry the outcome of one command as plain data: a status, the raw
//! payload, and child replies for array frames.
//!
//! ## Design Principles
//! 1. **Status Carries Failure**: Network, timeout and auth failures are reply
//!    statuses so callers branch on one value.
//! 2. **Lenient Accessors**: Typed readers fall back to the zero value; check
//!    [`Reply::status`] before trusting them.
//! 3. **Binary-Safe**: Payloads stay raw bytes until an accessor interprets them.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::error::ClientResult;

/// Outcome classification of a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Reply carries a value (or all declared array items).
    Ok,
    /// Server answered with a `-` error line.
    Error,
    /// Null bulk string, null/empty array or otherwise empty reply.
    NotFound,
    /// An argument could not be converted to its wire form.
    BadArgument,
    /// AUTH handshake was rejected after a (re)dial.
    NoAuth,
    /// Server-side failure classified by the caller.
    ServerError,
    /// Dial, write or read failed for a reason other than a deadline.
    NetworkException,
    /// Deadline expired while dialing, writing or reading.
    Timeout,
    /// Reply shape disagrees with its declared length.
    Unknown,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Status::Ok => "ok",
            Status::Error => "error",
            Status::NotFound => "not found",
            Status::BadArgument => "bad argument",
            Status::NoAuth => "no auth",
            Status::ServerError => "server error",
            Status::NetworkException => "network exception",
            Status::Timeout => "timeout",
            Status::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Decoded reply, or a locally produced failure.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    status: Status,
    payload: Option<Bytes>,
    items: Vec<Reply>,
}

impl Reply {
    /// Builds a reply for a parsed frame and infers its status.
    ///
    /// `cap` is the number of values the frame declared: 1 for simple strings,
    /// integers and non-null bulk strings, 0 for null bulk strings, and the
    /// element count (possibly -1) for arrays.
    ///
    /// An empty simple string (`+\r\n`) and a `$0` bulk string are present,
    /// empty payloads and come back `Ok`. They are neither rejected as short
    /// lines nor folded into `NotFound`; only `$-1` and empty or null arrays
    /// are `NotFound`.
    pub(crate) fn from_frame(payload: Option<Bytes>, cap: i64, items: Vec<Reply>) -> Self {
        let status = if cap == 0 || (payload.is_none() && items.is_empty()) {
            Status::NotFound
        } else if (cap == 1 && payload.is_some()) || items.len() as i64 >= cap {
            Status::Ok
        } else {
            Status::Unknown
        };
        Reply {
            status,
            payload,
            items,
        }
    }

    /// Builds a reply for a `-` error line.
    pub(crate) fn server_error(message: Bytes) -> Self {
        Reply {
            status: Status::Error,
            payload: Some(message),
            items: Vec::new(),
        }
    }

    /// Builds a locally produced failure; the message becomes the payload.
    pub(crate) fn failure(status: Status, message: impl fmt::Display) -> Self {
        Reply {
            status,
            payload: Some(Bytes::from(message.to_string())),
            items: Vec::new(),
        }
    }

    /// Status inferred for this reply.
    pub fn status(&self) -> Status {
        self.status
    }

    /// True when the status is [`Status::Ok`].
    pub fn is_ok(&self) -> bool {
        self.status == Status::Ok
    }

    /// True when the status is [`Status::NotFound`].
    pub fn is_not_found(&self) -> bool {
        self.status == Status::NotFound
    }

    /// Raw payload, `None` for null bulk strings and array replies.
    pub fn payload(&self) -> Option<&Bytes> {
        self.payload.as_ref()
    }

    /// Raw payload bytes; empty when absent.
    pub fn bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// Payload as UTF-8; empty when absent or not valid UTF-8.
    pub fn string(&self) -> String {
        self.text().map(str::to_owned).unwrap_or_default()
    }

    /// Accepts `1 t T TRUE true True` and their false counterparts.
    pub fn as_bool(&self) -> bool {
        matches!(self.text(), Some("1" | "t" | "T" | "TRUE" | "true" | "True"))
    }

    /// Payload parsed as `i8`; 0 when absent or unparsable.
    pub fn as_i8(&self) -> i8 {
        self.parse_or_default()
    }

    /// Payload parsed as `i16`; 0 when absent or unparsable.
    pub fn as_i16(&self) -> i16 {
        self.parse_or_default()
    }

    /// Payload parsed as `i32`; 0 when absent or unparsable.
    pub fn as_i32(&self) -> i32 {
        self.parse_or_default()
    }

    /// Payload parsed as `i64`; 0 when absent or unparsable.
    pub fn as_i64(&self) -> i64 {
        self.parse_or_default()
    }

    /// Payload parsed as `isize`; 0 when absent or unparsable.
    pub fn as_isize(&self) -> isize {
        self.parse_or_default()
    }

    /// Payload parsed as `u8`; 0 when absent or unparsable.
    pub fn as_u8(&self) -> u8 {
        self.parse_or_default()
    }

    /// Payload parsed as `u16`; 0 when absent or unparsable.
    pub fn as_u16(&self) -> u16 {
        self.parse_or_default()
    }

    /// Payload parsed as `u32`; 0 when absent or unparsable.
    pub fn as_u32(&self) -> u32 {
        self.parse_or_default()
    }

    /// Payload parsed as `u64`; 0 when absent or unparsable.
    pub fn as_u64(&self) -> u64 {
        self.parse_or_default()
    }

    /// Payload parsed as `usize`; 0 when absent or unparsable.
    pub fn as_usize(&self) -> usize {
        self.parse_or_default()
    }

    /// Payload parsed as `f32`; 0.0 when absent or unparsable.
    pub fn as_f32(&self) -> f32 {
        self.parse_or_default()
    }

    /// Payload parsed as `f64`; 0.0 when absent or unparsable.
    pub fn as_f64(&self) -> f64 {
        self.parse_or_default()
    }

    /// Deserializes a JSON payload into `T`.
    pub fn json_decode<T: DeserializeOwned>(&self) -> ClientResult<T> {
        Ok(serde_json::from_slice(self.bytes())?)
    }

    /// Child replies of an array frame.
    pub fn list(&self) -> &[Reply] {
        &self.items
    }

    /// Consumes the reply, returning its child replies.
    pub fn into_list(self) -> Vec<Reply> {
        self.items
    }

    /// Number of key/value pairs when items alternate key, value.
    pub fn kv_len(&self) -> usize {
        self.items.len() / 2
    }

    /// Calls `f(key, value)` for each adjacent pair and returns [`Reply::kv_len`].
    ///
    /// A trailing unpaired item is skipped.
    pub fn kv_each<F>(&self, mut f: F) -> usize
    where
        F: FnMut(&Reply, &Reply),
    {
        for (key, value) in self.kv_iter() {
            f(key, value);
        }
        self.kv_len()
    }

    /// Adjacent (key, value) pairs; a trailing unpaired item is skipped.
    pub fn kv_iter(&self) -> impl Iterator<Item = (&Reply, &Reply)> {
        self.items.chunks_exact(2).map(|pair| (&pair[0], &pair[1]))
    }

    fn text(&self) -> Option<&str> {
        std::str::from_utf8(self.bytes()).ok()
    }

    fn parse_or_default<T: FromStr + Default>(&self) -> T {
        self.text()
            .and_then(|text| text.parse().ok())
            .unwrap_or_default()
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(self.bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scalar(text: &str) -> Reply {
        Reply::from_frame(Some(Bytes::copy_from_slice(text.as_bytes())), 1, Vec::new())
    }

    #[test]
    fn infers_ok_for_scalar_with_payload() {
        let reply = scalar("OK");
        assert!(reply.is_ok());
        assert_eq!(reply.string(), "OK");
    }

    #[test]
    fn infers_not_found_for_null_and_empty() {
        assert!(Reply::from_frame(None, 0, Vec::new()).is_not_found());
        assert!(Reply::from_frame(None, -1, Vec::new()).is_not_found());
        assert!(Reply::from_frame(None, 3, Vec::new()).is_not_found());
    }

    #[test]
    fn infers_unknown_for_short_array() {
        let reply = Reply::from_frame(None, 3, vec![scalar("a")]);
        assert_eq!(reply.status(), Status::Unknown);
    }

    #[test]
    fn numeric_accessors_fall_back_to_zero() {
        assert_eq!(scalar("42").as_i64(), 42);
        assert_eq!(scalar("-7").as_i8(), -7);
        assert_eq!(scalar("300").as_u8(), 0);
        assert_eq!(scalar("-1").as_u32(), 0);
        assert_eq!(scalar("abc").as_i32(), 0);
        assert_eq!(scalar("2.5").as_f64(), 2.5);
        assert_eq!(scalar("1.25").as_f32(), 1.25);
        assert_eq!(Reply::from_frame(None, 0, Vec::new()).as_u64(), 0);
    }

    #[test]
    fn bool_accessor_matches_parse_bool_forms() {
        assert!(scalar("1").as_bool());
        assert!(scalar("True").as_bool());
        assert!(!scalar("0").as_bool());
        assert!(!scalar("yes").as_bool());
    }

    #[test]
    fn string_is_empty_for_invalid_utf8() {
        let reply = Reply::from_frame(Some(Bytes::from_static(&[0xff, 0xfe])), 1, Vec::new());
        assert_eq!(reply.string(), "");
        assert_eq!(reply.bytes(), &[0xff, 0xfe]);
    }

    #[test]
    fn json_decode_reads_structured_payload() {
        #[derive(serde::Deserialize, Debug, PartialEq)]
        struct Item {
            name: String,
            count: u32,
        }

        let reply = scalar(r#"{"name":"a","count":2}"#);
        let item: Item = reply.json_decode().unwrap();
        assert_eq!(
            item,
            Item {
                name: "a".to_string(),
                count: 2
            }
        );
        assert!(scalar("x").json_decode::<Item>().is_err());
    }

    #[test]
    fn kv_each_walks_adjacent_pairs() {
        let reply = Reply::from_frame(
            None,
            4,
            vec![scalar("k1"), scalar("v1"), scalar("k2"), scalar("v2")],
        );
        let mut seen = Vec::new();
        let pairs = reply.kv_each(|key, value| seen.push((key.string(), value.string())));
        assert_eq!(pairs, 2);
        assert_eq!(reply.kv_len(), 2);
        assert_eq!(
            seen,
            vec![
                ("k1".to_string(), "v1".to_string()),
                ("k2".to_string(), "v2".to_string())
            ]
        );
    }

    #[test]
    fn failure_carries_message() {
        let reply = Reply::failure(Status::Timeout, "deadline");
        assert_eq!(reply.status(), Status::Timeout);
        assert_eq!(reply.string(), "deadline");
        assert!(reply.list().is_empty());
    }
}
