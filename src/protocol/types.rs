//! RESP (Redis Serialization Protocol) Reply Types
//!
//! This module defines the reply values a client reads back from the server.
//!
//! ## Protocol Format
//!
//! Each RESP reply starts with a type prefix byte:
//! - `+` Status (simple string)
//! - `-` Error
//! - `:` Integer
//! - `$` Bulk String (possibly null)
//! - `*` Array
//!
//! ## Examples
//!
//! Status: `+OK\r\n`
//! Error: `-ERR no such key\r\n`
//! Integer: `:1000\r\n`
//! Bulk String: `$5\r\nhello\r\n`
//! Null Bulk String: `$-1\r\n`
//! Array: `*2\r\n$3\r\nfoo\r\n$3\r\nbar\r\n`

use crate::error::{Error, Result};
use bytes::Bytes;
use std::fmt;

/// The CRLF terminator used in RESP protocol
pub const CRLF: &[u8] = b"\r\n";

/// RESP protocol type prefixes
pub mod prefix {
    pub const STATUS: u8 = b'+';
    pub const ERROR: u8 = b'-';
    pub const INTEGER: u8 = b':';
    pub const BULK_STRING: u8 = b'$';
    pub const ARRAY: u8 = b'*';
}

/// A decoded server reply.
///
/// Exactly one case is active at a time. A null bulk string
/// (`Bulk(None)`, "no such key") and an empty array (`Array(vec![])`,
/// "empty result set") are different values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Status line, e.g. `+OK`.
    Status(String),

    /// Error line with any leading `ERR ` already stripped.
    Error(String),

    /// 64-bit signed integer.
    Integer(i64),

    /// Binary-safe bulk string, `None` for `$-1`.
    Bulk(Option<Bytes>),

    /// Array of replies. `*-1` and `*0` both decode to an empty array.
    Array(Vec<Reply>),
}

impl Reply {
    /// Creates a status reply.
    ///
    /// # Example
    /// ```
    /// use flashkv_client::protocol::Reply;
    /// let ok = Reply::status("OK");
    /// assert_eq!(ok.serialize(), b"+OK\r\n");
    /// ```
    pub fn status(s: impl Into<String>) -> Self {
        Reply::Status(s.into())
    }

    /// Creates an error reply. The text is written verbatim by
    /// [`serialize`](Self::serialize).
    pub fn error(s: impl Into<String>) -> Self {
        Reply::Error(s.into())
    }

    pub fn integer(n: i64) -> Self {
        Reply::Integer(n)
    }

    /// Creates a non-null bulk string reply.
    pub fn bulk(data: impl Into<Bytes>) -> Self {
        Reply::Bulk(Some(data.into()))
    }

    /// Creates a null bulk string reply.
    pub fn null() -> Self {
        Reply::Bulk(None)
    }

    pub fn array(values: Vec<Reply>) -> Self {
        Reply::Array(values)
    }

    pub fn ok() -> Self {
        Reply::Status("OK".to_string())
    }

    /// Short name of the active case, used in type mismatch errors.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Reply::Status(_) => "status",
            Reply::Error(_) => "error",
            Reply::Integer(_) => "integer",
            Reply::Bulk(Some(_)) => "bulk",
            Reply::Bulk(None) => "null",
            Reply::Array(_) => "array",
        }
    }

    /// Serializes the reply to its wire format.
    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.serialize_into(&mut buf);
        buf
    }

    /// Serializes the reply into an existing buffer.
    pub fn serialize_into(&self, buf: &mut Vec<u8>) {
        match self {
            Reply::Status(s) => {
                buf.push(prefix::STATUS);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Error(s) => {
                buf.push(prefix::ERROR);
                buf.extend_from_slice(s.as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Integer(n) => {
                buf.push(prefix::INTEGER);
                buf.extend_from_slice(n.to_string().as_bytes());
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(Some(data)) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(data.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                buf.extend_from_slice(data);
                buf.extend_from_slice(CRLF);
            }
            Reply::Bulk(None) => {
                buf.push(prefix::BULK_STRING);
                buf.extend_from_slice(b"-1");
                buf.extend_from_slice(CRLF);
            }
            Reply::Array(values) => {
                buf.push(prefix::ARRAY);
                buf.extend_from_slice(values.len().to_string().as_bytes());
                buf.extend_from_slice(CRLF);
                for value in values {
                    value.serialize_into(buf);
                }
            }
        }
    }

    /// Turns an error reply into [`Error::Server`], passing every other
    /// reply through.
    pub fn into_result(self) -> Result<Reply> {
        match self {
            Reply::Error(message) => Err(Error::Server(message)),
            other => Ok(other),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Reply::Bulk(None))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Reply::Error(_))
    }

    /// Attempts to view a status or UTF-8 bulk reply as text.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Status(s) => Some(s),
            Reply::Bulk(Some(b)) => std::str::from_utf8(b).ok(),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Reply::Bulk(Some(b)) => Some(b),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Reply::Integer(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Reply]> {
        match self {
            Reply::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Consumes self and returns the inner array if this is an Array variant.
    pub fn into_array(self) -> Option<Vec<Reply>> {
        match self {
            Reply::Array(arr) => Some(arr),
            _ => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Status(s) => write!(f, "{}", s),
            Reply::Error(s) => write!(f, "(error) {}", s),
            Reply::Integer(n) => write!(f, "(integer) {}", n),
            Reply::Bulk(Some(data)) => {
                if let Ok(s) = std::str::from_utf8(data) {
                    write!(f, "\"{}\"", s)
                } else {
                    write!(f, "(binary data, {} bytes)", data.len())
                }
            }
            Reply::Bulk(None) => write!(f, "(nil)"),
            Reply::Array(values) => {
                if values.is_empty() {
                    write!(f, "(empty array)")
                } else {
                    for (i, v) in values.iter().enumerate() {
                        if i > 0 {
                            writeln!(f)?;
                        }
                        write!(f, "{}) {}", i + 1, v)?;
                    }
                    Ok(())
                }
            }
        }
    }
}
