//! Incremental RESP Reply Parser
//!
//! This module decodes server replies from a byte buffer. It never performs
//! I/O: the connection appends socket data to a buffer and asks the parser
//! whether a complete reply is available, so every rule here can be tested
//! against canned byte slices.
//!
//! ## How the Parser Works
//!
//! The parser reads from a buffer and returns either:
//! - `Ok(Some((reply, consumed)))` - A full reply was decoded from the first `consumed` bytes
//! - `Ok(None)` - The reply is incomplete, read more data and try again
//! - `Err(ParseError)` - The bytes do not form a valid RESP reply
//!
//! ## Scanning Before Decoding
//!
//! A large array reply usually arrives over many socket reads. Decoding it
//! from byte 0 after every read would copy each element again and again, so
//! the reader first runs a [`ReplyScanner`]. The scanner only walks the
//! framing, allocates nothing, and remembers where it stopped, so every byte
//! is looked at once. When it reports the end offset of a complete reply,
//! that prefix is split off the buffer and decoded once with
//! [`RespParser::parse_bytes`], which slices bulk payloads out of the frozen
//! buffer instead of copying them.
//!
//! ## Lines
//!
//! A line ends at `\n`. A `\r` directly in front of it is dropped; no other
//! byte is special. Bulk string payloads are length-delimited and must be
//! followed by an exact `\r\n`.
//!
//! ## Strict and Mixed Arrays
//!
//! Ordinary array replies (MGET, KEYS, SMEMBERS, ...) only ever contain bulk
//! strings, so the strict parser rejects anything else inside an array. The
//! mixed parser is used for pub/sub pushes, which interleave integers with
//! bulk strings (`subscribe` acknowledgements carry a subscription count),
//! and for generic replies that may nest arrays.

use crate::protocol::types::{prefix, Reply, CRLF};
use bytes::Bytes;
use std::ops::Range;
use thiserror::Error;

/// Errors that can occur while decoding RESP data.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    /// The stream ended before the leading byte of a reply.
    #[error("no more data")]
    NoMoreData,

    /// The stream ended in the middle of a reply.
    #[error("unexpected end of stream")]
    UnexpectedEof,

    /// Unknown leading byte for a reply.
    #[error("unexpected reply: leading byte {0:#04x}")]
    UnexpectedReply(u8),

    /// A reply type that the strict parser does not accept inside an array.
    #[error("unexpected reply inside array: leading byte {0:#04x}")]
    UnexpectedElement(u8),

    /// Invalid integer format
    #[error("invalid integer: {0}")]
    InvalidInteger(String),

    /// Invalid bulk string or array length
    #[error("invalid length: {0}")]
    InvalidLength(String),

    /// Invalid UTF-8 in a status or error line
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(String),

    /// Bulk string payload not followed by CRLF
    #[error("bulk string missing trailing CRLF")]
    MissingTerminator,

    /// The reply exceeds maximum allowed size
    #[error("bulk string too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    /// Arrays nested beyond the supported depth
    #[error("maximum nesting depth exceeded: {0}")]
    TooDeep(usize),

    /// A well-formed reply of a different type than the caller expected
    #[error("unexpected reply type: expected {expected}, got {found}")]
    WrongType {
        expected: &'static str,
        found: &'static str,
    },

    /// A pub/sub push that does not have the documented shape
    #[error("malformed push message: {0}")]
    MalformedPush(String),
}

/// Result type for parsing operations.
pub type ParseResult<T> = Result<T, ParseError>;

/// Maximum size for a single bulk string (1 GiB)
pub const MAX_BULK_SIZE: usize = 1024 * 1024 * 1024;

/// Maximum array nesting depth (prevent stack overflow)
pub const MAX_NESTING_DEPTH: usize = 32;

/// How array elements are decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArrayMode {
    /// Array elements must be bulk strings or error replies.
    #[default]
    Strict,
    /// Array elements may be any reply, including integers and nested arrays.
    Mixed,
}

/// An incremental RESP reply parser.
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::{Reply, RespParser};
///
/// let mut parser = RespParser::mixed();
/// let (reply, consumed) = parser
///     .parse(b"*3\r\n$9\r\nsubscribe\r\n$4\r\nnews\r\n:1\r\n")
///     .unwrap()
///     .unwrap();
/// assert_eq!(consumed, 33);
/// assert_eq!(reply.into_array().unwrap()[2], Reply::Integer(1));
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct RespParser {
    mode: ArrayMode,
}

impl RespParser {
    /// Creates a strict parser (ordinary command replies).
    pub fn new() -> Self {
        Self {
            mode: ArrayMode::Strict,
        }
    }

    /// Creates a mixed parser (pub/sub pushes and generic replies).
    pub fn mixed() -> Self {
        Self {
            mode: ArrayMode::Mixed,
        }
    }

    pub fn mode(&self) -> ArrayMode {
        self.mode
    }

    /// Attempts to parse one reply from the start of `buf`.
    ///
    /// # Returns
    ///
    /// - `Ok(Some((reply, consumed)))` - Successfully parsed a reply
    /// - `Ok(None)` - Incomplete data, need more bytes
    /// - `Err(e)` - Parse error
    pub fn parse(&mut self, buf: &[u8]) -> ParseResult<Option<(Reply, usize)>> {
        self.parse_value(buf, None, 0, 0)
    }

    /// Like [`parse`](Self::parse), but bulk payloads share `buf`'s memory
    /// instead of being copied.
    pub fn parse_bytes(&mut self, buf: &Bytes) -> ParseResult<Option<(Reply, usize)>> {
        self.parse_value(buf, Some(buf), 0, 0)
    }

    /// Creates a scanner that finds the end of one reply in this mode.
    pub fn scanner(&self) -> ReplyScanner {
        ReplyScanner::new(self.mode)
    }

    /// Internal recursive parsing function. Returns the reply and the
    /// position just past it.
    fn parse_value(
        &self,
        buf: &[u8],
        owner: Option<&Bytes>,
        pos: usize,
        depth: usize,
    ) -> ParseResult<Option<(Reply, usize)>> {
        let Some(&lead) = buf.get(pos) else {
            return Ok(None);
        };

        check_element(self.mode, lead, depth)?;

        match lead {
            prefix::STATUS => self.parse_status(buf, pos),
            prefix::ERROR => self.parse_error(buf, pos),
            prefix::INTEGER => self.parse_integer(buf, pos),
            prefix::BULK_STRING => self.parse_bulk_string(buf, owner, pos),
            prefix::ARRAY => self.parse_array(buf, owner, pos, depth),
            other => Err(ParseError::UnexpectedReply(other)),
        }
    }

    /// Parses a status line: `+<text>\r\n`
    fn parse_status(&self, buf: &[u8], pos: usize) -> ParseResult<Option<(Reply, usize)>> {
        let Some((line, next)) = read_line(buf, pos + 1) else {
            return Ok(None);
        };
        Ok(Some((Reply::Status(utf8(line)?.to_string()), next)))
    }

    /// Parses an error line: `-<message>\r\n`, dropping a leading `ERR `.
    fn parse_error(&self, buf: &[u8], pos: usize) -> ParseResult<Option<(Reply, usize)>> {
        let Some((line, next)) = read_line(buf, pos + 1) else {
            return Ok(None);
        };
        let text = utf8(line)?;
        let text = text.strip_prefix("ERR ").unwrap_or(text);
        Ok(Some((Reply::Error(text.to_string()), next)))
    }

    /// Parses an integer: `:<integer>\r\n`
    fn parse_integer(&self, buf: &[u8], pos: usize) -> ParseResult<Option<(Reply, usize)>> {
        let Some((line, next)) = read_line(buf, pos + 1) else {
            return Ok(None);
        };
        let n = parse_number(line).map_err(ParseError::InvalidInteger)?;
        Ok(Some((Reply::Integer(n), next)))
    }

    /// Parses a bulk string: `$<length>\r\n<data>\r\n`
    fn parse_bulk_string(
        &self,
        buf: &[u8],
        owner: Option<&Bytes>,
        pos: usize,
    ) -> ParseResult<Option<(Reply, usize)>> {
        let Some((span, end)) = bulk_span(buf, pos)? else {
            return Ok(None);
        };
        let data = span.map(|range| match owner {
            Some(bytes) => bytes.slice(range),
            None => Bytes::copy_from_slice(&buf[range]),
        });
        Ok(Some((Reply::Bulk(data), end)))
    }

    /// Parses an array: `*<count>\r\n<elements...>`
    fn parse_array(
        &self,
        buf: &[u8],
        owner: Option<&Bytes>,
        pos: usize,
        depth: usize,
    ) -> ParseResult<Option<(Reply, usize)>> {
        let Some((count, mut next)) = array_header(buf, pos, depth)? else {
            return Ok(None);
        };
        if count == 0 {
            return Ok(Some((Reply::Array(Vec::new()), next)));
        }

        // The count is untrusted; don't let it size the allocation.
        let mut elements = Vec::with_capacity(count.min(1024));

        for _ in 0..count {
            match self.parse_value(buf, owner, next, depth + 1)? {
                Some((value, after)) => {
                    elements.push(value);
                    next = after;
                }
                None => return Ok(None),
            }
        }

        Ok(Some((Reply::Array(elements), next)))
    }
}

/// Rejects element types the strict mode does not allow inside arrays.
fn check_element(mode: ArrayMode, lead: u8, depth: usize) -> ParseResult<()> {
    if depth > 0
        && mode == ArrayMode::Strict
        && !matches!(lead, prefix::BULK_STRING | prefix::ERROR)
    {
        return Err(ParseError::UnexpectedElement(lead));
    }
    Ok(())
}

/// Locates the bulk string starting at `pos`.
///
/// Returns the payload range (`None` for a null bulk) and the position just
/// past the reply.
fn bulk_span(buf: &[u8], pos: usize) -> ParseResult<Option<(Option<Range<usize>>, usize)>> {
    let Some((line, data_start)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };
    let length = parse_number(line).map_err(ParseError::InvalidLength)?;

    if length == -1 {
        return Ok(Some((None, data_start)));
    }
    if length < 0 {
        return Err(ParseError::InvalidLength(length.to_string()));
    }

    let length = length as usize;
    if length > MAX_BULK_SIZE {
        return Err(ParseError::TooLarge {
            size: length,
            max: MAX_BULK_SIZE,
        });
    }

    let data_end = data_start + length;
    let total_needed = data_end + CRLF.len();
    if buf.len() < total_needed {
        return Ok(None);
    }

    if &buf[data_end..total_needed] != CRLF {
        return Err(ParseError::MissingTerminator);
    }

    Ok(Some((Some(data_start..data_end), total_needed)))
}

/// Reads an array header at `pos`: the element count and where the first
/// element starts. `*-1` (null array) and `*0` both count as empty.
fn array_header(buf: &[u8], pos: usize, depth: usize) -> ParseResult<Option<(usize, usize)>> {
    let Some((line, next)) = read_line(buf, pos + 1) else {
        return Ok(None);
    };
    let count = parse_number(line).map_err(ParseError::InvalidLength)?;
    if count <= 0 {
        return Ok(Some((0, next)));
    }
    if depth >= MAX_NESTING_DEPTH {
        return Err(ParseError::TooDeep(MAX_NESTING_DEPTH));
    }
    Ok(Some((count as usize, next)))
}

/// Finds where one reply ends without decoding it.
///
/// The scanner keeps its position between calls, so feeding it a buffer that
/// only ever grows costs time proportional to the new bytes. It must be used
/// with the same buffer prefix each time and discarded once it has reported
/// an end offset.
#[derive(Debug, Clone)]
pub struct ReplyScanner {
    mode: ArrayMode,
    /// Start of the next unscanned element
    pos: usize,
    /// Elements still expected by each open array, innermost last
    open: Vec<usize>,
}

impl ReplyScanner {
    pub fn new(mode: ArrayMode) -> Self {
        Self {
            mode,
            pos: 0,
            open: Vec::new(),
        }
    }

    /// Returns the length of the first complete reply in `buf`, or `None`
    /// if more bytes are needed.
    ///
    /// Framing errors are reported here; the contents of status, error and
    /// integer lines are checked by the decoder.
    pub fn scan(&mut self, buf: &[u8]) -> ParseResult<Option<usize>> {
        loop {
            let Some(&lead) = buf.get(self.pos) else {
                return Ok(None);
            };
            let depth = self.open.len();
            check_element(self.mode, lead, depth)?;

            let next = match lead {
                prefix::STATUS | prefix::ERROR | prefix::INTEGER => {
                    match read_line(buf, self.pos + 1) {
                        Some((_, next)) => next,
                        None => return Ok(None),
                    }
                }
                prefix::BULK_STRING => match bulk_span(buf, self.pos)? {
                    Some((_, next)) => next,
                    None => return Ok(None),
                },
                prefix::ARRAY => match array_header(buf, self.pos, depth)? {
                    Some((0, next)) => next,
                    Some((count, next)) => {
                        self.pos = next;
                        self.open.push(count);
                        continue;
                    }
                    None => return Ok(None),
                },
                other => return Err(ParseError::UnexpectedReply(other)),
            };

            self.pos = next;
            if self.element_done() {
                return Ok(Some(self.pos));
            }
        }
    }

    /// Counts one finished element against the open arrays. Returns true
    /// once the outermost reply is complete.
    fn element_done(&mut self) -> bool {
        while let Some(remaining) = self.open.last_mut() {
            *remaining -= 1;
            if *remaining > 0 {
                return false;
            }
            self.open.pop();
        }
        true
    }
}

/// Finds the line starting at `start`.
///
/// Returns the line content without its terminator and the position after
/// the `\n`, or `None` if no `\n` has arrived yet.
#[inline]
fn read_line(buf: &[u8], start: usize) -> Option<(&[u8], usize)> {
    let rest = buf.get(start..)?;
    let newline = rest.iter().position(|&b| b == b'\n')?;
    let mut line = &rest[..newline];
    if let Some((&b'\r', head)) = line.split_last() {
        line = head;
    }
    Some((line, start + newline + 1))
}

fn utf8(line: &[u8]) -> ParseResult<&str> {
    std::str::from_utf8(line).map_err(|e| ParseError::InvalidUtf8(e.to_string()))
}

fn parse_number(line: &[u8]) -> Result<i64, String> {
    let text = std::str::from_utf8(line).map_err(|_| String::from_utf8_lossy(line).into_owned())?;
    text.parse::<i64>().map_err(|_| text.to_string())
}

/// Helper function to parse a single reply with the strict parser.
pub fn parse_reply(buf: &[u8]) -> ParseResult<Option<(Reply, usize)>> {
    RespParser::new().parse(buf)
}

/// Helper function to parse a single reply with the mixed parser.
pub fn parse_mixed(buf: &[u8]) -> ParseResult<Option<(Reply, usize)>> {
    RespParser::mixed().parse(buf)
}
