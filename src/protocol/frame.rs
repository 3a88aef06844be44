//! Request Frame Encoding
//!
//! Every request sent to the server is a RESP array of bulk strings whose
//! first element is the command keyword:
//!
//! ```text
//! *<1 + args>\r\n
//! $<len(command)>\r\n<command>\r\n
//! $<len(arg1)>\r\n<arg1>\r\n
//! ...
//! ```
//!
//! Lengths are byte lengths, so multi-byte UTF-8 text and binary values are
//! framed correctly. The element count and every length always precede the
//! bytes they describe.
//!
//! ## Streaming Payloads
//!
//! Value-bearing writes (SET, SETNX, PUBLISH, ...) may carry large payloads.
//! [`Frame::encode_payload_header`] produces everything up to and including
//! the payload's `$<n>\r\n` line, so the connection can write the payload and
//! its terminator straight to the socket without copying it into the frame
//! buffer.

use crate::protocol::parser::ParseError;
use crate::protocol::types::{prefix, Reply, CRLF};
use bytes::{BufMut, Bytes, BytesMut};

/// An outbound request: a command keyword followed by byte-string arguments.
///
/// # Example
///
/// ```
/// use flashkv_client::protocol::Frame;
///
/// let frame = Frame::new("SET").arg("k").arg("bar");
/// assert_eq!(&frame.encode()[..], b"*3\r\n$3\r\nSET\r\n$1\r\nk\r\n$3\r\nbar\r\n");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    parts: Vec<Bytes>,
}

impl Frame {
    /// Starts a frame for `command`.
    pub fn new(command: &str) -> Self {
        Self {
            parts: vec![Bytes::copy_from_slice(command.as_bytes())],
        }
    }

    /// Builds a frame from a command and a slice of arguments.
    pub fn with_args<A: AsRef<[u8]>>(command: &str, args: &[A]) -> Self {
        let mut frame = Self::new(command);
        for arg in args {
            frame.push_arg(arg);
        }
        frame
    }

    /// Appends one argument.
    pub fn arg(mut self, arg: impl AsRef<[u8]>) -> Self {
        self.push_arg(arg);
        self
    }

    /// Appends an integer argument in decimal form.
    pub fn int(self, n: i64) -> Self {
        self.arg(n.to_string())
    }

    /// Appends every argument yielded by `args`.
    pub fn args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        for arg in args {
            self.push_arg(arg);
        }
        self
    }

    pub fn push_arg(&mut self, arg: impl AsRef<[u8]>) {
        self.parts.push(Bytes::copy_from_slice(arg.as_ref()));
    }

    /// The command keyword.
    pub fn command(&self) -> &[u8] {
        &self.parts[0]
    }

    /// The arguments after the command keyword.
    pub fn arguments(&self) -> &[Bytes] {
        &self.parts[1..]
    }

    /// Number of elements, command keyword included.
    pub fn len(&self) -> usize {
        self.parts.len()
    }

    /// Always false: a frame holds at least its command keyword.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Command keyword as text, for logging.
    pub fn name(&self) -> String {
        String::from_utf8_lossy(self.command()).into_owned()
    }

    /// Encodes the whole frame.
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        self.encode_into(&mut buf);
        buf
    }

    /// Encodes the whole frame into an existing buffer.
    pub fn encode_into(&self, buf: &mut BytesMut) {
        write_header(buf, prefix::ARRAY, self.parts.len());
        for part in &self.parts {
            write_bulk(buf, part);
        }
    }

    /// Encodes the frame as if one more argument of `payload_len` bytes
    /// followed, stopping right after that argument's length line.
    ///
    /// The caller must write exactly `payload_len` bytes and then `\r\n`.
    pub fn encode_payload_header(&self, payload_len: usize) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.encoded_len() + 16);
        write_header(&mut buf, prefix::ARRAY, self.parts.len() + 1);
        for part in &self.parts {
            write_bulk(&mut buf, part);
        }
        write_header(&mut buf, prefix::BULK_STRING, payload_len);
        buf
    }

    fn encoded_len(&self) -> usize {
        // prefix + digits + CRLF for each header, rounded up generously
        16 + self
            .parts
            .iter()
            .map(|p| p.len() + 16)
            .sum::<usize>()
    }
}

impl TryFrom<Reply> for Frame {
    type Error = ParseError;

    /// Recovers a request frame from a decoded array of bulk strings.
    fn try_from(reply: Reply) -> Result<Self, Self::Error> {
        let found = reply.kind_name();
        let Some(items) = reply.into_array() else {
            return Err(ParseError::WrongType {
                expected: "array",
                found,
            });
        };
        if items.is_empty() {
            return Err(ParseError::WrongType {
                expected: "command",
                found: "empty array",
            });
        }
        let parts = items
            .into_iter()
            .map(|item| match item {
                Reply::Bulk(Some(bytes)) => Ok(bytes),
                other => Err(ParseError::WrongType {
                    expected: "bulk",
                    found: other.kind_name(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { parts })
    }
}

/// Encodes `command` and `args` into a request frame.
///
/// This is the free-function form of [`Frame::with_args`] + [`Frame::encode`].
pub fn encode_command<A: AsRef<[u8]>>(command: &str, args: &[A]) -> BytesMut {
    Frame::with_args(command, args).encode()
}

fn write_header(buf: &mut BytesMut, kind: u8, n: usize) {
    buf.put_u8(kind);
    buf.put_slice(n.to_string().as_bytes());
    buf.put_slice(CRLF);
}

fn write_bulk(buf: &mut BytesMut, data: &[u8]) {
    write_header(buf, prefix::BULK_STRING, data.len());
    buf.put_slice(data);
    buf.put_slice(CRLF);
}
