//! Buffered Reply Reader
//!
//! Owns the read side of a connection. Socket data is accumulated in a
//! `BytesMut` buffer and handed to the parser until one full reply is
//! available; bytes belonging to later replies stay buffered.
//!
//! Each read first runs a [`ReplyScanner`](crate::protocol::ReplyScanner)
//! over the buffer. The scanner resumes where the previous socket read left
//! it, so a reply spread over many reads is walked once. Only a complete reply is split off the buffer
//! and decoded, with bulk payloads sliced out of the split-off bytes.
//!
//! Reading is cancel safe: if a `read_*` future is dropped while waiting for
//! the socket, no bytes are lost, because the only await point is
//! `read_buf` and the buffer is only consumed after a complete reply. The
//! pub/sub listener relies on this when it races reads against its control
//! channels.

use crate::connection::socket::ConnectionStats;
use crate::error::{Error, Result};
use crate::protocol::{ParseError, Reply, RespParser};
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::tcp::OwnedReadHalf;
use tracing::trace;

/// Initial buffer capacity
const INITIAL_BUFFER_SIZE: usize = 16 * 1024;

/// Decodes replies from an async byte stream.
#[derive(Debug)]
pub struct ReplyReader<R = OwnedReadHalf> {
    inner: R,
    buffer: BytesMut,
    stats: Arc<ConnectionStats>,
}

impl<R: AsyncRead + Unpin> ReplyReader<R> {
    pub fn new(inner: R, stats: Arc<ConnectionStats>) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(INITIAL_BUFFER_SIZE),
            stats,
        }
    }

    /// Reads one reply using `parser`.
    ///
    /// Error replies are returned as `Ok(Reply::Error(_))`; callers decide
    /// how to surface them.
    pub async fn read(&mut self, mut parser: RespParser) -> Result<Reply> {
        let mut scanner = parser.scanner();
        loop {
            if !self.buffer.is_empty() {
                if let Some(end) = scanner.scan(&self.buffer)? {
                    let frame = self.buffer.split_to(end).freeze();
                    let Some((reply, _)) = parser.parse_bytes(&frame)? else {
                        return Err(ParseError::UnexpectedEof.into());
                    };
                    self.stats.reply_read();
                    trace!(
                        consumed = end,
                        remaining = self.buffer.len(),
                        "Parsed reply"
                    );
                    return Ok(reply);
                }
            }

            if self.buffer.capacity() - self.buffer.len() < 1024 {
                self.buffer.reserve(INITIAL_BUFFER_SIZE);
            }

            let n = self
                .inner
                .read_buf(&mut self.buffer)
                .await
                .map_err(|e| Error::io("read failed", e))?;

            if n == 0 {
                return Err(if self.buffer.is_empty() {
                    ParseError::NoMoreData
                } else {
                    ParseError::UnexpectedEof
                }
                .into());
            }

            self.stats.bytes_read(n);
            trace!(bytes = n, "Read data");
        }
    }

    /// Reads one reply of any shape (mixed array decoding).
    pub async fn read_reply(&mut self) -> Result<Reply> {
        self.read(RespParser::mixed()).await
    }

    /// Reads one array reply whose elements may be of any type.
    ///
    /// This is the pub/sub read primitive. A top-level error reply becomes
    /// [`Error::Server`]; a top-level non-array reply is a protocol error.
    pub async fn read_mixed(&mut self) -> Result<Vec<Reply>> {
        match self.read(RespParser::mixed()).await?.into_result()? {
            Reply::Array(items) => Ok(items),
            other => Err(ParseError::WrongType {
                expected: "array",
                found: other.kind_name(),
            }
            .into()),
        }
    }

    /// Number of bytes received but not yet decoded.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}
