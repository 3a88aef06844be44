//! Command Channel
//!
//! The single choke point every command goes through. It combines the frame
//! encoder with a [`Connection`] and exposes four primitives:
//!
//! - `send_command`: encode and write a frame
//! - `send_with_payload`: encode and write a frame whose last argument is
//!   streamed from a caller-provided byte slice
//! - `expect_status` / `expect_integer` / `expect_bulk` / `read_reply`:
//!   read exactly one reply of the named shape
//! - `expect_array`: read exactly one array of bulk strings
//!
//! plus `send_expect_*` composites that pair a send with the matching read.
//!
//! ## Failure Policy
//!
//! Nothing is retried here. Transport and decode failures invalidate the
//! connection (see [`Connection`]) and surface to the caller. An error reply
//! from the server becomes [`Error::Server`] whatever shape was expected and
//! leaves the connection usable. A reply of the wrong shape is
//! [`Error::Protocol`] and invalidates the connection, since the caller and
//! the server no longer agree on where the stream is.

use crate::config::ClientConfig;
use crate::connection::{Connection, ConnectionState, ConnectionStats};
use crate::error::{Error, Result};
use crate::protocol::types::CRLF;
use crate::protocol::{Frame, ParseError, Reply, RespParser, MAX_BULK_SIZE};
use bytes::Bytes;
use std::sync::Arc;
use tracing::{debug, trace};

/// Rejects keys that the server could never accept.
pub(crate) fn check_key(key: &[u8]) -> Result<()> {
    if key.is_empty() {
        return Err(Error::argument("key must not be empty"));
    }
    Ok(())
}

/// Rejects payload lengths above the server's bulk string ceiling.
pub(crate) fn check_payload(len: usize) -> Result<()> {
    if len > MAX_BULK_SIZE {
        return Err(Error::argument(format!(
            "payload of {} bytes exceeds the {} byte limit",
            len, MAX_BULK_SIZE
        )));
    }
    Ok(())
}

/// Request/response channel over one connection.
#[derive(Debug)]
pub struct CommandChannel {
    connection: Connection,
}

impl CommandChannel {
    /// Creates a channel; the connection opens on first use.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            connection: Connection::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.connection.config()
    }

    pub fn state(&self) -> ConnectionState {
        self.connection.state()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        Arc::clone(self.connection.stats())
    }

    pub(crate) fn connection_mut(&mut self) -> &mut Connection {
        &mut self.connection
    }

    /// Opens the connection now instead of on first use.
    pub async fn connect(&mut self) -> Result<()> {
        self.connection.ensure_connected().await
    }

    /// Writes a prepared frame.
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        trace!(command = %frame.name(), args = frame.len() - 1, "Sending command");
        self.connection.send(&frame.encode()).await
    }

    /// Encodes and writes `name` with `args`.
    pub async fn send_command<A: AsRef<[u8]>>(&mut self, name: &str, args: &[A]) -> Result<()> {
        self.send_frame(&Frame::with_args(name, args)).await
    }

    /// Encodes and writes `name` with `args` followed by `payload` as the
    /// final argument. The payload is written straight to the socket.
    ///
    /// The first argument is the key and must not be empty.
    pub async fn send_with_payload<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
        payload: &[u8],
    ) -> Result<()> {
        let key = args
            .first()
            .ok_or_else(|| Error::argument(format!("{} requires a key", name)))?;
        check_key(key.as_ref())?;
        check_payload(payload.len())?;

        let frame = Frame::with_args(name, args);
        let header = frame.encode_payload_header(payload.len());
        trace!(command = %name, payload = payload.len(), "Sending command with payload");
        self.connection
            .send_parts(&[&header[..], payload, CRLF])
            .await
    }

    async fn read(&mut self, parser: RespParser) -> Result<Reply> {
        self.connection.read(parser).await?.into_result()
    }

    /// Drops the connection after a reply of the wrong shape; the stream can
    /// no longer be trusted.
    fn wrong_type(&mut self, expected: &'static str, found: &Reply) -> Error {
        let err = ParseError::WrongType {
            expected,
            found: found.kind_name(),
        };
        self.connection.invalidate(&err.to_string());
        err.into()
    }

    /// Reads one reply of any shape. Error replies become [`Error::Server`].
    pub async fn read_reply(&mut self) -> Result<Reply> {
        self.read(RespParser::mixed()).await
    }

    /// Reads one status reply and returns its text.
    pub async fn expect_status(&mut self) -> Result<String> {
        match self.read(RespParser::new()).await? {
            Reply::Status(text) => Ok(text),
            other => Err(self.wrong_type("status", &other)),
        }
    }

    /// Reads one status reply, ignoring its text.
    pub async fn expect_ok(&mut self) -> Result<()> {
        self.expect_status().await.map(|_| ())
    }

    pub async fn expect_integer(&mut self) -> Result<i64> {
        match self.read(RespParser::new()).await? {
            Reply::Integer(n) => Ok(n),
            other => Err(self.wrong_type("integer", &other)),
        }
    }

    /// Reads one bulk reply; `None` for a null bulk.
    pub async fn expect_bulk(&mut self) -> Result<Option<Bytes>> {
        match self.read(RespParser::new()).await? {
            Reply::Bulk(data) => Ok(data),
            other => Err(self.wrong_type("bulk", &other)),
        }
    }

    /// Reads one array of bulk strings. A null array is an empty result.
    pub async fn expect_array(&mut self) -> Result<Vec<Option<Bytes>>> {
        let items = match self.read(RespParser::new()).await? {
            Reply::Array(items) => items,
            other => return Err(self.wrong_type("array", &other)),
        };

        let mut out = Vec::with_capacity(items.len());
        for item in items {
            match item {
                Reply::Bulk(data) => out.push(data),
                // The reply is fully consumed, so the stream is still in sync.
                Reply::Error(message) => return Err(Error::Server(message)),
                other => return Err(self.wrong_type("bulk", &other)),
            }
        }
        Ok(out)
    }

    pub async fn send_expect_status<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
    ) -> Result<String> {
        self.send_command(name, args).await?;
        self.expect_status().await
    }

    pub async fn send_expect_ok<A: AsRef<[u8]>>(&mut self, name: &str, args: &[A]) -> Result<()> {
        self.send_command(name, args).await?;
        self.expect_ok().await
    }

    pub async fn send_expect_integer<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
    ) -> Result<i64> {
        self.send_command(name, args).await?;
        self.expect_integer().await
    }

    pub async fn send_expect_bulk<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
    ) -> Result<Option<Bytes>> {
        self.send_command(name, args).await?;
        self.expect_bulk().await
    }

    pub async fn send_expect_array<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
    ) -> Result<Vec<Option<Bytes>>> {
        self.send_command(name, args).await?;
        self.expect_array().await
    }

    pub async fn send_expect_reply<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
    ) -> Result<Reply> {
        self.send_command(name, args).await?;
        self.read_reply().await
    }

    pub async fn send_payload_expect_ok<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
        payload: &[u8],
    ) -> Result<()> {
        self.send_with_payload(name, args, payload).await?;
        self.expect_ok().await
    }

    pub async fn send_payload_expect_integer<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
        payload: &[u8],
    ) -> Result<i64> {
        self.send_with_payload(name, args, payload).await?;
        self.expect_integer().await
    }

    pub async fn send_payload_expect_bulk<A: AsRef<[u8]>>(
        &mut self,
        name: &str,
        args: &[A],
        payload: &[u8],
    ) -> Result<Option<Bytes>> {
        self.send_with_payload(name, args, payload).await?;
        self.expect_bulk().await
    }

    /// Sends QUIT if connected, then closes. Errors are ignored.
    pub async fn quit(&mut self) {
        if self.connection.is_connected() {
            debug!("Sending QUIT");
            if self.send_frame(&Frame::new("QUIT")).await.is_ok() {
                let _ = self.read(RespParser::new()).await;
            }
        }
        self.connection.close().await;
    }

    pub async fn close(&mut self) {
        self.connection.close().await;
    }
}
