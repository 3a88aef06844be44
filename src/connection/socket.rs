//! Connection Lifecycle
//!
//! A [`Connection`] owns at most one TCP stream to the server and is the only
//! place in the crate that opens, writes to or closes it.
//!
//! ## Connection Lifecycle
//!
//! ```text
//!        ┌──────────────┐   ensure_connected()   ┌──────────────┐
//!        │ Disconnected │ ─────────────────────> │  handshake   │
//!        └──────────────┘                        │ connect      │
//!               ▲   ▲                            │ AUTH  (opt.) │
//!               │   │        any failure         │ SELECT(opt.) │
//!               │   └─────────────────────────── └──────┬───────┘
//!               │                                       │ success
//!               │  I/O error, decode error,             ▼
//!               │  close()                       ┌──────────────┐
//!               └─────────────────────────────── │  Connected   │
//!                                                └──────────────┘
//! ```
//!
//! A failed call never retries on its own. The socket is dropped and the
//! *next* call pays for a fresh handshake, once.
//!
//! ## Read and Write Halves
//!
//! The stream is split after connecting. Writes go through a `BufWriter`
//! over the write half; replies are decoded by a [`ReplyReader`] over the read
//! half. While a pub/sub listener is running it borrows the reader
//! (`take_reader` / `restore_reader`) and the foreground only writes.

use crate::config::ClientConfig;
use crate::connection::reader::ReplyReader;
use crate::error::{Error, Result};
use crate::protocol::{Frame, Reply, RespParser};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tracing::{debug, info, trace, warn};

/// Write buffer capacity
const WRITE_BUFFER_SIZE: usize = 16 * 1024;

/// Whether a connection currently holds a usable socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connected,
}

/// Statistics for one client connection (shared with its reader)
#[derive(Debug, Default)]
pub struct ConnectionStats {
    /// Successful handshakes
    pub connects: AtomicU64,
    /// Sockets dropped, by failure or by close
    pub disconnects: AtomicU64,
    /// Frames written
    pub commands_sent: AtomicU64,
    /// Replies decoded
    pub replies_read: AtomicU64,
    /// Total bytes read
    pub bytes_read: AtomicU64,
    /// Total bytes written
    pub bytes_written: AtomicU64,
}

impl ConnectionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn connection_opened(&self) {
        self.connects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn connection_closed(&self) {
        self.disconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn command_sent(&self) {
        self.commands_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn reply_read(&self) {
        self.replies_read.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_read(&self, count: usize) {
        self.bytes_read.fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn bytes_written(&self, count: usize) {
        self.bytes_written
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn connect_count(&self) -> u64 {
        self.connects.load(Ordering::Relaxed)
    }

    pub fn replies_read(&self) -> u64 {
        self.replies_read.load(Ordering::Relaxed)
    }
}

/// An open, handshaken socket.
#[derive(Debug)]
struct Link {
    peer: SocketAddr,
    /// `None` while lent to the pub/sub listener
    reader: Option<ReplyReader>,
    writer: BufWriter<OwnedWriteHalf>,
}

impl Link {
    /// Writes `parts` back to back and flushes, bounded by `timeout`.
    async fn write_parts(&mut self, parts: &[&[u8]], timeout: Option<Duration>) -> std::io::Result<()> {
        let writer = &mut self.writer;
        let write = async move {
            for part in parts {
                writer.write_all(part).await?;
            }
            writer.flush().await
        };

        match timeout {
            Some(limit) => tokio::time::timeout(limit, write).await.map_err(|_| {
                std::io::Error::new(std::io::ErrorKind::TimedOut, "send timed out")
            })?,
            None => write.await,
        }
    }

    /// Sends one handshake command and requires a status reply.
    async fn handshake_step(&mut self, frame: Frame, timeout: Option<Duration>) -> Result<()> {
        let name = frame.name();
        self.write_parts(&[&frame.encode()[..]], timeout)
            .await
            .map_err(|e| Error::io(&format!("{} failed", name), e))?;

        let reader = self
            .reader
            .as_mut()
            .ok_or_else(|| Error::connection("reply stream unavailable during handshake"))?;

        match reader.read(RespParser::new()).await {
            Ok(Reply::Status(_)) => Ok(()),
            Ok(Reply::Error(message)) => Err(Error::connection(format!(
                "{} rejected: {}",
                name, message
            ))),
            Ok(other) => Err(Error::connection(format!(
                "{} returned unexpected {} reply",
                name,
                other.kind_name()
            ))),
            Err(e) => Err(Error::connection(format!("{} failed: {}", name, e))),
        }
    }
}

/// One lazily opened connection to the server.
#[derive(Debug)]
pub struct Connection {
    config: ClientConfig,
    link: Option<Link>,
    stats: Arc<ConnectionStats>,
}

impl Connection {
    /// Creates a connection; nothing is opened until first use.
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            link: None,
            stats: Arc::new(ConnectionStats::new()),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    pub fn stats(&self) -> &Arc<ConnectionStats> {
        &self.stats
    }

    pub fn state(&self) -> ConnectionState {
        if self.link.is_some() {
            ConnectionState::Connected
        } else {
            ConnectionState::Disconnected
        }
    }

    pub fn is_connected(&self) -> bool {
        self.link.is_some()
    }

    /// Address of the server, while connected.
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.link.as_ref().map(|link| link.peer)
    }

    /// Changes the database selected on every future handshake.
    pub fn set_database(&mut self, index: i64) {
        self.config.database = Some(index);
    }

    /// Opens and handshakes the socket if there is none.
    pub async fn ensure_connected(&mut self) -> Result<()> {
        if self.link.is_some() {
            return Ok(());
        }

        self.config.validate()?;
        let link = self.open().await?;
        info!(addr = %link.peer, "Connected");
        self.stats.connection_opened();
        self.link = Some(link);
        Ok(())
    }

    async fn open(&self) -> Result<Link> {
        let address = self.config.address();
        debug!(addr = %address, "Opening connection");

        let stream = TcpStream::connect((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|e| {
                warn!(addr = %address, error = %e, "Connect failed");
                Error::io(&format!("connect to {} failed", address), e)
            })?;
        stream
            .set_nodelay(true)
            .map_err(|e| Error::io("set TCP_NODELAY failed", e))?;
        let peer = stream
            .peer_addr()
            .map_err(|e| Error::io("peer address unavailable", e))?;

        let (read_half, write_half) = stream.into_split();
        let mut link = Link {
            peer,
            reader: Some(ReplyReader::new(read_half, Arc::clone(&self.stats))),
            writer: BufWriter::with_capacity(WRITE_BUFFER_SIZE, write_half),
        };

        if let Some(password) = &self.config.password {
            debug!(addr = %peer, "Authenticating");
            link.handshake_step(Frame::new("AUTH").arg(password), self.config.send_timeout)
                .await?;
        }

        if let Some(index) = self.config.database {
            debug!(addr = %peer, db = index, "Selecting database");
            link.handshake_step(Frame::new("SELECT").int(index), self.config.send_timeout)
                .await?;
        }

        Ok(link)
    }

    /// Writes raw bytes, connecting first if needed.
    pub async fn send(&mut self, bytes: &[u8]) -> Result<()> {
        self.send_parts(&[bytes]).await
    }

    /// Writes several byte slices as one request, connecting first if needed.
    ///
    /// On a transport error the socket is dropped and the state becomes
    /// `Disconnected`.
    pub async fn send_parts(&mut self, parts: &[&[u8]]) -> Result<()> {
        self.ensure_connected().await?;
        let timeout = self.config.send_timeout;
        let Some(link) = self.link.as_mut() else {
            return Err(Error::connection("not connected"));
        };

        match link.write_parts(parts, timeout).await {
            Ok(()) => {
                let written = parts.iter().map(|p| p.len()).sum();
                self.stats.command_sent();
                self.stats.bytes_written(written);
                trace!(bytes = written, "Sent request");
                Ok(())
            }
            Err(e) => {
                self.invalidate(&e.to_string());
                Err(Error::io("send failed", e))
            }
        }
    }

    /// Reads one reply. Any transport or decode failure drops the socket.
    pub async fn read(&mut self, parser: RespParser) -> Result<Reply> {
        let Some(link) = self.link.as_mut() else {
            return Err(Error::connection("not connected"));
        };
        let Some(reader) = link.reader.as_mut() else {
            return Err(Error::Busy(
                "reply stream is owned by the subscription listener".to_string(),
            ));
        };

        match reader.read(parser).await {
            Ok(reply) => Ok(reply),
            Err(e) => {
                self.invalidate(&e.to_string());
                Err(e)
            }
        }
    }

    /// Lends the reply stream to the pub/sub listener.
    pub(crate) fn take_reader(&mut self) -> Result<ReplyReader> {
        self.link
            .as_mut()
            .and_then(|link| link.reader.take())
            .ok_or_else(|| Error::connection("reply stream unavailable"))
    }

    /// Returns a reply stream taken with [`take_reader`](Self::take_reader).
    ///
    /// If the socket was dropped in the meantime the reader is discarded.
    pub(crate) fn restore_reader(&mut self, reader: ReplyReader) {
        if let Some(link) = self.link.as_mut() {
            link.reader = Some(reader);
        }
    }

    /// Drops the socket after a failure.
    pub(crate) fn invalidate(&mut self, reason: &str) {
        if let Some(link) = self.link.take() {
            warn!(addr = %link.peer, reason = reason, "Connection invalidated");
            self.stats.connection_closed();
        }
    }

    /// Closes the socket. Calling this on a closed connection does nothing.
    pub async fn close(&mut self) {
        if let Some(mut link) = self.link.take() {
            // Best effort: the peer may already be gone.
            let _ = link.writer.shutdown().await;
            self.stats.connection_closed();
            info!(addr = %link.peer, "Connection closed");
        }
    }
}
