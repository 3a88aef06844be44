//! Connection Module
//!
//! This module owns the client's socket. It opens the stream lazily on first
//! use, performs the AUTH/SELECT handshake, and drops the stream on any
//! transport or decode failure so the next call reconnects.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        Connection                           │
//! │                                                             │
//! │  ┌──────────────────────┐        ┌──────────────────────┐   │
//! │  │ BufWriter<WriteHalf> │        │ ReplyReader<ReadHalf>│   │
//! │  │  (foreground only)   │        │  BytesMut + parser   │   │
//! │  └──────────────────────┘        └──────────┬───────────┘   │
//! │                                             │ lent while    │
//! │                                             ▼ subscribed    │
//! │                                  ┌──────────────────────┐   │
//! │                                  │  pub/sub listener    │   │
//! │                                  └──────────────────────┘   │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Features
//!
//! - **Lazy connect**: nothing is opened until the first request
//! - **Handshake**: optional AUTH and SELECT before the connection is usable
//! - **No hidden retries**: failures surface to the caller; the next call reconnects
//! - **Statistics**: tracks handshakes, frames and bytes
//!
//! ## Example
//!
//! ```no_run
//! use flashkv_client::connection::Connection;
//! use flashkv_client::protocol::{Frame, RespParser};
//! use flashkv_client::ClientConfig;
//!
//! # async fn demo() -> flashkv_client::Result<()> {
//! let mut conn = Connection::new(ClientConfig::default());
//! conn.send(&Frame::new("PING").encode()).await?;
//! let reply = conn.read(RespParser::new()).await?;
//! println!("{}", reply);
//! # Ok(())
//! # }
//! ```

pub mod reader;
pub mod socket;

// Re-export commonly used types
pub use reader::ReplyReader;
pub use socket::{Connection, ConnectionState, ConnectionStats};
