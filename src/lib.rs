//! # FlashKV Client - An Async RESP Client
//!
//! An async client for FlashKV, Redis and any other server that speaks RESP
//! over TCP. It covers plain request/reply commands and publish/subscribe
//! with a background listener.
//!
//! ## Features
//!
//! - **Binary Safe**: Keys, arguments and values are byte strings end to end
//! - **Lazy Connections**: Sockets open on first use and reopen after failures
//! - **Streaming Payloads**: Large values go straight from the caller's buffer
//!   to the socket
//! - **Pub/Sub**: Channel and pattern subscriptions dispatched to handlers on
//!   a background task
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────────┐
//! │                          FlashKV Client                              │
//! │                                                                      │
//! │  ┌─────────────┐    ┌────────────────┐    ┌──────────────────────┐   │
//! │  │   Client    │───>│ CommandChannel │───>│     Connection       │   │
//! │  │ (commands)  │    │ send / expect  │    │ connect, AUTH,       │   │
//! │  └─────────────┘    └───────┬────────┘    │ SELECT, invalidate   │   │
//! │                             │             └──────────┬───────────┘   │
//! │                             ▼                        │               │
//! │                     ┌───────────────┐                │ read half     │
//! │                     │  FrameCodec   │                ▼               │
//! │                     │ Frame / Reply │    ┌──────────────────────┐    │
//! │                     └───────────────┘    │ SubscriptionManager  │    │
//! │                                          │  listener task       │    │
//! │                                          │  (owns read half)    │    │
//! │                                          └──────────────────────┘    │
//! └──────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```no_run
//! use flashkv_client::{Client, ClientConfig};
//! use flashkv_client::pubsub::Handler;
//!
//! #[tokio::main]
//! async fn main() -> flashkv_client::Result<()> {
//!     let mut client = Client::new(ClientConfig::new("127.0.0.1", 6379));
//!     client.set("name", "Ariz").await?;
//!     println!("{:?}", client.get_string("name").await?);
//!
//!     let mut subs = client.subscriber();
//!     let (handler, mut messages) = Handler::channel();
//!     subs.subscribe("news", handler).await?;
//!     client.publish("news", "hello").await?;
//!     println!("{:?}", messages.recv().await);
//!
//!     subs.close().await?;
//!     client.quit().await;
//!     Ok(())
//! }
//! ```
//!
//! ## Module Overview
//!
//! - [`protocol`]: request frame encoding and reply parsing
//! - [`connection`]: socket lifecycle, handshake and reply buffering
//! - [`channel`]: send/expect primitives every command is built from
//! - [`client`]: one method per supported command, plus payload codecs
//! - [`pubsub`]: subscriptions and the background listener
//! - [`config`]: connection settings
//! - [`error`]: the crate's error type

pub mod channel;
pub mod client;
pub mod config;
pub mod connection;
pub mod error;
pub mod protocol;
pub mod pubsub;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used types for convenience
pub use channel::CommandChannel;
pub use client::{Client, KeyType, PayloadCodec, Ttl, Utf8Codec};
pub use config::ClientConfig;
pub use connection::{ConnectionState, ConnectionStats};
pub use error::{Error, Result};
pub use protocol::{Frame, ParseError, Reply};
pub use pubsub::{Handler, Message, PubSubEvent, SubscriptionManager};

/// The default server port (same as Redis)
pub const DEFAULT_PORT: u16 = 6379;

/// The default server host
pub const DEFAULT_HOST: &str = "localhost";

/// Version of the client
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
