//! RESP Protocol Implementation
//!
//! This module provides the client side of the Redis Serialization Protocol
//! (RESP): encoding request frames and decoding server replies.
//!
//! ## Overview
//!
//! Requests are always arrays of bulk strings. Replies may be any RESP type;
//! pub/sub pushes are arrays that mix bulk strings and integers.
//!
//! ## Modules
//!
//! - `frame`: Builds and encodes outbound request frames
//! - `types`: Defines the `Reply` enum and its wire serialization
//! - `parser`: Incremental, I/O-free reply decoder
//!
//! ## Example
//!
//! ```
//! use flashkv_client::protocol::{parse_reply, Frame, Reply};
//!
//! // Encoding a request
//! let bytes = Frame::new("GET").arg("name").encode();
//! assert_eq!(&bytes[..], b"*2\r\n$3\r\nGET\r\n$4\r\nname\r\n");
//!
//! // Decoding a reply
//! let (reply, consumed) = parse_reply(b"$4\r\nAriz\r\n").unwrap().unwrap();
//! assert_eq!(reply, Reply::bulk("Ariz"));
//! assert_eq!(consumed, 10);
//! ```

pub mod frame;
pub mod parser;
pub mod types;

// Re-export commonly used types for convenience
pub use frame::{encode_command, Frame};
pub use parser::{
    parse_mixed, parse_reply, ArrayMode, ParseError, ParseResult, ReplyScanner, RespParser,
    MAX_BULK_SIZE,
};
pub use types::Reply;
