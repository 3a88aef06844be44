//! Client Error Types
//!
//! Every fallible operation in the crate returns [`Error`]. The variants let
//! callers branch on *why* a call failed:
//!
//! | Variant | Meaning | Connection afterwards |
//! |---|---|---|
//! | `Connection` | socket could not be opened, or an open socket failed | `Disconnected` |
//! | `Protocol` | bytes on the wire were not valid RESP, or had the wrong shape | `Disconnected` |
//! | `Server` | the server answered with a `-` error reply | unchanged |
//! | `Argument` | caller input rejected before any I/O | unchanged |
//! | `Decode` | a payload codec could not decode a stored value | unchanged |
//! | `Busy` | the reply stream is lent to the pub/sub listener | unchanged |
//! | `Listener` | the pub/sub listener task itself died | `Disconnected` |
//!
//! A `Server` error is a normal outcome for several commands (renaming a
//! missing key, INCR on a non-integer). It never invalidates the connection.

use crate::protocol::ParseError;
use std::io;
use thiserror::Error;

/// Errors returned by the client.
#[derive(Debug, Error)]
pub enum Error {
    /// The socket could not be opened or failed while in use.
    #[error("connection error: {message}")]
    Connection {
        message: String,
        #[source]
        source: Option<io::Error>,
    },

    /// The reply did not conform to RESP framing or to the expected shape.
    #[error("protocol error: {0}")]
    Protocol(#[from] ParseError),

    /// The server rejected the request; `ERR ` prefix already stripped.
    #[error("server error: {0}")]
    Server(String),

    /// Invalid caller input.
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A complete reply arrived, but its payload did not decode.
    #[error("payload decode failed: {0}")]
    Decode(String),

    /// The reply stream is owned by the subscription listener.
    #[error("connection busy: {0}")]
    Busy(String),

    /// The background pub/sub listener terminated abnormally.
    #[error("listener failed: {0}")]
    Listener(String),
}

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// A connection error without an underlying I/O error.
    pub fn connection(message: impl Into<String>) -> Self {
        Error::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// A connection error caused by `source`, prefixed with `context`.
    pub fn io(context: &str, source: io::Error) -> Self {
        Error::Connection {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Error::Argument(message.into())
    }

    /// Returns true for errors that leave the connection `Disconnected`.
    pub fn invalidates_connection(&self) -> bool {
        matches!(
            self,
            Error::Connection { .. } | Error::Protocol(_) | Error::Listener(_)
        )
    }

    pub fn is_server(&self) -> bool {
        matches!(self, Error::Server(_))
    }

    pub fn is_protocol(&self) -> bool {
        matches!(self, Error::Protocol(_))
    }

    pub fn is_connection(&self) -> bool {
        matches!(self, Error::Connection { .. })
    }

    pub fn is_argument(&self) -> bool {
        matches!(self, Error::Argument(_))
    }

    pub fn is_decode(&self) -> bool {
        matches!(self, Error::Decode(_))
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::io("I/O error", e)
    }
}
