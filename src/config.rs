//! Client Configuration
//!
//! Everything the client needs to open and prepare a connection. The values
//! are read once per connect: the send timeout is applied to every write on
//! that socket, the password triggers AUTH and the database index triggers
//! SELECT during the handshake.

use crate::error::{Error, Result};
use crate::{DEFAULT_HOST, DEFAULT_PORT};
use std::time::Duration;

/// How long an unsubscribing listener waits for the server's final
/// acknowledgement before giving up on the connection.
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Connection settings.
///
/// # Example
///
/// ```
/// use flashkv_client::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("cache.internal", 6380)
///     .with_password("hunter2")
///     .with_database(2)
///     .with_send_timeout(Duration::from_millis(500));
/// assert_eq!(config.address(), "cache.internal:6380");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Server host name or address
    pub host: String,
    /// Server port
    pub port: u16,
    /// Password for AUTH, sent right after connecting
    pub password: Option<String>,
    /// Database index for SELECT, sent right after AUTH
    pub database: Option<i64>,
    /// Upper bound for writing one request to the socket
    pub send_timeout: Option<Duration>,
    /// Upper bound for the pub/sub listener's final drain
    pub drain_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            password: None,
            database: None,
            send_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
        }
    }
}

impl ClientConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, index: i64) -> Self {
        self.database = Some(index);
        self
    }

    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = Some(timeout);
        self
    }

    pub fn with_drain_timeout(mut self, timeout: Duration) -> Self {
        self.drain_timeout = timeout;
        self
    }

    /// Returns the connect address as a string
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Rejects settings that can never produce a connection.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::argument("host must not be empty"));
        }
        if self.port == 0 {
            return Err(Error::argument("port must not be 0"));
        }
        if matches!(self.database, Some(db) if db < 0) {
            return Err(Error::argument("database index must not be negative"));
        }
        Ok(())
    }
}
