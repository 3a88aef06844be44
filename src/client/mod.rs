//! Command Layer
//!
//! [`Client`] wraps a [`CommandChannel`] with one method per supported
//! command. Every method is a single request/reply built from the channel
//! primitives, so the failure rules are the channel's: server errors come
//! back as [`Error::Server`] and leave the connection open, transport and
//! protocol errors drop it and the next call reconnects.
//!
//! ## Supported Commands
//!
//! ### Strings and Keys
//! - `PING`, `ECHO`
//! - `SET`, `SETNX`, `GET`, `GETSET`, `MSET`, `MGET`
//! - `DEL`, `EXISTS`, `TYPE`, `RENAME`, `EXPIRE`, `EXPIREAT`, `TTL`, `KEYS`,
//!   `RANDOMKEY`, `SORT`
//! - `INCR`, `INCRBY`, `DECR`, `DECRBY`
//!
//! ### Sets and Lists
//! - `SADD`, `SREM`, `SISMEMBER`, `SMEMBERS`, `SCARD`, `SPOP`, `SMOVE`
//! - `SINTER`, `SUNION`, `SDIFF`
//! - `LPUSH`, `RPUSH`, `LPOP`, `RPOP`, `LINDEX`, `LRANGE`, `LLEN`
//!
//! ### Server
//! - `DBSIZE`, `FLUSHDB`, `FLUSHALL`, `INFO`, `SELECT`, `PUBLISH`, `QUIT`

pub mod codec;

pub use codec::{PayloadCodec, RawCodec, Utf8Codec};

use crate::channel::{check_key, CommandChannel};
use crate::config::ClientConfig;
use crate::connection::{ConnectionState, ConnectionStats};
use crate::error::{Error, Result};
use crate::protocol::Frame;
use crate::pubsub::SubscriptionManager;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::debug;

/// The type of value stored at a key, as reported by TYPE.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyType {
    None,
    String,
    List,
    Set,
    ZSet,
    Hash,
    Stream,
    Other(String),
}

impl KeyType {
    fn parse(name: &str) -> Self {
        match name {
            "none" => KeyType::None,
            "string" => KeyType::String,
            "list" => KeyType::List,
            "set" => KeyType::Set,
            "zset" => KeyType::ZSet,
            "hash" => KeyType::Hash,
            "stream" => KeyType::Stream,
            other => KeyType::Other(other.to_string()),
        }
    }
}

/// Remaining lifetime of a key, as reported by TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// The key does not exist
    Missing,
    /// The key exists and never expires
    Persistent,
    Expires(Duration),
}

impl Ttl {
    fn from_reply(seconds: i64) -> Self {
        match seconds {
            -2 => Ttl::Missing,
            n if n < 0 => Ttl::Persistent,
            n => Ttl::Expires(Duration::from_secs(n as u64)),
        }
    }
}

/// Rejects an empty key list or any empty key in it.
fn check_keys<K: AsRef<[u8]>>(command: &str, keys: &[K]) -> Result<()> {
    if keys.is_empty() {
        return Err(Error::argument(format!(
            "{} requires at least one key",
            command
        )));
    }
    keys.iter().try_for_each(|k| check_key(k.as_ref()))
}

/// Splits INFO output into `field -> value`, skipping section headers.
fn parse_info(text: &str) -> HashMap<String, String> {
    text.lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// An async client for one server connection.
///
/// # Example
///
/// ```no_run
/// use flashkv_client::{Client, ClientConfig};
///
/// # async fn run() -> flashkv_client::Result<()> {
/// let mut client = Client::new(ClientConfig::new("127.0.0.1", 6379));
/// client.set("greeting", b"hello").await?;
/// assert_eq!(client.get_string("greeting").await?.as_deref(), Some("hello"));
/// client.quit().await;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct Client {
    channel: CommandChannel,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            channel: CommandChannel::new(config),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        self.channel.config()
    }

    pub fn state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.channel.stats()
    }

    /// The underlying channel, for commands without a wrapper.
    pub fn channel(&mut self) -> &mut CommandChannel {
        &mut self.channel
    }

    /// Opens the connection now instead of on first use.
    pub async fn connect(&mut self) -> Result<()> {
        self.channel.connect().await
    }

    /// A subscription manager on its own connection with the same settings.
    pub fn subscriber(&self) -> SubscriptionManager {
        SubscriptionManager::new(self.config().clone())
    }

    // ========================================================================
    // Connection Commands
    // ========================================================================

    pub async fn ping(&mut self) -> Result<String> {
        self.channel.send_expect_status("PING", &[] as &[&str]).await
    }

    pub async fn echo(&mut self, message: impl AsRef<[u8]>) -> Result<Bytes> {
        Ok(self
            .channel
            .send_expect_bulk("ECHO", &[message.as_ref()])
            .await?
            .unwrap_or_default())
    }

    /// Selects database `index` now and on every future reconnect.
    pub async fn select(&mut self, index: i64) -> Result<()> {
        if index < 0 {
            return Err(Error::argument("database index must not be negative"));
        }
        self.channel
            .send_frame(&Frame::new("SELECT").int(index))
            .await?;
        self.channel.expect_ok().await?;
        self.channel.connection_mut().set_database(index);
        debug!(db = index, "Database selected");
        Ok(())
    }

    /// Sends QUIT and closes the connection. Errors are ignored.
    pub async fn quit(&mut self) {
        self.channel.quit().await;
    }

    pub async fn close(&mut self) {
        self.channel.close().await;
    }

    // ========================================================================
    // String Commands
    // ========================================================================

    pub async fn set(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<()> {
        self.channel
            .send_payload_expect_ok("SET", &[key.as_ref()], value.as_ref())
            .await
    }

    /// Stores `value` encoded with `codec`.
    pub async fn set_value<T, C: PayloadCodec<T>>(
        &mut self,
        key: impl AsRef<[u8]>,
        value: &T,
        codec: &C,
    ) -> Result<()> {
        self.set(key, codec.encode(value)).await
    }

    /// Sets `key` only if it does not exist. Returns true if it was set.
    pub async fn setnx(&mut self, key: impl AsRef<[u8]>, value: impl AsRef<[u8]>) -> Result<bool> {
        let n = self
            .channel
            .send_payload_expect_integer("SETNX", &[key.as_ref()], value.as_ref())
            .await?;
        Ok(n == 1)
    }

    pub async fn get(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_bulk("GET", &[key]).await
    }

    /// Reads `key` and decodes it with `codec`.
    pub async fn get_value<T, C: PayloadCodec<T>>(
        &mut self,
        key: impl AsRef<[u8]>,
        codec: &C,
    ) -> Result<Option<T>> {
        self.get(key).await?.map(|v| codec.decode(v)).transpose()
    }

    pub async fn get_string(&mut self, key: impl AsRef<[u8]>) -> Result<Option<String>> {
        self.get_value(key, &Utf8Codec).await
    }

    /// Sets `key` and returns its previous value.
    pub async fn getset(
        &mut self,
        key: impl AsRef<[u8]>,
        value: impl AsRef<[u8]>,
    ) -> Result<Option<Bytes>> {
        self.channel
            .send_payload_expect_bulk("GETSET", &[key.as_ref()], value.as_ref())
            .await
    }

    /// Sets every `keys[i]` to `values[i]` in one request.
    pub async fn mset<K, V>(&mut self, keys: &[K], values: &[V]) -> Result<()>
    where
        K: AsRef<[u8]>,
        V: AsRef<[u8]>,
    {
        if keys.len() != values.len() {
            return Err(Error::argument(format!(
                "MSET got {} keys and {} values",
                keys.len(),
                values.len()
            )));
        }
        check_keys("MSET", keys)?;

        let mut frame = Frame::new("MSET");
        for (key, value) in keys.iter().zip(values) {
            frame.push_arg(key);
            frame.push_arg(value);
        }
        self.channel.send_frame(&frame).await?;
        self.channel.expect_ok().await
    }

    pub async fn mget<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<Vec<Option<Bytes>>> {
        check_keys("MGET", keys)?;
        self.channel.send_expect_array("MGET", keys).await
    }

    pub async fn incr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.counter("INCR", key.as_ref(), None).await
    }

    pub async fn incr_by(&mut self, key: impl AsRef<[u8]>, delta: i64) -> Result<i64> {
        self.counter("INCRBY", key.as_ref(), Some(delta)).await
    }

    pub async fn decr(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        self.counter("DECR", key.as_ref(), None).await
    }

    pub async fn decr_by(&mut self, key: impl AsRef<[u8]>, delta: i64) -> Result<i64> {
        self.counter("DECRBY", key.as_ref(), Some(delta)).await
    }

    async fn counter(&mut self, command: &str, key: &[u8], delta: Option<i64>) -> Result<i64> {
        check_key(key)?;
        let mut frame = Frame::new(command).arg(key);
        if let Some(delta) = delta {
            frame = frame.int(delta);
        }
        self.channel.send_frame(&frame).await?;
        self.channel.expect_integer().await
    }

    // ========================================================================
    // Key Commands
    // ========================================================================

    /// Deletes `keys`. Returns how many existed.
    pub async fn del<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<i64> {
        check_keys("DEL", keys)?;
        self.channel.send_expect_integer("DEL", keys).await
    }

    pub async fn exists(&mut self, key: impl AsRef<[u8]>) -> Result<bool> {
        let key = key.as_ref();
        check_key(key)?;
        Ok(self.channel.send_expect_integer("EXISTS", &[key]).await? > 0)
    }

    pub async fn key_type(&mut self, key: impl AsRef<[u8]>) -> Result<KeyType> {
        let key = key.as_ref();
        check_key(key)?;
        let name = self.channel.send_expect_status("TYPE", &[key]).await?;
        Ok(KeyType::parse(&name))
    }

    /// Renames `from` to `to`. A missing `from` is a server error.
    pub async fn rename(&mut self, from: impl AsRef<[u8]>, to: impl AsRef<[u8]>) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        check_key(from)?;
        check_key(to)?;
        self.channel.send_expect_ok("RENAME", &[from, to]).await
    }

    /// Sets a timeout on `key`, at second resolution. Returns false if the
    /// key does not exist.
    pub async fn expire(&mut self, key: impl AsRef<[u8]>, ttl: Duration) -> Result<bool> {
        let key = key.as_ref();
        check_key(key)?;
        let seconds = i64::try_from(ttl.as_secs())
            .map_err(|_| Error::argument(format!("ttl of {}s is out of range", ttl.as_secs())))?;
        let frame = Frame::new("EXPIRE").arg(key).int(seconds);
        self.channel.send_frame(&frame).await?;
        Ok(self.channel.expect_integer().await? == 1)
    }

    /// Expires `key` at `at`, at second resolution. Returns false if the key
    /// does not exist.
    pub async fn expire_at(&mut self, key: impl AsRef<[u8]>, at: SystemTime) -> Result<bool> {
        let key = key.as_ref();
        check_key(key)?;
        let timestamp = at
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|since| i64::try_from(since.as_secs()).ok())
            .ok_or_else(|| Error::argument("expiry time is out of range"))?;
        let frame = Frame::new("EXPIREAT").arg(key).int(timestamp);
        self.channel.send_frame(&frame).await?;
        Ok(self.channel.expect_integer().await? == 1)
    }

    pub async fn ttl(&mut self, key: impl AsRef<[u8]>) -> Result<Ttl> {
        let key = key.as_ref();
        check_key(key)?;
        let seconds = self.channel.send_expect_integer("TTL", &[key]).await?;
        Ok(Ttl::from_reply(seconds))
    }

    /// Keys matching a glob `pattern`.
    pub async fn keys(&mut self, pattern: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        let items = self
            .channel
            .send_expect_array("KEYS", &[pattern.as_ref()])
            .await?;
        Ok(items.into_iter().flatten().collect())
    }

    /// A random key from the selected database, or `None` if it is empty.
    pub async fn random_key(&mut self) -> Result<Option<Bytes>> {
        self.channel.send_expect_bulk("RANDOMKEY", &[] as &[&str]).await
    }

    /// Elements of the list or set at `key`, sorted numerically.
    pub async fn sort(&mut self, key: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        let items = self.channel.send_expect_array("SORT", &[key]).await?;
        Ok(items.into_iter().flatten().collect())
    }

    /// Elements of the list or set at `key`, sorted lexicographically.
    pub async fn sort_alpha(&mut self, key: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        let items = self
            .channel
            .send_expect_array("SORT", &[key, &b"ALPHA"[..]])
            .await?;
        Ok(items.into_iter().flatten().collect())
    }

    // ========================================================================
    // Server Commands
    // ========================================================================

    pub async fn dbsize(&mut self) -> Result<i64> {
        self.channel.send_expect_integer("DBSIZE", &[] as &[&str]).await
    }

    /// Deletes every key in the selected database.
    pub async fn flush_db(&mut self) -> Result<()> {
        self.channel.send_expect_ok("FLUSHDB", &[] as &[&str]).await
    }

    /// Deletes every key in every database.
    pub async fn flush_all(&mut self) -> Result<()> {
        self.channel.send_expect_ok("FLUSHALL", &[] as &[&str]).await
    }

    /// Server INFO as `field -> value`.
    pub async fn info(&mut self) -> Result<HashMap<String, String>> {
        let text = self
            .channel
            .send_expect_bulk("INFO", &[] as &[&str])
            .await?
            .unwrap_or_default();
        Ok(parse_info(&String::from_utf8_lossy(&text)))
    }

    /// Publishes `payload` on `channel`. Returns the number of receivers.
    pub async fn publish(
        &mut self,
        channel: impl AsRef<[u8]>,
        payload: impl AsRef<[u8]>,
    ) -> Result<i64> {
        self.channel
            .send_payload_expect_integer("PUBLISH", &[channel.as_ref()], payload.as_ref())
            .await
    }

    // ========================================================================
    // Set Commands
    // ========================================================================

    pub async fn sadd<M: AsRef<[u8]>>(&mut self, key: impl AsRef<[u8]>, members: &[M]) -> Result<i64> {
        self.members_command("SADD", key.as_ref(), members).await
    }

    pub async fn srem<M: AsRef<[u8]>>(&mut self, key: impl AsRef<[u8]>, members: &[M]) -> Result<i64> {
        self.members_command("SREM", key.as_ref(), members).await
    }

    pub async fn sismember(
        &mut self,
        key: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> Result<bool> {
        let n = self
            .channel
            .send_payload_expect_integer("SISMEMBER", &[key.as_ref()], member.as_ref())
            .await?;
        Ok(n == 1)
    }

    pub async fn smembers(&mut self, key: impl AsRef<[u8]>) -> Result<Vec<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        let items = self.channel.send_expect_array("SMEMBERS", &[key]).await?;
        Ok(items.into_iter().flatten().collect())
    }

    pub async fn scard(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_integer("SCARD", &[key]).await
    }

    /// Removes and returns a random member.
    pub async fn spop(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_bulk("SPOP", &[key]).await
    }

    /// Moves `member` from `source` to `destination`. Returns false if it was
    /// not in `source`.
    pub async fn smove(
        &mut self,
        source: impl AsRef<[u8]>,
        destination: impl AsRef<[u8]>,
        member: impl AsRef<[u8]>,
    ) -> Result<bool> {
        let destination = destination.as_ref();
        check_key(destination)?;
        let n = self
            .channel
            .send_payload_expect_integer("SMOVE", &[source.as_ref(), destination], member.as_ref())
            .await?;
        Ok(n == 1)
    }

    pub async fn sinter<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>> {
        self.set_algebra("SINTER", keys).await
    }

    pub async fn sunion<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>> {
        self.set_algebra("SUNION", keys).await
    }

    /// Members of the first set that are in none of the others.
    pub async fn sdiff<K: AsRef<[u8]>>(&mut self, keys: &[K]) -> Result<Vec<Bytes>> {
        self.set_algebra("SDIFF", keys).await
    }

    async fn set_algebra<K: AsRef<[u8]>>(&mut self, command: &str, keys: &[K]) -> Result<Vec<Bytes>> {
        check_keys(command, keys)?;
        let items = self.channel.send_expect_array(command, keys).await?;
        Ok(items.into_iter().flatten().collect())
    }

    // ========================================================================
    // List Commands
    // ========================================================================

    /// Prepends `values` in order, so the last one ends up first.
    pub async fn lpush<V: AsRef<[u8]>>(&mut self, key: impl AsRef<[u8]>, values: &[V]) -> Result<i64> {
        self.members_command("LPUSH", key.as_ref(), values).await
    }

    pub async fn rpush<V: AsRef<[u8]>>(&mut self, key: impl AsRef<[u8]>, values: &[V]) -> Result<i64> {
        self.members_command("RPUSH", key.as_ref(), values).await
    }

    /// Elements `start..=stop`; negative indexes count from the end.
    pub async fn lrange(&mut self, key: impl AsRef<[u8]>, start: i64, stop: i64) -> Result<Vec<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        let frame = Frame::new("LRANGE").arg(key).int(start).int(stop);
        self.channel.send_frame(&frame).await?;
        Ok(self.channel.expect_array().await?.into_iter().flatten().collect())
    }

    pub async fn lpop(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_bulk("LPOP", &[key]).await
    }

    pub async fn rpop(&mut self, key: impl AsRef<[u8]>) -> Result<Option<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_bulk("RPOP", &[key]).await
    }

    /// The element at `index`; negative indexes count from the end.
    pub async fn lindex(&mut self, key: impl AsRef<[u8]>, index: i64) -> Result<Option<Bytes>> {
        let key = key.as_ref();
        check_key(key)?;
        let frame = Frame::new("LINDEX").arg(key).int(index);
        self.channel.send_frame(&frame).await?;
        self.channel.expect_bulk().await
    }

    pub async fn llen(&mut self, key: impl AsRef<[u8]>) -> Result<i64> {
        let key = key.as_ref();
        check_key(key)?;
        self.channel.send_expect_integer("LLEN", &[key]).await
    }

    /// `command key member...` with an integer reply.
    async fn members_command<M: AsRef<[u8]>>(
        &mut self,
        command: &str,
        key: &[u8],
        members: &[M],
    ) -> Result<i64> {
        check_key(key)?;
        if members.is_empty() {
            return Err(Error::argument(format!(
                "{} requires at least one value",
                command
            )));
        }
        let frame = Frame::new(command).arg(key).args(members);
        self.channel.send_frame(&frame).await?;
        self.channel.expect_integer().await
    }
}
