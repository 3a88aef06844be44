//! Subscription Manager
//!
//! Owns a dedicated connection for pub/sub. Foreground calls write
//! SUBSCRIBE/UNSUBSCRIBE frames and keep the set of active keys; everything
//! read from the socket is handled by the background listener.

use crate::channel::{check_key, CommandChannel};
use crate::config::ClientConfig;
use crate::connection::{ConnectionState, ConnectionStats, ReplyReader};
use crate::error::{Error, Result};
use crate::pubsub::event::{Handler, KeyKind, PubSubEvent};
use crate::pubsub::listener::{ListenerExit, ListenerHandle};
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Capacity of the event stream before slow receivers start lagging.
const EVENT_CAPACITY: usize = 1024;

/// Whether a background listener is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriptionState {
    Idle,
    Listening,
}

/// Subscribes handlers to channels and patterns on one connection.
///
/// # Example
///
/// ```no_run
/// use flashkv_client::pubsub::{Handler, SubscriptionManager};
/// use flashkv_client::ClientConfig;
///
/// # async fn run() -> flashkv_client::Result<()> {
/// let mut subs = SubscriptionManager::new(ClientConfig::default());
/// let (handler, mut messages) = Handler::channel();
/// subs.subscribe("news", handler).await?;
///
/// if let Some(message) = messages.recv().await {
///     println!("{}: {:?}", message.channel_str(), message.payload_str());
/// }
/// subs.close().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct SubscriptionManager {
    channel: CommandChannel,
    keys: HashMap<Bytes, KeyKind>,
    listener: Option<ListenerHandle>,
    events: broadcast::Sender<PubSubEvent>,
}

impl SubscriptionManager {
    pub fn new(config: ClientConfig) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            channel: CommandChannel::new(config),
            keys: HashMap::new(),
            listener: None,
            events,
        }
    }

    pub fn state(&self) -> SubscriptionState {
        match &self.listener {
            Some(listener) if !listener.is_finished() => SubscriptionState::Listening,
            _ => SubscriptionState::Idle,
        }
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.channel.state()
    }

    pub fn stats(&self) -> Arc<ConnectionStats> {
        self.channel.stats()
    }

    /// A new receiver for acknowledgements, messages and failures.
    pub fn events(&self) -> broadcast::Receiver<PubSubEvent> {
        self.events.subscribe()
    }

    pub fn is_subscribed(&self, key: impl AsRef<[u8]>) -> bool {
        self.keys.contains_key(key.as_ref())
    }

    /// Active keys, sorted.
    pub fn subscriptions(&self) -> Vec<Bytes> {
        let mut keys: Vec<Bytes> = self.keys.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Subscribes `handler` to `key`.
    ///
    /// Keys containing `*` are subscribed as patterns. A key that
    /// is already subscribed is left alone and nothing is sent.
    pub async fn subscribe(&mut self, key: impl AsRef<[u8]>, handler: Handler) -> Result<()> {
        self.reap_failed_listener().await?;
        let key = Bytes::copy_from_slice(key.as_ref());
        check_key(&key)?;
        if self.keys.contains_key(&key) {
            debug!(key = %String::from_utf8_lossy(&key), "Already subscribed");
            return Ok(());
        }

        let kind = KeyKind::of(&key);
        let listener = match self.listener.take() {
            Some(listener) => listener,
            None => self.start_listener().await?,
        };
        // In place before the frame is written, so the first push finds it.
        listener.register(key.clone(), handler);
        self.listener = Some(listener);

        if let Err(e) = self
            .channel
            .send_command(kind.subscribe_command(), &[&key])
            .await
        {
            return Err(self.abandon(e).await);
        }

        debug!(key = %String::from_utf8_lossy(&key), kind = ?kind, "Subscribe sent");
        self.keys.insert(key, kind);
        Ok(())
    }

    /// Unsubscribes `key`. Unknown keys are ignored.
    ///
    /// Removing the last key stops the listener; this returns once it has
    /// exited.
    pub async fn unsubscribe(&mut self, key: impl AsRef<[u8]>) -> Result<()> {
        self.reap_failed_listener().await?;
        let key = key.as_ref();
        let Some(kind) = self.keys.get(key).copied() else {
            return Ok(());
        };
        let last = self.keys.len() == 1;
        let key = Bytes::copy_from_slice(key);

        if let Some(listener) = &self.listener {
            listener.remove(key.clone());
            if last {
                listener.begin_drain();
            }
        }

        if let Err(e) = self
            .channel
            .send_command(kind.unsubscribe_command(), &[&key])
            .await
        {
            return Err(self.abandon(e).await);
        }

        debug!(key = %String::from_utf8_lossy(&key), "Unsubscribe sent");
        self.keys.remove(&key);
        if last {
            self.stop_listener().await?;
        }
        Ok(())
    }

    /// Drops every subscription and waits for the listener to exit.
    pub async fn unsubscribe_all(&mut self) -> Result<()> {
        self.reap_failed_listener().await?;
        if self.keys.is_empty() {
            return self.stop_listener().await;
        }

        if let Some(listener) = &self.listener {
            listener.clear();
            listener.begin_drain();
        }

        let patterns = self.keys.values().any(|k| *k == KeyKind::Pattern);
        let mut sent = self
            .channel
            .send_command(KeyKind::Channel.unsubscribe_command(), &[] as &[&[u8]])
            .await;
        if sent.is_ok() && patterns {
            sent = self
                .channel
                .send_command(KeyKind::Pattern.unsubscribe_command(), &[] as &[&[u8]])
                .await;
        }
        if let Err(e) = sent {
            return Err(self.abandon(e).await);
        }

        debug!(count = self.keys.len(), "Unsubscribed from everything");
        self.keys.clear();
        self.stop_listener().await
    }

    /// Stops listening and closes the connection. Safe without
    /// subscriptions.
    ///
    /// Returns the error of a listener that failed since the last call.
    pub async fn close(&mut self) -> Result<()> {
        let reaped = self.reap_failed_listener().await;
        if let Some(listener) = self.listener.take() {
            let exit = listener.shutdown().await;
            self.restore(exit.reader);
        }
        self.keys.clear();
        self.channel.quit().await;
        reaped
    }

    async fn start_listener(&mut self) -> Result<ListenerHandle> {
        self.channel.connect().await?;
        let reader = self.channel.connection_mut().take_reader()?;
        let drain_timeout = self.channel.config().drain_timeout;
        Ok(ListenerHandle::spawn(
            reader,
            self.events.clone(),
            drain_timeout,
        ))
    }

    async fn stop_listener(&mut self) -> Result<()> {
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };
        let ListenerExit { reader, result } = listener.drain().await;
        self.restore(reader);
        result
    }

    /// Hands the read half back, or drops the socket if the listener kept
    /// it.
    fn restore(&mut self, reader: Option<ReplyReader>) {
        let connection = self.channel.connection_mut();
        match reader {
            Some(reader) => connection.restore_reader(reader),
            None => connection.invalidate("subscription stream abandoned"),
        }
    }

    /// Collects a listener that ended on its own and returns its error once.
    async fn reap_failed_listener(&mut self) -> Result<()> {
        if !self.listener.as_ref().is_some_and(|l| l.is_finished()) {
            return Ok(());
        }
        let Some(listener) = self.listener.take() else {
            return Ok(());
        };

        let exit = listener.join().await;
        if !self.keys.is_empty() {
            warn!(count = self.keys.len(), "Subscriptions lost with the listener");
        }
        self.keys.clear();
        // The server-side subscriptions went away with the socket.
        self.channel.connection_mut().invalidate("subscription listener exited");
        if let Err(Error::Listener(message)) = &exit.result {
            let _ = self
                .events
                .send(PubSubEvent::ListenerFailed(message.clone()));
        }
        exit.result
    }

    /// Leaves pub/sub mode after a failed write.
    async fn abandon(&mut self, err: Error) -> Error {
        warn!(error = %err, "Abandoning subscriptions");
        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        self.keys.clear();
        self.channel.close().await;
        err
    }
}

impl Drop for SubscriptionManager {
    fn drop(&mut self) {
        if let Some(listener) = &self.listener {
            listener.signal_shutdown();
            info!("Subscription listener stopped");
        }
    }
}
