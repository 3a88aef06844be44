//! Pub/Sub Messages, Handlers and Events

use bytes::Bytes;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Whether a subscription key names one channel or a glob pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyKind {
    Channel,
    Pattern,
}

impl KeyKind {
    /// Keys containing `*` are patterns. `?` and `[` are ordinary channel
    /// name characters.
    pub fn of(key: &[u8]) -> Self {
        if key.contains(&b'*') {
            KeyKind::Pattern
        } else {
            KeyKind::Channel
        }
    }

    pub fn subscribe_command(self) -> &'static str {
        match self {
            KeyKind::Channel => "SUBSCRIBE",
            KeyKind::Pattern => "PSUBSCRIBE",
        }
    }

    pub fn unsubscribe_command(self) -> &'static str {
        match self {
            KeyKind::Channel => "UNSUBSCRIBE",
            KeyKind::Pattern => "PUNSUBSCRIBE",
        }
    }
}

/// A message published to a subscribed channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Channel the message was published to
    pub channel: Bytes,
    /// Pattern that matched, for pattern subscriptions
    pub pattern: Option<Bytes>,
    pub payload: Bytes,
}

impl Message {
    /// The subscription key this message was dispatched by.
    pub fn key(&self) -> &Bytes {
        self.pattern.as_ref().unwrap_or(&self.channel)
    }

    pub fn channel_str(&self) -> String {
        String::from_utf8_lossy(&self.channel).into_owned()
    }

    /// The payload as text, if it is valid UTF-8.
    pub fn payload_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.payload).ok()
    }
}

type Callback = Arc<dyn Fn(&Message) + Send + Sync>;

/// Receives the messages for one subscription key.
///
/// Callbacks run on the listener task, so a slow callback delays every
/// other subscription on the same manager. Use [`Handler::channel`] to move
/// the work elsewhere.
#[derive(Clone)]
pub enum Handler {
    Callback(Callback),
    Channel(mpsc::UnboundedSender<Message>),
}

impl Handler {
    pub fn callback<F>(f: F) -> Self
    where
        F: Fn(&Message) + Send + Sync + 'static,
    {
        Handler::Callback(Arc::new(f))
    }

    /// A handler that forwards messages into an unbounded channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<Message>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Handler::Channel(tx), rx)
    }

    /// Delivers `message`. Returns false if the receiving side is gone.
    pub(crate) fn dispatch(&self, message: &Message) -> bool {
        match self {
            Handler::Callback(f) => {
                f(message);
                true
            }
            Handler::Channel(tx) => tx.send(message.clone()).is_ok(),
        }
    }
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Callback(_) => f.write_str("Handler::Callback"),
            Handler::Channel(_) => f.write_str("Handler::Channel"),
        }
    }
}

/// Notifications published by a subscription manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PubSubEvent {
    /// The server confirmed a subscription; `count` is the total held.
    Subscribed { key: Bytes, kind: KeyKind, count: i64 },
    /// The server confirmed an unsubscribe. `key` is `None` when nothing was
    /// subscribed.
    Unsubscribed {
        key: Option<Bytes>,
        kind: KeyKind,
        count: i64,
    },
    Message(Message),
    /// An error reply arrived in the push stream. Listening continues.
    ServerError(String),
    /// The listener stopped on a transport or protocol failure.
    ListenerFailed(String),
}
