//! Background Push Listener
//!
//! While a manager holds subscriptions, one tokio task owns the read half of
//! its connection and is the only thing that reads from it. Each iteration
//! decodes one push (a mixed array) and acts on its kind:
//!
//! | Push | Shape | Action |
//! |---|---|---|
//! | `message` | `[kind, channel, payload]` | dispatch by channel |
//! | `pmessage` | `[kind, pattern, channel, payload]` | dispatch by pattern |
//! | `subscribe`, `psubscribe` | `[kind, key, count]` | `Subscribed` event |
//! | `unsubscribe`, `punsubscribe` | `[kind, key or nil, count]` | `Unsubscribed` event |
//!
//! The handler table lives in the task. The foreground mutates it only by
//! sending [`RegistryCommand`]s, and pending commands are applied before
//! every read so a handler registered before its SUBSCRIBE was written is
//! always in place when the first message arrives.
//!
//! ## Stopping
//!
//! A watch channel carries a [`ListenerSignal`]. `Drain` keeps reading until
//! the server acknowledges an unsubscribe with a remaining count of zero,
//! at which point the stream is clean and the read half is handed back.
//! Draining is bounded by a deadline. `Shutdown` exits at once.

use crate::connection::ReplyReader;
use crate::error::{Error, Result};
use crate::protocol::{ParseError, Reply};
use crate::pubsub::event::{Handler, KeyKind, Message, PubSubEvent};
use bytes::Bytes;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, error, info, trace, warn};

/// Control signal for the listener task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ListenerSignal {
    Run,
    Drain,
    Shutdown,
}

/// Handler table updates sent from the foreground.
#[derive(Debug)]
pub(crate) enum RegistryCommand {
    Register { key: Bytes, handler: Handler },
    Remove { key: Bytes },
    Clear,
}

/// What the listener task returns when it ends.
#[derive(Debug)]
pub(crate) struct ListenerExit {
    /// The read half, when the stream is still usable
    pub reader: Option<ReplyReader>,
    pub result: Result<()>,
}

/// Foreground side of a running listener.
#[derive(Debug)]
pub(crate) struct ListenerHandle {
    signal: watch::Sender<ListenerSignal>,
    registry: mpsc::UnboundedSender<RegistryCommand>,
    task: JoinHandle<ListenerExit>,
}

impl ListenerHandle {
    pub(crate) fn spawn(
        reader: ReplyReader,
        events: broadcast::Sender<PubSubEvent>,
        drain_timeout: Duration,
    ) -> Self {
        let (signal, signal_rx) = watch::channel(ListenerSignal::Run);
        let (registry, registry_rx) = mpsc::unbounded_channel();

        let task = tokio::spawn(listen(
            reader,
            registry_rx,
            signal_rx,
            events,
            drain_timeout,
        ));
        info!("Subscription listener started");

        Self {
            signal,
            registry,
            task,
        }
    }

    pub(crate) fn register(&self, key: Bytes, handler: Handler) {
        let _ = self.registry.send(RegistryCommand::Register { key, handler });
    }

    pub(crate) fn remove(&self, key: Bytes) {
        let _ = self.registry.send(RegistryCommand::Remove { key });
    }

    pub(crate) fn clear(&self) {
        let _ = self.registry.send(RegistryCommand::Clear);
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Asks the listener to stop at the next zero-count unsubscribe ack.
    ///
    /// Must be sent before the final UNSUBSCRIBE is written.
    pub(crate) fn begin_drain(&self) {
        self.signal.send_if_modified(|state| {
            if *state == ListenerSignal::Run {
                *state = ListenerSignal::Drain;
                true
            } else {
                false
            }
        });
    }

    pub(crate) fn signal_shutdown(&self) {
        let _ = self.signal.send(ListenerSignal::Shutdown);
    }

    pub(crate) async fn drain(self) -> ListenerExit {
        self.begin_drain();
        self.join().await
    }

    pub(crate) async fn shutdown(self) -> ListenerExit {
        self.signal_shutdown();
        self.join().await
    }

    /// Waits for the task to end, turning a panic into [`Error::Listener`].
    pub(crate) async fn join(self) -> ListenerExit {
        match self.task.await {
            Ok(exit) => exit,
            Err(e) => ListenerExit {
                reader: None,
                result: Err(Error::Listener(if e.is_panic() {
                    "listener task panicked".to_string()
                } else {
                    "listener task was cancelled".to_string()
                })),
            },
        }
    }
}

/// One decoded push.
#[derive(Debug, PartialEq)]
enum Push {
    Message(Message),
    Subscribed { key: Bytes, kind: KeyKind, count: i64 },
    Unsubscribed { key: Option<Bytes>, kind: KeyKind, count: i64 },
}

fn malformed(detail: impl Into<String>) -> ParseError {
    ParseError::MalformedPush(detail.into())
}

fn bulk(item: Reply, field: &str) -> std::result::Result<Bytes, ParseError> {
    match item {
        Reply::Bulk(Some(data)) => Ok(data),
        other => Err(malformed(format!("{} is {}", field, other.kind_name()))),
    }
}

fn count(item: Reply) -> std::result::Result<i64, ParseError> {
    match item {
        Reply::Integer(n) => Ok(n),
        other => Err(malformed(format!("count is {}", other.kind_name()))),
    }
}

fn parse_push(items: Vec<Reply>) -> std::result::Result<Push, ParseError> {
    let len = items.len();
    let mut items = items.into_iter();
    let kind = match items.next() {
        Some(first) => bulk(first, "kind")?,
        None => return Err(malformed("empty push")),
    };

    let need = match &kind[..] {
        b"pmessage" => 4,
        b"message" | b"subscribe" | b"psubscribe" | b"unsubscribe" | b"punsubscribe" => 3,
        other => {
            return Err(malformed(format!(
                "unknown kind {:?}",
                String::from_utf8_lossy(other)
            )))
        }
    };
    if len < need {
        return Err(malformed(format!(
            "{} has {} elements, expected {}",
            String::from_utf8_lossy(&kind),
            len,
            need
        )));
    }

    // Length checked above.
    let mut next = || items.next().unwrap_or_else(Reply::null);

    Ok(match &kind[..] {
        b"message" => Push::Message(Message {
            channel: bulk(next(), "channel")?,
            pattern: None,
            payload: bulk(next(), "payload")?,
        }),
        b"pmessage" => {
            let pattern = bulk(next(), "pattern")?;
            Push::Message(Message {
                channel: bulk(next(), "channel")?,
                pattern: Some(pattern),
                payload: bulk(next(), "payload")?,
            })
        }
        b"subscribe" | b"psubscribe" => Push::Subscribed {
            kind: ack_kind(&kind),
            key: bulk(next(), "key")?,
            count: count(next())?,
        },
        _ => {
            let key = match next() {
                Reply::Bulk(key) => key,
                other => return Err(malformed(format!("key is {}", other.kind_name()))),
            };
            Push::Unsubscribed {
                kind: ack_kind(&kind),
                key,
                count: count(next())?,
            }
        }
    })
}

fn ack_kind(kind: &[u8]) -> KeyKind {
    if kind.starts_with(b"p") {
        KeyKind::Pattern
    } else {
        KeyKind::Channel
    }
}

fn apply(handlers: &mut HashMap<Bytes, Handler>, command: RegistryCommand) {
    match command {
        RegistryCommand::Register { key, handler } => {
            debug!(key = %String::from_utf8_lossy(&key), "Handler registered");
            handlers.insert(key, handler);
        }
        RegistryCommand::Remove { key } => {
            debug!(key = %String::from_utf8_lossy(&key), "Handler removed");
            handlers.remove(&key);
        }
        RegistryCommand::Clear => {
            debug!(count = handlers.len(), "Handlers cleared");
            handlers.clear();
        }
    }
}

fn dispatch(handlers: &HashMap<Bytes, Handler>, message: &Message) {
    match handlers.get(message.key()) {
        Some(handler) => {
            if !handler.dispatch(message) {
                debug!(key = %String::from_utf8_lossy(message.key()), "Handler receiver dropped");
            }
        }
        None => {
            trace!(key = %String::from_utf8_lossy(message.key()), "No handler for message");
        }
    }
}

/// The listener task.
async fn listen(
    mut reader: ReplyReader,
    mut registry: mpsc::UnboundedReceiver<RegistryCommand>,
    mut signal: watch::Receiver<ListenerSignal>,
    events: broadcast::Sender<PubSubEvent>,
    drain_timeout: Duration,
) -> ListenerExit {
    let mut handlers: HashMap<Bytes, Handler> = HashMap::new();
    let mut registry_open = true;
    let mut deadline: Option<Instant> = None;

    loop {
        while let Ok(command) = registry.try_recv() {
            apply(&mut handlers, command);
        }

        match *signal.borrow_and_update() {
            ListenerSignal::Shutdown => {
                info!("Subscription listener shut down");
                return ListenerExit {
                    reader: Some(reader),
                    result: Ok(()),
                };
            }
            ListenerSignal::Drain if deadline.is_none() => {
                debug!(timeout = ?drain_timeout, "Draining subscription stream");
                deadline = Some(Instant::now() + drain_timeout);
            }
            _ => {}
        }

        tokio::select! {
            biased;

            changed = signal.changed() => {
                if changed.is_err() {
                    debug!("Subscription manager dropped, listener exiting");
                    return ListenerExit { reader: None, result: Ok(()) };
                }
            }

            command = registry.recv(), if registry_open => match command {
                Some(command) => apply(&mut handlers, command),
                None => registry_open = false,
            },

            _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                warn!(timeout = ?drain_timeout, "Unsubscribe was not acknowledged in time");
                return ListenerExit { reader: None, result: Ok(()) };
            }

            read = reader.read_mixed() => {
                let items = match read {
                    Ok(items) => items,
                    Err(Error::Server(message)) => {
                        warn!(error = %message, "Server error in subscription stream");
                        let _ = events.send(PubSubEvent::ServerError(message));
                        continue;
                    }
                    Err(e) => return fail(e, &signal, &events),
                };

                match parse_push(items) {
                    Ok(Push::Message(message)) => {
                        trace!(
                            channel = %String::from_utf8_lossy(&message.channel),
                            bytes = message.payload.len(),
                            "Message received"
                        );
                        dispatch(&handlers, &message);
                        let _ = events.send(PubSubEvent::Message(message));
                    }
                    Ok(Push::Subscribed { key, kind, count }) => {
                        debug!(key = %String::from_utf8_lossy(&key), count = count, "Subscribed");
                        let _ = events.send(PubSubEvent::Subscribed { key, kind, count });
                    }
                    Ok(Push::Unsubscribed { key, kind, count }) => {
                        debug!(count = count, "Unsubscribed");
                        let _ = events.send(PubSubEvent::Unsubscribed { key, kind, count });
                        // Read the live value: the drain request may have
                        // been sent after this loop last looked.
                        if count == 0 && *signal.borrow() == ListenerSignal::Drain {
                            info!("Subscription listener stopped");
                            return ListenerExit { reader: Some(reader), result: Ok(()) };
                        }
                    }
                    Err(e) => return fail(e.into(), &signal, &events),
                }
            }
        }
    }
}

/// Ends the listener after a transport or protocol failure.
///
/// Failures while stopping only end the loop; the connection is discarded
/// either way.
fn fail(
    err: Error,
    signal: &watch::Receiver<ListenerSignal>,
    events: &broadcast::Sender<PubSubEvent>,
) -> ListenerExit {
    if *signal.borrow() != ListenerSignal::Run {
        debug!(error = %err, "Subscription stream closed while stopping");
        return ListenerExit {
            reader: None,
            result: Ok(()),
        };
    }

    error!(error = %err, "Subscription listener failed");
    let _ = events.send(PubSubEvent::ListenerFailed(err.to_string()));
    ListenerExit {
        reader: None,
        result: Err(err),
    }
}
