//! In-process RESP server for tests.
//!
//! Speaks enough of the protocol to drive the client end to end: strings,
//! counters, sets, lists, expiry bookkeeping, AUTH/SELECT and pub/sub with
//! `*`/`?` patterns. Every received command is logged so tests can assert on
//! the exact traffic. `RAW <bytes>` writes its argument back verbatim, which
//! is how tests feed the client malformed or unusual replies.

use crate::config::ClientConfig;
use crate::protocol::{parse_reply, Frame, Reply};
use bytes::{Buf, Bytes, BytesMut};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

const WRONGTYPE: &str = "WRONGTYPE Operation against a key holding the wrong kind of value";
const NOT_INTEGER: &str = "ERR value is not an integer or out of range";

const KNOWN_COMMANDS: &[&str] = &[
    "PING", "ECHO", "AUTH", "SELECT", "SET", "SETNX", "GET", "GETSET", "MSET", "MGET", "DEL",
    "EXISTS", "INCR", "INCRBY", "DECR", "DECRBY", "RENAME", "EXPIRE", "TTL", "KEYS", "DBSIZE",
    "FLUSHDB", "TYPE", "INFO", "SADD", "SREM", "SISMEMBER", "SMEMBERS", "SCARD", "LPUSH",
    "RPUSH", "LRANGE", "LLEN", "PUBLISH", "SUBSCRIBE", "PSUBSCRIBE", "UNSUBSCRIBE",
    "PUNSUBSCRIBE", "QUIT", "RAW", "LPOP", "RPOP", "LINDEX", "SPOP", "SMOVE", "SINTER",
    "SUNION", "SDIFF", "SORT", "RANDOMKEY", "EXPIREAT", "FLUSHALL",
];

type Key = (i64, Bytes);

enum Value {
    Str(Bytes),
    Set(BTreeSet<Bytes>),
    List(VecDeque<Bytes>),
}

#[derive(Default)]
struct Store {
    values: HashMap<Key, Value>,
    expiries: HashMap<Key, Instant>,
}

impl Store {
    fn set(&mut self, key: Key, value: Bytes) {
        self.expiries.remove(&key);
        self.values.insert(key, Value::Str(value));
    }

    fn remove(&mut self, key: &Key) -> Option<Value> {
        self.expiries.remove(key);
        self.values.remove(key)
    }

    fn string(&self, key: &Key) -> Result<Option<Bytes>, Reply> {
        match self.values.get(key) {
            None => Ok(None),
            Some(Value::Str(v)) => Ok(Some(v.clone())),
            Some(_) => Err(Reply::error(WRONGTYPE)),
        }
    }

    /// The set at `key`; a missing key reads as empty.
    fn members(&self, key: &Key) -> Result<BTreeSet<Bytes>, Reply> {
        match self.values.get(key) {
            None => Ok(BTreeSet::new()),
            Some(Value::Set(set)) => Ok(set.clone()),
            Some(_) => Err(Reply::error(WRONGTYPE)),
        }
    }

    fn keys_in(&self, db: i64) -> impl Iterator<Item = &Bytes> {
        self.values
            .keys()
            .filter(move |(d, _)| *d == db)
            .map(|(_, k)| k)
    }
}

#[derive(Default)]
struct Subscriptions {
    channels: BTreeSet<Bytes>,
    patterns: BTreeSet<Bytes>,
}

impl Subscriptions {
    fn count(&self) -> usize {
        self.channels.len() + self.patterns.len()
    }

    fn receivers(&self, channel: &[u8]) -> usize {
        usize::from(self.channels.contains(channel))
            + self
                .patterns
                .iter()
                .filter(|p| glob_match(p, channel))
                .count()
    }

    fn set(&mut self, pattern: bool) -> &mut BTreeSet<Bytes> {
        if pattern {
            &mut self.patterns
        } else {
            &mut self.channels
        }
    }
}

struct Shared {
    port: u16,
    password: Option<String>,
    accepted: AtomicUsize,
    next_session: AtomicU64,
    commands: Mutex<Vec<Vec<String>>>,
    store: Mutex<Store>,
    subscribers: Mutex<HashMap<u64, Subscriptions>>,
    sessions: Mutex<Vec<JoinHandle<()>>>,
    bus: broadcast::Sender<(Bytes, Bytes)>,
}

/// A mock server bound to an ephemeral localhost port.
pub(crate) struct MockServer {
    shared: Arc<Shared>,
    acceptor: JoinHandle<()>,
}

impl MockServer {
    pub(crate) async fn start() -> Self {
        Self::launch(None).await
    }

    /// A server that answers `NOAUTH` until AUTH succeeds.
    pub(crate) async fn with_password(password: &str) -> Self {
        Self::launch(Some(password.to_string())).await
    }

    async fn launch(password: Option<String>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        let (bus, _) = broadcast::channel(256);

        let shared = Arc::new(Shared {
            port: addr.port(),
            password,
            accepted: AtomicUsize::new(0),
            next_session: AtomicU64::new(1),
            commands: Mutex::new(Vec::new()),
            store: Mutex::new(Store::default()),
            subscribers: Mutex::new(HashMap::new()),
            sessions: Mutex::new(Vec::new()),
            bus,
        });

        let acceptor = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    shared.accepted.fetch_add(1, Ordering::SeqCst);
                    let session = tokio::spawn(serve(stream, Arc::clone(&shared)));
                    shared.sessions.lock().unwrap().push(session);
                }
            }
        });

        Self { shared, acceptor }
    }

    pub(crate) fn config(&self) -> ClientConfig {
        ClientConfig::new("127.0.0.1", self.shared.port)
    }

    /// Connections accepted so far.
    pub(crate) fn accepted(&self) -> usize {
        self.shared.accepted.load(Ordering::SeqCst)
    }

    /// Every command received, in arrival order, as lossy text.
    pub(crate) fn commands(&self) -> Vec<Vec<String>> {
        self.shared.commands.lock().unwrap().clone()
    }

    /// Drops every open client socket. New connections are still accepted.
    pub(crate) async fn kill_sessions(&self) {
        let sessions = std::mem::take(&mut *self.shared.sessions.lock().unwrap());
        for session in sessions {
            session.abort();
            let _ = session.await;
        }
    }

    /// A localhost port with nothing listening on it.
    pub(crate) async fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        listener.local_addr().unwrap().port()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.acceptor.abort();
        if let Ok(mut sessions) = self.shared.sessions.lock() {
            for session in sessions.drain(..) {
                session.abort();
            }
        }
    }
}

/// Removes a session's subscriptions however the session ends.
struct SessionGuard {
    id: u64,
    shared: Arc<Shared>,
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if let Ok(mut subscribers) = self.shared.subscribers.lock() {
            subscribers.remove(&self.id);
        }
    }
}

struct Session {
    id: u64,
    db: i64,
    authed: bool,
}

async fn serve(stream: TcpStream, shared: Arc<Shared>) {
    let id = shared.next_session.fetch_add(1, Ordering::Relaxed);
    let _guard = SessionGuard {
        id,
        shared: Arc::clone(&shared),
    };
    let mut session = Session {
        id,
        db: 0,
        authed: shared.password.is_none(),
    };
    let mut bus = shared.bus.subscribe();
    let (mut reader, mut writer) = stream.into_split();
    let mut buffer = BytesMut::with_capacity(4096);

    loop {
        loop {
            let (request, consumed) = match parse_reply(&buffer) {
                Ok(Some(parsed)) => parsed,
                Ok(None) => break,
                Err(_) => return,
            };
            buffer.advance(consumed);
            let Ok(frame) = Frame::try_from(request) else {
                return;
            };

            let (out, close) = session.execute(&shared, &frame);
            if writer.write_all(&out).await.is_err() || close {
                return;
            }
        }

        tokio::select! {
            read = reader.read_buf(&mut buffer) => match read {
                Ok(0) | Err(_) => return,
                Ok(_) => {}
            },
            published = bus.recv() => match published {
                Ok((channel, payload)) => {
                    let out = session.deliver(&shared, &channel, &payload);
                    if !out.is_empty() && writer.write_all(&out).await.is_err() {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return,
            },
        }
    }
}

impl Session {
    fn execute(&mut self, shared: &Shared, frame: &Frame) -> (Vec<u8>, bool) {
        let name = frame.name().to_ascii_uppercase();
        let args = frame.arguments();

        let logged = std::iter::once(frame.name())
            .chain(args.iter().map(|a| String::from_utf8_lossy(a).into_owned()))
            .collect();
        shared.commands.lock().unwrap().push(logged);

        match name.as_str() {
            "RAW" => return (args.first().map(|a| a.to_vec()).unwrap_or_default(), false),
            "QUIT" => return (Reply::ok().serialize(), true),
            "AUTH" => {}
            _ if !self.authed => {
                return (Reply::error("NOAUTH Authentication required.").serialize(), false)
            }
            _ => {}
        }

        let pubsub = matches!(
            name.as_str(),
            "SUBSCRIBE" | "PSUBSCRIBE" | "UNSUBSCRIBE" | "PUNSUBSCRIBE"
        );
        let subscribed = shared
            .subscribers
            .lock()
            .unwrap()
            .get(&self.id)
            .is_some_and(|s| s.count() > 0);
        if subscribed && !pubsub && name != "PING" {
            let reply = Reply::error(
                "ERR only (P)SUBSCRIBE / (P)UNSUBSCRIBE / PING / QUIT allowed in this context",
            );
            return (reply.serialize(), false);
        }

        if pubsub {
            return (self.pubsub(shared, &name, args), false);
        }
        if name == "PUBLISH" && args.len() == 2 {
            let receivers: usize = shared
                .subscribers
                .lock()
                .unwrap()
                .values()
                .map(|s| s.receivers(&args[0]))
                .sum();
            let _ = shared.bus.send((args[0].clone(), args[1].clone()));
            return (Reply::integer(receivers as i64).serialize(), false);
        }

        (self.command(shared, &name, args).serialize(), false)
    }

    fn pubsub(&mut self, shared: &Shared, name: &str, args: &[Bytes]) -> Vec<u8> {
        let kind = name.to_ascii_lowercase();
        let pattern = name.starts_with('P');
        let mut out = Vec::new();
        let mut registry = shared.subscribers.lock().unwrap();
        let subs = registry.entry(self.id).or_default();

        if name.ends_with("UNSUBSCRIBE") {
            let keys: Vec<Bytes> = if args.is_empty() {
                subs.set(pattern).iter().cloned().collect()
            } else {
                args.to_vec()
            };
            if keys.is_empty() {
                ack(&mut out, &kind, None, subs.count());
            }
            for key in keys {
                subs.set(pattern).remove(&key);
                ack(&mut out, &kind, Some(&key), subs.count());
            }
        } else {
            if args.is_empty() {
                return wrong_arity(name).serialize();
            }
            for key in args {
                subs.set(pattern).insert(key.clone());
                ack(&mut out, &kind, Some(key), subs.count());
            }
        }
        out
    }

    fn deliver(&self, shared: &Shared, channel: &Bytes, payload: &Bytes) -> Vec<u8> {
        let registry = shared.subscribers.lock().unwrap();
        let Some(subs) = registry.get(&self.id) else {
            return Vec::new();
        };

        let mut out = Vec::new();
        if subs.channels.contains(&channel[..]) {
            Reply::array(vec![
                Reply::bulk("message"),
                Reply::bulk(channel.clone()),
                Reply::bulk(payload.clone()),
            ])
            .serialize_into(&mut out);
        }
        for pattern in subs.patterns.iter().filter(|p| glob_match(p, channel)) {
            Reply::array(vec![
                Reply::bulk("pmessage"),
                Reply::bulk(pattern.clone()),
                Reply::bulk(channel.clone()),
                Reply::bulk(payload.clone()),
            ])
            .serialize_into(&mut out);
        }
        out
    }

    fn command(&mut self, shared: &Shared, name: &str, args: &[Bytes]) -> Reply {
        let db = self.db;
        let key = |i: usize| (db, args[i].clone());
        let mut store = shared.store.lock().unwrap();

        match (name, args.len()) {
            ("PING", 0) => Reply::status("PONG"),
            ("PING", 1) | ("ECHO", 1) => Reply::bulk(args[0].clone()),
            ("AUTH", 1) => match &shared.password {
                Some(password) if password.as_bytes() == &args[0][..] => {
                    self.authed = true;
                    Reply::ok()
                }
                Some(_) => Reply::error("ERR invalid password"),
                None => Reply::error("ERR Client sent AUTH, but no password is set"),
            },
            ("SELECT", 1) => match parse_int(&args[0]) {
                Some(index) if (0..16).contains(&index) => {
                    self.db = index;
                    Reply::ok()
                }
                _ => Reply::error("ERR DB index is out of range"),
            },
            ("SET", n) if n >= 2 => {
                store.set(key(0), args[1].clone());
                Reply::ok()
            }
            ("SETNX", 2) => {
                if store.values.contains_key(&key(0)) {
                    Reply::integer(0)
                } else {
                    store.set(key(0), args[1].clone());
                    Reply::integer(1)
                }
            }
            ("GET", 1) => match store.string(&key(0)) {
                Ok(Some(value)) => Reply::bulk(value),
                Ok(None) => Reply::null(),
                Err(e) => e,
            },
            ("GETSET", 2) => match store.string(&key(0)) {
                Ok(old) => {
                    store.set(key(0), args[1].clone());
                    old.map_or_else(Reply::null, Reply::bulk)
                }
                Err(e) => e,
            },
            ("MSET", n) if n >= 2 && n % 2 == 0 => {
                for pair in args.chunks(2) {
                    store.set((db, pair[0].clone()), pair[1].clone());
                }
                Reply::ok()
            }
            ("MGET", n) if n >= 1 => Reply::array(
                (0..n)
                    .map(|i| match store.values.get(&key(i)) {
                        Some(Value::Str(v)) => Reply::bulk(v.clone()),
                        _ => Reply::null(),
                    })
                    .collect(),
            ),
            ("DEL", n) if n >= 1 => {
                Reply::integer((0..n).filter(|&i| store.remove(&key(i)).is_some()).count() as i64)
            }
            ("EXISTS", n) if n >= 1 => Reply::integer(
                (0..n)
                    .filter(|&i| store.values.contains_key(&key(i)))
                    .count() as i64,
            ),
            ("INCR", 1) | ("DECR", 1) | ("INCRBY", 2) | ("DECRBY", 2) => {
                let delta = match name {
                    "INCR" => Some(1),
                    "DECR" => Some(-1),
                    "INCRBY" => parse_int(&args[1]),
                    _ => parse_int(&args[1]).and_then(i64::checked_neg),
                };
                let current = match store.string(&key(0)) {
                    Ok(None) => Some(0),
                    Ok(Some(v)) => parse_int(&v),
                    Err(e) => return e,
                };
                match current.zip(delta).and_then(|(c, d)| c.checked_add(d)) {
                    Some(next) => {
                        store.set(key(0), Bytes::from(next.to_string()));
                        Reply::integer(next)
                    }
                    None => Reply::error(NOT_INTEGER),
                }
            }
            ("RENAME", 2) => match store.remove(&key(0)) {
                Some(value) => {
                    store.values.insert(key(1), value);
                    Reply::ok()
                }
                None => Reply::error("ERR no such key"),
            },
            ("EXPIRE", 2) => match parse_int(&args[1]) {
                Some(seconds) if store.values.contains_key(&key(0)) => {
                    let deadline = Instant::now() + Duration::from_secs(seconds.max(0) as u64);
                    store.expiries.insert(key(0), deadline);
                    Reply::integer(1)
                }
                Some(_) => Reply::integer(0),
                None => Reply::error(NOT_INTEGER),
            },
            ("EXPIREAT", 2) => match parse_int(&args[1]) {
                Some(timestamp) if store.values.contains_key(&key(0)) => {
                    let now = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .unwrap_or_default()
                        .as_secs() as i64;
                    let left = Duration::from_secs((timestamp - now).max(0) as u64);
                    store.expiries.insert(key(0), Instant::now() + left);
                    Reply::integer(1)
                }
                Some(_) => Reply::integer(0),
                None => Reply::error(NOT_INTEGER),
            },
            ("TTL", 1) => {
                if !store.values.contains_key(&key(0)) {
                    Reply::integer(-2)
                } else {
                    match store.expiries.get(&key(0)) {
                        Some(deadline) => Reply::integer(
                            deadline
                                .saturating_duration_since(Instant::now())
                                .as_secs_f64()
                                .ceil() as i64,
                        ),
                        None => Reply::integer(-1),
                    }
                }
            }
            ("KEYS", 1) => {
                let mut keys: Vec<Bytes> = store
                    .keys_in(db)
                    .filter(|k| glob_match(&args[0], k))
                    .cloned()
                    .collect();
                keys.sort();
                Reply::array(keys.into_iter().map(Reply::bulk).collect())
            }
            ("RANDOMKEY", 0) => store
                .keys_in(db)
                .next()
                .cloned()
                .map_or_else(Reply::null, Reply::bulk),
            ("SORT", 1) | ("SORT", 2) => {
                let alpha = match args.get(1) {
                    None => false,
                    Some(option) if option.eq_ignore_ascii_case(b"ALPHA") => true,
                    Some(_) => return Reply::error("ERR syntax error"),
                };
                let mut items: Vec<Bytes> = match store.values.get(&key(0)) {
                    None => Vec::new(),
                    Some(Value::List(list)) => list.iter().cloned().collect(),
                    Some(Value::Set(set)) => set.iter().cloned().collect(),
                    Some(Value::Str(_)) => return Reply::error(WRONGTYPE),
                };
                if alpha {
                    items.sort();
                } else {
                    let scores: Option<Vec<f64>> = items
                        .iter()
                        .map(|item| std::str::from_utf8(item).ok()?.parse().ok())
                        .collect();
                    let Some(scores) = scores else {
                        return Reply::error("ERR One or more scores can't be converted into double");
                    };
                    let mut scored: Vec<(f64, Bytes)> = scores.into_iter().zip(items).collect();
                    scored.sort_by(|a, b| a.0.total_cmp(&b.0));
                    items = scored.into_iter().map(|(_, item)| item).collect();
                }
                Reply::array(items.into_iter().map(Reply::bulk).collect())
            }
            ("DBSIZE", 0) => Reply::integer(store.keys_in(db).count() as i64),
            ("FLUSHDB", 0) => {
                store.values.retain(|(d, _), _| *d != db);
                store.expiries.retain(|(d, _), _| *d != db);
                Reply::ok()
            }
            ("FLUSHALL", 0) => {
                store.values.clear();
                store.expiries.clear();
                Reply::ok()
            }
            ("TYPE", 1) => Reply::status(match store.values.get(&key(0)) {
                None => "none",
                Some(Value::Str(_)) => "string",
                Some(Value::Set(_)) => "set",
                Some(Value::List(_)) => "list",
            }),
            ("INFO", 0) | ("INFO", 1) => {
                let keys = store.keys_in(db).count();
                let mut text = format!(
                    "# Server\r\nredis_version:7.2.0\r\nredis_mode:standalone\r\ntcp_port:{}\r\n\r\n# Keyspace\r\n",
                    shared.port
                );
                if keys > 0 {
                    text.push_str(&format!("db{}:keys={},expires=0,avg_ttl=0\r\n", db, keys));
                }
                Reply::bulk(text)
            }
            ("SADD", n) if n >= 2 => {
                let entry = store
                    .values
                    .entry(key(0))
                    .or_insert_with(|| Value::Set(BTreeSet::new()));
                let Value::Set(set) = entry else {
                    return Reply::error(WRONGTYPE);
                };
                Reply::integer(args[1..].iter().filter(|m| set.insert((*m).clone())).count() as i64)
            }
            ("SREM", n) if n >= 2 => match store.values.get_mut(&key(0)) {
                None => Reply::integer(0),
                Some(Value::Set(set)) => {
                    let removed = args[1..].iter().filter(|m| set.remove(&m[..])).count();
                    if set.is_empty() {
                        store.remove(&key(0));
                    }
                    Reply::integer(removed as i64)
                }
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("SISMEMBER", 2) => match store.values.get(&key(0)) {
                None => Reply::integer(0),
                Some(Value::Set(set)) => Reply::integer(i64::from(set.contains(&args[1][..]))),
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("SMEMBERS", 1) => match store.values.get(&key(0)) {
                None => Reply::array(vec![]),
                Some(Value::Set(set)) => Reply::array(set.iter().cloned().map(Reply::bulk).collect()),
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("SCARD", 1) => match store.values.get(&key(0)) {
                None => Reply::integer(0),
                Some(Value::Set(set)) => Reply::integer(set.len() as i64),
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("SPOP", 1) => match store.values.get_mut(&key(0)) {
                None => Reply::null(),
                Some(Value::Set(set)) => {
                    let popped = set.pop_first();
                    if set.is_empty() {
                        store.remove(&key(0));
                    }
                    popped.map_or_else(Reply::null, Reply::bulk)
                }
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("SMOVE", 3) => {
                let (source, destination) = match (store.members(&key(0)), store.members(&key(1))) {
                    (Ok(source), Ok(destination)) => (source, destination),
                    (Err(e), _) | (_, Err(e)) => return e,
                };
                if !source.contains(&args[2]) {
                    return Reply::integer(0);
                }
                if let Some(Value::Set(set)) = store.values.get_mut(&key(0)) {
                    set.remove(&args[2]);
                    if set.is_empty() {
                        store.remove(&key(0));
                    }
                }
                let mut destination = destination;
                destination.insert(args[2].clone());
                store.values.insert(key(1), Value::Set(destination));
                Reply::integer(1)
            }
            ("SINTER", n) | ("SUNION", n) | ("SDIFF", n) if n >= 1 => {
                let mut sets = Vec::with_capacity(n);
                for i in 0..n {
                    match store.members(&key(i)) {
                        Ok(set) => sets.push(set),
                        Err(e) => return e,
                    }
                }
                let mut rest = sets.into_iter();
                let mut result = rest.next().unwrap_or_default();
                for set in rest {
                    match name {
                        "SINTER" => result.retain(|m| set.contains(m)),
                        "SUNION" => result.extend(set),
                        _ => result.retain(|m| !set.contains(m)),
                    }
                }
                Reply::array(result.into_iter().map(Reply::bulk).collect())
            }
            ("LPOP", 1) | ("RPOP", 1) => match store.values.get_mut(&key(0)) {
                None => Reply::null(),
                Some(Value::List(list)) => {
                    let popped = if name == "LPOP" {
                        list.pop_front()
                    } else {
                        list.pop_back()
                    };
                    if list.is_empty() {
                        store.remove(&key(0));
                    }
                    popped.map_or_else(Reply::null, Reply::bulk)
                }
                Some(_) => Reply::error(WRONGTYPE),
            },
            ("LINDEX", 2) => match (parse_int(&args[1]), store.values.get(&key(0))) {
                (None, _) => Reply::error(NOT_INTEGER),
                (Some(_), None) => Reply::null(),
                (Some(index), Some(Value::List(list))) => {
                    let len = list.len() as i64;
                    let index = if index < 0 { len + index } else { index };
                    if (0..len).contains(&index) {
                        Reply::bulk(list[index as usize].clone())
                    } else {
                        Reply::null()
                    }
                }
                (Some(_), Some(_)) => Reply::error(WRONGTYPE),
            },
            ("LPUSH", n) | ("RPUSH", n) if n >= 2 => {
                let entry = store
                    .values
                    .entry(key(0))
                    .or_insert_with(|| Value::List(VecDeque::new()));
                let Value::List(list) = entry else {
                    return Reply::error(WRONGTYPE);
                };
                for value in &args[1..] {
                    if name == "LPUSH" {
                        list.push_front(value.clone());
                    } else {
                        list.push_back(value.clone());
                    }
                }
                Reply::integer(list.len() as i64)
            }
            ("LRANGE", 3) => match (parse_int(&args[1]), parse_int(&args[2])) {
                (Some(start), Some(stop)) => match store.values.get(&key(0)) {
                    None => Reply::array(vec![]),
                    Some(Value::List(list)) => Reply::array(
                        list.range(index_range(list.len(), start, stop))
                            .cloned()
                            .map(Reply::bulk)
                            .collect(),
                    ),
                    Some(_) => Reply::error(WRONGTYPE),
                },
                _ => Reply::error(NOT_INTEGER),
            },
            ("LLEN", 1) => match store.values.get(&key(0)) {
                None => Reply::integer(0),
                Some(Value::List(list)) => Reply::integer(list.len() as i64),
                Some(_) => Reply::error(WRONGTYPE),
            },
            _ if KNOWN_COMMANDS.contains(&name) => wrong_arity(name),
            _ => Reply::error(format!("ERR unknown command '{}'", name)),
        }
    }
}

fn ack(out: &mut Vec<u8>, kind: &str, key: Option<&Bytes>, count: usize) {
    Reply::array(vec![
        Reply::bulk(kind.to_string()),
        key.map_or_else(Reply::null, |k| Reply::bulk(k.clone())),
        Reply::integer(count as i64),
    ])
    .serialize_into(out);
}

fn wrong_arity(name: &str) -> Reply {
    Reply::error(format!(
        "ERR wrong number of arguments for '{}' command",
        name.to_ascii_lowercase()
    ))
}

fn parse_int(bytes: &[u8]) -> Option<i64> {
    std::str::from_utf8(bytes).ok()?.parse().ok()
}

fn index_range(len: usize, start: i64, stop: i64) -> std::ops::Range<usize> {
    let len = len as i64;
    let resolve = |i: i64| if i < 0 { (len + i).max(0) } else { i };
    let (start, stop) = (resolve(start), resolve(stop).min(len - 1));
    if start > stop {
        0..0
    } else {
        start as usize..stop as usize + 1
    }
}

/// Redis-style glob match supporting `*` and `?`.
pub(crate) fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p == t => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_glob_match() {
        assert!(glob_match(b"news.*", b"news.sports"));
        assert!(glob_match(b"news.*", b"news."));
        assert!(!glob_match(b"news.*", b"weather"));
        assert!(glob_match(b"h?llo", b"hello"));
        assert!(!glob_match(b"h?llo", b"hllo"));
        assert!(glob_match(b"*", b""));
    }

    #[test]
    fn test_index_range() {
        assert_eq!(index_range(5, 0, -1), 0..5);
        assert_eq!(index_range(5, -2, -1), 3..5);
        assert_eq!(index_range(5, 3, 1), 0..0);
        assert_eq!(index_range(0, 0, -1), 0..0);
        assert_eq!(index_range(3, 0, 10), 0..3);
    }
}
