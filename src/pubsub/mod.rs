//! Publish/Subscribe
//!
//! A [`SubscriptionManager`] puts its own connection into subscribe mode and
//! routes published messages to per-key [`Handler`]s.
//!
//! ```text
//!   foreground                               listener task
//!   ──────────                               ─────────────
//!   subscribe(key, h) ──Register(key, h)──>  handler table
//!          │                                       │
//!          └── SUBSCRIBE key ──> server ──> push ──┤
//!                                                  ├─> handler(message)
//!                                                  └─> PubSubEvent
//! ```
//!
//! The foreground only writes; the listener only reads. The listener runs
//! while at least one key is subscribed and is joined before the call that
//! removes the last key returns.

pub mod event;
mod listener;
pub mod manager;

pub use event::{Handler, KeyKind, Message, PubSubEvent};
pub use manager::{SubscriptionManager, SubscriptionState};
