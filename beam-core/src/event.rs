//! Outbound event channels for session observers.
//!
//! Status, error, and connect/disconnect notifications are delivered over
//! an unbounded mpsc channel handed out at construction, decoupling the
//! engines from any particular UI. Events are always emitted *after* the
//! client-registry lock is released so an observer that re-enters the
//! engine cannot deadlock it.

use std::net::SocketAddr;

use tokio::sync::mpsc;

// ── Event types ──────────────────────────────────────────────────

/// Notifications emitted by the broadcast server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Human-readable status text.
    Status(String),
    /// A reported, non-fatal fault (capture glitch, encode failure,
    /// accept error).
    Error(String),
    /// A client joined the registry.
    ClientConnected(SocketAddr),
    /// A client was evicted after a write fault or shutdown.
    ClientDisconnected(SocketAddr),
}

/// Notifications emitted by the stream client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    /// Human-readable status text.
    Status(String),
    /// A reported fault (decode failure, receive error).
    Error(String),
    /// The connection is down — explicit disconnect, peer close, or
    /// read fault. Reconnection is the caller's responsibility.
    Disconnected,
}

// ── Outbox ───────────────────────────────────────────────────────

/// Fire-and-forget sender half of an event channel.
///
/// Emitting never blocks an engine loop; if the observer dropped its
/// receiver the event is silently discarded.
#[derive(Debug, Clone)]
pub struct Outbox<T>(mpsc::UnboundedSender<T>);

impl<T> Outbox<T> {
    /// Create an outbox and the receiver observers listen on.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self(tx), rx)
    }

    /// Emit an event, ignoring a missing observer.
    pub fn send(&self, event: T) {
        let _ = self.0.send(event);
    }
}
