//! What the transport hands to the event queue.

use std::fmt;
use std::time::Duration;

/// Connection lifecycle changes, delivered to handlers in line order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    /// Registration has been sent and the read loop is running.
    Connected { server: String, nick: String },

    /// A deliberate disconnect has started.
    Disconnecting { server: String, nick: String },

    /// The socket is closed and the read loop has exited.
    Disconnected { server: String, nick: String },

    /// The connection dropped; a reconnect attempt follows after `delay`.
    Reconnecting { attempt: u32, delay: Duration },

    /// The keep-alive probe went unanswered twice.
    WatchdogFailed,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Connected { server, nick } => {
                write!(f, "connected to {server} as {nick}")
            }
            ConnectionEvent::Disconnecting { server, .. } => {
                write!(f, "disconnecting from {server}")
            }
            ConnectionEvent::Disconnected { server, .. } => {
                write!(f, "disconnected from {server}")
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                write!(f, "reconnect attempt {attempt} in {}s", delay.as_secs())
            }
            ConnectionEvent::WatchdogFailed => f.write_str("watchdog failed"),
        }
    }
}

/// One unit of work from the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A raw protocol line, CRLF stripped.
    Line(String),
    Connection(ConnectionEvent),
}
