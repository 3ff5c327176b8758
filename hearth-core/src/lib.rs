//! Hearth: a reconnecting IRC connection with a serialized event pipeline
//! for building bots.
//!
//! The moving parts:
//! - [`transport::LineTransport`] owns the socket, reads lines, and keeps
//!   the session alive across drops.
//! - [`queue::EventQueue`] runs every handler callback on one worker thread,
//!   in arrival order.
//! - [`dispatch::Dispatcher`] offers each line to the registered handlers.
//! - [`writer::Writer`] is the outbound façade handlers reply through.
//! - [`bot::IrcBot`] wires the above together.

pub mod bot;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod event;
pub mod handlers;
pub mod parsing;
pub mod plugin;
pub mod queue;
pub mod scheduler;
pub mod transport;
pub mod watchdog;
pub mod writer;

#[cfg(test)]
pub(crate) mod testing;

pub use bot::IrcBot;
pub use config::{IrcConfig, ValidConfig};
pub use dispatch::{Dispatcher, Registrar};
pub use error::{BotError, ConfigError, HandlerError, TransportError};
pub use event::ConnectionEvent;
pub use handlers::{
    AllHandler, ConnectionHandler, Handler, HandlerContext, IrcResponse, JoinHandler,
    KeepHandling, MessageHandler, PartHandler, PingHandler, PongHandler, ResponseScope,
};
pub use plugin::Plugin;
pub use scheduler::Scheduler;
pub use transport::ReconnectPolicy;
pub use writer::Writer;
