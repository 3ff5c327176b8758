//! Line handlers.
//!
//! A handler is offered every line the bot reads, in registration order, on
//! the event-queue worker. The stock handlers each match one kind of line
//! and invoke a user callback with a parsed [`IrcResponse`].

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use regex::{Captures, Regex};

use crate::config::ValidConfig;
use crate::event::ConnectionEvent;
use crate::writer::Writer;

mod all;
mod connection;
mod join;
mod message;
mod part;
mod ping;
mod pong;

pub use all::AllHandler;
pub use connection::ConnectionHandler;
pub use join::JoinHandler;
pub use message::{MessageHandler, ResponseScope};
pub use part::PartHandler;
pub use ping::PingHandler;
pub use pong::PongHandler;

/// What a handler gets to work with besides the line itself.
pub struct HandlerContext<'a> {
    pub config: &'a ValidConfig,
    pub writer: &'a Writer,
}

pub trait Handler: Send {
    /// Shown in logs when the handler fails.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()>;

    fn handle_connection_event(
        &mut self,
        _event: &ConnectionEvent,
        _ctx: &HandlerContext<'_>,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    /// Checked after every dispatch cycle. Once false, the handler is
    /// removed and never sees another line.
    fn keep_handling(&self) -> bool {
        true
    }
}

/// Shared "run me again" switch for a handler.
///
/// Clone it before handing the handler over, then flip it from the
/// callback (or anywhere else) to retire the handler after the current
/// line.
#[derive(Debug, Clone)]
pub struct KeepHandling(Arc<AtomicBool>);

impl Default for KeepHandling {
    fn default() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }
}

impl KeepHandling {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn set(&self, keep: bool) {
        self.0.store(keep, Ordering::SeqCst);
    }

    /// Shorthand for `set(false)`.
    pub fn retire(&self) {
        self.set(false);
    }
}

/// Callback shape shared by the stock handlers.
pub type Action = Box<dyn FnMut(&Writer, &IrcResponse) -> anyhow::Result<()> + Send>;

/// A line, parsed for a callback.
#[derive(Debug, Clone)]
pub struct IrcResponse {
    remote_user: String,
    channel: String,
    message: String,
    regex: Option<Regex>,
}

impl IrcResponse {
    pub fn new(
        remote_user: impl Into<String>,
        channel: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            remote_user: remote_user.into(),
            channel: channel.into(),
            message: message.into(),
            regex: None,
        }
    }

    pub fn with_regex(mut self, regex: Regex) -> Self {
        self.regex = Some(regex);
        self
    }

    /// Nick of whoever sent the line, after bridge resolution.
    pub fn remote_user(&self) -> &str {
        &self.remote_user
    }

    /// Where the line was sent: a channel, or the bot's nick for a PM.
    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn regex(&self) -> Option<&Regex> {
        self.regex.as_ref()
    }

    /// Captures of the trigger pattern against the message.
    pub fn captures(&self) -> Option<Captures<'_>> {
        self.regex.as_ref()?.captures(&self.message)
    }

    /// Where a reply belongs: the channel for channel lines, the sender for
    /// private messages.
    pub fn reply_target<'a>(&'a self, bot_nick: &str) -> &'a str {
        if crate::parsing::same_name(&self.channel, bot_nick) {
            &self.remote_user
        } else {
            &self.channel
        }
    }
}
