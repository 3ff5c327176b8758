//! Outbound path.
//!
//! [`WriteGate`] is the single lock every wire write passes through. While a
//! session is up it holds the sender half of that session's writer task;
//! while disconnected it holds nothing and writes are dropped quietly.
//! [`Writer`] is the IRC-shaped façade handlers and timers use.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::config::ValidConfig;

/// Longest PRIVMSG body sent in one line.
pub const MAX_MESSAGE_LEN: usize = 400;
/// Appended to every piece of a split message except the last.
pub const CONTINUATION: &str = "<more>";

struct Sink {
    tx: mpsc::UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

#[derive(Default)]
pub struct WriteGate {
    sink: Mutex<Option<Sink>>,
    connected: AtomicBool,
}

impl WriteGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a live session. `task` is the writer task draining `tx`.
    pub(crate) fn open(&self, tx: mpsc::UnboundedSender<String>, task: Option<JoinHandle<()>>) {
        let mut sink = self.sink.lock();
        *sink = Some(Sink { tx, task });
        self.connected.store(true, Ordering::SeqCst);
    }

    /// Detach the session. Lines already handed to the writer task are
    /// still flushed; the returned handle resolves once it has finished.
    pub(crate) fn close(&self) -> Option<JoinHandle<()>> {
        let mut sink = self.sink.lock();
        self.connected.store(false, Ordering::SeqCst);
        sink.take().and_then(|s| s.task)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Queue lines for the wire, all under one hold of the lock so they
    /// go out back to back.
    pub fn send_lines<I>(&self, lines: I)
    where
        I: IntoIterator<Item = String>,
    {
        let sink = self.sink.lock();
        let Some(sink) = sink.as_ref() else {
            tracing::trace!("Not connected, dropping outbound line");
            return;
        };
        for line in lines {
            if sink.tx.send(line).is_err() {
                tracing::debug!("Writer task has exited, dropping outbound line");
                return;
            }
        }
    }

    pub fn send_line(&self, line: impl Into<String>) {
        self.send_lines(std::iter::once(line.into()));
    }
}

/// Cloneable outbound façade.
///
/// Every method is safe to call from any thread and silently does nothing
/// while the bot is disconnected.
#[derive(Clone)]
pub struct Writer {
    gate: Arc<WriteGate>,
    config: Arc<ValidConfig>,
    pongs: Arc<watch::Sender<Option<String>>>,
}

impl Writer {
    pub(crate) fn new(gate: Arc<WriteGate>, config: Arc<ValidConfig>) -> Self {
        let (pongs, _) = watch::channel(None);
        Self {
            gate,
            config,
            pongs: Arc::new(pongs),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.gate.is_connected()
    }

    pub(crate) fn gate(&self) -> &Arc<WriteGate> {
        &self.gate
    }

    /// Say something in the configured channel.
    pub fn send_command_to_channel(&self, message: &str) {
        self.send_message(message, &self.config.channel);
    }

    /// PRIVMSG `target`, one line per non-empty line of `message`. Lines
    /// over [`MAX_MESSAGE_LEN`] characters are split into several messages.
    pub fn send_message(&self, message: &str, target: &str) {
        let lines = protocol_lines(message)
            .flat_map(split_long)
            .map(|piece| format!("PRIVMSG {target} :{piece}"))
            .collect::<Vec<_>>();
        self.gate.send_lines(lines);
    }

    /// CTCP ACTION (`/me`) to `target`.
    pub fn send_action(&self, message: &str, target: &str) {
        let lines = protocol_lines(message)
            .map(|line| format!("PRIVMSG {target} :\x01ACTION {line}\x01"))
            .collect::<Vec<_>>();
        self.gate.send_lines(lines);
    }

    pub fn send_pong(&self, token: &str) {
        self.gate.send_line(format!("PONG :{token}"));
    }

    pub fn send_ping(&self, token: &str) {
        self.gate.send_line(format!("PING :{token}"));
    }

    /// Leave the configured channel.
    pub fn send_part(&self, reason: &str) {
        self.gate
            .send_line(format!("PART {} :{reason}", self.config.channel));
    }

    /// Send a raw protocol command. Anything after the first line break is
    /// discarded.
    pub fn send_raw(&self, command: &str) {
        let line = command.split(LINE_BREAKS).next().unwrap_or_default();
        if line.len() != command.trim_end_matches(LINE_BREAKS).len() {
            tracing::warn!("Raw command contained a line break; sending first line only");
        }
        if !line.is_empty() {
            self.gate.send_line(line);
        }
    }

    /// Called when the server answers a PING.
    pub fn received_pong(&self, token: &str) {
        tracing::trace!(token, "PONG received");
        self.pongs.send_replace(Some(token.to_string()));
    }

    /// Observe the most recent PONG token.
    pub fn subscribe_pongs(&self) -> watch::Receiver<Option<String>> {
        self.pongs.subscribe()
    }
}

/// Servers end a line at CR or LF alone.
const LINE_BREAKS: [char; 2] = ['\r', '\n'];

/// The non-empty lines of `text`, split on CR, LF or CRLF.
fn protocol_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split(LINE_BREAKS).filter(|line| !line.is_empty())
}

/// Split `line` into pieces of at most [`MAX_MESSAGE_LEN`] chars, marking
/// every piece but the last with [`CONTINUATION`].
fn split_long(line: &str) -> Vec<String> {
    if line.chars().count() <= MAX_MESSAGE_LEN {
        return vec![line.to_string()];
    }
    let chars = line.chars().collect::<Vec<_>>();
    let mut pieces = chars
        .chunks(MAX_MESSAGE_LEN)
        .map(|chunk| chunk.iter().collect::<String>())
        .collect::<Vec<_>>();
    let last = pieces.len() - 1;
    for piece in &mut pieces[..last] {
        piece.push_str(CONTINUATION);
    }
    pieces
}
