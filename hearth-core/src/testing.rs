//! Shared fixtures for unit tests.

use std::sync::Arc;

use tokio::sync::mpsc;

use crate::config::{IrcConfig, ValidConfig};
use crate::writer::{WriteGate, Writer};

pub(crate) fn raw_config() -> IrcConfig {
    IrcConfig {
        server: "irc.example.net".into(),
        channel: "#hearth".into(),
        nick: "ember".into(),
        username: "ember".into(),
        quit_message: "bye".into(),
        watchdog_secs: 0,
        ..IrcConfig::default()
    }
}

pub(crate) fn config() -> Arc<ValidConfig> {
    Arc::new(raw_config().into_valid().expect("fixture config is valid"))
}

/// A writer attached to an in-memory channel instead of a socket.
pub(crate) fn open_writer() -> (Writer, mpsc::UnboundedReceiver<String>) {
    writer_with(config())
}

pub(crate) fn writer_with(
    config: Arc<ValidConfig>,
) -> (Writer, mpsc::UnboundedReceiver<String>) {
    let gate = Arc::new(WriteGate::new());
    let (tx, rx) = mpsc::unbounded_channel();
    gate.open(tx, None);
    (Writer::new(gate, config), rx)
}

pub(crate) fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
    let mut out = Vec::new();
    while let Ok(line) = rx.try_recv() {
        out.push(line);
    }
    out
}

/// `:nick!user@host PRIVMSG target :message`
pub(crate) fn privmsg(nick: &str, target: &str, message: &str) -> String {
    format!(":{nick}!~{nick}@example.net PRIVMSG {target} :{message}")
}

/// Poll `check` until it holds, failing the test after two seconds.
pub(crate) async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(2);
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
}
