//! A loopback stand-in for an IRC server.

#![allow(dead_code)]

use std::time::Duration;

use hearth_core::{IrcConfig, ReconnectPolicy};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpListener;

const STEP_TIMEOUT: Duration = Duration::from_secs(5);

pub struct FakeServer {
    listener: TcpListener,
    port: u16,
}

impl FakeServer {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        Self { listener, port }
    }

    /// Config pointed at this server, with the watchdog off.
    pub fn config(&self) -> IrcConfig {
        IrcConfig {
            server: "127.0.0.1".into(),
            port: self.port,
            channel: "#hearth".into(),
            nick: "ember".into(),
            username: "ember".into(),
            quit_message: "see you".into(),
            watchdog_secs: 0,
            ..IrcConfig::default()
        }
    }

    pub async fn accept(&self) -> Client {
        let (stream, _) = tokio::time::timeout(STEP_TIMEOUT, self.listener.accept())
            .await
            .expect("bot never connected")
            .unwrap();
        let (read, write) = stream.into_split();
        Client {
            lines: BufReader::new(read).lines(),
            write,
        }
    }

    /// Accept and consume the USER / NICK / JOIN handshake.
    pub async fn accept_registered(&self) -> Client {
        let mut client = self.accept().await;
        client.expect("USER ember 0 * :Hearth IRC Bot").await;
        client.expect("NICK ember").await;
        client.expect("JOIN #hearth").await;
        client
    }
}

/// Reconnect fast enough for a test to watch.
pub fn quick_policy() -> ReconnectPolicy {
    ReconnectPolicy {
        initial: Duration::from_millis(50),
        step: Duration::from_millis(50),
        max: Duration::from_millis(200),
    }
}

pub struct Client {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

impl Client {
    /// Next line from the bot, or `None` once it hangs up.
    pub async fn next_line(&mut self) -> Option<String> {
        tokio::time::timeout(STEP_TIMEOUT, self.lines.next_line())
            .await
            .expect("timed out waiting for the bot")
            .unwrap_or(None)
    }

    pub async fn expect(&mut self, expected: &str) {
        let line = self.next_line().await;
        assert_eq!(line.as_deref(), Some(expected));
    }

    /// Skip lines until one equals `expected`.
    pub async fn expect_eventually(&mut self, expected: &str) {
        loop {
            match self.next_line().await {
                Some(line) if line == expected => return,
                Some(_) => continue,
                None => panic!("connection closed before {expected:?}"),
            }
        }
    }

    pub async fn send(&mut self, line: &str) {
        self.write
            .write_all(format!("{line}\r\n").as_bytes())
            .await
            .unwrap();
    }

    pub async fn expect_closed(&mut self) {
        loop {
            if self.next_line().await.is_none() {
                return;
            }
        }
    }
}

/// Poll `check` until it holds, failing after five seconds.
pub async fn wait_until(what: &str, check: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + STEP_TIMEOUT;
    while !check() {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
