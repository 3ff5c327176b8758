//! Line-oriented IRC transport.
//!
//! One reader task runs for the whole life of a [`LineTransport`]. It reads
//! CRLF-framed lines and hands them to an [`Inbox`] without ever running a
//! handler itself. When the socket dies without a deliberate disconnect it
//! drops into reconnect mode, waits out a linear backoff, and carries on
//! reading from the fresh session.
//!
//! Outbound lines go through the shared [`WriteGate`]. Each session has its
//! own writer task that owns the write half and applies the rate limit.

use std::fmt;
use std::future::Future;
use std::io;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_rustls::TlsConnector;
use tokio_rustls::rustls;
use tokio_rustls::rustls::client::danger::{
    HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier,
};
use tokio_rustls::rustls::pki_types::{CertificateDer, ServerName, UnixTime};
use tokio_rustls::rustls::{DigitallySignedStruct, SignatureScheme};

use crate::config::{IrcConfig, ValidConfig};
use crate::error::TransportError;
use crate::event::{ConnectionEvent, Inbound};
use crate::watchdog;
use crate::writer::{WriteGate, Writer};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);
/// Longest inbound line kept; anything longer is dropped whole.
const MAX_LINE_LEN: usize = 8 * 1024;
/// How long a disconnect waits for queued outbound lines to reach the wire.
const WRITER_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

type LineReader = BufReader<Box<dyn AsyncRead + Send + Unpin>>;
type LineWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the transport delivers what it reads.
pub trait Inbox: Send + Sync + 'static {
    /// Hand over one line or lifecycle event. Must not block.
    fn deliver(&self, inbound: Inbound);

    /// Resolves once everything delivered so far has been processed and
    /// nothing more will be accepted.
    fn drain(&self) -> impl Future<Output = ()> + Send;
}

/// Linear reconnect backoff: wait `initial`, then `step` longer after each
/// failed attempt, never more than `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial: Duration,
    pub step: Duration,
    pub max: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(60),
            step: Duration::from_secs(60),
            max: Duration::from_secs(10 * 60),
        }
    }
}

impl ReconnectPolicy {
    pub fn delays(&self) -> Backoff {
        Backoff {
            next: self.initial.min(self.max),
            step: self.step,
            max: self.max,
        }
    }
}

/// Endless sequence of reconnect delays.
#[derive(Debug, Clone)]
pub struct Backoff {
    next: Duration,
    step: Duration,
    max: Duration,
}

impl Iterator for Backoff {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = current.saturating_add(self.step).min(self.max);
        Some(current)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Lifecycle {
    Idle,
    Connecting,
    Running,
    ShutDown,
}

enum SessionEnd {
    Aborted,
    Eof,
    Watchdog,
    Io(io::Error),
}

impl fmt::Display for SessionEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionEnd::Aborted => f.write_str("aborted"),
            SessionEnd::Eof => f.write_str("server closed the connection"),
            SessionEnd::Watchdog => f.write_str("watchdog requested reconnect"),
            SessionEnd::Io(e) => write!(f, "read error: {e}"),
        }
    }
}

pub struct LineTransport<I: Inbox> {
    shared: Arc<Shared<I>>,
}

impl<I: Inbox> Clone for LineTransport<I> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
        }
    }
}

struct Shared<I> {
    config: Arc<ValidConfig>,
    policy: ReconnectPolicy,
    inbox: I,
    gate: Arc<WriteGate>,
    writer: Writer,
    keep_reading: AtomicBool,
    abort: watch::Sender<bool>,
    faults: watch::Sender<u64>,
    lifecycle: Mutex<Lifecycle>,
    reader: Mutex<Option<JoinHandle<()>>>,
    watchdog: Mutex<Option<JoinHandle<()>>>,
}

impl<I: Inbox> LineTransport<I> {
    pub fn new(config: Arc<ValidConfig>, policy: ReconnectPolicy, inbox: I) -> Self {
        let gate = Arc::new(WriteGate::new());
        let writer = Writer::new(gate.clone(), config.clone());
        let (abort, _) = watch::channel(false);
        let (faults, _) = watch::channel(0);
        Self {
            shared: Arc::new(Shared {
                config,
                policy,
                inbox,
                gate,
                writer,
                keep_reading: AtomicBool::new(false),
                abort,
                faults,
                lifecycle: Mutex::new(Lifecycle::Idle),
                reader: Mutex::new(None),
                watchdog: Mutex::new(None),
            }),
        }
    }

    /// The outbound façade bound to this transport's write gate.
    pub fn writer(&self) -> Writer {
        self.shared.writer.clone()
    }

    /// Whether a session is currently writable.
    pub fn is_connected(&self) -> bool {
        self.shared.gate.is_connected()
    }

    /// Whether the reader task is alive, connected or reconnecting.
    pub fn is_running(&self) -> bool {
        matches!(
            *self.shared.lifecycle.lock(),
            Lifecycle::Connecting | Lifecycle::Running
        )
    }

    /// Open the socket, register, join the channel and start reading.
    pub async fn connect(&self) -> Result<(), TransportError> {
        let shared = &self.shared;
        {
            let mut state = shared.lifecycle.lock();
            match *state {
                Lifecycle::Idle => *state = Lifecycle::Connecting,
                Lifecycle::Connecting | Lifecycle::Running => {
                    return Err(TransportError::AlreadyConnected);
                }
                Lifecycle::ShutDown => return Err(TransportError::ShutDown),
            }
        }

        shared.keep_reading.store(true, Ordering::SeqCst);
        let reader = match shared.open_session().await {
            Ok(reader) => reader,
            Err(e) => {
                shared.keep_reading.store(false, Ordering::SeqCst);
                let mut state = shared.lifecycle.lock();
                if *state == Lifecycle::Connecting {
                    *state = Lifecycle::Idle;
                }
                return Err(e);
            }
        };

        {
            let mut state = shared.lifecycle.lock();
            if *state == Lifecycle::ShutDown {
                drop(state);
                if let Some(task) = shared.gate.close() {
                    task.abort();
                }
                return Err(TransportError::ShutDown);
            }
            *state = Lifecycle::Running;
        }

        shared.announce_connected();
        let abort = shared.abort.subscribe();
        let faults = shared.faults.subscribe();
        *shared.reader.lock() = Some(tokio::spawn(read_loop(
            shared.clone(),
            reader,
            abort,
            faults,
        )));

        if let Some(period) = shared.config.watchdog_period() {
            let on_failure = {
                let shared = shared.clone();
                move || {
                    shared
                        .inbox
                        .deliver(Inbound::Connection(ConnectionEvent::WatchdogFailed));
                    shared.force_reconnect();
                }
            };
            let task = tokio::spawn(watchdog::run(
                period,
                shared.writer.clone(),
                shared.abort.subscribe(),
                on_failure,
            ));
            *shared.watchdog.lock() = Some(task);
        }
        Ok(())
    }

    /// Push the reader into reconnect mode as if the socket had died.
    pub fn force_reconnect(&self) {
        self.shared.force_reconnect();
    }

    /// Tear everything down and drain the inbox. Does nothing if the
    /// transport never connected or is already shut down.
    ///
    /// A disconnected transport cannot be connected again.
    pub async fn disconnect(&self) {
        let shared = &self.shared;
        {
            let mut state = shared.lifecycle.lock();
            match *state {
                Lifecycle::Idle | Lifecycle::ShutDown => {
                    tracing::debug!("Disconnect requested but transport is not running");
                    return;
                }
                Lifecycle::Connecting | Lifecycle::Running => *state = Lifecycle::ShutDown,
            }
        }

        let server = shared.config.server.clone();
        let nick = shared.config.nick.clone();
        tracing::info!(server = %server, "Disconnecting...");
        shared
            .inbox
            .deliver(Inbound::Connection(ConnectionEvent::Disconnecting {
                server: server.clone(),
                nick: nick.clone(),
            }));

        shared.keep_reading.store(false, Ordering::SeqCst);
        shared.abort.send_replace(true);
        let writer_task = shared.gate.close();

        let reader = shared.reader.lock().take();
        if let Some(reader) = reader
            && let Err(e) = reader.await
            && e.is_panic()
        {
            tracing::error!(error = %e, "Reader task panicked");
        }
        let watchdog = shared.watchdog.lock().take();
        if let Some(watchdog) = watchdog {
            let _ = watchdog.await;
        }
        if let Some(task) = writer_task
            && tokio::time::timeout(WRITER_FLUSH_TIMEOUT, task).await.is_err()
        {
            tracing::warn!("Outbound lines were still pending when the connection closed");
        }

        shared
            .inbox
            .deliver(Inbound::Connection(ConnectionEvent::Disconnected { server, nick }));
        shared.inbox.drain().await;
        tracing::info!("Disconnect complete");
    }
}

impl<I: Inbox> Shared<I> {
    fn force_reconnect(&self) {
        self.faults.send_modify(|n| *n = n.wrapping_add(1));
    }

    fn announce_connected(&self) {
        tracing::info!(
            server = %self.config.server,
            nick = %self.config.nick,
            channel = %self.config.channel,
            "Connected"
        );
        self.inbox
            .deliver(Inbound::Connection(ConnectionEvent::Connected {
                server: self.config.server.clone(),
                nick: self.config.nick.clone(),
            }));
    }

    /// Establish a socket, send registration, and attach a writer task.
    async fn open_session(&self) -> Result<LineReader, TransportError> {
        let conn = establish_connection(&self.config).await?;
        let (reader, mut writer) = conn.into_split();

        let rate_limit = self.config.rate_limit();
        for line in registration(&self.config) {
            writer.write_all(format!("{line}\r\n").as_bytes()).await?;
            if !rate_limit.is_zero() {
                tokio::time::sleep(rate_limit).await;
            }
        }
        writer.flush().await?;

        let (tx, rx) = mpsc::unbounded_channel();
        let task = tokio::spawn(write_loop(writer, rx, rate_limit));
        self.gate.open(tx, Some(task));
        Ok(BufReader::new(reader))
    }

    async fn reconnect(&self, abort: &mut watch::Receiver<bool>) -> Option<LineReader> {
        retry_with_backoff(
            &self.policy,
            abort,
            |attempt, delay| {
                self.inbox
                    .deliver(Inbound::Connection(ConnectionEvent::Reconnecting {
                        attempt,
                        delay,
                    }))
            },
            |_| self.open_session(),
        )
        .await
    }
}

/// Lines sent on a fresh socket, in order.
fn registration(config: &IrcConfig) -> Vec<String> {
    let mut lines = Vec::with_capacity(5);
    if let Some(pass) = config.server_password.as_deref() {
        lines.push(format!("PASS {pass}"));
    }
    lines.push(format!("USER {} 0 * :{}", config.username, config.real_name));
    lines.push(format!("NICK {}", config.nick));
    lines.push(format!("JOIN {}", config.channel));
    if let Some(password) = config.password.as_deref() {
        lines.push(format!("PRIVMSG NickServ :IDENTIFY {password}"));
    }
    lines
}

async fn read_loop<I: Inbox>(
    shared: Arc<Shared<I>>,
    mut reader: LineReader,
    mut abort: watch::Receiver<bool>,
    mut faults: watch::Receiver<u64>,
) {
    loop {
        let end = read_lines(&shared.inbox, &mut reader, &mut abort, &mut faults).await;
        if !shared.keep_reading.load(Ordering::SeqCst) {
            break;
        }
        tracing::warn!(
            reason = %end,
            "IRC connection closed, but we weren't terminating. Trying to reconnect..."
        );

        drop(reader);
        if let Some(task) = shared.gate.close() {
            task.abort();
        }

        let Some(next) = shared.reconnect(&mut abort).await else {
            tracing::info!("Reconnect abandoned, reader exiting");
            break;
        };
        faults.borrow_and_update();
        reader = next;
        tracing::info!("We have re-established connection!");
        shared.announce_connected();
    }

    // A reconnect can race a disconnect; never leave a session attached.
    if let Some(task) = shared.gate.close()
        && tokio::time::timeout(WRITER_FLUSH_TIMEOUT, task).await.is_err()
    {
        tracing::debug!("Writer task did not finish after reader exit");
    }
}

async fn read_lines<I: Inbox>(
    inbox: &I,
    reader: &mut LineReader,
    abort: &mut watch::Receiver<bool>,
    faults: &mut watch::Receiver<u64>,
) -> SessionEnd {
    let mut buf = Vec::with_capacity(512);
    // Inside an oversized line; drop bytes until its newline.
    let mut discarding = false;
    loop {
        if *abort.borrow() {
            return SessionEnd::Aborted;
        }
        buf.clear();
        let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64);
        tokio::select! {
            _ = abort.changed() => return SessionEnd::Aborted,
            _ = faults.changed() => return SessionEnd::Watchdog,
            read = limited.read_until(b'\n', &mut buf) => match read {
                Ok(0) => return SessionEnd::Eof,
                Ok(_) => {
                    let complete = buf.ends_with(b"\n");
                    if discarding {
                        discarding = !complete;
                        continue;
                    }
                    if !complete && buf.len() >= MAX_LINE_LEN {
                        tracing::warn!(limit = MAX_LINE_LEN, "Inbound line too long, discarding it");
                        discarding = true;
                        continue;
                    }
                    let text = String::from_utf8_lossy(&buf);
                    let line = text.trim_end_matches(['\r', '\n']);
                    if line.trim().is_empty() {
                        continue;
                    }
                    tracing::trace!(line, "<<");
                    inbox.deliver(Inbound::Line(line.to_string()));
                }
                Err(e) => return SessionEnd::Io(e),
            },
        }
    }
}

async fn write_loop(
    mut writer: LineWriter,
    mut rx: mpsc::UnboundedReceiver<String>,
    rate_limit: Duration,
) {
    while let Some(line) = rx.recv().await {
        tracing::trace!(line = %line, ">>");
        let framed = format!("{line}\r\n");
        let written = match writer.write_all(framed.as_bytes()).await {
            Ok(()) => writer.flush().await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            tracing::warn!(error = %e, "Write failed, dropping outbound lines for this session");
            return;
        }
        if !rate_limit.is_zero() {
            tokio::time::sleep(rate_limit).await;
        }
    }
    let _ = writer.shutdown().await;
}

/// Wait, try, repeat, following `policy`, until `attempt` succeeds or the
/// abort signal fires. `on_wait` is told about each wait before it starts.
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    policy: &ReconnectPolicy,
    abort: &mut watch::Receiver<bool>,
    mut on_wait: impl FnMut(u32, Duration),
    mut attempt: F,
) -> Option<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, TransportError>>,
{
    for (n, delay) in (1u32..).zip(policy.delays()) {
        if *abort.borrow() {
            return None;
        }
        tracing::info!(attempt = n, "Waiting {}s, then attempting reconnect...", delay.as_secs());
        on_wait(n, delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = abort.changed() => {
                tracing::info!("Terminate signal detected, aborting reconnect...");
                return None;
            }
        }
        if *abort.borrow() {
            return None;
        }
        let outcome = tokio::select! {
            outcome = attempt(n) => outcome,
            _ = abort.changed() => {
                tracing::info!(attempt = n, "Terminate signal detected, abandoning reconnect attempt");
                return None;
            }
        };
        match outcome {
            Ok(value) => return Some(value),
            Err(e) => tracing::warn!(attempt = n, error = %e, "Reconnect failed, trying again"),
        }
    }
    None
}

/// Establish TCP (and optionally TLS) connection to the server.
pub async fn establish_connection(
    config: &IrcConfig,
) -> Result<EstablishedConnection, TransportError> {
    let addr = config.server_addr();
    let mode = if config.tls { "TLS" } else { "plain" };

    tracing::debug!("Resolving {addr}...");
    let tcp = match tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(&addr)).await {
        Ok(Ok(tcp)) => tcp,
        Ok(Err(source)) => return Err(TransportError::Connect { addr, source }),
        Err(_) => {
            return Err(TransportError::Connect {
                addr,
                source: io::Error::new(io::ErrorKind::TimedOut, "connect timed out"),
            });
        }
    };
    let _ = tcp.set_nodelay(true);
    tracing::debug!("TCP connected to {addr} ({mode})");

    if !config.tls {
        return Ok(EstablishedConnection::Plain(tcp));
    }

    if config.tls_insecure {
        tracing::warn!(server = %config.server, "TLS certificate verification is disabled");
    }
    let connector = TlsConnector::from(Arc::new(tls_config(config.tls_insecure)));
    let server_name = ServerName::try_from(config.server.clone())
        .map_err(|_| TransportError::ServerName(config.server.clone()))?;
    let tls_stream = connector
        .connect(server_name, tcp)
        .await
        .map_err(|source| TransportError::Tls {
            addr: addr.clone(),
            source,
        })?;
    tracing::debug!("TLS handshake complete");
    Ok(EstablishedConnection::Tls(tls_stream))
}

/// A connection that has completed TCP (and optionally TLS) but hasn't
/// started IRC registration yet.
pub enum EstablishedConnection {
    Plain(TcpStream),
    Tls(tokio_rustls::client::TlsStream<TcpStream>),
}

impl EstablishedConnection {
    fn into_split(self) -> (Box<dyn AsyncRead + Send + Unpin>, LineWriter) {
        match self {
            EstablishedConnection::Plain(tcp) => {
                let (reader, writer) = tcp.into_split();
                (Box::new(reader), Box::new(writer))
            }
            EstablishedConnection::Tls(tls) => {
                let (reader, writer) = tokio::io::split(tls);
                (Box::new(reader), Box::new(writer))
            }
        }
    }
}

/// Client TLS settings: webpki roots, or no verification at all when
/// `insecure` is set.
fn tls_config(insecure: bool) -> rustls::ClientConfig {
    let _ = rustls::crypto::ring::default_provider().install_default();
    let builder = rustls::ClientConfig::builder();
    if insecure {
        return builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(AcceptAnyCert))
            .with_no_client_auth();
    }
    let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    builder.with_root_certificates(roots).with_no_client_auth()
}

#[derive(Debug)]
struct AcceptAnyCert;

impl ServerCertVerifier for AcceptAnyCert {
    fn verify_server_cert(
        &self,
        _: &CertificateDer<'_>,
        _: &[CertificateDer<'_>],
        _: &ServerName<'_>,
        _: &[u8],
        _: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _: &[u8],
        _: &CertificateDer<'_>,
        _: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
