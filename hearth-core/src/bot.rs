//! The assembled bot.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use tokio::runtime::Handle;

use crate::config::{IrcConfig, ValidConfig};
use crate::dispatch::{Dispatcher, Registrar};
use crate::error::{BotError, TransportError};
use crate::handlers::{Handler, PingHandler, PongHandler};
use crate::plugin::Plugin;
use crate::queue::{self, EventQueue};
use crate::scheduler::Scheduler;
use crate::transport::{LineTransport, ReconnectPolicy};
use crate::writer::Writer;

/// Name of the event-queue worker thread.
pub const WORKER_THREAD: &str = "hearth-events";

/// Owns a transport, an event queue with its dispatcher, and a scheduler.
///
/// ```no_run
/// # async fn demo() -> anyhow::Result<()> {
/// use hearth_core::{IrcBot, IrcConfig, MessageHandler};
///
/// let config = IrcConfig {
///     server: "irc.libera.chat".into(),
///     channel: "#hearth".into(),
///     nick: "ember".into(),
///     ..IrcConfig::default()
/// };
/// let hello = MessageHandler::new(r"^!hello$", |writer, response| {
///     writer.send_message("hi!", response.channel());
///     Ok(())
/// })?;
/// let bot = IrcBot::new(config, vec![Box::new(hello)])?;
/// bot.run_until(tokio::signal::ctrl_c()).await?;
/// # Ok(())
/// # }
/// ```
pub struct IrcBot {
    config: Arc<ValidConfig>,
    transport: LineTransport<EventQueue<Dispatcher>>,
    queue: EventQueue<Dispatcher>,
    writer: Writer,
    scheduler: Scheduler,
    registrar: Registrar,
    plugins: Vec<Box<dyn Plugin>>,
    stopped: bool,
}

impl IrcBot {
    /// Validate `config` and build every component. Must be called from
    /// inside a tokio runtime.
    ///
    /// Ping and pong handling is always registered ahead of `handlers`.
    pub fn new(config: IrcConfig, handlers: Vec<Box<dyn Handler>>) -> Result<Self, BotError> {
        Self::with_reconnect_policy(config, handlers, ReconnectPolicy::default())
    }

    pub fn with_reconnect_policy(
        config: IrcConfig,
        handlers: Vec<Box<dyn Handler>>,
        policy: ReconnectPolicy,
    ) -> Result<Self, BotError> {
        let config = Arc::new(config.into_valid()?);
        let runtime = Handle::try_current()?;

        let (queue, worker) = EventQueue::new(WORKER_THREAD, queue::log_errors());
        let transport = LineTransport::new(config.clone(), policy, queue.clone());
        let writer = transport.writer();

        let mut dispatcher = Dispatcher::new(config.clone(), writer.clone());
        dispatcher.push(Box::new(PingHandler));
        dispatcher.push(Box::new(PongHandler));
        for handler in handlers {
            dispatcher.push(handler);
        }
        worker.spawn(dispatcher).map_err(BotError::Worker)?;

        Ok(Self {
            scheduler: Scheduler::new(runtime, queue.clone()),
            registrar: Registrar::new(queue.clone()),
            config,
            transport,
            queue,
            writer,
            plugins: Vec::new(),
            stopped: false,
        })
    }

    pub fn config(&self) -> &ValidConfig {
        &self.config
    }

    pub fn writer(&self) -> Writer {
        self.writer.clone()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// A handle for adding handlers later, from anywhere.
    pub fn registrar(&self) -> Registrar {
        self.registrar.clone()
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Register a handler. It sees lines read after the registration is
    /// processed, never the one currently being dispatched.
    pub fn add_handler<H: Handler + 'static>(&self, handler: H) -> bool {
        self.registrar.add(Box::new(handler))
    }

    /// Initialize `plugin` and register its handlers.
    pub fn load_plugin(&mut self, mut plugin: Box<dyn Plugin>, path: &Path) -> Result<(), BotError> {
        let name = plugin.name().to_string();
        plugin
            .init(path, &self.config)
            .map_err(|source| BotError::Plugin {
                name: name.clone(),
                source,
            })?;
        let handlers = plugin.handlers();
        tracing::info!(
            plugin = %name,
            version = plugin.version(),
            handlers = handlers.len(),
            "Plugin loaded"
        );
        for handler in handlers {
            self.registrar.add(handler);
        }
        self.plugins.push(plugin);
        Ok(())
    }

    /// `(name, version)` of every loaded plugin.
    pub fn plugins(&self) -> Vec<(&str, &str)> {
        self.plugins.iter().map(|p| (p.name(), p.version())).collect()
    }

    /// Connect, unless already connected or reconnecting.
    pub async fn start(&self) -> Result<(), TransportError> {
        if self.stopped {
            return Err(TransportError::ShutDown);
        }
        if self.transport.is_running() {
            return Ok(());
        }
        self.transport.connect().await
    }

    /// Leave the channel, let pending work finish, disconnect, and tear
    /// down plugins. Safe to call more than once.
    pub async fn stop(&mut self) {
        self.stopped = true;
        if self.transport.is_connected() {
            tracing::info!(channel = %self.config.channel, "Leaving channel");
            self.writer.send_part(&self.config.quit_message);
        }
        self.queue.flush().await;
        self.scheduler.stop_all();
        self.transport.disconnect().await;
        self.queue.shutdown().await;

        for mut plugin in self.plugins.drain(..) {
            tracing::debug!(plugin = plugin.name(), "Tearing down plugin");
            plugin.teardown();
        }
    }

    /// Start, wait for `signal`, then stop.
    pub async fn run_until<F: Future>(mut self, signal: F) -> Result<(), BotError> {
        if let Err(e) = self.start().await {
            self.stop().await;
            return Err(e.into());
        }
        signal.await;
        tracing::info!("Shutdown requested");
        self.stop().await;
        Ok(())
    }
}
