//! Handler registry, living on the event-queue worker.

use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use crate::config::ValidConfig;
use crate::event::{ConnectionEvent, Inbound};
use crate::handlers::{Handler, HandlerContext};
use crate::queue::{EventQueue, panic_message};
use crate::transport::Inbox;
use crate::writer::Writer;

/// Owns the handler list and runs one dispatch cycle per inbound item.
pub struct Dispatcher {
    config: Arc<ValidConfig>,
    writer: Writer,
    handlers: Vec<Box<dyn Handler>>,
}

impl Dispatcher {
    pub fn new(config: Arc<ValidConfig>, writer: Writer) -> Self {
        Self {
            config,
            writer,
            handlers: Vec::new(),
        }
    }

    pub fn writer(&self) -> &Writer {
        &self.writer
    }

    pub fn config(&self) -> &ValidConfig {
        &self.config
    }

    pub fn push(&mut self, handler: Box<dyn Handler>) {
        tracing::debug!(handler = handler.name(), "Handler registered");
        self.handlers.push(handler);
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn dispatch(&mut self, inbound: Inbound) {
        match inbound {
            Inbound::Line(line) => self.dispatch_line(&line),
            Inbound::Connection(event) => self.dispatch_event(&event),
        }
    }

    /// Offer `line` to every handler in order, then drop retired ones.
    pub fn dispatch_line(&mut self, line: &str) {
        let ctx = HandlerContext {
            config: &self.config,
            writer: &self.writer,
        };
        for handler in &mut self.handlers {
            let outcome = catch_unwind(AssertUnwindSafe(|| handler.handle_line(line, &ctx)));
            report(&**handler, outcome, line);
        }
        self.retire();
    }

    pub fn dispatch_event(&mut self, event: &ConnectionEvent) {
        tracing::debug!(event = %event, "Connection event");
        let ctx = HandlerContext {
            config: &self.config,
            writer: &self.writer,
        };
        for handler in &mut self.handlers {
            let outcome =
                catch_unwind(AssertUnwindSafe(|| handler.handle_connection_event(event, &ctx)));
            report(&**handler, outcome, &event.to_string());
        }
        self.retire();
    }

    fn retire(&mut self) {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.keep_handling());
        let retired = before - self.handlers.len();
        if retired > 0 {
            tracing::debug!(retired, remaining = self.handlers.len(), "Handlers retired");
        }
    }
}

fn report(
    handler: &dyn Handler,
    outcome: std::thread::Result<anyhow::Result<()>>,
    input: &str,
) {
    match outcome {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!(
            handler = handler.name(),
            input,
            error = %format!("{e:#}"),
            "Handler failed"
        ),
        Err(panic) => tracing::error!(
            handler = handler.name(),
            input,
            panic = %panic_message(panic.as_ref()),
            "Handler panicked"
        ),
    }
}

/// Adds handlers from any thread. Registration is queued behind whatever
/// is already pending, so a new handler only sees later lines.
#[derive(Clone)]
pub struct Registrar {
    queue: EventQueue<Dispatcher>,
}

impl Registrar {
    pub fn new(queue: EventQueue<Dispatcher>) -> Self {
        Self { queue }
    }

    /// Returns false if the bot has already shut down.
    pub fn add(&self, handler: Box<dyn Handler>) -> bool {
        self.queue.enqueue(move |dispatcher| {
            dispatcher.push(handler);
            Ok(())
        })
    }
}

impl Inbox for EventQueue<Dispatcher> {
    fn deliver(&self, inbound: Inbound) {
        self.enqueue(move |dispatcher| {
            dispatcher.dispatch(inbound);
            Ok(())
        });
    }

    fn drain(&self) -> impl Future<Output = ()> + Send {
        self.shutdown()
    }
}
