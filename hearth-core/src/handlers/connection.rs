use super::{Handler, HandlerContext, KeepHandling};
use crate::event::ConnectionEvent;
use crate::writer::Writer;

type EventAction = Box<dyn FnMut(&Writer, &ConnectionEvent) -> anyhow::Result<()> + Send>;

/// Fires on connection lifecycle changes instead of lines.
pub struct ConnectionHandler {
    action: EventAction,
    keep: KeepHandling,
}

impl ConnectionHandler {
    pub fn new<F>(action: F) -> Self
    where
        F: FnMut(&Writer, &ConnectionEvent) -> anyhow::Result<()> + Send + 'static,
    {
        Self {
            action: Box::new(action),
            keep: KeepHandling::new(),
        }
    }

    pub fn with_keep_handling(mut self, keep: KeepHandling) -> Self {
        self.keep = keep;
        self
    }
}

impl Handler for ConnectionHandler {
    fn name(&self) -> &str {
        "connection"
    }

    fn handle_line(&mut self, _line: &str, _ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn handle_connection_event(
        &mut self,
        event: &ConnectionEvent,
        ctx: &HandlerContext<'_>,
    ) -> anyhow::Result<()> {
        (self.action)(ctx.writer, event)
    }

    fn keep_handling(&self) -> bool {
        self.keep.get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn sees_events_not_lines() {
        let config = testing::config();
        let (writer, _wire) = testing::open_writer();
        let ctx = HandlerContext {
            config: &config,
            writer: &writer,
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut handler = ConnectionHandler::new(move |_, event| {
            sink.lock().push(event.clone());
            Ok(())
        });

        handler.handle_line("PING :x", &ctx).unwrap();
        handler
            .handle_connection_event(&ConnectionEvent::WatchdogFailed, &ctx)
            .unwrap();

        assert_eq!(*seen.lock(), [ConnectionEvent::WatchdogFailed]);
    }
}
