use super::{Action, Handler, HandlerContext, IrcResponse, KeepHandling};
use crate::writer::Writer;

/// Sees every line, unparsed. The response carries the raw line as its
/// message and leaves user and channel empty.
pub struct AllHandler {
    action: Action,
    keep: KeepHandling,
}

impl AllHandler {
    pub fn new<F>(action: F) -> Self
    where
        F: FnMut(&Writer, &IrcResponse) -> anyhow::Result<()> + Send + 'static,
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

impl Handler for AllHandler {
    fn name(&self) -> &str {
        "all"
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        (self.action)(ctx.writer, &IrcResponse::new("", "", line))
    }

    fn keep_handling(&self) -> bool {
        self.keep.get()
    }
}
