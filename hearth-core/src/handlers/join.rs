use std::sync::LazyLock;

use regex::Regex;

use super::{Action, Handler, HandlerContext, IrcResponse, KeepHandling};
use crate::parsing::same_name;
use crate::writer::Writer;

static JOIN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<nick>[^!\s]+)!(?P<user>\S+)\s+JOIN\s+:?(?P<channel>[^\s:]+)")
        .expect("JOIN pattern is valid")
});

/// Fires when someone other than the bot joins a channel. The response
/// message is empty.
pub struct JoinHandler {
    action: Action,
    keep: KeepHandling,
}

impl JoinHandler {
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

impl Handler for JoinHandler {
    fn name(&self) -> &str {
        "join"
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        let Some(caps) = JOIN.captures(line) else {
            return Ok(());
        };
        let nick = &caps["nick"];
        if same_name(nick, &ctx.config.nick) {
            return Ok(());
        }
        (self.action)(ctx.writer, &IrcResponse::new(nick, &caps["channel"], ""))
    }

    fn keep_handling(&self) -> bool {
        self.keep.get()
    }
}
