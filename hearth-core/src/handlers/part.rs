use std::sync::LazyLock;

use regex::Regex;

use super::{Action, Handler, HandlerContext, IrcResponse, KeepHandling};
use crate::parsing::same_name;
use crate::writer::Writer;

static PART: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<nick>[^!\s]+)!(?P<user>\S+)\s+PART\s+(?P<channel>[^\s:]+)")
        .expect("PART pattern is valid")
});

/// Fires when someone other than the bot leaves a channel. The response
/// message is empty.
pub struct PartHandler {
    action: Action,
    keep: KeepHandling,
}

impl PartHandler {
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

impl Handler for PartHandler {
    fn name(&self) -> &str {
        "part"
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        let Some(caps) = PART.captures(line) else {
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

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;
    use parking_lot::Mutex;
    use std::sync::Arc;

    #[test]
    fn reports_user_and_channel_but_not_self() {
        let config = testing::config();
        let (writer, mut wire) = testing::open_writer();
        let ctx = HandlerContext {
            config: &config,
            writer: &writer,
        };
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let mut part = PartHandler::new(move |w, r| {
            sink.lock().push((r.remote_user().to_string(), r.channel().to_string()));
            w.send_message(&format!("bye {}", r.remote_user()), r.channel());
            Ok(())
        });

        part.handle_line(":alice!~alice@host PART #hearth :gone fishing", &ctx)
            .unwrap();
        part.handle_line(":bob!~bob@host PART #hearth", &ctx).unwrap();
        part.handle_line(":ember!~ember@host PART #hearth :bye", &ctx)
            .unwrap();
        part.handle_line(":carol!~carol@host JOIN #hearth", &ctx).unwrap();

        assert_eq!(
            *seen.lock(),
            [
                ("alice".to_string(), "#hearth".to_string()),
                ("bob".to_string(), "#hearth".to_string()),
            ]
        );
        assert_eq!(
            testing::drain(&mut wire),
            ["PRIVMSG #hearth :bye alice", "PRIVMSG #hearth :bye bob"]
        );
    }
}
