use std::sync::LazyLock;

use regex::Regex;

use super::{Handler, HandlerContext};

static PING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^PING\s+:?(?P<token>.+)$").expect("PING pattern is valid"));

/// Answers server keep-alives. Always registered, never retires.
#[derive(Debug, Default)]
pub struct PingHandler;

impl Handler for PingHandler {
    fn name(&self) -> &str {
        "ping"
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        if let Some(caps) = PING.captures(line) {
            ctx.writer.send_pong(&caps["token"]);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn echoes_the_token() {
        let config = testing::config();
        let (writer, mut wire) = testing::open_writer();
        let ctx = HandlerContext {
            config: &config,
            writer: &writer,
        };
        let mut ping = PingHandler;

        ping.handle_line("PING :abc123", &ctx).unwrap();
        ping.handle_line("PING irc.example.net", &ctx).unwrap();
        ping.handle_line(":alice!~a@host PRIVMSG #hearth :PING :nope", &ctx)
            .unwrap();

        assert_eq!(
            testing::drain(&mut wire),
            ["PONG :abc123", "PONG :irc.example.net"]
        );
        assert!(ping.keep_handling());
    }
}
