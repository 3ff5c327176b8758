use std::sync::LazyLock;

use regex::Regex;

use super::{Handler, HandlerContext};

static PONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<server>\S+)\s+PONG\s+(?P<origin>\S+)\s+:?(?P<token>.+)$")
        .expect("PONG pattern is valid")
});

/// Reports server PONGs to the writer so the watchdog can see them.
#[derive(Debug, Default)]
pub struct PongHandler;

impl Handler for PongHandler {
    fn name(&self) -> &str {
        "pong"
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        if let Some(caps) = PONG.captures(line) {
            ctx.writer.received_pong(&caps["token"]);
        }
        Ok(())
    }
}
