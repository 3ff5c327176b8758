use std::borrow::Cow;
use std::sync::LazyLock;
use std::time::{Duration, Instant};

use regex::Regex;

use super::{Action, Handler, HandlerContext, IrcResponse, KeepHandling};
use crate::config::ValidConfig;
use crate::error::HandlerError;
use crate::parsing::{has_tags, liquefy_pattern, same_name};
use crate::writer::Writer;

static PRIVMSG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^:(?P<nick>[^!\s]+)!(?P<user>\S+)\s+PRIVMSG\s+(?P<channel>\S+)\s+:(?P<message>.+)$")
        .expect("PRIVMSG pattern is valid")
});

/// Where a [`MessageHandler`] listens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ResponseScope {
    /// Only the configured channel.
    ChannelOnly,
    /// Only private messages to the bot.
    PmsOnly,
    #[default]
    ChannelAndPms,
}

/// Fires when a PRIVMSG matches a trigger pattern.
///
/// The pattern may contain `{%nick%}`, `{%user%}` and `{%channel%}`; those
/// are filled in (escaped) per line before matching.
pub struct MessageHandler {
    pattern: String,
    compiled: Option<Regex>,
    action: Action,
    scope: ResponseScope,
    respond_to_self: bool,
    cooldown: Duration,
    last_fired: Option<Instant>,
    keep: KeepHandling,
}

impl MessageHandler {
    pub fn new<F>(pattern: &str, action: F) -> Result<Self, HandlerError>
    where
        F: FnMut(&Writer, &IrcResponse) -> anyhow::Result<()> + Send + 'static,
    {
        let compiled = if has_tags(pattern) {
            // Catch syntax errors now rather than on the first line.
            compile(&liquefy_pattern(pattern, "user", "nick", "#channel"), pattern)?;
            None
        } else {
            Some(compile(pattern, pattern)?)
        };
        Ok(Self {
            pattern: pattern.to_string(),
            compiled,
            action: Box::new(action),
            scope: ResponseScope::default(),
            respond_to_self: false,
            cooldown: Duration::ZERO,
            last_fired: None,
            keep: KeepHandling::new(),
        })
    }

    pub fn with_scope(mut self, scope: ResponseScope) -> Self {
        self.scope = scope;
        self
    }

    /// Minimum time between two fires. Zero means no limit.
    pub fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub fn respond_to_self(mut self, respond: bool) -> Self {
        self.respond_to_self = respond;
        self
    }

    pub fn with_keep_handling(mut self, keep: KeepHandling) -> Self {
        self.keep = keep;
        self
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    fn trigger(&self, user: &str, config: &ValidConfig, channel: &str) -> Result<Cow<'_, Regex>, HandlerError> {
        match &self.compiled {
            Some(regex) => Ok(Cow::Borrowed(regex)),
            None => {
                let filled = liquefy_pattern(&self.pattern, user, &config.nick, channel);
                compile(&filled, &self.pattern).map(Cow::Owned)
            }
        }
    }

    fn cooling_down(&self, now: Instant) -> bool {
        match self.last_fired {
            Some(last) if !self.cooldown.is_zero() => now.duration_since(last) <= self.cooldown,
            _ => false,
        }
    }

    pub(crate) fn handle_at(
        &mut self,
        line: &str,
        config: &ValidConfig,
        writer: &Writer,
        now: Instant,
    ) -> anyhow::Result<()> {
        let Some(caps) = PRIVMSG.captures(line) else {
            return Ok(());
        };
        let channel = &caps["channel"];
        let (nick, message) = config.unbridge(&caps["nick"], &caps["message"]);

        let trigger = self.trigger(&nick, config, channel)?;
        if !trigger.is_match(&message) {
            return Ok(());
        }

        if !self.respond_to_self && same_name(&nick, &config.nick) {
            return Ok(());
        }
        match self.scope {
            ResponseScope::ChannelOnly if !same_name(channel, &config.channel) => return Ok(()),
            ResponseScope::PmsOnly if !same_name(channel, &config.nick) => return Ok(()),
            _ => {}
        }
        if self.cooling_down(now) {
            tracing::debug!(pattern = %self.pattern, nick = %nick, "Trigger matched during cooldown");
            return Ok(());
        }

        let response = IrcResponse::new(nick, channel, message).with_regex(trigger.into_owned());
        (self.action)(writer, &response)?;
        self.last_fired = Some(now);
        Ok(())
    }
}

fn compile(pattern: &str, original: &str) -> Result<Regex, HandlerError> {
    Regex::new(pattern).map_err(|source| HandlerError::Pattern {
        pattern: original.to_string(),
        source,
    })
}

impl Handler for MessageHandler {
    fn name(&self) -> &str {
        &self.pattern
    }

    fn handle_line(&mut self, line: &str, ctx: &HandlerContext<'_>) -> anyhow::Result<()> {
        self.handle_at(line, ctx.config, ctx.writer, Instant::now())
    }

    fn keep_handling(&self) -> bool {
        self.keep.get()
    }
}
