//! Connection configuration.
//!
//! [`IrcConfig`] is the serde-friendly shape loaded from disk. Nothing in the
//! engine consumes it directly: it has to pass [`IrcConfig::validate`] first,
//! which yields a [`ValidConfig`] that can be read but never mutated.

use std::collections::BTreeMap;
use std::ops::Deref;
use std::time::Duration;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Default plain-text IRC port.
pub const DEFAULT_PORT: u16 = 6667;
/// Longest quit message most networks accept.
pub const MAX_QUIT_MESSAGE_LEN: usize = 160;
/// Default keep-alive period.
pub const DEFAULT_WATCHDOG_SECS: u64 = 60;

/// Capture group a bridge pattern must define for the relayed user.
pub const BRIDGE_USER_GROUP: &str = "bridgeUser";
/// Capture group a bridge pattern must define for the relayed message.
pub const BRIDGE_MESSAGE_GROUP: &str = "bridgeMessage";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IrcConfig {
    /// Hostname of the IRC server.
    pub server: String,
    pub port: u16,
    /// The single channel the bot joins.
    pub channel: String,
    pub username: String,
    pub nick: String,
    pub real_name: String,
    /// NickServ password, sent as `IDENTIFY` after joining.
    pub password: Option<String>,
    /// Server password, sent as `PASS` before registration.
    pub server_password: Option<String>,
    pub quit_message: String,
    /// Relay bot nick pattern → pattern extracting `bridgeUser` and
    /// `bridgeMessage` from what the relay says.
    pub bridge_bots: BTreeMap<String, String>,
    /// Minimum delay between two lines on the wire.
    pub rate_limit_ms: u64,
    pub tls: bool,
    /// Skip TLS certificate verification.
    pub tls_insecure: bool,
    /// Keep-alive PING period. 0 disables the watchdog.
    pub watchdog_secs: u64,
}

impl Default for IrcConfig {
    fn default() -> Self {
        Self {
            server: String::new(),
            port: DEFAULT_PORT,
            channel: String::new(),
            username: "hearthbot".to_string(),
            nick: "hearthbot".to_string(),
            real_name: "Hearth IRC Bot".to_string(),
            password: None,
            server_password: None,
            quit_message: String::new(),
            bridge_bots: BTreeMap::new(),
            rate_limit_ms: 0,
            tls: false,
            tls_insecure: false,
            watchdog_secs: DEFAULT_WATCHDOG_SECS,
        }
    }
}

impl IrcConfig {
    /// `host:port` as handed to the socket layer.
    pub fn server_addr(&self) -> String {
        format!("{}:{}", self.server, self.port)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }

    /// `None` when the watchdog is disabled.
    pub fn watchdog_period(&self) -> Option<Duration> {
        (self.watchdog_secs > 0).then(|| Duration::from_secs(self.watchdog_secs))
    }

    /// Check every field and compile the bridge patterns.
    ///
    /// All problems are collected before returning, so one error reports
    /// everything that needs fixing.
    pub fn validate(&self) -> Result<ValidConfig, ConfigError> {
        self.clone().into_valid()
    }

    pub fn into_valid(self) -> Result<ValidConfig, ConfigError> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("Server", &self.server),
            ("Channel", &self.channel),
            ("UserName", &self.username),
            ("Nick", &self.nick),
            ("RealName", &self.real_name),
        ] {
            if value.trim().is_empty() {
                problems.push(format!("{name} can not be empty"));
            }
        }

        if self.port == 0 {
            problems.push("Port can not be zero".to_string());
        }

        if self.quit_message.contains(['\r', '\n']) {
            problems.push("Quit Message can not contain new lines".to_string());
        } else if self.quit_message.chars().count() > MAX_QUIT_MESSAGE_LEN {
            problems.push(format!(
                "Quit Message can not contain more than {MAX_QUIT_MESSAGE_LEN} characters"
            ));
        }

        let mut bridges = Vec::with_capacity(self.bridge_bots.len());
        for (nick, pattern) in &self.bridge_bots {
            match compile_bridge(nick, pattern) {
                Ok(bridge) => bridges.push(bridge),
                Err(mut found) => problems.append(&mut found),
            }
        }

        if problems.is_empty() {
            Ok(ValidConfig {
                inner: self,
                bridges,
            })
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }
}

fn compile_bridge(nick: &str, pattern: &str) -> Result<Bridge, Vec<String>> {
    let mut problems = Vec::new();

    if nick.is_empty() {
        problems.push("BridgeBots can not have an empty key".to_string());
    }
    let nick_re = match Regex::new(&format!("^(?:{nick})$")) {
        Ok(re) => Some(re),
        Err(e) => {
            problems.push(format!("BridgeBots key {nick:?} is not a valid pattern: {e}"));
            None
        }
    };

    let pattern_re = if pattern.is_empty() {
        problems.push(format!("BridgeBots {nick} can not have an empty value"));
        None
    } else {
        match Regex::new(pattern) {
            Ok(re) => {
                for group in [BRIDGE_USER_GROUP, BRIDGE_MESSAGE_GROUP] {
                    if !re.capture_names().flatten().any(|n| n == group) {
                        problems.push(format!(
                            "BridgeBots {nick} must have regex group '{group}' in it"
                        ));
                    }
                }
                Some(re)
            }
            Err(e) => {
                problems.push(format!("BridgeBots {nick} has an invalid pattern: {e}"));
                None
            }
        }
    };

    match (nick_re, pattern_re) {
        (Some(nick), Some(pattern)) if problems.is_empty() => Ok(Bridge { nick, pattern }),
        _ => Err(problems),
    }
}

#[derive(Debug, Clone)]
struct Bridge {
    nick: Regex,
    pattern: Regex,
}

/// A checked [`IrcConfig`] with its bridge patterns compiled.
///
/// Derefs to the inner config for reading. There is no way to get a
/// mutable reference back out.
#[derive(Debug, Clone)]
pub struct ValidConfig {
    inner: IrcConfig,
    bridges: Vec<Bridge>,
}

impl Deref for ValidConfig {
    type Target = IrcConfig;

    fn deref(&self) -> &IrcConfig {
        &self.inner
    }
}

impl ValidConfig {
    /// Resolve the real speaker of a message relayed by a bridge bot.
    ///
    /// When `nick` is a configured bridge and its pattern extracts a
    /// non-empty user and message, those replace the originals. Otherwise
    /// the inputs come back unchanged.
    pub fn unbridge(&self, nick: &str, message: &str) -> (String, String) {
        for bridge in &self.bridges {
            if !bridge.nick.is_match(nick) {
                continue;
            }
            if let Some(caps) = bridge.pattern.captures(message) {
                let user = caps.name(BRIDGE_USER_GROUP).map_or("", |m| m.as_str());
                let relayed = caps.name(BRIDGE_MESSAGE_GROUP).map_or("", |m| m.as_str());
                if !user.is_empty() && !relayed.is_empty() {
                    return (user.to_string(), relayed.to_string());
                }
                break;
            }
        }
        (nick.to_string(), message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> IrcConfig {
        IrcConfig {
            server: "irc.example.net".into(),
            channel: "#hearth".into(),
            ..IrcConfig::default()
        }
    }

    #[test]
    fn default_fields_pass_once_server_and_channel_set() {
        let valid = base().validate().unwrap();
        assert_eq!(valid.port, DEFAULT_PORT);
        assert_eq!(valid.server_addr(), "irc.example.net:6667");
    }

    #[test]
    fn quit_message_with_newline_fails() {
        let config = IrcConfig {
            quit_message: "bye\nall".into(),
            ..base()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.problems(), ["Quit Message can not contain new lines"]);
    }

    #[test]
    fn quit_message_length_limit() {
        let at_limit = IrcConfig {
            quit_message: "q".repeat(160),
            ..base()
        };
        assert!(at_limit.validate().is_ok());

        let over = IrcConfig {
            quit_message: "q".repeat(161),
            ..base()
        };
        let err = over.validate().unwrap_err();
        assert!(err.problems()[0].contains("more than 160"));
    }

    #[test]
    fn every_problem_is_reported() {
        let config = IrcConfig {
            server: String::new(),
            channel: " ".into(),
            nick: String::new(),
            port: 0,
            ..IrcConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert_eq!(err.problems().len(), 4, "{err}");
        let text = err.to_string();
        assert!(text.starts_with("The following errors are wrong with the IrcConfig:"));
        assert!(text.contains("Server can not be empty"));
        assert!(text.contains("Nick can not be empty"));
        assert!(text.contains("Port can not be zero"));
    }

    #[test]
    fn bridge_pattern_needs_both_groups() {
        let mut config = base();
        config
            .bridge_bots
            .insert("relay".into(), r"^(?P<bridgeUser>\w+): .*$".into());
        let err = config.validate().unwrap_err();
        assert_eq!(
            err.problems(),
            ["BridgeBots relay must have regex group 'bridgeMessage' in it"]
        );
    }

    #[test]
    fn bridge_rejects_bad_regex_and_empty_key() {
        let mut config = base();
        config.bridge_bots.insert(String::new(), "(".into());
        let err = config.validate().unwrap_err();
        assert!(err.problems().iter().any(|p| p.contains("empty key")));
        assert!(err.problems().iter().any(|p| p.contains("invalid pattern")));
    }

    #[test]
    fn unbridge_replaces_nick_and_message() {
        let mut config = base();
        config.bridge_bots.insert(
            "relay".into(),
            r"^<(?P<bridgeUser>[^>]+)>\s+(?P<bridgeMessage>.+)$".into(),
        );
        let valid = config.validate().unwrap();

        assert_eq!(
            valid.unbridge("relay", "<alice> hello there"),
            ("alice".to_string(), "hello there".to_string())
        );
        // Pattern miss keeps the relay as speaker.
        assert_eq!(
            valid.unbridge("relay", "no brackets"),
            ("relay".to_string(), "no brackets".to_string())
        );
        // Keys match the whole nick only.
        assert_eq!(
            valid.unbridge("relay2", "<alice> hi"),
            ("relay2".to_string(), "<alice> hi".to_string())
        );
    }

    #[test]
    fn unbridge_keeps_originals_when_a_group_is_empty() {
        let mut config = base();
        config.bridge_bots.insert(
            "relay".into(),
            r"^(?P<bridgeUser>\w*):\s*(?P<bridgeMessage>.*)$".into(),
        );
        let valid = config.validate().unwrap();

        assert_eq!(
            valid.unbridge("relay", ": hi"),
            ("relay".to_string(), ": hi".to_string())
        );
        assert_eq!(
            valid.unbridge("relay", "alice: "),
            ("relay".to_string(), "alice: ".to_string())
        );
        assert_eq!(
            valid.unbridge("relay", "alice: hi"),
            ("alice".to_string(), "hi".to_string())
        );
    }

    #[test]
    fn deserializes_from_toml_with_defaults() {
        let config: IrcConfig = toml::from_str(
            r##"
            server = "irc.libera.chat"
            port = 6697
            tls = true
            channel = "#hearth"
            nick = "ember"
            quit_message = "later"
            watchdog_secs = 0

            [bridge_bots]
            "discord-relay" = '^<(?P<bridgeUser>\w+)> (?P<bridgeMessage>.+)$'
            "##,
        )
        .unwrap();

        assert_eq!(config.port, 6697);
        assert_eq!(config.username, "hearthbot");
        assert!(config.watchdog_period().is_none());
        let valid = config.into_valid().unwrap();
        assert_eq!(valid.nick, "ember");
        assert_eq!(valid.unbridge("discord-relay", "<bob> yo").0, "bob");
    }
}
