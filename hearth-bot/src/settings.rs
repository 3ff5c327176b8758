//! Settings file for the runner.
//!
//! One TOML file with an `[irc]` table (the engine's [`IrcConfig`]) and an
//! optional `[bot]` table for the runner's own commands.

use std::path::{Path, PathBuf};

use anyhow::Context;
use hearth_core::IrcConfig;
use serde::{Deserialize, Serialize};

/// Default settings file name, looked up relative to the root directory.
pub const DEFAULT_SETTINGS_FILE: &str = "hearth.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub irc: IrcConfig,
    pub bot: BotSettings,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BotSettings {
    /// Reported by the `source` command.
    pub source_url: String,
    /// Reported by the `about` command.
    pub about: String,
    /// Directory plugins keep their files under. Relative paths resolve
    /// against the root directory.
    pub plugin_dir: PathBuf,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            about: "I am running hearth, an event-driven IRC bot engine written in Rust.".into(),
            plugin_dir: PathBuf::from("plugins"),
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("can't read {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("bad settings file {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_tables() {
        let settings = Settings::parse(
            r##"
            [irc]
            server = "irc.libera.chat"
            port = 6697
            tls = true
            channel = "#hearth"
            nick = "ember"

            [bot]
            source_url = "https://example.org/hearth"
            "##,
        )
        .unwrap();
        assert_eq!(settings.irc.server, "irc.libera.chat");
        assert_eq!(settings.irc.port, 6697);
        assert_eq!(settings.irc.username, "hearthbot");
        assert_eq!(settings.bot.source_url, "https://example.org/hearth");
        assert_eq!(settings.bot.plugin_dir, PathBuf::from("plugins"));
    }

    #[test]
    fn bot_table_is_optional() {
        let settings = Settings::parse("[irc]\nserver = \"localhost\"\n").unwrap();
        assert_eq!(settings.bot, BotSettings::default());
    }

    #[test]
    fn unreadable_file_names_the_path() {
        let err = Settings::load(Path::new("/nonexistent/hearth.toml")).unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/hearth.toml"));
    }

    #[test]
    fn sample_file_parses_and_validates() {
        let sample = include_str!("../hearth.example.toml");
        let settings = Settings::parse(sample).unwrap();
        settings.irc.validate().unwrap();
    }
}
