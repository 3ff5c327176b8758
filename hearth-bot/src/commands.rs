//! Built-in commands, addressed to the bot by nick:
//! `!<nick> plugins`, `!<nick> version [plugin]`, `!<nick> source [plugin]`,
//! `!<nick> about [plugin]` and `!<nick> help [command]`. `@` works in place
//! of `!`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use hearth_core::{Handler, IrcResponse, MessageHandler, Plugin, ValidConfig, Writer};

use crate::settings::BotSettings;

/// Name the built-in commands answer to as a plugin.
pub const DEFAULT_PLUGIN: &str = "hearth";

const HELP: &str = "Default Commands: 'plugins', 'source [plugin]', 'version [plugin]', \
                    'about [plugin]', 'help [command]'";

#[derive(Debug, Clone, PartialEq, Eq)]
struct PluginInfo {
    version: String,
    source_url: String,
    about: String,
}

/// What the bot knows about each loaded plugin, keyed by lowercase name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: BTreeMap<String, PluginInfo>,
}

impl Catalog {
    pub fn insert(&mut self, plugin: &dyn Plugin) {
        self.entries.insert(
            plugin.name().to_lowercase(),
            PluginInfo {
                version: plugin.version().to_string(),
                source_url: plugin.source_url().to_string(),
                about: plugin.about().to_string(),
            },
        );
    }

    pub fn plugin_list(&self) -> String {
        let names = self.entries.keys().map(String::as_str).collect::<Vec<_>>();
        format!("List of plugins I am running: {}", names.join(" "))
    }

    pub fn version_of(&self, plugin: Option<&str>) -> String {
        self.describe(plugin, "Version", |info| &info.version)
    }

    pub fn source_of(&self, plugin: Option<&str>) -> String {
        self.describe(plugin, "Source", |info| &info.source_url)
    }

    pub fn about(&self, plugin: Option<&str>) -> String {
        self.describe(plugin, "About", |info| &info.about)
    }

    fn describe(
        &self,
        plugin: Option<&str>,
        what: &str,
        field: impl Fn(&PluginInfo) -> &String,
    ) -> String {
        let name = plugin
            .filter(|p| !p.is_empty())
            .unwrap_or(DEFAULT_PLUGIN)
            .to_lowercase();
        match self.entries.get(&name) {
            Some(info) if !field(info).is_empty() => format!("{what} of '{name}': {}", field(info)),
            Some(_) => format!("'{name}' did not say"),
            None => format!("'{name}' is not a plugin I have loaded..."),
        }
    }
}

/// Help line for one built-in command.
pub fn help_for(topic: Option<&str>) -> &'static str {
    match topic {
        None => HELP,
        Some("plugins" | "pluginlist") => "Gets the list of plugins running.",
        Some("source") => "Gets the source code URL of the given plugin.",
        Some("version") => "Gets the version of the given plugin.",
        Some("about") => "Gets information about the given plugin.",
        Some("help") => "Gets help information about the given command.",
        Some(_) => "Invalid Command!",
    }
}

/// The built-in commands, packaged as a plugin so they list themselves.
pub struct DefaultCommands {
    settings: BotSettings,
    catalog: Arc<Catalog>,
    pending: Vec<Box<dyn Handler>>,
}

impl DefaultCommands {
    /// `others` are the plugins loaded alongside; they show up in the
    /// catalog with this one.
    pub fn new(settings: BotSettings, others: &[Box<dyn Plugin>]) -> Self {
        let mut this = Self {
            settings,
            catalog: Arc::default(),
            pending: Vec::new(),
        };
        let mut catalog = Catalog::default();
        catalog.insert(&this);
        for plugin in others {
            catalog.insert(&**plugin);
        }
        this.catalog = Arc::new(catalog);
        this
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// `^[!@]<nick>:? <command>` followed by an optional word argument.
fn command_pattern(command: &str) -> String {
    format!(r"^[!@]{{%nick%}}:?\s+{command}(\s+(?P<arg>\w+))?")
}

fn argument(response: &IrcResponse) -> Option<String> {
    response
        .captures()
        .and_then(|caps| caps.name("arg").map(|m| m.as_str().to_string()))
}

fn command<F>(pattern: &str, nick: &str, reply: F) -> anyhow::Result<Box<dyn Handler>>
where
    F: Fn(Option<&str>) -> String + Send + 'static,
{
    let nick = nick.to_string();
    let handler = MessageHandler::new(pattern, move |writer: &Writer, response| {
        let text = reply(argument(response).as_deref());
        writer.send_message(&text, response.reply_target(&nick));
        Ok(())
    })?;
    Ok(Box::new(handler))
}

impl Plugin for DefaultCommands {
    fn name(&self) -> &str {
        DEFAULT_PLUGIN
    }

    fn version(&self) -> &str {
        env!("CARGO_PKG_VERSION")
    }

    fn about(&self) -> &str {
        &self.settings.about
    }

    fn source_url(&self) -> &str {
        &self.settings.source_url
    }

    fn init(&mut self, _path: &Path, config: &ValidConfig) -> anyhow::Result<()> {
        let nick = config.nick.as_str();

        let catalog = self.catalog.clone();
        self.pending.push(command(
            r"^[!@]{%nick%}:?\s+plugin(s|\s*list)",
            nick,
            move |_| catalog.plugin_list(),
        )?);

        let catalog = self.catalog.clone();
        self.pending.push(command(&command_pattern("version"), nick, move |arg| {
            catalog.version_of(arg)
        })?);

        let catalog = self.catalog.clone();
        self.pending.push(command(&command_pattern("source"), nick, move |arg| {
            catalog.source_of(arg)
        })?);

        let catalog = self.catalog.clone();
        self.pending.push(command(&command_pattern("about"), nick, move |arg| {
            catalog.about(arg)
        })?);

        self.pending.push(command(&command_pattern("help"), nick, |arg| {
            help_for(arg).to_string()
        })?);
        Ok(())
    }

    fn handlers(&mut self) -> Vec<Box<dyn Handler>> {
        std::mem::take(&mut self.pending)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Weather;

    impl Plugin for Weather {
        fn name(&self) -> &str {
            "Weather"
        }

        fn version(&self) -> &str {
            "2.1.0"
        }

        fn init(&mut self, _: &Path, _: &ValidConfig) -> anyhow::Result<()> {
            Ok(())
        }

        fn handlers(&mut self) -> Vec<Box<dyn Handler>> {
            Vec::new()
        }
    }

    fn commands() -> DefaultCommands {
        let settings = BotSettings {
            source_url: "https://example.org/hearth".into(),
            ..BotSettings::default()
        };
        let others: Vec<Box<dyn Plugin>> = vec![Box::new(Weather)];
        DefaultCommands::new(settings, &others)
    }

    #[test]
    fn lists_every_plugin_in_lowercase() {
        assert_eq!(
            commands().catalog().plugin_list(),
            "List of plugins I am running: hearth weather"
        );
    }

    #[test]
    fn describes_default_or_named_plugin() {
        let commands = commands();
        let catalog = commands.catalog();
        assert_eq!(
            catalog.version_of(None),
            format!("Version of 'hearth': {}", env!("CARGO_PKG_VERSION"))
        );
        assert_eq!(catalog.version_of(Some("WEATHER")), "Version of 'weather': 2.1.0");
        assert_eq!(
            catalog.source_of(None),
            "Source of 'hearth': https://example.org/hearth"
        );
        assert_eq!(catalog.source_of(Some("weather")), "'weather' did not say");
        assert_eq!(
            catalog.about(Some("karma")),
            "'karma' is not a plugin I have loaded..."
        );
    }

    #[test]
    fn help_topics() {
        assert_eq!(help_for(None), HELP);
        assert_eq!(help_for(Some("pluginlist")), help_for(Some("plugins")));
        assert_eq!(help_for(Some("dance")), "Invalid Command!");
    }

    #[test]
    fn init_builds_one_handler_per_command() {
        let config = hearth_core::IrcConfig {
            server: "irc.example.net".into(),
            channel: "#hearth".into(),
            ..hearth_core::IrcConfig::default()
        }
        .into_valid()
        .unwrap();
        let mut commands = commands();
        commands.init(Path::new("plugins/hearth"), &config).unwrap();
        assert_eq!(commands.handlers().len(), 5);
        assert!(commands.handlers().is_empty());
    }
}
