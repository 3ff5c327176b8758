//! hearth-bot: runs a hearth IRC bot from a settings file.
//!
//! Loads [`settings::Settings`], builds an [`IrcBot`], and loads the
//! built-in [`commands::DefaultCommands`] alongside any plugins the caller
//! hands over.

pub mod commands;
pub mod settings;

use std::path::Path;

use hearth_core::{IrcBot, Plugin};

use crate::commands::DefaultCommands;
use crate::settings::Settings;

/// Build a bot from `settings`, loading the built-in commands first and then
/// `plugins`. Each plugin gets its own directory under the plugin dir,
/// which is resolved against `root` when relative.
///
/// Must be called from inside a tokio runtime.
pub fn assemble(
    settings: Settings,
    root: &Path,
    plugins: Vec<Box<dyn Plugin>>,
) -> anyhow::Result<IrcBot> {
    let Settings { irc, bot: bot_settings } = settings;
    let plugin_dir = root.join(&bot_settings.plugin_dir);

    let defaults: Box<dyn Plugin> = Box::new(DefaultCommands::new(bot_settings, &plugins));
    let mut bot = IrcBot::new(irc, Vec::new())?;
    for plugin in std::iter::once(defaults).chain(plugins) {
        let dir = plugin_dir.join(plugin.name().to_lowercase());
        bot.load_plugin(plugin, &dir)?;
    }

    tracing::info!(
        server = %bot.config().server,
        channel = %bot.config().channel,
        plugins = bot.plugins().len(),
        "Bot assembled"
    );
    Ok(bot)
}
