//! Plugin contract.
//!
//! A plugin is a bundle of handlers with a setup and teardown step. The
//! bot calls [`Plugin::init`] once, registers whatever
//! [`Plugin::handlers`] returns, and calls [`Plugin::teardown`] on stop.

use std::path::Path;

use crate::config::ValidConfig;
use crate::handlers::Handler;

pub trait Plugin: Send {
    fn name(&self) -> &str;

    fn version(&self) -> &str {
        "0.0.0"
    }

    /// One-line description for help output.
    fn about(&self) -> &str {
        ""
    }

    /// Where the plugin's code lives.
    fn source_url(&self) -> &str {
        ""
    }

    /// `path` is the plugin's own directory, for any files it ships with.
    fn init(&mut self, path: &Path, config: &ValidConfig) -> anyhow::Result<()>;

    /// Called once, after a successful `init`.
    fn handlers(&mut self) -> Vec<Box<dyn Handler>>;

    fn teardown(&mut self) {}
}
