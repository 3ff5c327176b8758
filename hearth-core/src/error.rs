use thiserror::Error;

/// Every problem found while validating an [`IrcConfig`](crate::IrcConfig).
///
/// Validation does not stop at the first failure, so one error can carry
/// several messages.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("The following errors are wrong with the IrcConfig:\n{}", bullet_list(.problems))]
    Invalid { problems: Vec<String> },
}

impl ConfigError {
    pub fn problems(&self) -> &[String] {
        match self {
            ConfigError::Invalid { problems } => problems,
        }
    }
}

fn bullet_list(problems: &[String]) -> String {
    problems
        .iter()
        .map(|p| format!("\t- {p}"))
        .collect::<Vec<_>>()
        .join("\n")
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("already connected")]
    AlreadyConnected,

    #[error("transport has been shut down")]
    ShutDown,

    #[error("TCP connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("TLS handshake with {addr} failed: {source}")]
    Tls {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0:?} is not a valid TLS server name")]
    ServerName(String),

    #[error("connection I/O: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("invalid trigger pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IrcBot must be created from inside a tokio runtime")]
    NoRuntime(#[from] tokio::runtime::TryCurrentError),

    #[error("failed to start event queue worker: {0}")]
    Worker(#[source] std::io::Error),

    #[error("plugin {name} failed to initialize: {source:#}")]
    Plugin {
        name: String,
        #[source]
        source: anyhow::Error,
    },
}
