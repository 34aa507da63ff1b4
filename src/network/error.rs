//! Errors returned while building and executing requests

use thiserror::Error;

/// Configuration problems detected before any network I/O.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("url is empty")]
    EmptyUrl,

    #[error("invalid url {url:?}: {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("invalid header name {0:?}")]
    InvalidHeaderName(String),

    #[error("invalid value for header {0:?}")]
    InvalidHeaderValue(String),
}

/// Errors that can occur while executing a request
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The structured body passed to `json` could not be serialized.
    #[error("failed to encode request body: {0}")]
    Body(#[source] serde_json::Error),

    #[error("client build error: {0}")]
    Client(#[source] reqwest::Error),

    /// Failure reported by the network layer, passed through unchanged.
    #[error(transparent)]
    Transport(reqwest::Error),

    #[error("failed to decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

impl Error {
    /// True when the error was raised before anything was sent.
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Body(_))
    }

    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }
}
