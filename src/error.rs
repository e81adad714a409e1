use std::io;

use thiserror::Error;

use crate::http::request::ParseError;

/// Central error type for the mazurka server core.
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying I/O error from the OS or network.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error during HTTP request parsing.
    #[error("{0}")]
    Parse(#[from] ParseError),

    /// A requested file could not be mapped (missing, directory, unreadable).
    #[error("{0}")]
    FileAccess(String),

    /// The timer does not contain a node with the given key.
    #[error("no timer node with the given key")]
    TimerKeyNotFound,

    /// Ports below 1024 are reserved for system services.
    #[error("listening port {0} is below 1024")]
    ReservedPort(u16),

    /// The configuration file could not be parsed.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
