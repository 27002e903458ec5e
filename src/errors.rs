//! Error types shared across the host side of the bridge.

use std::fmt::{Display, Formatter};

/// Shared bridge result type.
pub type Result<T> = std::result::Result<T, BridgeError>;

/// Bridge error enumeration covering all host-side failure modes.
///
/// Errors are `Clone` because a single failed request can reject every
/// request chained off it.
#[derive(Debug, Clone, PartialEq)]
pub enum BridgeError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// The executor process could not be started.
    Spawn(String),
    /// Stream read or write failure.
    Io(String),
    /// Line framing or packet serialization failure.
    Protocol(String),
    /// The executor has exited or the bridge was closed.
    ProcessTerminated,
    /// The executor answered the request with an error.
    Remote(RemoteError),
}

impl Display for BridgeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::ProcessTerminated => write!(f, "process has been terminated"),
            Self::Remote(err) => write!(f, "remote: {err}"),
        }
    }
}

impl std::error::Error for BridgeError {}

impl From<toml::de::Error> for BridgeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for BridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

/// An error raised inside the executor, normalized into one shape.
///
/// A bare string error only populates `message`. Structured errors fill in
/// whichever of the other fields the executor sent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteError {
    /// Type name of the thrown value, when it was an object.
    pub class: Option<String>,
    /// The thrown value's `name` field.
    pub name: Option<String>,
    /// The thrown value's `code` field, kept as raw JSON.
    pub code: Option<serde_json::Value>,
    /// Human readable message.
    pub message: String,
    /// Diagnostic trace, when the executor produced one.
    pub stack: Option<String>,
}

impl RemoteError {
    /// Build an error that only carries a message.
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            ..Self::default()
        }
    }
}

impl Display for RemoteError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.stack {
            Some(stack) if !stack.is_empty() => f.write_str(stack),
            _ => f.write_str(&self.message),
        }
    }
}

impl std::error::Error for RemoteError {}
