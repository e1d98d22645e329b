//! Error types shared across the gateway.

use std::fmt::{Display, Formatter};

/// Shared gateway result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Gateway error enumeration covering all failure modes.
///
/// Denials and pending approvals are not errors; they are reported as
/// [`crate::models::command::CommandDecision`] states.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// Command could not be resolved to an existing file.
    CommandNotFound(String),
    /// Spawn was requested with an empty command.
    CommandEmpty(String),
    /// The operating system refused to start the process.
    Spawn(String),
    /// File-system or I/O operation failure.
    Io(String),
    /// Audit sink failed to record an event.
    Audit(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::CommandNotFound(msg) => write!(f, "command not found: {msg}"),
            Self::CommandEmpty(msg) => write!(f, "command empty: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
            Self::Audit(msg) => write!(f, "audit: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}
