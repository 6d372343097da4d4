//! Error types for parlor-core.

use thiserror::Error;

/// Errors produced while interpreting client input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Error {
    /// A recognized command was missing a required argument.
    #[error("{usage}")]
    Usage { usage: &'static str },

    #[error("unknown command: /{0}")]
    UnknownCommand(String),

    #[error("invalid display name: {0}")]
    InvalidName(String),
}

/// Result type alias for parlor-core operations.
pub type Result<T> = std::result::Result<T, Error>;
