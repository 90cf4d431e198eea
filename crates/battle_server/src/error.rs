//! Server error types.

use battle_core::GameError;
use thiserror::Error;

/// Errors raised while hosting a match.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The engine refused an operation.
    #[error(transparent)]
    Game(#[from] GameError),

    /// Server configuration could not be loaded.
    #[error("Failed to load server config '{path}': {message}")]
    Config {
        /// Config file.
        path: String,
        /// What went wrong.
        message: String,
    },

    /// The host stopped before the submission was delivered.
    #[error("Match host is no longer accepting orders")]
    HostClosed,
}

/// Result type for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;
