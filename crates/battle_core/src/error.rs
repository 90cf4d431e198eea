//! Error types for the tick engine.
//!
//! Order-level rejections are not errors: they are reported through
//! [`crate::order::RejectCode`] inside the event log. [`GameError`] covers
//! everything that is not a player's fault.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for all engine errors.
#[derive(Debug, Error)]
pub enum GameError {
    /// Invalid unit identifier.
    #[error("Invalid unit ID: {0}")]
    InvalidUnitId(u32),

    /// Invalid facility identifier.
    #[error("Invalid facility ID: {0}")]
    InvalidFacilityId(u32),

    /// Unknown player.
    #[error("Unknown player: {0}")]
    UnknownPlayer(u8),

    /// Rules or scenario file failed to parse or validate.
    #[error("Failed to parse config '{path}': {message}")]
    ConfigError {
        /// Path (or `<inline>`) of the config source.
        path: String,
        /// Error message.
        message: String,
    },

    /// An order submission could not be decoded or exceeded the payload ceiling.
    #[error("Malformed submission: {0}")]
    MalformedSubmission(String),

    /// A state mutation would break an engine invariant; the mutation was skipped.
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid game state.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// Replay file could not be read, written or decoded.
    #[error("Replay error: {0}")]
    ReplayError(String),

    /// Replayed simulation diverged from the recorded hash.
    #[error("Desync detected at tick {tick}: local hash {local_hash}, recorded hash {recorded_hash}")]
    DesyncDetected {
        /// Tick where desync occurred.
        tick: u64,
        /// Hash produced by this run.
        local_hash: u64,
        /// Hash stored in the replay.
        recorded_hash: u64,
    },
}
