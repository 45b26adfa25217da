//! Error types for the headless host.

use std::path::PathBuf;

use thiserror::Error;

use realm_core::error::CoreError;

/// Result type alias using [`ServerError`].
pub type Result<T> = std::result::Result<T, ServerError>;

/// Errors raised while starting or driving the server.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A file could not be read.
    #[error("Failed to read '{}': {source}", path.display())]
    Io {
        /// File that failed.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// A server config file is not valid RON.
    #[error("Failed to parse server config: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// The simulation rejected configuration or geometry.
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A protocol message could not be encoded or decoded.
    #[error("Protocol error: {0}")]
    Json(#[from] serde_json::Error),

    /// A command named a player with no instance.
    #[error("No instance for player {0}")]
    UnknownPlayer(u64),
}
