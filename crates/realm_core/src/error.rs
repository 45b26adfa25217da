//! Error types for configuration and geometry loading.
//!
//! Nothing on the per-tick path returns these: a rejected intent or a
//! degenerate sweep degrades to "no transition" / "no movement". Errors only
//! surface when the host loads configuration or registers map geometry.

use thiserror::Error;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Top-level error type for the simulation core.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Configuration text failed to parse.
    #[error("Failed to parse config '{source_name}': {message}")]
    ConfigParseError {
        /// Where the config came from (path or label).
        source_name: String,
        /// Parser message.
        message: String,
    },

    /// Configuration parsed but failed validation.
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// A mob kind was referenced that has no config entry.
    #[error("Unknown mob kind: {0}")]
    UnknownMobKind(String),

    /// A hitbox definition key has no config entry.
    #[error("Unknown hitbox definition: {0}")]
    UnknownHitboxDef(String),

    /// Map geometry failed validation.
    #[error("Invalid geometry for map '{map_id}': {message}")]
    InvalidGeometry {
        /// Map the geometry belongs to.
        map_id: String,
        /// What was wrong.
        message: String,
    },

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(u64),
}
