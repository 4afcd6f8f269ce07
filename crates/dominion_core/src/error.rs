//! Error types for the planning and battle core.
//!
//! Expected planning failures are not errors: they are reported as
//! [`crate::planning::PlanningOutcome`] values. Allocation shortfalls are not
//! errors either. What remains here are data problems, stale commits and
//! broken integration contracts.

use thiserror::Error;

/// Result type alias using [`GameError`].
pub type Result<T> = std::result::Result<T, GameError>;

/// Top-level error type for the core.
#[derive(Debug, Error)]
pub enum GameError {
    /// Data file parsing error.
    #[error("Failed to parse data '{path}': {message}")]
    DataParseError {
        /// Path or label of the data that failed to parse.
        path: String,
        /// Error message.
        message: String,
    },

    /// A building type id is not present in the catalog.
    #[error("Unknown building type: {0}")]
    UnknownBuildingType(u32),

    /// An item (research) type id is not present in the catalog.
    #[error("Unknown item type: {0}")]
    UnknownItemType(u32),

    /// Invalid entity reference.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The live world no longer matches the snapshot a decision was made on.
    #[error("Invalid game state: {0}")]
    InvalidState(String),

    /// No path exists on a ground battle map.
    #[error("No path from {from:?} to {to:?}")]
    NoPath {
        /// Start cell.
        from: (u32, u32),
        /// Goal cell.
        to: (u32, u32),
    },

    /// External battle logic returned a signal the battle cannot honour.
    #[error("Battle callback contract breach: {0}")]
    CallbackContract(String),
}
