//! Error types for the chainview state store.

use thiserror::Error;

/// Errors that can occur while maintaining or rewinding the derived view.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Invalid rollback target {block_index}: target must be >= 1")]
    InvalidTarget { block_index: u64 },

    #[error("Can't roll back to block {block_index}: no such block in the store")]
    TargetNotFound { block_index: u64 },

    #[error("Stale update for asset '{asset}': block {at_block} is older than current block {current}")]
    StaleUpdate {
        asset: String,
        at_block: u64,
        current: u64,
    },

    #[error("Rollback hook '{hook}' failed: {reason}")]
    Hook { hook: String, reason: String },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("{0}")]
    Other(String),
}

impl ViewError {
    /// Returns `true` if the error is a rollback precondition violation,
    /// raised before any mutation was attempted.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::InvalidTarget { .. } | Self::TargetNotFound { .. }
        )
    }
}
