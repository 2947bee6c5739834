//! Per-process feed state.
//!
//! The block feed owns exactly one [`ProcessState`] and passes it `&mut` into
//! the rollback engine; keeping it an explicit value (rather than ambient
//! globals) makes the single-writer requirement visible in every signature
//! that can change it.

use serde::{Deserialize, Serialize};

use crate::types::ProcessedBlock;

/// Sentinel for "no message processed yet".
pub const NO_MESSAGE: i64 = -1;

/// Mutable position of the feed within the source chain.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessState {
    /// The most recent block fully processed into the view.
    pub last_block: ProcessedBlock,
    /// Sequence number of the last processed feed message, or [`NO_MESSAGE`].
    pub last_message_index: i64,
    /// Whether the feed believes it has reached the chain tip.
    pub caught_up: bool,
}

impl ProcessState {
    pub fn new() -> Self {
        Self {
            last_block: ProcessedBlock::genesis(),
            last_message_index: NO_MESSAGE,
            caught_up: false,
        }
    }

    /// Record a newly processed block as the feed's position.
    pub fn advance(&mut self, block: ProcessedBlock) {
        self.last_block = block;
    }

    /// Record the sequence number of a processed feed message.
    pub fn record_message(&mut self, message_index: i64) {
        self.last_message_index = message_index;
    }

    /// Drop back to the pre-genesis position (full reset).
    pub fn reset(&mut self) {
        self.last_block = ProcessedBlock::genesis();
        self.last_message_index = NO_MESSAGE;
        self.caught_up = false;
    }
}

impl Default for ProcessState {
    fn default() -> Self {
        Self::new()
    }
}
