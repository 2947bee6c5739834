//! Block-info cache.
//!
//! Read paths that repeatedly resolve block indexes to block times (feed
//! enrichment, range queries) go through this process-local cache instead of
//! the store. The rollback engine clears it in full before returning, since
//! any cached row above the cut point is stale.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::types::ProcessedBlock;

/// Process-local cache of processed-block rows, keyed by block index.
#[derive(Default)]
pub struct BlockCache {
    data: Mutex<HashMap<u64, ProcessedBlock>>,
}

impl BlockCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, block_index: u64) -> Option<ProcessedBlock> {
        self.data.lock().unwrap().get(&block_index).cloned()
    }

    pub fn insert(&self, block: ProcessedBlock) {
        self.data.lock().unwrap().insert(block.block_index, block);
    }

    /// Drop every cached entry.
    pub fn clear(&self) {
        self.data.lock().unwrap().clear();
    }

    pub fn len(&self) -> usize {
        self.data.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.lock().unwrap().is_empty()
    }
}
