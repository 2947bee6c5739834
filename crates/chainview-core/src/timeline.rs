//! Time-range resolution — map wall-clock ranges onto block-index ranges.
//!
//! Query surfaces take unix-timestamp ranges; the collections are keyed by
//! block index. The resolver converts between the two with an asymmetric
//! nearest-match policy: the start bound snaps down (latest block at or
//! before the timestamp), the end bound snaps up (earliest block at or after
//! it), so the resolved range always covers the requested interval.

use crate::cache::BlockCache;
use crate::config::ViewConfig;
use crate::error::ViewError;
use crate::state::ProcessState;
use crate::store::RecordStore;

/// Resolve an optional timestamp range to an inclusive block-index range.
///
/// A missing start means "from the protocol's first block"; a missing end
/// means "up to the feed's latest processed block". A start earlier than
/// recorded history falls back to the first block; an end beyond the tip
/// falls back to the highest stored block (or the first block when the store
/// is empty).
pub async fn resolve_block_range(
    store: &dyn RecordStore,
    config: &ViewConfig,
    state: &ProcessState,
    start_time: Option<i64>,
    end_time: Option<i64>,
) -> Result<(u64, u64), ViewError> {
    let start_block = match start_time {
        None => config.first_block,
        Some(t) => match store.block_at_or_before(t).await? {
            Some(block) => block.block_index,
            None => config.first_block,
        },
    };

    let end_block = match end_time {
        None => state.last_block.block_index,
        Some(t) => match store.block_at_or_after(t).await? {
            Some(block) => block.block_index,
            None => match store.latest_block().await? {
                Some(block) => block.block_index,
                None => config.first_block,
            },
        },
    };

    Ok((start_block, end_block))
}

/// Cached lookup of a processed block's timestamp.
///
/// Serves from the [`BlockCache`] when possible and populates it on a miss.
/// Returns `None` for a block the store has never processed (or that a
/// rollback removed).
pub async fn block_time(
    store: &dyn RecordStore,
    cache: &BlockCache,
    block_index: u64,
) -> Result<Option<i64>, ViewError> {
    if let Some(block) = cache.get(block_index) {
        return Ok(Some(block.block_time));
    }
    match store.block_by_index(block_index).await? {
        Some(block) => {
            let time = block.block_time;
            cache.insert(block);
            Ok(Some(time))
        }
        None => Ok(None),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
