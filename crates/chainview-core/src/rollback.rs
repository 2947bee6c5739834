//! Rollback engine — rewinds the derived view after a chain reorganization.
//!
//! The feed calls [`RollbackEngine::rollback`] when the source chain drops
//! blocks the view has already processed. The engine cuts every block-scoped
//! collection back to the target, reconstructs tracked assets from their
//! version histories, notifies extension-module hooks, resets the feed
//! counters, and invalidates the block cache.
//!
//! The entry point is idempotent: every phase only touches rows above the
//! target, so re-invoking with the same target after a crash between phases
//! finishes the job without further effect. The caller must hold off forward
//! writes for the duration of the call (single-writer contract, visible in
//! the `&mut ProcessState` receiver).

use std::sync::Arc;

use tracing::{info, warn};

use crate::cache::BlockCache;
use crate::error::ViewError;
use crate::hooks::{HookRegistry, RollbackHook};
use crate::state::{ProcessState, NO_MESSAGE};
use crate::store::RecordStore;
use crate::tracker::AssetTracker;
use crate::types::ProcessedBlock;

/// Coordinates the rollback phases over one store.
pub struct RollbackEngine {
    store: Arc<dyn RecordStore>,
    tracker: AssetTracker,
    hooks: HookRegistry,
    cache: Arc<BlockCache>,
}

impl RollbackEngine {
    pub fn new(store: Arc<dyn RecordStore>, cache: Arc<BlockCache>) -> Self {
        Self {
            tracker: AssetTracker::new(store.clone()),
            store,
            hooks: HookRegistry::new(),
            cache,
        }
    }

    /// Register an extension-module hook. Hooks run in registration order.
    pub fn register_hook(&mut self, hook: Arc<dyn RollbackHook>) {
        self.hooks.register(hook);
    }

    /// Rewind the view so block `target` is the newest processed block.
    ///
    /// Returns the surviving block row at `target`; the caller assigns it as
    /// the feed's new position (`state.last_block` is deliberately left for
    /// the caller). Precondition failures — target 0, or no processed block
    /// at `target` — are returned before anything is mutated.
    pub async fn rollback(
        &self,
        target: u64,
        state: &mut ProcessState,
    ) -> Result<ProcessedBlock, ViewError> {
        if target == 0 {
            return Err(ViewError::InvalidTarget {
                block_index: target,
            });
        }
        if self.store.block_by_index(target).await?.is_none() {
            return Err(ViewError::TargetNotFound {
                block_index: target,
            });
        }

        warn!(target, "pruning view to block");

        let purged = self.store.purge_above(target).await?;

        let stale_assets = self.store.assets_above(target).await?;
        for asset in &stale_assets {
            info!(
                asset = %asset.asset,
                at_block = asset.at_block,
                target,
                "rewinding tracked asset"
            );
            self.tracker.reconstruct_as_of(&asset.asset, target).await?;
        }

        let hook_failures = self.hooks.dispatch(target).await;

        state.last_message_index = NO_MESSAGE;
        state.caught_up = false;

        self.cache.clear();

        info!(
            target,
            purged = purged.total(),
            assets_rewound = stale_assets.len(),
            hook_failures,
            "rollback complete"
        );

        Ok(self
            .store
            .block_by_index(target)
            .await?
            .unwrap_or_else(ProcessedBlock::genesis))
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use crate::tracker::AssetUpdate;
    use crate::types::{BalanceChange, MarketCapPoint, TransactionStat, Trade};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    const T0: i64 = 1_400_000_000;

    fn block(index: u64) -> ProcessedBlock {
        ProcessedBlock {
            block_index: index,
            block_time: T0 + index as i64 * 600,
            block_hash: format!("{index:08x}"),
        }
    }

    async fn seeded_store(up_to: u64) -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for i in 1..=up_to {
            store.insert_block(&block(i)).await.unwrap();
            store
                .insert_balance_change(&BalanceChange {
                    block_index: i,
                    block_time: T0 + i as i64 * 600,
                    address: "1BurnAddr".into(),
                    asset: "XCP".into(),
                    quantity: 10,
                    new_balance: 10 * i as i64,
                })
                .await
                .unwrap();
            store
                .insert_trade(&Trade {
                    block_index: i,
                    block_time: T0 + i as i64 * 600,
                    base_asset: "XCP".into(),
                    quote_asset: "BTC".into(),
                    base_quantity: 100,
                    quote_quantity: 1,
                    unit_price: 0.01,
                })
                .await
                .unwrap();
            store
                .insert_market_cap(&MarketCapPoint {
                    block_index: i,
                    block_time: T0 + i as i64 * 600,
                    asset: "XCP".into(),
                    denominated_in: "BTC".into(),
                    market_cap: 26.0,
                })
                .await
                .unwrap();
            store
                .insert_transaction_stat(&TransactionStat {
                    block_index: i,
                    block_time: T0 + i as i64 * 600,
                    message_index: i as i64,
                    category: "send".into(),
                })
                .await
                .unwrap();
        }
        store
    }

    fn update(total_issued: i64) -> AssetUpdate {
        AssetUpdate {
            owner: Some("1Owner".into()),
            divisible: true,
            locked: false,
            total_issued: Some(total_issued),
        }
    }

    struct CountingHook {
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl RollbackHook for CountingHook {
        fn name(&self) -> &str {
            "counting"
        }

        async fn on_rollback(&self, _target_block: u64) -> Result<(), ViewError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                return Err(ViewError::Other("hook exploded".into()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn rollback_cuts_every_collection() {
        let store = seeded_store(10).await;
        let cache = Arc::new(BlockCache::new());
        let engine = RollbackEngine::new(store.clone(), cache);
        let mut state = ProcessState::new();
        state.record_message(10);
        state.caught_up = true;

        let returned = engine.rollback(5, &mut state).await.unwrap();

        assert_eq!(returned, block(5));
        assert_eq!(store.latest_block().await.unwrap().unwrap().block_index, 5);
        assert!(store.block_by_index(6).await.unwrap().is_none());
        let stats = store.stats_between(1, 100).await.unwrap();
        assert_eq!(stats.len(), 5);
        assert!(stats.iter().all(|s| s.block_index <= 5));
        let trades = store.trades_for_pair("XCP", "BTC", 100).await.unwrap();
        assert!(trades.iter().all(|t| t.block_index <= 5));

        // Counters reset; the block pointer is the caller's to assign.
        assert_eq!(state.last_message_index, NO_MESSAGE);
        assert!(!state.caught_up);
        assert_eq!(state.last_block, ProcessedBlock::genesis());
    }

    #[tokio::test]
    async fn rollback_rewinds_and_removes_assets() {
        let store = seeded_store(10).await;
        let tracker = AssetTracker::new(store.clone());
        // Updated before and after the cut: must rewind to block 3.
        tracker.record_update("OLD", update(100), 3).await.unwrap();
        tracker.record_update("OLD", update(900), 9).await.unwrap();
        // Born after the cut: must disappear.
        tracker.record_update("YOUNG", update(5), 8).await.unwrap();

        let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
        let mut state = ProcessState::new();
        engine.rollback(5, &mut state).await.unwrap();

        let old = store.asset("OLD").await.unwrap().unwrap();
        assert_eq!(old.at_block, 3);
        assert_eq!(old.total_issued, Some(100));
        assert!(old.history.is_empty());
        assert!(store.asset("YOUNG").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn rollback_preconditions_leave_store_untouched() {
        let store = seeded_store(10).await;
        let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
        let mut state = ProcessState::new();
        state.record_message(42);

        let err = engine.rollback(0, &mut state).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(err, ViewError::InvalidTarget { .. }));

        let err = engine.rollback(500, &mut state).await.unwrap_err();
        assert!(err.is_precondition());
        assert!(matches!(
            err,
            ViewError::TargetNotFound { block_index: 500 }
        ));

        // Nothing was deleted and the counters were not reset.
        assert_eq!(store.latest_block().await.unwrap().unwrap().block_index, 10);
        assert_eq!(store.stats_between(1, 100).await.unwrap().len(), 10);
        assert_eq!(state.last_message_index, 42);
    }

    #[tokio::test]
    async fn rollback_twice_is_idempotent() {
        let store = seeded_store(10).await;
        let tracker = AssetTracker::new(store.clone());
        tracker.record_update("TOKEN", update(100), 2).await.unwrap();
        tracker.record_update("TOKEN", update(200), 8).await.unwrap();

        let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
        let mut state = ProcessState::new();

        let first = engine.rollback(5, &mut state).await.unwrap();
        let asset_after_first = store.asset("TOKEN").await.unwrap();
        let second = engine.rollback(5, &mut state).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(store.asset("TOKEN").await.unwrap(), asset_after_first);
        assert_eq!(store.latest_block().await.unwrap().unwrap().block_index, 5);
        assert_eq!(store.stats_between(1, 100).await.unwrap().len(), 5);
    }

    #[tokio::test]
    async fn failing_hook_does_not_fail_the_rollback() {
        let store = seeded_store(10).await;
        let calls = Arc::new(AtomicU32::new(0));
        let after = Arc::new(AtomicU32::new(0));

        let mut engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
        engine.register_hook(Arc::new(CountingHook {
            calls: calls.clone(),
            fail: true,
        }));
        engine.register_hook(Arc::new(CountingHook {
            calls: after.clone(),
            fail: false,
        }));

        let mut state = ProcessState::new();
        let returned = engine.rollback(5, &mut state).await.unwrap();

        assert_eq!(returned.block_index, 5);
        assert_eq!(calls.load(Ordering::Relaxed), 1);
        // The hook registered after the failing one still ran.
        assert_eq!(after.load(Ordering::Relaxed), 1);
    }

    #[tokio::test]
    async fn rollback_clears_block_cache() {
        let store = seeded_store(10).await;
        let cache = Arc::new(BlockCache::new());
        cache.insert(block(9));
        cache.insert(block(10));

        let engine = RollbackEngine::new(store, cache.clone());
        let mut state = ProcessState::new();
        engine.rollback(5, &mut state).await.unwrap();

        assert!(cache.is_empty());
    }
}
