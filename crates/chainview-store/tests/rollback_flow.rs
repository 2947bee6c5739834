//! End-to-end reorg flows over the shipping storage backends.
//!
//! Each test drives the real sequence a feed goes through: bootstrap, process
//! blocks and records, hit a reorg, roll the view back, resume. The SQLite
//! backend gets the full treatment; one test runs the identical script over
//! the in-memory backend and asserts both land in the same observable state.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use chainview_core::{
    block_time, reset_state, resolve_block_range, AssetTracker, AssetUpdate, BlockCache,
    ProcessState, ProcessedBlock, RecordStore, RollbackEngine, RollbackHook, TrackedAsset, Trade,
    TransactionStat, ViewConfig, ViewError, NO_MESSAGE,
};
use chainview_store::{MemoryStore, SqliteStore};

// ─── Helpers ─────────────────────────────────────────────────────────────────

const T0: i64 = 1_400_000_000;

fn block(index: u64) -> ProcessedBlock {
    ProcessedBlock {
        block_index: index,
        block_time: T0 + index as i64 * 600,
        block_hash: format!("{index:08x}"),
    }
}

fn trade(block_index: u64) -> Trade {
    Trade {
        block_index,
        block_time: T0 + block_index as i64 * 600,
        base_asset: "XCP".into(),
        quote_asset: "BTC".into(),
        base_quantity: 100,
        quote_quantity: 1,
        unit_price: 0.01,
    }
}

fn stat(block_index: u64) -> TransactionStat {
    TransactionStat {
        block_index,
        block_time: T0 + block_index as i64 * 600,
        message_index: block_index as i64,
        category: "send".into(),
    }
}

fn update(total_issued: i64) -> AssetUpdate {
    AssetUpdate {
        owner: Some("1IssuerAddr".into()),
        divisible: true,
        locked: false,
        total_issued: Some(total_issued),
    }
}

/// Process blocks 1..=tip: block row, trade, stat, feed position.
async fn feed_blocks(
    store: &dyn RecordStore,
    state: &mut ProcessState,
    tip: u64,
) -> Result<(), ViewError> {
    for i in 1..=tip {
        store.insert_block(&block(i)).await?;
        store.insert_trade(&trade(i)).await?;
        store.insert_transaction_stat(&stat(i)).await?;
        state.advance(block(i));
        state.record_message(i as i64);
    }
    state.caught_up = true;
    Ok(())
}

struct RecordingHook {
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl RollbackHook for RecordingHook {
    fn name(&self) -> &str {
        "recording"
    }

    async fn on_rollback(&self, target_block: u64) -> Result<(), ViewError> {
        self.seen.lock().unwrap().push(target_block);
        Ok(())
    }
}

// ─── Full reorg flow over SQLite ─────────────────────────────────────────────

#[tokio::test]
async fn reorg_rewinds_sqlite_view_end_to_end() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let config = ViewConfig::for_testing(1);
    let mut state = ProcessState::new();

    reset_state(store.as_ref(), &config, &mut state)
        .await
        .unwrap();

    feed_blocks(store.as_ref(), &mut state, 10).await.unwrap();
    let tracker = AssetTracker::new(store.clone());
    tracker.record_update("PEPECASH", update(500), 4).await.unwrap();
    tracker.record_update("PEPECASH", update(900), 8).await.unwrap();

    let seen = Arc::new(Mutex::new(Vec::new()));
    let mut engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
    engine.register_hook(Arc::new(RecordingHook { seen: seen.clone() }));

    let returned = engine.rollback(6, &mut state).await.unwrap();
    state.advance(returned.clone());

    // The view now ends at block 6.
    assert_eq!(returned, block(6));
    assert_eq!(state.last_block, block(6));
    assert_eq!(store.latest_block().await.unwrap().unwrap(), block(6));
    assert!(store.block_by_index(7).await.unwrap().is_none());
    assert_eq!(store.stats_between(1, 100).await.unwrap().len(), 6);
    let trades = store.trades_for_pair("XCP", "BTC", 100).await.unwrap();
    assert_eq!(trades.len(), 6);
    assert!(trades.iter().all(|t| t.block_index <= 6));

    // PEPECASH is back to its block-4 version; the seeded native asset was
    // never above the cut and is untouched.
    let pepecash = store.asset("PEPECASH").await.unwrap().unwrap();
    assert_eq!(pepecash.at_block, 4);
    assert_eq!(pepecash.total_issued, Some(500));
    assert!(pepecash.history.is_empty());
    let xcp = store.asset("XCP").await.unwrap().unwrap();
    assert_eq!(xcp.at_block, 1);

    // Extension modules were notified; the feed counters were dropped.
    assert_eq!(*seen.lock().unwrap(), vec![6]);
    assert_eq!(state.last_message_index, NO_MESSAGE);
    assert!(!state.caught_up);

    // The feed can now replay the competing branch: the purged indexes and
    // message numbers are free again.
    let replacement = ProcessedBlock {
        block_index: 7,
        block_time: T0 + 7 * 600 + 30,
        block_hash: "branch-b".into(),
    };
    store.insert_block(&replacement).await.unwrap();
    store.insert_transaction_stat(&stat(7)).await.unwrap();
    assert_eq!(store.latest_block().await.unwrap().unwrap(), replacement);
}

// ─── Backend parity ──────────────────────────────────────────────────────────

/// Observable state after the scripted reorg, for cross-backend comparison.
#[derive(Debug, PartialEq)]
struct Outcome {
    latest: Option<u64>,
    token: Option<TrackedAsset>,
    trades: usize,
    stats: usize,
}

async fn run_reorg_script(store: Arc<dyn RecordStore>) -> Outcome {
    let config = ViewConfig::for_testing(1);
    let mut state = ProcessState::new();
    reset_state(store.as_ref(), &config, &mut state)
        .await
        .unwrap();
    feed_blocks(store.as_ref(), &mut state, 8).await.unwrap();

    let tracker = AssetTracker::new(store.clone());
    tracker.record_update("TOKEN", update(100), 2).await.unwrap();
    tracker.record_update("TOKEN", update(700), 7).await.unwrap();

    let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
    engine.rollback(4, &mut state).await.unwrap();

    Outcome {
        latest: store
            .latest_block()
            .await
            .unwrap()
            .map(|b| b.block_index),
        token: store.asset("TOKEN").await.unwrap(),
        trades: store.trades_for_pair("XCP", "BTC", 100).await.unwrap().len(),
        stats: store.stats_between(1, 100).await.unwrap().len(),
    }
}

#[tokio::test]
async fn backends_agree_after_identical_reorg() {
    let memory = run_reorg_script(Arc::new(MemoryStore::new())).await;
    let sqlite = run_reorg_script(Arc::new(SqliteStore::in_memory().await.unwrap())).await;

    assert_eq!(memory, sqlite);
    assert_eq!(memory.latest, Some(4));
    let token = memory.token.unwrap();
    assert_eq!(token.at_block, 2);
    assert_eq!(token.total_issued, Some(100));
}

// ─── Time ranges across a rollback ───────────────────────────────────────────

#[tokio::test]
async fn time_ranges_track_the_view_across_a_rollback() {
    let store = Arc::new(SqliteStore::in_memory().await.unwrap());
    let config = ViewConfig::for_testing(1);
    let mut state = ProcessState::new();
    reset_state(store.as_ref(), &config, &mut state)
        .await
        .unwrap();
    feed_blocks(store.as_ref(), &mut state, 10).await.unwrap();

    // Warm the cache, then resolve against the full view.
    let cache = Arc::new(BlockCache::new());
    assert_eq!(
        block_time(store.as_ref(), &cache, 8).await.unwrap(),
        Some(T0 + 8 * 600)
    );
    let (start, end) = resolve_block_range(
        store.as_ref(),
        &config,
        &state,
        Some(T0 + 2 * 600 + 300),
        Some(T0 + 100 * 600),
    )
    .await
    .unwrap();
    assert_eq!((start, end), (2, 10));

    let engine = RollbackEngine::new(store.clone(), cache.clone());
    let returned = engine.rollback(4, &mut state).await.unwrap();
    state.advance(returned);

    // Rolled-back blocks are gone from the cache and the store.
    assert_eq!(block_time(store.as_ref(), &cache, 8).await.unwrap(), None);
    assert_eq!(
        block_time(store.as_ref(), &cache, 3).await.unwrap(),
        Some(T0 + 3 * 600)
    );

    // Open-ended ranges follow the new feed position; an end beyond the tip
    // snaps to the surviving highest block.
    let (start, end) = resolve_block_range(store.as_ref(), &config, &state, None, None)
        .await
        .unwrap();
    assert_eq!((start, end), (1, 4));
    let (start, end) = resolve_block_range(
        store.as_ref(),
        &config,
        &state,
        Some(T0 + 2 * 600),
        Some(T0 + 100 * 600),
    )
    .await
    .unwrap();
    assert_eq!((start, end), (2, 4));
}

// ─── Durability ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn rolled_back_file_store_stays_rolled_back() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("view.db");
    let path = path.to_str().unwrap();

    {
        let store = Arc::new(SqliteStore::open(path).await.unwrap());
        let config = ViewConfig::for_testing(1);
        let mut state = ProcessState::new();
        reset_state(store.as_ref(), &config, &mut state)
            .await
            .unwrap();
        feed_blocks(store.as_ref(), &mut state, 8).await.unwrap();

        let tracker = AssetTracker::new(store.clone());
        tracker.record_update("TOKEN", update(100), 2).await.unwrap();
        tracker.record_update("TOKEN", update(600), 6).await.unwrap();

        let engine = RollbackEngine::new(store.clone(), Arc::new(BlockCache::new()));
        engine.rollback(3, &mut state).await.unwrap();
    }

    let store = SqliteStore::open(path).await.unwrap();
    assert_eq!(store.latest_block().await.unwrap().unwrap().block_index, 3);
    assert_eq!(store.stats_between(1, 100).await.unwrap().len(), 3);
    let token = store.asset("TOKEN").await.unwrap().unwrap();
    assert_eq!(token.at_block, 2);
    assert_eq!(token.total_issued, Some(100));
    assert!(store.asset("XCP").await.unwrap().is_some());
}
