//! The record store trait and the in-memory reference backend.
//!
//! A [`RecordStore`] holds the derived view's collections: processed blocks,
//! the four block-scoped record types, versioned tracked assets, per-asset
//! market snapshots, and the metadata singleton. The rollback engine,
//! bootstrap, and time-range resolver are all written against this trait;
//! `chainview-store` provides the persistent SQLite implementation and
//! [`MemoryStore`] here is the ephemeral one used in tests.

use async_trait::async_trait;

use crate::error::ViewError;
use crate::tracker::TrackedAsset;
use crate::types::{
    AssetMarketInfo, BalanceChange, MarketCapPoint, ProcessedBlock, StoreMetadata,
    TransactionStat, Trade,
};

/// Per-collection deletion counts from a [`RecordStore::purge_above`] sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub blocks: u64,
    pub balance_changes: u64,
    pub trades: u64,
    pub market_caps: u64,
    pub transaction_stats: u64,
}

impl PurgeReport {
    /// Total rows deleted across all block-scoped collections.
    pub fn total(&self) -> u64 {
        self.blocks
            + self.balance_changes
            + self.trades
            + self.market_caps
            + self.transaction_stats
    }
}

/// Storage backend for the derived view.
///
/// Write methods are only ever called from the single feed/rollback writer;
/// read methods may be called concurrently from query paths.
#[async_trait]
pub trait RecordStore: Send + Sync {
    // ── Schema ───────────────────────────────────────────────────────────────

    /// Declare every collection and secondary index. Safe to call on a store
    /// that already has them (all declarations are if-not-exists).
    async fn ensure_indexes(&self) -> Result<(), ViewError>;

    /// Drop every collection that a full reparse regenerates: blocks, balance
    /// changes, trades, market-cap history, transaction stats, tracked assets,
    /// and asset market snapshots. The metadata singleton survives (bootstrap
    /// overwrites it right after).
    async fn reset(&self) -> Result<(), ViewError>;

    // ── Blocks ───────────────────────────────────────────────────────────────

    /// Insert a processed block. Fails if `block_index` is already present.
    async fn insert_block(&self, block: &ProcessedBlock) -> Result<(), ViewError>;

    async fn block_by_index(&self, block_index: u64)
        -> Result<Option<ProcessedBlock>, ViewError>;

    /// The stored block with the highest index.
    async fn latest_block(&self) -> Result<Option<ProcessedBlock>, ViewError>;

    /// Latest block with `block_time <= time` (ties broken toward the higher
    /// index).
    async fn block_at_or_before(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError>;

    /// Earliest block with `block_time >= time`.
    async fn block_at_or_after(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError>;

    // ── Tracked assets ───────────────────────────────────────────────────────

    async fn asset(&self, name: &str) -> Result<Option<TrackedAsset>, ViewError>;

    /// Upsert a tracked asset under its name.
    async fn save_asset(&self, asset: &TrackedAsset) -> Result<(), ViewError>;

    /// Remove a tracked asset. Removing an absent asset is a no-op.
    async fn delete_asset(&self, name: &str) -> Result<(), ViewError>;

    /// All assets whose current version was written above `block_index`.
    async fn assets_above(&self, block_index: u64) -> Result<Vec<TrackedAsset>, ViewError>;

    // ── Block-scoped appends ─────────────────────────────────────────────────

    async fn insert_balance_change(&self, change: &BalanceChange) -> Result<(), ViewError>;

    async fn insert_trade(&self, trade: &Trade) -> Result<(), ViewError>;

    async fn insert_market_cap(&self, point: &MarketCapPoint) -> Result<(), ViewError>;

    /// Insert a transaction stat. Fails if `message_index` was already
    /// recorded.
    async fn insert_transaction_stat(&self, stat: &TransactionStat) -> Result<(), ViewError>;

    // ── Purge ────────────────────────────────────────────────────────────────

    /// Delete every row with `block_index > block_index` from all five
    /// block-scoped collections. Tracked assets and market snapshots are not
    /// touched here; asset rewind is the tracker's job.
    async fn purge_above(&self, block_index: u64) -> Result<PurgeReport, ViewError>;

    // ── Reporting reads ──────────────────────────────────────────────────────

    /// Trades for a pair, newest first, at most `limit` rows.
    async fn trades_for_pair(
        &self,
        base_asset: &str,
        quote_asset: &str,
        limit: u32,
    ) -> Result<Vec<Trade>, ViewError>;

    /// Balance history for one address/asset pair, oldest first.
    async fn balance_changes_for_address(
        &self,
        address: &str,
        asset: &str,
    ) -> Result<Vec<BalanceChange>, ViewError>;

    /// Market-cap history for an asset in one denomination, newest block
    /// first, at most `limit` rows.
    async fn market_caps_for(
        &self,
        denominated_in: &str,
        asset: &str,
        limit: u32,
    ) -> Result<Vec<MarketCapPoint>, ViewError>;

    /// Transaction stats with `start_block <= block_index <= end_block`,
    /// oldest first.
    async fn stats_between(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransactionStat>, ViewError>;

    // ── Market snapshots ─────────────────────────────────────────────────────

    async fn market_info(&self, asset: &str) -> Result<Option<AssetMarketInfo>, ViewError>;

    /// Upsert an asset's market snapshot.
    async fn save_market_info(&self, info: &AssetMarketInfo) -> Result<(), ViewError>;

    // ── Metadata ─────────────────────────────────────────────────────────────

    async fn metadata(&self) -> Result<Option<StoreMetadata>, ViewError>;

    /// Upsert the metadata singleton.
    async fn save_metadata(&self, meta: &StoreMetadata) -> Result<(), ViewError>;
}

// ─── In-memory store (for testing) ───────────────────────────────────────────

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

/// In-memory record store for tests and ephemeral views.
///
/// Blocks are kept index-ordered so the time-range scans read in block order;
/// everything else mirrors the persistent backend with plain maps and vectors.
#[derive(Default)]
pub struct MemoryStore {
    blocks: Mutex<BTreeMap<u64, ProcessedBlock>>,
    assets: Mutex<HashMap<String, TrackedAsset>>,
    balance_changes: Mutex<Vec<BalanceChange>>,
    trades: Mutex<Vec<Trade>>,
    market_caps: Mutex<Vec<MarketCapPoint>>,
    transaction_stats: Mutex<Vec<TransactionStat>>,
    market_info: Mutex<HashMap<String, AssetMarketInfo>>,
    metadata: Mutex<Option<StoreMetadata>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn ensure_indexes(&self) -> Result<(), ViewError> {
        // Maps need no schema.
        Ok(())
    }

    async fn reset(&self) -> Result<(), ViewError> {
        self.blocks.lock().unwrap().clear();
        self.assets.lock().unwrap().clear();
        self.balance_changes.lock().unwrap().clear();
        self.trades.lock().unwrap().clear();
        self.market_caps.lock().unwrap().clear();
        self.transaction_stats.lock().unwrap().clear();
        self.market_info.lock().unwrap().clear();
        Ok(())
    }

    async fn insert_block(&self, block: &ProcessedBlock) -> Result<(), ViewError> {
        let mut blocks = self.blocks.lock().unwrap();
        if blocks.contains_key(&block.block_index) {
            return Err(ViewError::Storage(format!(
                "duplicate block index {}",
                block.block_index
            )));
        }
        blocks.insert(block.block_index, block.clone());
        Ok(())
    }

    async fn block_by_index(
        &self,
        block_index: u64,
    ) -> Result<Option<ProcessedBlock>, ViewError> {
        Ok(self.blocks.lock().unwrap().get(&block_index).cloned())
    }

    async fn latest_block(&self) -> Result<Option<ProcessedBlock>, ViewError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .last_key_value()
            .map(|(_, b)| b.clone()))
    }

    async fn block_at_or_before(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .values()
            .rev()
            .find(|b| b.block_time <= time)
            .cloned())
    }

    async fn block_at_or_after(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError> {
        Ok(self
            .blocks
            .lock()
            .unwrap()
            .values()
            .find(|b| b.block_time >= time)
            .cloned())
    }

    async fn asset(&self, name: &str) -> Result<Option<TrackedAsset>, ViewError> {
        Ok(self.assets.lock().unwrap().get(name).cloned())
    }

    async fn save_asset(&self, asset: &TrackedAsset) -> Result<(), ViewError> {
        self.assets
            .lock()
            .unwrap()
            .insert(asset.asset.clone(), asset.clone());
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), ViewError> {
        self.assets.lock().unwrap().remove(name);
        Ok(())
    }

    async fn assets_above(&self, block_index: u64) -> Result<Vec<TrackedAsset>, ViewError> {
        let mut above: Vec<TrackedAsset> = self
            .assets
            .lock()
            .unwrap()
            .values()
            .filter(|a| a.at_block > block_index)
            .cloned()
            .collect();
        above.sort_by(|a, b| a.asset.cmp(&b.asset));
        Ok(above)
    }

    async fn insert_balance_change(&self, change: &BalanceChange) -> Result<(), ViewError> {
        self.balance_changes.lock().unwrap().push(change.clone());
        Ok(())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), ViewError> {
        self.trades.lock().unwrap().push(trade.clone());
        Ok(())
    }

    async fn insert_market_cap(&self, point: &MarketCapPoint) -> Result<(), ViewError> {
        self.market_caps.lock().unwrap().push(point.clone());
        Ok(())
    }

    async fn insert_transaction_stat(&self, stat: &TransactionStat) -> Result<(), ViewError> {
        let mut stats = self.transaction_stats.lock().unwrap();
        if stats.iter().any(|s| s.message_index == stat.message_index) {
            return Err(ViewError::Storage(format!(
                "duplicate message index {}",
                stat.message_index
            )));
        }
        stats.push(stat.clone());
        Ok(())
    }

    async fn purge_above(&self, block_index: u64) -> Result<PurgeReport, ViewError> {
        let mut report = PurgeReport::default();

        let mut blocks = self.blocks.lock().unwrap();
        let cut = blocks.split_off(&(block_index + 1));
        report.blocks = cut.len() as u64;
        drop(blocks);

        let mut changes = self.balance_changes.lock().unwrap();
        let before = changes.len();
        changes.retain(|c| c.block_index <= block_index);
        report.balance_changes = (before - changes.len()) as u64;
        drop(changes);

        let mut trades = self.trades.lock().unwrap();
        let before = trades.len();
        trades.retain(|t| t.block_index <= block_index);
        report.trades = (before - trades.len()) as u64;
        drop(trades);

        let mut caps = self.market_caps.lock().unwrap();
        let before = caps.len();
        caps.retain(|p| p.block_index <= block_index);
        report.market_caps = (before - caps.len()) as u64;
        drop(caps);

        let mut stats = self.transaction_stats.lock().unwrap();
        let before = stats.len();
        stats.retain(|s| s.block_index <= block_index);
        report.transaction_stats = (before - stats.len()) as u64;

        Ok(report)
    }

    async fn trades_for_pair(
        &self,
        base_asset: &str,
        quote_asset: &str,
        limit: u32,
    ) -> Result<Vec<Trade>, ViewError> {
        let mut matched: Vec<Trade> = self
            .trades
            .lock()
            .unwrap()
            .iter()
            .filter(|t| t.base_asset == base_asset && t.quote_asset == quote_asset)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.block_time.cmp(&a.block_time));
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn balance_changes_for_address(
        &self,
        address: &str,
        asset: &str,
    ) -> Result<Vec<BalanceChange>, ViewError> {
        let mut matched: Vec<BalanceChange> = self
            .balance_changes
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.address == address && c.asset == asset)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.block_time.cmp(&b.block_time));
        Ok(matched)
    }

    async fn market_caps_for(
        &self,
        denominated_in: &str,
        asset: &str,
        limit: u32,
    ) -> Result<Vec<MarketCapPoint>, ViewError> {
        let mut matched: Vec<MarketCapPoint> = self
            .market_caps
            .lock()
            .unwrap()
            .iter()
            .filter(|p| p.denominated_in == denominated_in && p.asset == asset)
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.block_index.cmp(&a.block_index));
        matched.truncate(limit as usize);
        Ok(matched)
    }

    async fn stats_between(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransactionStat>, ViewError> {
        let mut matched: Vec<TransactionStat> = self
            .transaction_stats
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.block_index >= start_block && s.block_index <= end_block)
            .cloned()
            .collect();
        matched.sort_by(|a, b| a.block_index.cmp(&b.block_index));
        Ok(matched)
    }

    async fn market_info(&self, asset: &str) -> Result<Option<AssetMarketInfo>, ViewError> {
        Ok(self.market_info.lock().unwrap().get(asset).cloned())
    }

    async fn save_market_info(&self, info: &AssetMarketInfo) -> Result<(), ViewError> {
        self.market_info
            .lock()
            .unwrap()
            .insert(info.asset.clone(), info.clone());
        Ok(())
    }

    async fn metadata(&self) -> Result<Option<StoreMetadata>, ViewError> {
        Ok(self.metadata.lock().unwrap().clone())
    }

    async fn save_metadata(&self, meta: &StoreMetadata) -> Result<(), ViewError> {
        *self.metadata.lock().unwrap() = Some(meta.clone());
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
