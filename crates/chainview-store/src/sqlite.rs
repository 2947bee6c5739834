//! SQLite storage backend for ChainView.
//!
//! Persists every view collection to a single SQLite file. Uses `sqlx` with
//! WAL mode for concurrent read performance; asset version histories are
//! stored as a JSON column on the asset row, so an asset and its history
//! always move together.
//!
//! # Usage
//! ```rust,no_run
//! use chainview_store::sqlite::SqliteStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStore::open("./view.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStore::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use chainview_core::error::ViewError;
use chainview_core::store::{PurgeReport, RecordStore};
use chainview_core::tracker::{AssetVersion, TrackedAsset};
use chainview_core::types::{
    AssetMarketInfo, BalanceChange, MarketCapPoint, ProcessedBlock, StoreMetadata,
    TransactionStat, Trade,
};

/// Collection and secondary-index declarations, all if-not-exists so the
/// schema can be re-declared on every startup and after every reset.
const SCHEMA: &[&str] = &[
    // Blocks: unique by index, scanned by time for range resolution.
    "CREATE TABLE IF NOT EXISTS blocks (
        block_index INTEGER PRIMARY KEY,
        block_time  INTEGER NOT NULL,
        block_hash  TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_blocks_time ON blocks (block_time);",
    // Tracked assets: history rides along as JSON.
    "CREATE TABLE IF NOT EXISTS tracked_assets (
        asset        TEXT PRIMARY KEY,
        owner        TEXT,
        divisible    INTEGER NOT NULL,
        locked       INTEGER NOT NULL,
        total_issued INTEGER,
        at_block     INTEGER NOT NULL,
        history      TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_assets_at_block ON tracked_assets (at_block);",
    "CREATE INDEX IF NOT EXISTS idx_assets_owner ON tracked_assets (owner, asset);",
    // Trades.
    "CREATE TABLE IF NOT EXISTS trades (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        block_index    INTEGER NOT NULL,
        block_time     INTEGER NOT NULL,
        base_asset     TEXT    NOT NULL,
        quote_asset    TEXT    NOT NULL,
        base_quantity  INTEGER NOT NULL,
        quote_quantity INTEGER NOT NULL,
        unit_price     REAL    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_trades_pair_time
        ON trades (base_asset, quote_asset, block_time DESC);",
    "CREATE INDEX IF NOT EXISTS idx_trades_block_pair
        ON trades (block_index, base_asset, quote_asset);",
    // Balance changes.
    "CREATE TABLE IF NOT EXISTS balance_changes (
        id          INTEGER PRIMARY KEY AUTOINCREMENT,
        block_index INTEGER NOT NULL,
        block_time  INTEGER NOT NULL,
        address     TEXT    NOT NULL,
        asset       TEXT    NOT NULL,
        quantity    INTEGER NOT NULL,
        new_balance INTEGER NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_balance_changes_block ON balance_changes (block_index);",
    "CREATE INDEX IF NOT EXISTS idx_balance_changes_addr
        ON balance_changes (address, asset, block_time);",
    // Market-cap history.
    "CREATE TABLE IF NOT EXISTS market_cap_history (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        block_index    INTEGER NOT NULL,
        block_time     INTEGER NOT NULL,
        asset          TEXT    NOT NULL,
        denominated_in TEXT    NOT NULL,
        market_cap     REAL    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_market_caps_block ON market_cap_history (block_index);",
    "CREATE INDEX IF NOT EXISTS idx_market_caps_denom_asset
        ON market_cap_history (denominated_in, asset, block_index DESC);",
    "CREATE INDEX IF NOT EXISTS idx_market_caps_denom_time
        ON market_cap_history (denominated_in, block_time DESC);",
    // Transaction stats: message_index is unique store-wide.
    "CREATE TABLE IF NOT EXISTS transaction_stats (
        id            INTEGER PRIMARY KEY AUTOINCREMENT,
        block_index   INTEGER NOT NULL,
        block_time    INTEGER NOT NULL,
        message_index INTEGER NOT NULL UNIQUE,
        category      TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_stats_time_category
        ON transaction_stats (block_time, category);",
    "CREATE INDEX IF NOT EXISTS idx_stats_block ON transaction_stats (block_index);",
    // Per-asset market snapshots (reset-scoped, not block-scoped).
    "CREATE TABLE IF NOT EXISTS asset_market_info (
        asset        TEXT PRIMARY KEY,
        price        REAL    NOT NULL,
        market_cap   REAL    NOT NULL,
        supply       INTEGER NOT NULL,
        last_updated INTEGER NOT NULL
    );",
    // Metadata singleton: the fixed id pins the table to one row.
    "CREATE TABLE IF NOT EXISTS app_metadata (
        id                  INTEGER PRIMARY KEY CHECK (id = 0),
        schema_version      INTEGER NOT NULL,
        network             TEXT    NOT NULL,
        source_version      TEXT,
        source_network      TEXT,
        last_compiled_block INTEGER NOT NULL,
        updated_at          INTEGER NOT NULL
    );",
];

/// Tables wiped by a full reset, in deletion order.
const RESET_TABLES: &[&str] = &[
    "blocks",
    "tracked_assets",
    "trades",
    "balance_changes",
    "market_cap_history",
    "transaction_stats",
    "asset_market_info",
];

/// SQLite-backed record store.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./view.db"`) or a full SQLite URL
    /// (`"sqlite:./view.db?mode=rwc"`).
    pub async fn open(path: &str) -> Result<Self, ViewError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}?mode=rwc")
        };

        let pool = SqlitePool::connect(&url)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Open an in-memory SQLite database.
    ///
    /// All data is lost when the pool is dropped. Ideal for tests.
    pub async fn in_memory() -> Result<Self, ViewError> {
        // One never-recycled connection: every new connection to
        // `sqlite::memory:` gets its own empty database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        let store = Self { pool };
        store.init_schema().await?;
        Ok(store)
    }

    /// Enable WAL mode and declare all tables and indexes.
    async fn init_schema(&self) -> Result<(), ViewError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        for statement in SCHEMA {
            sqlx::query(statement)
                .execute(&self.pool)
                .await
                .map_err(|e| ViewError::Storage(e.to_string()))?;
        }
        Ok(())
    }
}

// ─── Row mapping ─────────────────────────────────────────────────────────────

fn to_block(row: &SqliteRow) -> ProcessedBlock {
    ProcessedBlock {
        block_index: row.get::<i64, _>("block_index") as u64,
        block_time: row.get("block_time"),
        block_hash: row.get("block_hash"),
    }
}

fn to_asset(row: &SqliteRow) -> Result<TrackedAsset, ViewError> {
    let history_json: String = row.get("history");
    let history: Vec<AssetVersion> = serde_json::from_str(&history_json)
        .map_err(|e| ViewError::Serialization(e.to_string()))?;

    Ok(TrackedAsset {
        asset: row.get("asset"),
        owner: row.get("owner"),
        divisible: row.get("divisible"),
        locked: row.get("locked"),
        total_issued: row.get("total_issued"),
        at_block: row.get::<i64, _>("at_block") as u64,
        history,
    })
}

// ─── RecordStore impl ────────────────────────────────────────────────────────

#[async_trait]
impl RecordStore for SqliteStore {
    async fn ensure_indexes(&self) -> Result<(), ViewError> {
        self.init_schema().await
    }

    async fn reset(&self) -> Result<(), ViewError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        for table in RESET_TABLES {
            sqlx::query(&format!("DELETE FROM {table}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| ViewError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        debug!("view collections wiped");
        Ok(())
    }

    async fn insert_block(&self, block: &ProcessedBlock) -> Result<(), ViewError> {
        sqlx::query("INSERT INTO blocks (block_index, block_time, block_hash) VALUES (?, ?, ?)")
            .bind(block.block_index as i64)
            .bind(block.block_time)
            .bind(&block.block_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        debug!(block = block.block_index, "block stored");
        Ok(())
    }

    async fn block_by_index(
        &self,
        block_index: u64,
    ) -> Result<Option<ProcessedBlock>, ViewError> {
        let row = sqlx::query(
            "SELECT block_index, block_time, block_hash FROM blocks WHERE block_index = ?",
        )
        .bind(block_index as i64)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(to_block))
    }

    async fn latest_block(&self) -> Result<Option<ProcessedBlock>, ViewError> {
        let row = sqlx::query(
            "SELECT block_index, block_time, block_hash FROM blocks
             ORDER BY block_index DESC LIMIT 1",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(to_block))
    }

    async fn block_at_or_before(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError> {
        let row = sqlx::query(
            "SELECT block_index, block_time, block_hash FROM blocks
             WHERE block_time <= ?
             ORDER BY block_time DESC, block_index DESC LIMIT 1",
        )
        .bind(time)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(to_block))
    }

    async fn block_at_or_after(&self, time: i64) -> Result<Option<ProcessedBlock>, ViewError> {
        let row = sqlx::query(
            "SELECT block_index, block_time, block_hash FROM blocks
             WHERE block_time >= ?
             ORDER BY block_time ASC, block_index ASC LIMIT 1",
        )
        .bind(time)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.as_ref().map(to_block))
    }

    async fn asset(&self, name: &str) -> Result<Option<TrackedAsset>, ViewError> {
        let row = sqlx::query(
            "SELECT asset, owner, divisible, locked, total_issued, at_block, history
             FROM tracked_assets WHERE asset = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        row.as_ref().map(to_asset).transpose()
    }

    async fn save_asset(&self, asset: &TrackedAsset) -> Result<(), ViewError> {
        let history = serde_json::to_string(&asset.history)
            .map_err(|e| ViewError::Serialization(e.to_string()))?;

        sqlx::query(
            "INSERT OR REPLACE INTO tracked_assets
             (asset, owner, divisible, locked, total_issued, at_block, history)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&asset.asset)
        .bind(&asset.owner)
        .bind(asset.divisible)
        .bind(asset.locked)
        .bind(asset.total_issued)
        .bind(asset.at_block as i64)
        .bind(&history)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        debug!(asset = %asset.asset, at_block = asset.at_block, "asset saved");
        Ok(())
    }

    async fn delete_asset(&self, name: &str) -> Result<(), ViewError> {
        sqlx::query("DELETE FROM tracked_assets WHERE asset = ?")
            .bind(name)
            .execute(&self.pool)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn assets_above(&self, block_index: u64) -> Result<Vec<TrackedAsset>, ViewError> {
        let rows = sqlx::query(
            "SELECT asset, owner, divisible, locked, total_issued, at_block, history
             FROM tracked_assets WHERE at_block > ? ORDER BY asset",
        )
        .bind(block_index as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        rows.iter().map(to_asset).collect()
    }

    async fn insert_balance_change(&self, change: &BalanceChange) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT INTO balance_changes
             (block_index, block_time, address, asset, quantity, new_balance)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(change.block_index as i64)
        .bind(change.block_time)
        .bind(&change.address)
        .bind(&change.asset)
        .bind(change.quantity)
        .bind(change.new_balance)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn insert_trade(&self, trade: &Trade) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT INTO trades
             (block_index, block_time, base_asset, quote_asset,
              base_quantity, quote_quantity, unit_price)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(trade.block_index as i64)
        .bind(trade.block_time)
        .bind(&trade.base_asset)
        .bind(&trade.quote_asset)
        .bind(trade.base_quantity)
        .bind(trade.quote_quantity)
        .bind(trade.unit_price)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn insert_market_cap(&self, point: &MarketCapPoint) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT INTO market_cap_history
             (block_index, block_time, asset, denominated_in, market_cap)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(point.block_index as i64)
        .bind(point.block_time)
        .bind(&point.asset)
        .bind(&point.denominated_in)
        .bind(point.market_cap)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn insert_transaction_stat(&self, stat: &TransactionStat) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT INTO transaction_stats (block_index, block_time, message_index, category)
             VALUES (?, ?, ?, ?)",
        )
        .bind(stat.block_index as i64)
        .bind(stat.block_time)
        .bind(stat.message_index)
        .bind(&stat.category)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn purge_above(&self, block_index: u64) -> Result<PurgeReport, ViewError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        let mut report = PurgeReport::default();
        let cut = block_index as i64;

        report.blocks = sqlx::query("DELETE FROM blocks WHERE block_index > ?")
            .bind(cut)
            .execute(&mut *tx)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?
            .rows_affected();

        report.balance_changes =
            sqlx::query("DELETE FROM balance_changes WHERE block_index > ?")
                .bind(cut)
                .execute(&mut *tx)
                .await
                .map_err(|e| ViewError::Storage(e.to_string()))?
                .rows_affected();

        report.trades = sqlx::query("DELETE FROM trades WHERE block_index > ?")
            .bind(cut)
            .execute(&mut *tx)
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?
            .rows_affected();

        report.market_caps =
            sqlx::query("DELETE FROM market_cap_history WHERE block_index > ?")
                .bind(cut)
                .execute(&mut *tx)
                .await
                .map_err(|e| ViewError::Storage(e.to_string()))?
                .rows_affected();

        report.transaction_stats =
            sqlx::query("DELETE FROM transaction_stats WHERE block_index > ?")
                .bind(cut)
                .execute(&mut *tx)
                .await
                .map_err(|e| ViewError::Storage(e.to_string()))?
                .rows_affected();

        tx.commit()
            .await
            .map_err(|e| ViewError::Storage(e.to_string()))?;

        debug!(
            block_index,
            deleted = report.total(),
            "purged records above block"
        );
        Ok(report)
    }

    async fn trades_for_pair(
        &self,
        base_asset: &str,
        quote_asset: &str,
        limit: u32,
    ) -> Result<Vec<Trade>, ViewError> {
        let rows = sqlx::query(
            "SELECT block_index, block_time, base_asset, quote_asset,
                    base_quantity, quote_quantity, unit_price
             FROM trades WHERE base_asset = ? AND quote_asset = ?
             ORDER BY block_time DESC LIMIT ?",
        )
        .bind(base_asset)
        .bind(quote_asset)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| Trade {
                block_index: row.get::<i64, _>("block_index") as u64,
                block_time: row.get("block_time"),
                base_asset: row.get("base_asset"),
                quote_asset: row.get("quote_asset"),
                base_quantity: row.get("base_quantity"),
                quote_quantity: row.get("quote_quantity"),
                unit_price: row.get("unit_price"),
            })
            .collect())
    }

    async fn balance_changes_for_address(
        &self,
        address: &str,
        asset: &str,
    ) -> Result<Vec<BalanceChange>, ViewError> {
        let rows = sqlx::query(
            "SELECT block_index, block_time, address, asset, quantity, new_balance
             FROM balance_changes WHERE address = ? AND asset = ?
             ORDER BY block_time ASC",
        )
        .bind(address)
        .bind(asset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| BalanceChange {
                block_index: row.get::<i64, _>("block_index") as u64,
                block_time: row.get("block_time"),
                address: row.get("address"),
                asset: row.get("asset"),
                quantity: row.get("quantity"),
                new_balance: row.get("new_balance"),
            })
            .collect())
    }

    async fn market_caps_for(
        &self,
        denominated_in: &str,
        asset: &str,
        limit: u32,
    ) -> Result<Vec<MarketCapPoint>, ViewError> {
        let rows = sqlx::query(
            "SELECT block_index, block_time, asset, denominated_in, market_cap
             FROM market_cap_history WHERE denominated_in = ? AND asset = ?
             ORDER BY block_index DESC LIMIT ?",
        )
        .bind(denominated_in)
        .bind(asset)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| MarketCapPoint {
                block_index: row.get::<i64, _>("block_index") as u64,
                block_time: row.get("block_time"),
                asset: row.get("asset"),
                denominated_in: row.get("denominated_in"),
                market_cap: row.get("market_cap"),
            })
            .collect())
    }

    async fn stats_between(
        &self,
        start_block: u64,
        end_block: u64,
    ) -> Result<Vec<TransactionStat>, ViewError> {
        let rows = sqlx::query(
            "SELECT block_index, block_time, message_index, category
             FROM transaction_stats WHERE block_index >= ? AND block_index <= ?
             ORDER BY block_index ASC",
        )
        .bind(start_block as i64)
        .bind(end_block as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| TransactionStat {
                block_index: row.get::<i64, _>("block_index") as u64,
                block_time: row.get("block_time"),
                message_index: row.get("message_index"),
                category: row.get("category"),
            })
            .collect())
    }

    async fn market_info(&self, asset: &str) -> Result<Option<AssetMarketInfo>, ViewError> {
        let row = sqlx::query(
            "SELECT asset, price, market_cap, supply, last_updated
             FROM asset_market_info WHERE asset = ?",
        )
        .bind(asset)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.map(|r| AssetMarketInfo {
            asset: r.get("asset"),
            price: r.get("price"),
            market_cap: r.get("market_cap"),
            supply: r.get("supply"),
            last_updated: r.get("last_updated"),
        }))
    }

    async fn save_market_info(&self, info: &AssetMarketInfo) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT OR REPLACE INTO asset_market_info
             (asset, price, market_cap, supply, last_updated)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(&info.asset)
        .bind(info.price)
        .bind(info.market_cap)
        .bind(info.supply)
        .bind(info.last_updated)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(())
    }

    async fn metadata(&self) -> Result<Option<StoreMetadata>, ViewError> {
        let row = sqlx::query(
            "SELECT schema_version, network, source_version, source_network,
                    last_compiled_block, updated_at
             FROM app_metadata WHERE id = 0",
        )
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        Ok(row.map(|r| StoreMetadata {
            schema_version: r.get::<i64, _>("schema_version") as u32,
            network: r.get("network"),
            source_version: r.get("source_version"),
            source_network: r.get("source_network"),
            last_compiled_block: r.get::<i64, _>("last_compiled_block") as u64,
            updated_at: r.get("updated_at"),
        }))
    }

    async fn save_metadata(&self, meta: &StoreMetadata) -> Result<(), ViewError> {
        sqlx::query(
            "INSERT OR REPLACE INTO app_metadata
             (id, schema_version, network, source_version, source_network,
              last_compiled_block, updated_at)
             VALUES (0, ?, ?, ?, ?, ?, ?)",
        )
        .bind(meta.schema_version as i64)
        .bind(&meta.network)
        .bind(&meta.source_version)
        .bind(&meta.source_network)
        .bind(meta.last_compiled_block as i64)
        .bind(meta.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| ViewError::Storage(e.to_string()))?;

        debug!(network = %meta.network, "metadata saved");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
