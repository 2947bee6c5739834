//! Record types for the derived view collections.
//!
//! Everything here is written by the block feed as it processes messages and
//! deleted wholesale above the cut point when the chain reorganizes. Each
//! block-scoped record carries the `block_index` it was produced at; that tag
//! is what the rollback engine keys its purge on.

use serde::{Deserialize, Serialize};

// ─── ProcessedBlock ──────────────────────────────────────────────────────────

/// A block the feed has fully processed into the view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessedBlock {
    /// Height of the block on the source chain.
    pub block_index: u64,
    /// Unix timestamp of the block (seconds since epoch).
    pub block_time: i64,
    /// Block hash as reported by the source chain.
    pub block_hash: String,
}

impl ProcessedBlock {
    /// Placeholder for "before any block was processed".
    ///
    /// Returned by the rollback engine when the store holds no blocks at all,
    /// and used as the initial `last_block` of a fresh [`crate::ProcessState`].
    pub fn genesis() -> Self {
        Self {
            block_index: 0,
            block_time: 0,
            block_hash: String::new(),
        }
    }
}

// ─── Block-scoped records ────────────────────────────────────────────────────

/// A single balance movement for one address/asset pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceChange {
    pub block_index: u64,
    pub block_time: i64,
    /// Address whose balance moved.
    pub address: String,
    /// Asset the movement is denominated in.
    pub asset: String,
    /// Signed movement amount (negative = debit).
    pub quantity: i64,
    /// Resulting balance after the movement.
    pub new_balance: i64,
}

/// A matched trade between two assets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub block_index: u64,
    pub block_time: i64,
    pub base_asset: String,
    pub quote_asset: String,
    pub base_quantity: i64,
    pub quote_quantity: i64,
    /// Price of one base unit in quote units.
    pub unit_price: f64,
}

/// A point in an asset's market-capitalization history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketCapPoint {
    pub block_index: u64,
    pub block_time: i64,
    pub asset: String,
    /// Currency the cap is expressed in.
    pub denominated_in: String,
    pub market_cap: f64,
}

/// One counted protocol message, for transaction-volume statistics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionStat {
    pub block_index: u64,
    pub block_time: i64,
    /// Sequence number of the message on the source feed. Unique store-wide.
    pub message_index: i64,
    /// Message category (e.g. `"send"`, `"order"`).
    pub category: String,
}

// ─── Non-block-scoped records ────────────────────────────────────────────────

/// Latest compiled market snapshot for one asset.
///
/// Recompiled from scratch by the surrounding system rather than replayed
/// block by block: rollback leaves it alone, a full reset drops it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetMarketInfo {
    pub asset: String,
    /// Last computed unit price, in the view's reference currency.
    pub price: f64,
    pub market_cap: f64,
    /// Circulating supply in base units.
    pub supply: i64,
    /// Unix timestamp of the last recompile.
    pub last_updated: i64,
}

/// The singleton application-metadata document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreMetadata {
    /// Version of this store's own schema.
    pub schema_version: u32,
    /// Network slug the view is built for (e.g. `"mainnet"`).
    pub network: String,
    /// Version reported by the upstream daemon, once seen.
    pub source_version: Option<String>,
    /// Network reported by the upstream daemon, once seen.
    pub source_network: Option<String>,
    /// Highest block the periodic asset compiler has covered.
    pub last_compiled_block: u64,
    /// Unix timestamp of the last metadata write.
    pub updated_at: i64,
}

// ─── Tests ───────────────────────────────────────────────────────────────────
