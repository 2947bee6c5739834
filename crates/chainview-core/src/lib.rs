//! chainview-core — versioned derived-state store with reorg rollback.
//!
//! # Architecture
//!
//! ```text
//! block feed ──▶ RecordStore        (blocks + block-scoped collections)
//!           ──▶ AssetTracker        (per-asset embedded version history)
//!           ──▶ ProcessState        (feed position, message counter)
//!
//! reorg ──▶ RollbackEngine
//!               ├── purge_above     (cut block-scoped collections)
//!               ├── AssetTracker    (reconstruct assets as of the target)
//!               ├── HookRegistry    (extension-module rollback processors)
//!               └── BlockCache      (invalidated before returning)
//!
//! reparse ──▶ bootstrap::reset_state (drop, reseed genesis, metadata)
//! queries ──▶ timeline::resolve_block_range / block_time
//! ```

pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod hooks;
pub mod rollback;
pub mod state;
pub mod store;
pub mod timeline;
pub mod tracker;
pub mod types;

pub use bootstrap::reset_state;
pub use cache::BlockCache;
pub use config::{ViewConfig, SCHEMA_VERSION};
pub use error::ViewError;
pub use hooks::{HookRegistry, RollbackHook};
pub use rollback::RollbackEngine;
pub use state::{ProcessState, NO_MESSAGE};
pub use store::{MemoryStore, PurgeReport, RecordStore};
pub use timeline::{block_time, resolve_block_range};
pub use tracker::{AssetTracker, AssetUpdate, AssetVersion, Rewind, TrackedAsset};
pub use types::{
    AssetMarketInfo, BalanceChange, MarketCapPoint, ProcessedBlock, StoreMetadata,
    TransactionStat, Trade,
};
