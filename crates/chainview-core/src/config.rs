//! View configuration.

use serde::{Deserialize, Serialize};

/// Version of the store schema written by this build.
///
/// Bumped whenever a collection or index changes shape; a mismatch against the
/// persisted [`crate::StoreMetadata`] means the database needs a full reparse.
pub const SCHEMA_VERSION: u32 = 1;

/// Configuration for a chainview instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewConfig {
    /// Network slug the view runs against (e.g. `"mainnet"`, `"testnet"`).
    pub network: String,
    /// First block of the protocol on this network. Time-range resolution
    /// never returns an index below this, and genesis assets are seeded as of
    /// this block.
    pub first_block: u64,
    /// Assets that exist from the protocol's first block and are seeded into
    /// the tracker on every reset.
    pub native_assets: Vec<String>,
    /// Schema version stamped into the metadata singleton on reset.
    pub schema_version: u32,
}

impl Default for ViewConfig {
    fn default() -> Self {
        Self {
            network: "mainnet".into(),
            first_block: 278_270,
            native_assets: vec!["XCP".into(), "BTC".into()],
            schema_version: SCHEMA_VERSION,
        }
    }
}

impl ViewConfig {
    /// Config for a throwaway test view: genesis at `first_block`, one native
    /// asset named `"XCP"`.
    pub fn for_testing(first_block: u64) -> Self {
        Self {
            network: "regtest".into(),
            first_block,
            native_assets: vec!["XCP".into()],
            schema_version: SCHEMA_VERSION,
        }
    }
}
