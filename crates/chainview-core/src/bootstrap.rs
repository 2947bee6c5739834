//! Bootstrap — full reset of the view for a reparse from the first block.
//!
//! Unlike rollback (targeted, partial), reset unconditionally drops every
//! collection a reparse regenerates and reseeds the minimum state the feed
//! needs: the native genesis assets and the metadata singleton.

use tracing::info;

use crate::config::ViewConfig;
use crate::error::ViewError;
use crate::state::ProcessState;
use crate::store::RecordStore;
use crate::tracker::TrackedAsset;
use crate::types::StoreMetadata;

/// Reset the store to its pre-parse state and return the fresh metadata.
///
/// Drops the purged collections, re-declares every index, seeds one genesis
/// [`TrackedAsset`] per configured native asset, writes the metadata
/// singleton, and drops the feed position back before genesis. Idempotent:
/// running it twice leaves the same state as running it once.
pub async fn reset_state(
    store: &dyn RecordStore,
    config: &ViewConfig,
    state: &mut ProcessState,
) -> Result<StoreMetadata, ViewError> {
    info!(
        network = %config.network,
        first_block = config.first_block,
        "resetting view state"
    );

    store.reset().await?;
    store.ensure_indexes().await?;

    for name in &config.native_assets {
        let seed = TrackedAsset::genesis(name.clone(), config.first_block);
        store.save_asset(&seed).await?;
    }

    let meta = StoreMetadata {
        schema_version: config.schema_version,
        network: config.network.clone(),
        source_version: None,
        source_network: None,
        last_compiled_block: config.first_block,
        updated_at: chrono::Utc::now().timestamp(),
    };
    store.save_metadata(&meta).await?;

    state.reset();

    Ok(meta)
}
