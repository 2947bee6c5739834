//! Versioned asset tracker.
//!
//! Each tracked asset carries its full version history inline: the current
//! attributes plus an oldest-first list of archived [`AssetVersion`]s, each
//! tagged with the block it became current at. Appends happen on every
//! update; the rollback engine walks the history newest-first to reconstruct
//! the attributes an asset had at the cut point.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::ViewError;
use crate::store::RecordStore;

// ─── Version algebra ─────────────────────────────────────────────────────────

/// One archived version of an asset's mutable attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetVersion {
    pub owner: Option<String>,
    pub divisible: bool,
    pub locked: bool,
    pub total_issued: Option<i64>,
    /// Block at which this version became current.
    pub at_block: u64,
}

/// The attribute set written by one feed update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetUpdate {
    pub owner: Option<String>,
    pub divisible: bool,
    pub locked: bool,
    pub total_issued: Option<i64>,
}

/// Outcome of rewinding one asset to a target block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rewind {
    /// The current version was already at or below the target.
    Unchanged,
    /// An archived version was promoted back to current.
    Restored,
    /// No version existed at or below the target; the asset must be removed.
    Removed,
}

/// A tracked asset: current attributes plus embedded version history.
///
/// Invariant: `history` is ordered oldest to newest, and every archived
/// `at_block` is `<=` the current `at_block`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedAsset {
    /// Natural key. At most one tracked row exists per asset name.
    pub asset: String,
    pub owner: Option<String>,
    pub divisible: bool,
    pub locked: bool,
    pub total_issued: Option<i64>,
    /// Block at which the current attributes became current.
    pub at_block: u64,
    /// Archived versions, oldest first.
    pub history: Vec<AssetVersion>,
}

impl TrackedAsset {
    /// A native asset as it exists from the protocol's first block: no owner,
    /// divisible, unlocked, supply tracked elsewhere, empty history.
    pub fn genesis(name: impl Into<String>, first_block: u64) -> Self {
        Self {
            asset: name.into(),
            owner: None,
            divisible: true,
            locked: false,
            total_issued: None,
            at_block: first_block,
            history: Vec::new(),
        }
    }

    /// Snapshot the current attributes as an archivable version.
    pub fn current_version(&self) -> AssetVersion {
        AssetVersion {
            owner: self.owner.clone(),
            divisible: self.divisible,
            locked: self.locked,
            total_issued: self.total_issued,
            at_block: self.at_block,
        }
    }

    /// Archive the current version and make `update` current as of `at_block`.
    pub fn apply_update(&mut self, update: AssetUpdate, at_block: u64) {
        self.history.push(self.current_version());
        self.owner = update.owner;
        self.divisible = update.divisible;
        self.locked = update.locked;
        self.total_issued = update.total_issued;
        self.at_block = at_block;
    }

    /// Rewind to the newest version at or below `target`.
    ///
    /// Pops archived versions newest-first until one qualifies; that version's
    /// attributes become current and everything older stays archived. Returns
    /// [`Rewind::Removed`] when no version qualifies — the asset did not exist
    /// at the target block and the caller must delete it.
    pub fn rewind_to(&mut self, target: u64) -> Rewind {
        if self.at_block <= target {
            return Rewind::Unchanged;
        }
        while let Some(version) = self.history.pop() {
            if version.at_block <= target {
                self.owner = version.owner;
                self.divisible = version.divisible;
                self.locked = version.locked;
                self.total_issued = version.total_issued;
                self.at_block = version.at_block;
                return Rewind::Restored;
            }
        }
        Rewind::Removed
    }
}

// ─── Persistence wrapper ─────────────────────────────────────────────────────

/// Applies the version algebra against a [`RecordStore`].
pub struct AssetTracker {
    store: Arc<dyn RecordStore>,
}

impl AssetTracker {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// The asset's current attributes, if it is tracked.
    pub async fn current_state(&self, name: &str) -> Result<Option<TrackedAsset>, ViewError> {
        self.store.asset(name).await
    }

    /// Record a feed update for `name` as of `at_block`.
    ///
    /// Creates the asset (empty history) when it is not yet tracked.
    /// An `at_block` below the current version is rejected as
    /// [`ViewError::StaleUpdate`] without touching the store — updates must
    /// arrive in block order.
    pub async fn record_update(
        &self,
        name: &str,
        update: AssetUpdate,
        at_block: u64,
    ) -> Result<TrackedAsset, ViewError> {
        let asset = match self.store.asset(name).await? {
            Some(mut existing) => {
                if at_block < existing.at_block {
                    return Err(ViewError::StaleUpdate {
                        asset: name.to_string(),
                        at_block,
                        current: existing.at_block,
                    });
                }
                existing.apply_update(update, at_block);
                existing
            }
            None => TrackedAsset {
                asset: name.to_string(),
                owner: update.owner,
                divisible: update.divisible,
                locked: update.locked,
                total_issued: update.total_issued,
                at_block,
                history: Vec::new(),
            },
        };
        self.store.save_asset(&asset).await?;
        Ok(asset)
    }

    /// Rewind one asset to its state as of `target` and persist the outcome.
    ///
    /// An untracked name is a no-op `Unchanged`.
    pub async fn reconstruct_as_of(&self, name: &str, target: u64) -> Result<Rewind, ViewError> {
        let Some(mut asset) = self.store.asset(name).await? else {
            return Ok(Rewind::Unchanged);
        };
        let outcome = asset.rewind_to(target);
        match outcome {
            Rewind::Unchanged => {}
            Rewind::Restored => self.store.save_asset(&asset).await?,
            Rewind::Removed => self.store.delete_asset(name).await?,
        }
        Ok(outcome)
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
