//! chainview-store — storage backends for ChainView.
//!
//! Backends:
//! - `MemoryStore` — in-memory (tests, ephemeral views), re-exported from
//!   `chainview-core` where it lives next to the [`RecordStore`] trait
//! - [`sqlite`] — SQLite via `sqlx` (embedded, single-file persistence)
//!
//! [`RecordStore`]: chainview_core::RecordStore

pub use chainview_core::MemoryStore;

#[cfg(feature = "sqlite")]
pub mod sqlite;

#[cfg(feature = "sqlite")]
pub use sqlite::SqliteStore;
