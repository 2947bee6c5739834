//! Rollback hooks — extension points invoked after a rewind.
//!
//! Extension modules that keep their own derived collections register a hook
//! here; the rollback engine calls every hook once per rollback, after the
//! core collections have been cut back. Hooks run sequentially in
//! registration order, and a failing hook is logged and skipped rather than
//! aborting the rollback — the core state is already consistent by the time
//! hooks run, and a module that missed a rollback can resync on its own.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::error;

use crate::error::ViewError;

/// A module-provided rollback processor.
#[async_trait]
pub trait RollbackHook: Send + Sync {
    /// Identifier used in log lines.
    fn name(&self) -> &str;

    /// Called once per rollback with the target block index. Everything the
    /// module derived from blocks above `target_block` should be discarded.
    async fn on_rollback(&self, target_block: u64) -> Result<(), ViewError>;
}

/// Ordered, append-only registry of rollback hooks.
pub struct HookRegistry {
    hooks: Vec<Arc<dyn RollbackHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self { hooks: Vec::new() }
    }

    /// Register a hook. Hooks run in the order they were registered.
    pub fn register(&mut self, hook: Arc<dyn RollbackHook>) {
        self.hooks.push(hook);
    }

    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Invoke every hook for `target_block`, in order.
    ///
    /// Returns the number of hooks that failed. Failures are logged with the
    /// hook's name and never short-circuit the remaining hooks.
    pub async fn dispatch(&self, target_block: u64) -> usize {
        let mut failures = 0;
        for hook in &self.hooks {
            if let Err(e) = hook.on_rollback(target_block).await {
                error!(hook = hook.name(), error = %e, "rollback hook failed");
                failures += 1;
            }
        }
        failures
    }
}

impl Default for HookRegistry {
    fn default() -> Self {
        Self::new()
    }
}
