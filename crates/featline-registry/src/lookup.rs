//! Swappable registry snapshot holder
//!
//! The retrieval path reads the registry through `RegistryLookup`, which
//! hands out one `Arc<RegistrySnapshot>` per call. Publishing swaps the whole
//! `Arc`, so a call in flight keeps the snapshot it started with and never
//! observes a half-updated definition.

use crate::snapshot::RegistrySnapshot;
use std::sync::{Arc, RwLock};
use tracing::debug;

/// Source of registry snapshots for the retrieval path
pub trait RegistryLookup: Send + Sync {
    /// The current snapshot. Callers hold it for the whole call.
    fn snapshot(&self) -> Arc<RegistrySnapshot>;
}

/// Holds the current snapshot behind a lock that is only taken to clone or
/// replace the `Arc`
#[derive(Debug)]
pub struct SnapshotRegistry {
    current: RwLock<Arc<RegistrySnapshot>>,
}

impl Default for SnapshotRegistry {
    fn default() -> Self {
        Self::new(RegistrySnapshot::empty())
    }
}

impl SnapshotRegistry {
    pub fn new(snapshot: RegistrySnapshot) -> Self {
        Self {
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    /// Replaces the current snapshot, returning the previous one.
    ///
    /// A snapshot with a lower version than the current one is ignored, so
    /// a slow refresh cannot roll the registry back.
    pub fn swap(&self, snapshot: RegistrySnapshot) -> Arc<RegistrySnapshot> {
        let next = Arc::new(snapshot);
        // A poisoned lock still guards a valid Arc; recover it.
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        if next.version() < guard.version() {
            debug!(
                current = guard.version(),
                offered = next.version(),
                "Ignoring stale registry snapshot"
            );
            return Arc::clone(&guard);
        }
        std::mem::replace(&mut *guard, next)
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version()
    }
}

impl RegistryLookup for SnapshotRegistry {
    fn snapshot(&self) -> Arc<RegistrySnapshot> {
        let guard = self.current.read().unwrap_or_else(|e| e.into_inner());
        Arc::clone(&guard)
    }
}

/// A fixed snapshot, for fixtures and one-shot tools
impl RegistryLookup for Arc<RegistrySnapshot> {
    fn snapshot(&self) -> Arc<RegistrySnapshot> {
        Arc::clone(self)
    }
}
