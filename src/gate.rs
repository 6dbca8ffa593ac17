//! Per-path advisory locking for hosts that deliver concurrent callbacks.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Exclusive leases keyed by logical path.
///
/// Distinct paths never contend; the same path serialises. Lock objects are
/// created on first use and kept for the mount lifetime, which keeps lease
/// hand-off free of lost-wakeup races.
#[derive(Debug, Default)]
pub struct PathLocks {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Held for the duration of one mutating operation.
pub type Lease = OwnedMutexGuard<()>;

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the exclusive lease for `path`, waiting if another mutating
    /// operation holds it.
    pub async fn lease(&self, path: &str) -> Lease {
        let lock = self
            .locks
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
