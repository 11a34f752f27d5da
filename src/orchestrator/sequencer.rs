//! Per-source-account sequencing
//!
//! The protocol rejects out-of-order counters, so concurrent requests from
//! one source account must serialize: the lock is taken before the counter
//! read and held until the operation is injected. Requests from different
//! sources never contend.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::types::{AccountRef, Network};

/// Lock table keyed by (network, source account)
#[derive(Default)]
pub struct AccountSequencer {
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl AccountSequencer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the sequencing lock for one source on one network
    ///
    /// The returned guard owns the lock; drop it after injection to let
    /// the next same-source request read a fresh counter.
    pub async fn acquire(&self, network: &Network, source: &AccountRef) -> OwnedMutexGuard<()> {
        let key = format!("{}/{}", network.name(), source);
        let lock = self
            .locks
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }

    /// Number of accounts that have ever been sequenced (for diagnostics)
    pub fn tracked_accounts(&self) -> usize {
        self.locks.len()
    }
}
