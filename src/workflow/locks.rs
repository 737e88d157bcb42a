//! Per-asset mutation scopes
//!
//! Keyed async mutexes: mutating operations on one asset are serialized while
//! different assets proceed in parallel. Idle entries are reclaimed so the
//! arena does not grow with the total number of assets ever touched.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Guard for one asset's mutation scope. Dropping it releases the scope and
/// reclaims the arena slot if nobody else is waiting.
pub struct AssetGuard {
    _guard: OwnedMutexGuard<()>,
    asset_id: String,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl Drop for AssetGuard {
    fn drop(&mut self) {
        // Two strong refs remain while held: the map's and this guard's.
        self.locks
            .remove_if(&self.asset_id, |_, lock| Arc::strong_count(lock) <= 2);
    }
}

#[derive(Default, Clone)]
pub struct SharedAssetLocks {
    inner: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl SharedAssetLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the mutation scope for an asset, waiting if another mutation
    /// is in flight.
    pub async fn acquire(&self, asset_id: &str) -> AssetGuard {
        let lock = self
            .inner
            .entry(asset_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = lock.lock_owned().await;
        AssetGuard {
            _guard: guard,
            asset_id: asset_id.to_string(),
            locks: self.inner.clone(),
        }
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.inner.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn serializes_same_asset() {
        let locks = SharedAssetLocks::new();
        let counter = Arc::new(std::sync::atomic::AtomicU64::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let counter = counter.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire("a1").await;
                let seen = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                // If another task were inside the scope, it would have bumped
                // the counter between these two reads.
                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(
                    counter.load(std::sync::atomic::Ordering::SeqCst),
                    seen + 1
                );
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }
    }

    #[tokio::test]
    async fn reclaims_idle_entries() {
        let locks = SharedAssetLocks::new();
        {
            let _guard = locks.acquire("a1").await;
            assert_eq!(locks.len(), 1);
        }
        assert_eq!(locks.len(), 0);
    }

    #[tokio::test]
    async fn distinct_assets_do_not_block() {
        let locks = SharedAssetLocks::new();
        let _a = locks.acquire("a1").await;
        // Would deadlock if scopes were global
        let _b = locks.acquire("a2").await;
    }
}
