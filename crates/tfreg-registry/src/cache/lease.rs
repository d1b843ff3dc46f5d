//! In-process exclusive leases on cache keys.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::coordinate::CacheKey;

type Slots = Arc<Mutex<HashMap<CacheKey, Arc<AsyncMutex<()>>>>>;

/// One async mutex per key that currently has a holder or a waiter
#[derive(Debug, Default)]
pub struct KeyLeases {
    slots: Slots,
}

/// Held lease; the key is free again once this is dropped
#[derive(Debug)]
pub struct KeyLease {
    key: CacheKey,
    slots: Slots,
    _guard: OwnedMutexGuard<()>,
}

impl KeyLeases {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait until no other caller holds `key`
    pub async fn acquire(&self, key: &CacheKey) -> KeyLease {
        let slot = {
            let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
            sweep_idle(&mut slots);
            Arc::clone(slots.entry(key.clone()).or_default())
        };

        KeyLease {
            key: key.clone(),
            slots: Arc::clone(&self.slots),
            _guard: slot.lock_owned().await,
        }
    }

    /// Number of keys with a holder or waiter
    pub fn active(&self) -> usize {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        sweep_idle(&mut slots);
        slots.len()
    }
}

/// Drop slots only the table still references. These are left behind when
/// a waiter is cancelled after the holder already released the key.
fn sweep_idle(slots: &mut HashMap<CacheKey, Arc<AsyncMutex<()>>>) {
    slots.retain(|_, slot| Arc::strong_count(slot) > 1);
}

impl Drop for KeyLease {
    fn drop(&mut self) {
        let mut slots = self.slots.lock().unwrap_or_else(|e| e.into_inner());
        // The table and our guard are the only owners: nobody is waiting
        let idle = slots
            .get(&self.key)
            .is_some_and(|slot| Arc::strong_count(slot) <= 2);
        if idle {
            slots.remove(&self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinate::ModuleCoordinate;
    use std::time::Duration;

    fn key(version: &str) -> CacheKey {
        ModuleCoordinate::new("acme", "vpc", "aws", version).cache_key()
    }

    #[tokio::test]
    async fn test_released_on_drop() {
        let leases = KeyLeases::new();
        let lease = leases.acquire(&key("1.0.0")).await;
        assert_eq!(leases.active(), 1);

        drop(lease);
        assert_eq!(leases.active(), 0);
    }

    #[tokio::test]
    async fn test_same_key_is_exclusive() {
        let leases = Arc::new(KeyLeases::new());
        let first = leases.acquire(&key("1.0.0")).await;

        let waiter = {
            let leases = Arc::clone(&leases);
            tokio::spawn(async move {
                let _lease = leases.acquire(&key("1.0.0")).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!waiter.is_finished());

        drop(first);
        tokio::time::timeout(Duration::from_secs(5), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(leases.active(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_waiter_leaves_no_slot() {
        let leases = Arc::new(KeyLeases::new());
        let holder = leases.acquire(&key("1.0.0")).await;

        let waiter = {
            let leases = Arc::clone(&leases);
            tokio::spawn(async move {
                let _lease = leases.acquire(&key("1.0.0")).await;
                std::future::pending::<()>().await;
            })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;

        // The waiter is still queued, so the holder keeps the slot
        drop(holder);
        waiter.abort();
        assert!(waiter.await.unwrap_err().is_cancelled());

        assert_eq!(leases.active(), 0);
        let _again = tokio::time::timeout(Duration::from_secs(1), leases.acquire(&key("1.0.0")))
            .await
            .unwrap();
        assert_eq!(leases.active(), 1);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let leases = KeyLeases::new();
        let _a = leases.acquire(&key("1.0.0")).await;
        let _b = tokio::time::timeout(Duration::from_secs(1), leases.acquire(&key("2.0.0")))
            .await
            .unwrap();
        assert_eq!(leases.active(), 2);
    }
}
