//! Per-key request coalescing.
//!
//! Holders of the same key run one at a time; different keys never wait on
//! each other. Callers re-check their cache after acquiring, so the second
//! caller for a key is served by the first caller's work.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::{Arc, Mutex};

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

type Inflight<K> = Arc<Mutex<HashMap<K, Arc<AsyncMutex<()>>>>>;

/// Keyed async lock table.
pub struct KeyedCoalescer<K> {
    inflight: Inflight<K>,
}

impl<K> Default for KeyedCoalescer<K>
where
    K: Hash + Eq + Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> KeyedCoalescer<K>
where
    K: Hash + Eq + Clone,
{
    pub fn new() -> Self {
        Self {
            inflight: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Wait for exclusive ownership of `key`.
    pub async fn acquire(&self, key: K) -> CoalesceGuard<K> {
        let lock = {
            let mut inflight = self.inflight.lock().unwrap_or_else(|e| e.into_inner());
            Arc::clone(
                inflight
                    .entry(key.clone())
                    .or_insert_with(|| Arc::new(AsyncMutex::new(()))),
            )
        };

        // Built before waiting so a cancelled waiter still cleans up its key.
        // `pending` is declared later and therefore dropped first.
        let mut held = CoalesceGuard {
            guard: None,
            key: Some(key),
            inflight: Arc::clone(&self.inflight),
        };
        let pending = lock.lock_owned();
        held.guard = Some(pending.await);
        held
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.inflight.lock().map(|m| m.len()).unwrap_or(0)
    }
}

/// Exclusive hold on one key; released on drop.
///
/// The key's table entry is removed when the last holder or waiter is gone.
pub struct CoalesceGuard<K>
where
    K: Hash + Eq,
{
    guard: Option<OwnedMutexGuard<()>>,
    key: Option<K>,
    inflight: Inflight<K>,
}

impl<K> Drop for CoalesceGuard<K>
where
    K: Hash + Eq,
{
    fn drop(&mut self) {
        // Release the lock first so its Arc no longer counts as a user.
        drop(self.guard.take());

        let Some(key) = self.key.take() else {
            return;
        };
        let Ok(mut inflight) = self.inflight.lock() else {
            return;
        };
        // Waiters clone the Arc under this same map lock, so a count of one
        // means nobody else holds or awaits the key.
        if inflight
            .get(&key)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            inflight.remove(&key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_entry_removed_after_release() {
        let coalescer = KeyedCoalescer::new();
        {
            let _guard = coalescer.acquire("fp-1").await;
            assert_eq!(coalescer.active_keys(), 1);
        }
        assert_eq!(coalescer.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_different_keys_do_not_block() {
        let coalescer = KeyedCoalescer::new();
        let _a = coalescer.acquire(1u32).await;
        let b = tokio::time::timeout(Duration::from_secs(1), coalescer.acquire(2u32)).await;
        assert!(b.is_ok());
        assert_eq!(coalescer.active_keys(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_serialized() {
        let coalescer = Arc::new(KeyedCoalescer::new());
        let running = Arc::new(AtomicUsize::new(0));
        let max_running = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let coalescer = Arc::clone(&coalescer);
            let running = Arc::clone(&running);
            let max_running = Arc::clone(&max_running);
            handles.push(tokio::spawn(async move {
                let _guard = coalescer.acquire("same").await;
                let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                max_running.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(10)).await;
                running.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_running.load(Ordering::SeqCst), 1);
        assert_eq!(coalescer.active_keys(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_waiter_removes_entry() {
        let coalescer = KeyedCoalescer::new();
        let holder = coalescer.acquire(3u32).await;

        let mut waiter = Box::pin(coalescer.acquire(3u32));
        let waited = tokio::time::timeout(Duration::from_millis(5), &mut waiter).await;
        assert!(waited.is_err());

        // The waiter still counts as a user after the holder leaves
        drop(holder);
        assert_eq!(coalescer.active_keys(), 1);

        drop(waiter);
        assert_eq!(coalescer.active_keys(), 0);
    }

    #[tokio::test]
    async fn test_waiter_keeps_entry_alive() {
        let coalescer = Arc::new(KeyedCoalescer::new());
        let first = coalescer.acquire(7u64).await;

        let waiter = {
            let coalescer = Arc::clone(&coalescer);
            tokio::spawn(async move {
                let _guard = coalescer.acquire(7u64).await;
            })
        };
        // Let the waiter register on the key
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        drop(first);
        waiter.await.unwrap();
        assert_eq!(coalescer.active_keys(), 0);
    }
}
