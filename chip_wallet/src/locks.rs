//! Per-wallet lock manager.
//!
//! Every mutating operation serializes through a logical lock per wallet, so
//! the service behaves single-threaded per wallet while staying parallel
//! across disjoint wallets. Multi-wallet operations acquire all of their
//! locks in one step, in sorted key order, which prevents deadlock when two
//! transfers touch the same pair in opposite directions concurrently.
//!
//! Each held lock carries a safety timeout. A holder that exceeds it is
//! assumed wedged: the next waiter steals the lock and the event is logged.
//! Steals indicate a bug and are not part of normal operation.

use crate::ledger::errors::{WalletError, WalletResult};
use log::warn;
use std::collections::HashMap;
use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// Poll interval while waiting for contended keys.
const WAIT_SLICE: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Copy)]
struct Holder {
    token: u64,
    locked_at: Instant,
}

/// Per-key logical lock registry.
pub struct LockManager {
    timeout: Duration,
    held: Mutex<HashMap<String, Holder>>,
    released: Notify,
    next_token: AtomicU64,
    steals: AtomicU64,
}

impl LockManager {
    /// Create a lock manager with the given holder/acquisition timeout.
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            held: Mutex::new(HashMap::new()),
            released: Notify::new(),
            next_token: AtomicU64::new(1),
            steals: AtomicU64::new(0),
        }
    }

    /// Serialize on a single wallet.
    pub async fn acquire(&self, key: &str) -> WalletResult<LockGuard<'_>> {
        self.acquire_many(std::slice::from_ref(&key)).await
    }

    /// Serialize on a pair of wallets in deterministic order.
    pub async fn acquire_pair(&self, a: &str, b: &str) -> WalletResult<LockGuard<'_>> {
        self.acquire_many(&[a, b]).await
    }

    /// Serialize on a set of wallets.
    ///
    /// Keys are deduplicated and sorted before acquisition; all locks are
    /// taken in one atomic step or none are, so batch operations cannot
    /// deadlock against each other.
    ///
    /// # Errors
    ///
    /// * `WalletError::LockTimeout` - the set could not be acquired within
    ///   the configured timeout
    pub async fn acquire_many<S: AsRef<str>>(&self, keys: &[S]) -> WalletResult<LockGuard<'_>> {
        let mut keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        keys.sort();
        keys.dedup();

        let deadline = Instant::now() + self.timeout;

        loop {
            if let Some(guard) = self.try_acquire(&keys) {
                return Ok(guard);
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(WalletError::LockTimeout(keys.join(", ")));
            }

            // Wake on release, or poll: a steal candidate only becomes
            // eligible by the passage of time, not by a release event.
            let slice = WAIT_SLICE.min(deadline - now);
            let _ = tokio::time::timeout(slice, self.released.notified()).await;
        }
    }

    /// Total number of lock steals since startup.
    pub fn steal_count(&self) -> u64 {
        self.steals.load(Ordering::Relaxed)
    }

    fn try_acquire(&self, keys: &[String]) -> Option<LockGuard<'_>> {
        let mut held = self.held.lock().expect("lock table poisoned");
        let now = Instant::now();

        let blocked = keys.iter().any(|key| match held.get(key) {
            Some(holder) => now.duration_since(holder.locked_at) <= self.timeout,
            None => false,
        });
        if blocked {
            return None;
        }

        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        for key in keys {
            if let Some(stale) = held.insert(
                key.clone(),
                Holder {
                    token,
                    locked_at: now,
                },
            ) {
                self.steals.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Forcibly cleared wallet lock '{key}' held for {:?} (over {:?} timeout)",
                    now.duration_since(stale.locked_at),
                    self.timeout
                );
            }
        }

        Some(LockGuard {
            manager: self,
            keys: keys.to_vec(),
            token,
        })
    }

    fn release(&self, keys: &[String], token: u64) {
        let mut held = self.held.lock().expect("lock table poisoned");
        for key in keys {
            // Only release what we still own; a stolen lock belongs to the
            // thief and must stay in the table.
            if held.get(key).is_some_and(|h| h.token == token) {
                held.remove(key);
            }
        }
        drop(held);
        self.released.notify_waiters();
    }
}

/// Guard over a set of wallet locks; releases on drop.
pub struct LockGuard<'a> {
    manager: &'a LockManager,
    keys: Vec<String>,
    token: u64,
}

impl LockGuard<'_> {
    /// Keys held by this guard, in sorted order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }
}

impl Drop for LockGuard<'_> {
    fn drop(&mut self) {
        self.manager.release(&self.keys, self.token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_acquire_and_release() {
        let manager = LockManager::new(Duration::from_secs(1));

        let guard = manager.acquire("p1").await.expect("should acquire");
        assert_eq!(guard.keys(), ["p1"]);
        drop(guard);

        // Re-acquire after release must not wait for the timeout.
        let start = Instant::now();
        let _guard = manager.acquire("p1").await.expect("should re-acquire");
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_pair_acquisition_is_sorted_and_deduplicated() {
        let manager = LockManager::new(Duration::from_secs(1));

        let guard = manager.acquire_pair("zeta", "alpha").await.unwrap();
        assert_eq!(guard.keys(), ["alpha", "zeta"]);
        drop(guard);

        let guard = manager.acquire_pair("p1", "p1").await.unwrap();
        assert_eq!(guard.keys(), ["p1"]);
    }

    #[tokio::test]
    async fn test_blocked_waiter_takes_over_wedged_holder() {
        let manager = LockManager::new(Duration::from_millis(100));

        let _held = manager.acquire("p1").await.unwrap();
        let start = Instant::now();

        // The waiter blocks until the holder exceeds its timeout, then
        // takes the lock over instead of failing.
        let _stolen = manager.acquire("p1").await.expect("waiter should take over");
        assert!(start.elapsed() >= Duration::from_millis(75));
        assert_eq!(manager.steal_count(), 1);
    }

    #[tokio::test]
    async fn test_waiter_steals_after_holder_timeout() {
        let manager = LockManager::new(Duration::from_millis(100));

        let held = manager.acquire("p1").await.unwrap();
        tokio::time::sleep(Duration::from_millis(150)).await;

        // Holder exceeded the timeout: the waiter takes the lock.
        let stolen = manager.acquire("p1").await.expect("steal should succeed");
        assert_eq!(manager.steal_count(), 1);

        // The stale guard's drop must not release the thief's lock.
        drop(held);
        {
            let held = manager.held.lock().unwrap();
            assert!(held.contains_key("p1"));
        }
        drop(stolen);
        {
            let held = manager.held.lock().unwrap();
            assert!(!held.contains_key("p1"));
        }
    }

    #[tokio::test]
    async fn test_disjoint_keys_do_not_block() {
        let manager = LockManager::new(Duration::from_secs(1));

        let _a = manager.acquire("p1").await.unwrap();
        let start = Instant::now();
        let _b = manager.acquire("p2").await.unwrap();
        assert!(start.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_opposite_direction_pairs_do_not_deadlock() {
        let manager = Arc::new(LockManager::new(Duration::from_secs(2)));

        let mut tasks = Vec::new();
        for i in 0..20 {
            let manager = manager.clone();
            let (a, b) = if i % 2 == 0 { ("p1", "p2") } else { ("p2", "p1") };
            tasks.push(tokio::spawn(async move {
                let _guard = manager.acquire_pair(a, b).await.expect("should acquire");
                tokio::time::sleep(Duration::from_millis(1)).await;
            }));
        }

        for task in tasks {
            task.await.expect("task should complete");
        }
        assert_eq!(manager.steal_count(), 0);
    }

    #[tokio::test]
    async fn test_exclusion_under_contention() {
        let manager = Arc::new(LockManager::new(Duration::from_secs(5)));
        let in_section = Arc::new(AtomicU64::new(0));

        let mut tasks = Vec::new();
        for _ in 0..10 {
            let manager = manager.clone();
            let in_section = in_section.clone();
            tasks.push(tokio::spawn(async move {
                let _guard = manager.acquire("p1").await.expect("should acquire");
                assert_eq!(in_section.fetch_add(1, Ordering::SeqCst), 0);
                tokio::time::sleep(Duration::from_millis(2)).await;
                assert_eq!(in_section.fetch_sub(1, Ordering::SeqCst), 1);
            }));
        }

        for task in tasks {
            task.await.expect("task should complete");
        }
        assert_eq!(in_section.load(Ordering::SeqCst), 0);
    }
}
