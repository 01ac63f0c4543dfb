//! In-memory snapshot store for tests.

use super::{SnapshotStore, StoreError, StoreResult};
use crate::ledger::state::ServiceState;
use async_trait::async_trait;
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicU64, Ordering},
};

/// Snapshot store holding the committed state in memory.
///
/// Supports fault injection: `fail_next_save` makes the next `save` call
/// return an error without committing, which is how snapshot-failure
/// rollback paths are exercised in tests.
#[derive(Default)]
pub struct MemoryStore {
    snapshot: Mutex<Option<ServiceState>>,
    fail_next: AtomicBool,
    saves: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arrange for the next `save` call to fail.
    pub fn fail_next_save(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Clone of the committed snapshot, if any.
    pub fn committed(&self) -> Option<ServiceState> {
        self.snapshot.lock().expect("snapshot mutex poisoned").clone()
    }
}

#[async_trait]
impl SnapshotStore for MemoryStore {
    async fn load(&self) -> StoreResult<Option<ServiceState>> {
        Ok(self.snapshot.lock().expect("snapshot mutex poisoned").clone())
    }

    async fn save(&self, state: &ServiceState) -> StoreResult<()> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(StoreError::WriteFailed("injected failure".to_string()));
        }

        // Round-trip through the codec so tests catch anything the file
        // store would fail to serialize.
        let bytes = serde_json::to_vec(state)?;
        let state = serde_json::from_slice(&bytes)?;

        *self.snapshot.lock().expect("snapshot mutex poisoned") = Some(state);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryStore::new();
        assert!(store.load().await.unwrap().is_none());

        let state = ServiceState::new();
        store.save(&state).await.expect("save should succeed");

        assert!(store.load().await.unwrap().is_some());
        assert_eq!(store.save_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_failure_does_not_commit() {
        let store = MemoryStore::new();
        store.fail_next_save();

        let state = ServiceState::new();
        let err = store.save(&state).await.unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed(_)));
        assert!(store.load().await.unwrap().is_none());

        // Failure is one-shot.
        store.save(&state).await.expect("second save should succeed");
        assert_eq!(store.save_count(), 1);
    }
}
