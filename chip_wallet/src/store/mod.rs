//! Durable snapshot storage.
//!
//! The whole service state is persisted as one atomic snapshot per mutating
//! request: either the new snapshot is visible after a crash or the previous
//! one is. Two adapters are provided: [`FileStore`] for deployments and
//! [`MemoryStore`] for tests.

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::ledger::state::ServiceState;
use async_trait::async_trait;
use thiserror::Error;

/// Snapshot persistence errors
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying I/O failure
    #[error("Snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Snapshot (de)serialization failure
    #[error("Snapshot codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// Injected failure (test adapters)
    #[error("Snapshot write failed: {0}")]
    WriteFailed(String),
}

/// Result type for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Atomic single-key snapshot storage for the full service state.
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Load the last committed snapshot.
    ///
    /// Returns `Ok(None)` when no snapshot has ever been written; the caller
    /// starts from an empty state.
    async fn load(&self) -> StoreResult<Option<ServiceState>>;

    /// Atomically replace the committed snapshot.
    async fn save(&self, state: &ServiceState) -> StoreResult<()>;
}
