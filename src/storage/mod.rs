//! Transaction store: persisted `id -> BridgeTransaction` mapping.
//!
//! The engine only appends and updates; deleting records is left to callers.

use async_trait::async_trait;

use crate::blockchain::bridge::{BridgeTransaction, TransactionPatch};
use crate::core::errors::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Narrow store interface the bridge engine drives transactions through.
#[async_trait]
pub trait TransactionStore: Send + Sync {
    /// Saves a new record. Fails if the id already exists.
    async fn insert_transaction(&self, tx: &BridgeTransaction) -> Result<()>;

    /// Returns the current record, `BridgeError::NotFound` if absent.
    async fn get_transaction(&self, id: &str) -> Result<BridgeTransaction>;

    /// Merges `patch` into the stored record and returns the result.
    /// The write is durable once this returns.
    async fn update_transaction(&self, id: &str, patch: &TransactionPatch)
        -> Result<BridgeTransaction>;

    /// All records, newest first.
    async fn list_transactions(&self) -> Result<Vec<BridgeTransaction>>;
}
