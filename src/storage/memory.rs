//! In-memory transaction store (tests and simulation runs).

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::TransactionStore;
use crate::blockchain::bridge::{BridgeTransaction, TransactionPatch};
use crate::core::errors::{BridgeError, Result};

/// Memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
    transactions: Arc<RwLock<HashMap<String, BridgeTransaction>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with records, as if loaded after a restart.
    pub fn with_transactions(transactions: impl IntoIterator<Item = BridgeTransaction>) -> Self {
        let map = transactions.into_iter().map(|tx| (tx.id.clone(), tx)).collect();
        Self { transactions: Arc::new(RwLock::new(map)) }
    }
}

#[async_trait]
impl TransactionStore for MemoryStore {
    async fn insert_transaction(&self, tx: &BridgeTransaction) -> Result<()> {
        let mut transactions = self.transactions.write().await;
        if transactions.contains_key(&tx.id) {
            return Err(BridgeError::Storage(format!("Transaction already exists: {}", tx.id)));
        }
        transactions.insert(tx.id.clone(), tx.clone());
        debug!(tx_id = %tx.id, kind = %tx.kind, "transaction saved to memory store");
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<BridgeTransaction> {
        let transactions = self.transactions.read().await;
        transactions.get(id).cloned().ok_or_else(|| BridgeError::NotFound(id.to_string()))
    }

    async fn update_transaction(
        &self,
        id: &str,
        patch: &TransactionPatch,
    ) -> Result<BridgeTransaction> {
        let mut transactions = self.transactions.write().await;
        let tx = transactions.get_mut(id).ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        tx.apply(patch);
        Ok(tx.clone())
    }

    async fn list_transactions(&self) -> Result<Vec<BridgeTransaction>> {
        let transactions = self.transactions.read().await;
        let mut all: Vec<_> = transactions.values().cloned().collect();
        all.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        Ok(all)
    }
}
