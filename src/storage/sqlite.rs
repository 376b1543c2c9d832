//! SQLite-backed transaction store.

use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::TransactionStore;
use crate::blockchain::bridge::{
    BridgeState, BridgeTransaction, TransactionPatch, TransactionType,
};
use crate::core::errors::{BridgeError, Result};

#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    is_memory: bool,
}

impl SqliteStore {
    pub async fn new_with_url(database_url: &str) -> Result<Self> {
        let is_memory = database_url.contains(":memory:");
        if !is_memory {
            ensure_parent_dir(database_url);
        }

        // Avoid logging the full URL
        let scheme = database_url.split(':').next().unwrap_or("sqlite");
        info!(db = %format!("{}:(redacted, len={})", scheme, database_url.len()), "[storage] connecting to database");

        let mut connect_options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| BridgeError::Configuration(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            // Every state change must survive a crash before the next step runs
            .synchronous(SqliteSynchronous::Full);
        if !is_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // Each connection to `:memory:` opens its own database
        let max_connections = if is_memory { 1 } else { 8 };
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(30))
            .connect_with(connect_options)
            .await
            .map_err(|e| BridgeError::Storage(format!("Failed to connect to database: {}", e)))?;

        let store = Self { pool, is_memory };
        store.initialize_schema().await?;

        info!("Bridge transaction store initialized");
        Ok(store)
    }

    pub fn is_in_memory(&self) -> bool {
        self.is_memory
    }

    async fn initialize_schema(&self) -> Result<()> {
        debug!("Initializing database schema");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS bridge_transactions (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                state TEXT NOT NULL,
                asset_address TEXT NOT NULL,
                amount TEXT NOT NULL,
                from_address TEXT NOT NULL,
                to_address TEXT NOT NULL,
                network TEXT,
                block_id TEXT,
                tx_id TEXT,
                hash TEXT,
                external_hash TEXT,
                external_block_id TEXT,
                start_time DATETIME NOT NULL,
                end_time DATETIME,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| BridgeError::Storage(format!("Failed to create bridge_transactions table: {}", e)))?;

        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_bridge_transactions_start_time ON bridge_transactions (start_time)",
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn ensure_parent_dir(database_url: &str) {
    let path = database_url.trim_start_matches("sqlite:").trim_start_matches("//");
    let path = path.split('?').next().unwrap_or_default();
    if path.is_empty() {
        return;
    }
    if let Some(parent) = std::path::Path::new(path).parent() {
        if !parent.as_os_str().is_empty() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Failed to create database dir {:?}: {}", parent, e);
            }
        }
    }
}

fn row_to_transaction(row: &SqliteRow) -> Result<BridgeTransaction> {
    let kind: String = row.try_get("kind")?;
    let state: String = row.try_get("state")?;
    Ok(BridgeTransaction {
        id: row.try_get("id")?,
        kind: TransactionType::from_str(&kind)
            .map_err(|_| BridgeError::Storage(format!("Unknown transaction type in store: {}", kind)))?,
        state: BridgeState::from_str(&state)?,
        asset_address: row.try_get("asset_address")?,
        amount: row.try_get("amount")?,
        from: row.try_get("from_address")?,
        to: row.try_get("to_address")?,
        network: row.try_get("network")?,
        block_id: row.try_get("block_id")?,
        tx_id: row.try_get("tx_id")?,
        hash: row.try_get("hash")?,
        external_hash: row.try_get("external_hash")?,
        external_block_id: row.try_get("external_block_id")?,
        start_time: row.try_get("start_time")?,
        end_time: row.try_get("end_time")?,
        error: row.try_get("error")?,
    })
}

#[async_trait]
impl TransactionStore for SqliteStore {
    async fn insert_transaction(&self, tx: &BridgeTransaction) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO bridge_transactions (id, kind, state, asset_address, amount, from_address, to_address, network, block_id, tx_id, hash, external_hash, external_block_id, start_time, end_time, error)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
        )
        .bind(&tx.id)
        .bind(tx.kind.as_str())
        .bind(tx.state.as_str())
        .bind(&tx.asset_address)
        .bind(&tx.amount)
        .bind(&tx.from)
        .bind(&tx.to)
        .bind(&tx.network)
        .bind(&tx.block_id)
        .bind(&tx.tx_id)
        .bind(&tx.hash)
        .bind(&tx.external_hash)
        .bind(&tx.external_block_id)
        .bind(tx.start_time)
        .bind(tx.end_time)
        .bind(&tx.error)
        .execute(&self.pool)
        .await?;
        debug!(tx_id = %tx.id, kind = %tx.kind, "bridge transaction inserted");
        Ok(())
    }

    async fn get_transaction(&self, id: &str) -> Result<BridgeTransaction> {
        let row = sqlx::query("SELECT * FROM bridge_transactions WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| BridgeError::NotFound(id.to_string()))?;
        row_to_transaction(&row)
    }

    async fn update_transaction(
        &self,
        id: &str,
        patch: &TransactionPatch,
    ) -> Result<BridgeTransaction> {
        let mut db_tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE bridge_transactions SET
                state = COALESCE(?1, state),
                block_id = COALESCE(?2, block_id),
                tx_id = COALESCE(?3, tx_id),
                hash = COALESCE(?4, hash),
                external_hash = COALESCE(?5, external_hash),
                external_block_id = COALESCE(?6, external_block_id),
                end_time = COALESCE(?7, end_time),
                error = COALESCE(?8, error)
            WHERE id = ?9
            "#,
        )
        .bind(patch.state.map(|s| s.as_str()))
        .bind(&patch.block_id)
        .bind(&patch.tx_id)
        .bind(&patch.hash)
        .bind(&patch.external_hash)
        .bind(&patch.external_block_id)
        .bind(patch.end_time)
        .bind(&patch.error)
        .bind(id)
        .execute(&mut *db_tx)
        .await?;

        if result.rows_affected() == 0 {
            return Err(BridgeError::NotFound(id.to_string()));
        }

        let row = sqlx::query("SELECT * FROM bridge_transactions WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *db_tx)
            .await?;
        let updated = row_to_transaction(&row)?;
        db_tx.commit().await?;
        Ok(updated)
    }

    async fn list_transactions(&self) -> Result<Vec<BridgeTransaction>> {
        let rows = sqlx::query("SELECT * FROM bridge_transactions ORDER BY start_time DESC")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_transaction).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::bridge::NewTransfer;
    use chrono::Utc;

    fn sample(kind: TransactionType) -> BridgeTransaction {
        BridgeTransaction::new(&NewTransfer {
            kind,
            asset_address: "0x0200070000000000000000000000000000000000000000000000000000000000"
                .to_string(),
            amount: "0.25".to_string(),
            from: "0x742d35Cc6634C0532925a3b844Bc454e4438f44e".to_string(),
            to: "cnVkoGs3rEMqLqY27c2nfVXJRGdzNJk2ns78DcqtppaSRe8qm".to_string(),
            network: Some("1".to_string()),
        })
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteStore::new_with_url("sqlite::memory:").await.unwrap();
        assert!(store.is_in_memory());
        let tx = sample(TransactionType::EthBridgeIncoming);
        store.insert_transaction(&tx).await.unwrap();

        let found = store.get_transaction(&tx.id).await.unwrap();
        assert_eq!(found.kind, TransactionType::EthBridgeIncoming);
        assert_eq!(found.state, BridgeState::Initial);
        assert_eq!(found.network.as_deref(), Some("1"));
        assert_eq!(found.start_time.timestamp_millis(), tx.start_time.timestamp_millis());
    }

    #[tokio::test]
    async fn test_update_keeps_unset_columns() {
        let store = SqliteStore::new_with_url("sqlite::memory:").await.unwrap();
        let tx = sample(TransactionType::EvmOutgoing);
        store.insert_transaction(&tx).await.unwrap();

        let patch = TransactionPatch {
            state: Some(BridgeState::SoraSubmitted),
            tx_id: Some("0xextrinsic".to_string()),
            ..Default::default()
        };
        store.update_transaction(&tx.id, &patch).await.unwrap();

        let end = Utc::now();
        let patch = TransactionPatch {
            state: Some(BridgeState::SoraCommitted),
            block_id: Some("0xblock".to_string()),
            end_time: Some(end),
            ..Default::default()
        };
        let updated = store.update_transaction(&tx.id, &patch).await.unwrap();
        assert_eq!(updated.state, BridgeState::SoraCommitted);
        assert_eq!(updated.tx_id.as_deref(), Some("0xextrinsic"));
        assert_eq!(updated.block_id.as_deref(), Some("0xblock"));
        assert!(updated.end_time.is_some());
        assert!(updated.error.is_none());
    }

    #[tokio::test]
    async fn test_missing_transaction() {
        let store = SqliteStore::new_with_url("sqlite::memory:").await.unwrap();
        assert_eq!(
            store.get_transaction("nope").await,
            Err(BridgeError::NotFound("nope".to_string()))
        );
        let patch = TransactionPatch::state(BridgeState::SoraRejected);
        assert!(matches!(
            store.update_transaction("nope", &patch).await,
            Err(BridgeError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_records_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}/bridge.db", dir.path().display());

        let tx = sample(TransactionType::SubstrateIncoming);
        {
            let store = SqliteStore::new_with_url(&url).await.unwrap();
            store.insert_transaction(&tx).await.unwrap();
            store
                .update_transaction(&tx.id, &TransactionPatch::state(BridgeState::ExternalSubmitted))
                .await
                .unwrap();
            store.close().await;
        }

        let reopened = SqliteStore::new_with_url(&url).await.unwrap();
        let all = reopened.list_transactions().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, tx.id);
        assert_eq!(all[0].state, BridgeState::ExternalSubmitted);
    }
}
