//! UI-facing side effects of the bridge engine.

use async_trait::async_trait;
use tracing::info;

use super::BridgeTransaction;
use crate::core::errors::Result;

/// Integration points the engine calls out to.
///
/// Everything except `before_submit` is fire-and-forget: the engine does not
/// wait on or react to these calls.
#[async_trait]
pub trait BridgeHooks: Send + Sync {
    /// Runs before any step that needs a new signature. Returning
    /// `SignatureRejected` routes the step to its reject state.
    async fn before_submit(&self, _tx: &BridgeTransaction) -> Result<()> {
        Ok(())
    }

    /// A transaction ended in a failed state.
    fn show_notification(&self, _tx: &BridgeTransaction) {}

    /// A driver brought the transaction to its done state. Fires once per transaction.
    fn update_history(&self) {}

    fn add_transaction_to_progress(&self, _id: &str) {}

    fn remove_transaction_from_progress(&self, _id: &str) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl BridgeHooks for NoopHooks {}

/// Reports every hook call through `tracing`; used by the CLI.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

#[async_trait]
impl BridgeHooks for TracingHooks {
    async fn before_submit(&self, tx: &BridgeTransaction) -> Result<()> {
        info!(tx_id = %tx.id, state = %tx.state, "signing next leg");
        Ok(())
    }

    fn show_notification(&self, tx: &BridgeTransaction) {
        info!(
            tx_id = %tx.id,
            state = %tx.state,
            error = tx.error.as_deref().unwrap_or("-"),
            "bridge transfer failed"
        );
    }

    fn update_history(&self) {
        info!("bridge history refresh requested");
    }

    fn add_transaction_to_progress(&self, id: &str) {
        info!(tx_id = %id, "transfer in progress");
    }

    fn remove_transaction_from_progress(&self, id: &str) {
        info!(tx_id = %id, "transfer no longer in progress");
    }
}
