//! State-boundary table: terminal states per transaction type.

use std::collections::HashMap;

use super::{BridgeState, BridgeTransaction, TransactionType};
use crate::core::errors::{BridgeError, Result};

/// Terminal states of one transaction type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryStates {
    pub done: BridgeState,
    pub failed: Vec<BridgeState>,
}

impl BoundaryStates {
    pub fn new(done: BridgeState, failed: Vec<BridgeState>) -> Self {
        Self { done, failed }
    }

    pub fn is_done(&self, state: BridgeState) -> bool {
        self.done == state
    }

    pub fn is_failed(&self, state: BridgeState) -> bool {
        self.failed.contains(&state)
    }

    pub fn is_terminal(&self, state: BridgeState) -> bool {
        self.is_done(state) || self.is_failed(state)
    }
}

/// Static `type -> { done, failed }` mapping, fixed at construction.
#[derive(Debug, Clone, Default)]
pub struct BoundaryTable {
    entries: HashMap<TransactionType, BoundaryStates>,
}

impl BoundaryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Table covering every built-in transaction type.
    pub fn standard() -> Self {
        use BridgeState::*;
        let failed = vec![SoraRejected, ExternalRejected];
        Self::new()
            .with(TransactionType::EthBridgeOutgoing, BoundaryStates::new(ExternalCommitted, failed.clone()))
            .with(TransactionType::EthBridgeIncoming, BoundaryStates::new(SoraCommitted, failed.clone()))
            .with(TransactionType::EvmOutgoing, BoundaryStates::new(ExternalCommitted, failed.clone()))
            .with(TransactionType::EvmIncoming, BoundaryStates::new(SoraCommitted, failed.clone()))
            .with(TransactionType::SubstrateOutgoing, BoundaryStates::new(ExternalCommitted, failed.clone()))
            .with(TransactionType::SubstrateIncoming, BoundaryStates::new(SoraCommitted, failed))
    }

    pub fn with(mut self, kind: TransactionType, states: BoundaryStates) -> Self {
        self.entries.insert(kind, states);
        self
    }

    pub fn get(&self, kind: TransactionType) -> Result<&BoundaryStates> {
        self.entries.get(&kind).ok_or_else(|| {
            BridgeError::Configuration(format!("No boundary states declared for {}", kind))
        })
    }

    pub fn is_terminal(&self, tx: &BridgeTransaction) -> Result<bool> {
        Ok(self.get(tx.kind)?.is_terminal(tx.state))
    }

    pub fn is_done(&self, tx: &BridgeTransaction) -> Result<bool> {
        Ok(self.get(tx.kind)?.is_done(tx.state))
    }

    pub fn is_failed(&self, tx: &BridgeTransaction) -> Result<bool> {
        Ok(self.get(tx.kind)?.is_failed(tx.state))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &TransactionType> {
        self.entries.keys()
    }

    /// Rejects entries whose done state is also listed as failed.
    pub fn validate(&self) -> Result<()> {
        for (kind, states) in &self.entries {
            if states.failed.is_empty() {
                return Err(BridgeError::Configuration(format!(
                    "{} declares no failed states",
                    kind
                )));
            }
            if states.failed.contains(&states.done) {
                return Err(BridgeError::Configuration(format!(
                    "{} lists its done state {} as failed",
                    kind, states.done
                )));
            }
        }
        Ok(())
    }
}
