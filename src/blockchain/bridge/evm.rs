//! Relayed bridge between SORA and an EVM network.
//!
//! The user signs only the source leg; relayers deliver the funds, so the
//! destination leg is observed as a counterpart.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::reducer::{BridgeReducer, ReducerContext, ReducerFactory, Step, Transition};
use super::{BridgeState, BridgeTransaction, TransactionType};
use crate::blockchain::traits::{Counterpart, ExternalChain, SoraChain};
use crate::core::errors::{BridgeError, Result};

use BridgeState::*;

pub const OUTGOING: &[Transition] = &[
    Transition::new(Initial, Step::SubmitSora, SoraSubmitted, SoraRejected),
    Transition::new(SoraSubmitted, Step::WaitSora, SoraCommitted, SoraRejected),
    Transition::new(
        SoraCommitted,
        Step::AwaitCounterpart(Counterpart::ExternalReceived),
        ExternalCommitted,
        ExternalRejected,
    ),
];

pub const INCOMING: &[Transition] = &[
    Transition::new(Initial, Step::SubmitExternal, ExternalSubmitted, ExternalRejected),
    Transition::new(ExternalSubmitted, Step::WaitExternal, ExternalCommitted, ExternalRejected),
    Transition::new(
        ExternalCommitted,
        Step::AwaitCounterpart(Counterpart::SoraReceived),
        SoraCommitted,
        SoraRejected,
    ),
];

pub struct EvmReducer {
    kind: TransactionType,
    ctx: ReducerContext,
    sora: Arc<dyn SoraChain>,
    evm: Arc<dyn ExternalChain>,
}

impl EvmReducer {
    pub fn new(
        kind: TransactionType,
        ctx: ReducerContext,
        sora: Arc<dyn SoraChain>,
        evm: Arc<dyn ExternalChain>,
    ) -> Self {
        Self { kind, ctx, sora, evm }
    }

    /// The connected network has to be the one the transfer was created for.
    fn check_network(&self, tx: &BridgeTransaction) -> Result<()> {
        match tx.network.as_deref() {
            Some(network) if network != self.evm.network_name() => {
                warn!(
                    tx_id = %tx.id,
                    expected = network,
                    connected = self.evm.network_name(),
                    "EVM network mismatch"
                );
                Err(BridgeError::Rejected(format!(
                    "transfer targets network {}, connected to {}",
                    network,
                    self.evm.network_name()
                )))
            }
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl BridgeReducer for EvmReducer {
    fn kind(&self) -> TransactionType {
        self.kind
    }

    fn transitions(&self) -> &'static [Transition] {
        match self.kind {
            TransactionType::EvmIncoming => INCOMING,
            _ => OUTGOING,
        }
    }

    fn context(&self) -> &ReducerContext {
        &self.ctx
    }

    fn sora(&self) -> &dyn SoraChain {
        self.sora.as_ref()
    }

    fn external(&self) -> &dyn ExternalChain {
        self.evm.as_ref()
    }

    async fn check_submit(&self, tx: &BridgeTransaction, _step: Step) -> Result<()> {
        self.check_network(tx)
    }
}

/// Factories for both EVM transaction types.
pub fn reducers(
    sora: Arc<dyn SoraChain>,
    evm: Arc<dyn ExternalChain>,
) -> Vec<(TransactionType, Arc<dyn ReducerFactory>)> {
    [TransactionType::EvmOutgoing, TransactionType::EvmIncoming]
        .into_iter()
        .map(|kind| {
            let sora = sora.clone();
            let evm = evm.clone();
            let factory: Arc<dyn ReducerFactory> =
                Arc::new(move |ctx: ReducerContext| -> Box<dyn BridgeReducer> {
                    Box::new(EvmReducer::new(kind, ctx, sora.clone(), evm.clone()))
                });
            (kind, factory)
        })
        .collect()
}
