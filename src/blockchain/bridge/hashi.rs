//! HASHI bridge: SORA <-> Ethereum.
//!
//! Every transfer is a bridge request registered on SORA that the HASHI peers
//! have to approve. Outgoing transfers are claimed on Ethereum with the
//! approved request; incoming transfers register the Ethereum transaction on
//! SORA once it is confirmed.

use async_trait::async_trait;
use std::sync::Arc;

use super::reducer::{BridgeReducer, ReducerContext, ReducerFactory, Step, Transition};
use super::{BridgeState, BridgeTransaction, TransactionType};
use crate::blockchain::traits::{Counterpart, ExternalChain, SoraChain};
use crate::core::errors::{BridgeError, Result};

use BridgeState::*;

pub const OUTGOING: &[Transition] = &[
    Transition::new(Initial, Step::SubmitSora, SoraSubmitted, SoraRejected),
    Transition::new(SoraSubmitted, Step::WaitSora, SoraPending, SoraRejected),
    Transition::new(
        SoraPending,
        Step::AwaitCounterpart(Counterpart::RequestApproved),
        SoraCommitted,
        SoraRejected,
    ),
    Transition::new(SoraCommitted, Step::SubmitExternal, ExternalSubmitted, ExternalRejected),
    Transition::new(ExternalSubmitted, Step::WaitExternal, ExternalCommitted, ExternalRejected),
];

pub const INCOMING: &[Transition] = &[
    Transition::new(Initial, Step::SubmitExternal, ExternalSubmitted, ExternalRejected),
    Transition::new(ExternalSubmitted, Step::WaitExternal, ExternalCommitted, ExternalRejected),
    Transition::new(ExternalCommitted, Step::SubmitSora, SoraSubmitted, SoraRejected),
    Transition::new(SoraSubmitted, Step::WaitSora, SoraPending, SoraRejected),
    Transition::new(
        SoraPending,
        Step::AwaitCounterpart(Counterpart::RequestApproved),
        SoraCommitted,
        SoraRejected,
    ),
];

pub struct HashiReducer {
    kind: TransactionType,
    ctx: ReducerContext,
    sora: Arc<dyn SoraChain>,
    ethereum: Arc<dyn ExternalChain>,
}

impl HashiReducer {
    pub fn new(
        kind: TransactionType,
        ctx: ReducerContext,
        sora: Arc<dyn SoraChain>,
        ethereum: Arc<dyn ExternalChain>,
    ) -> Self {
        Self { kind, ctx, sora, ethereum }
    }
}

#[async_trait]
impl BridgeReducer for HashiReducer {
    fn kind(&self) -> TransactionType {
        self.kind
    }

    fn transitions(&self) -> &'static [Transition] {
        match self.kind {
            TransactionType::EthBridgeIncoming => INCOMING,
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
        self.ethereum.as_ref()
    }

    async fn check_submit(&self, tx: &BridgeTransaction, step: Step) -> Result<()> {
        match (self.kind, step) {
            // The claim on Ethereum carries the approved request hash
            (TransactionType::EthBridgeOutgoing, Step::SubmitExternal) if tx.hash.is_none() => {
                Err(BridgeError::Reconciliation(
                    "approved request hash missing, cannot claim on Ethereum".to_string(),
                ))
            }
            // The SORA request references the Ethereum transaction
            (TransactionType::EthBridgeIncoming, Step::SubmitSora) if tx.external_hash.is_none() => {
                Err(BridgeError::Reconciliation(
                    "Ethereum transaction hash missing, cannot register request".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }
}

/// Factories for both HASHI transaction types.
pub fn reducers(
    sora: Arc<dyn SoraChain>,
    ethereum: Arc<dyn ExternalChain>,
) -> Vec<(TransactionType, Arc<dyn ReducerFactory>)> {
    [TransactionType::EthBridgeOutgoing, TransactionType::EthBridgeIncoming]
        .into_iter()
        .map(|kind| {
            let sora = sora.clone();
            let ethereum = ethereum.clone();
            let factory: Arc<dyn ReducerFactory> =
                Arc::new(move |ctx: ReducerContext| -> Box<dyn BridgeReducer> {
                    Box::new(HashiReducer::new(kind, ctx, sora.clone(), ethereum.clone()))
                });
            (kind, factory)
        })
        .collect()
}
