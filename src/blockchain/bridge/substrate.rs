//! SORA <-> parachain transfers through the relay chain.
//!
//! Outgoing transfers pass two observable hops after the SORA leg: the relay
//! chain accepting the message, then the parachain crediting the recipient.

use async_trait::async_trait;
use std::sync::Arc;

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
        Step::AwaitCounterpart(Counterpart::RelayAccepted),
        ExternalPending,
        ExternalRejected,
    ),
    Transition::new(
        ExternalPending,
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

pub struct SubstrateReducer {
    kind: TransactionType,
    ctx: ReducerContext,
    sora: Arc<dyn SoraChain>,
    parachain: Arc<dyn ExternalChain>,
}

impl SubstrateReducer {
    pub fn new(
        kind: TransactionType,
        ctx: ReducerContext,
        sora: Arc<dyn SoraChain>,
        parachain: Arc<dyn ExternalChain>,
    ) -> Self {
        Self { kind, ctx, sora, parachain }
    }
}

#[async_trait]
impl BridgeReducer for SubstrateReducer {
    fn kind(&self) -> TransactionType {
        self.kind
    }

    fn transitions(&self) -> &'static [Transition] {
        match self.kind {
            TransactionType::SubstrateIncoming => INCOMING,
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
        self.parachain.as_ref()
    }

    async fn check_submit(&self, tx: &BridgeTransaction, _step: Step) -> Result<()> {
        // The message destination is the parachain name
        if tx.network.as_deref().map_or(true, str::is_empty) {
            return Err(BridgeError::Rejected("destination parachain not set".to_string()));
        }
        Ok(())
    }
}

/// Factories for both parachain transaction types.
pub fn reducers(
    sora: Arc<dyn SoraChain>,
    parachain: Arc<dyn ExternalChain>,
) -> Vec<(TransactionType, Arc<dyn ReducerFactory>)> {
    [TransactionType::SubstrateOutgoing, TransactionType::SubstrateIncoming]
        .into_iter()
        .map(|kind| {
            let sora = sora.clone();
            let parachain = parachain.clone();
            let factory: Arc<dyn ReducerFactory> =
                Arc::new(move |ctx: ReducerContext| -> Box<dyn BridgeReducer> {
                    Box::new(SubstrateReducer::new(kind, ctx, sora.clone(), parachain.clone()))
                });
            (kind, factory)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::bridge::reducer::validate_transitions;
    use crate::blockchain::bridge::BoundaryTable;

    #[test]
    fn test_tables_are_valid() {
        let table = BoundaryTable::standard();
        for (kind, transitions) in [
            (TransactionType::SubstrateOutgoing, OUTGOING),
            (TransactionType::SubstrateIncoming, INCOMING),
        ] {
            validate_transitions(kind, transitions, table.get(kind).unwrap()).unwrap();
        }
    }

    #[test]
    fn test_outgoing_passes_relay_before_parachain() {
        let steps: Vec<_> = OUTGOING.iter().map(|t| t.step).collect();
        assert_eq!(
            &steps[2..],
            &[
                Step::AwaitCounterpart(Counterpart::RelayAccepted),
                Step::AwaitCounterpart(Counterpart::ExternalReceived),
            ]
        );
    }
}
