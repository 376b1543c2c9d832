//! Generic state-machine driver shared by every bridge family.
//!
//! A reducer owns a linear transition table: one forward edge and one reject
//! edge per non-terminal state. `change_state` runs exactly one step and
//! persists its outcome before returning, so a transaction can always be
//! resumed from its last stored state.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::events::{BridgeEvent, EventBus};
use super::hooks::BridgeHooks;
use super::polling::poll_observation;
use super::{BoundaryStates, BoundaryTable, BridgeState, BridgeTransaction, TransactionPatch, TransactionType};
use crate::blockchain::traits::{AssetRegistry, Counterpart, ExternalChain, LegReceipt, SoraChain};
use crate::core::config::PollingConfig;
use crate::core::errors::{BridgeError, Result};
use crate::storage::TransactionStore;

/// Kind of work a state transition performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    /// Sign and broadcast the SORA leg
    SubmitSora,
    /// Wait for the SORA extrinsic to be final
    WaitSora,
    /// Sign and broadcast the external leg
    SubmitExternal,
    /// Wait for the external transaction to be confirmed
    WaitExternal,
    /// Wait for the other chain's leg
    AwaitCounterpart(Counterpart),
}

impl Step {
    pub fn requires_signature(&self) -> bool {
        matches!(self, Step::SubmitSora | Step::SubmitExternal)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Step::SubmitSora => "submit SORA leg",
            Step::WaitSora => "SORA finality",
            Step::SubmitExternal => "submit external leg",
            Step::WaitExternal => "external confirmation",
            Step::AwaitCounterpart(Counterpart::RequestApproved) => "request approval",
            Step::AwaitCounterpart(Counterpart::SoraReceived) => "SORA crediting",
            Step::AwaitCounterpart(Counterpart::RelayAccepted) => "relay acceptance",
            Step::AwaitCounterpart(Counterpart::ExternalReceived) => "external crediting",
        }
    }
}

/// One edge of a transaction type's state chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: BridgeState,
    pub step: Step,
    pub next: BridgeState,
    pub reject: BridgeState,
}

impl Transition {
    pub const fn new(from: BridgeState, step: Step, next: BridgeState, reject: BridgeState) -> Self {
        Self { from, step, next, reject }
    }
}

/// Collaborators shared by every reducer the orchestrator constructs.
#[derive(Clone)]
pub struct ReducerContext {
    pub store: Arc<dyn TransactionStore>,
    pub boundary: Arc<BoundaryTable>,
    pub hooks: Arc<dyn BridgeHooks>,
    pub assets: Arc<dyn AssetRegistry>,
    pub events: Option<Arc<EventBus>>,
    pub polling: PollingConfig,
    pub cancel: CancellationToken,
}

impl ReducerContext {
    pub fn publish(&self, event: BridgeEvent) {
        if let Some(events) = &self.events {
            events.publish(event);
        }
    }
}

/// Per-family, per-direction driver of one transaction type.
///
/// Implementors supply the transition table and the two chain adapters; the
/// provided methods implement the step/persist/terminate policy. Override
/// `check_submit` for family preconditions and `run_step` for family-specific
/// leg handling.
#[async_trait]
pub trait BridgeReducer: Send + Sync {
    fn kind(&self) -> TransactionType;

    fn transitions(&self) -> &'static [Transition];

    fn context(&self) -> &ReducerContext;

    fn sora(&self) -> &dyn SoraChain;

    fn external(&self) -> &dyn ExternalChain;

    /// Family checks that must pass before the user is asked to sign.
    /// Runs only when the step needs a new signature; an error rejects the
    /// step without reaching `before_submit`.
    async fn check_submit(&self, _tx: &BridgeTransaction, _step: Step) -> Result<()> {
        Ok(())
    }

    /// Side effect of one step; the returned patch must not set `state`.
    async fn run_step(&self, tx: &BridgeTransaction, step: Step) -> Result<TransactionPatch> {
        run_leg(self.context(), self.sora(), self.external(), tx, step).await
    }

    async fn before_submit(&self, tx: &BridgeTransaction) -> Result<()> {
        self.context().hooks.before_submit(tx).await
    }

    /// Called once when the transaction reaches its done state.
    ///
    /// The done state is persisted together with `end_time`; a done record
    /// without one (written by an older engine) gets it stamped here.
    async fn on_complete(&self, tx: &BridgeTransaction) -> Result<BridgeTransaction> {
        let ctx = self.context();
        if tx.kind.direction() == super::TransferDirection::Incoming {
            register_asset(ctx.assets.as_ref(), &tx.asset_address).await;
        }
        if tx.end_time.is_some() {
            return Ok(tx.clone());
        }
        let patch = TransactionPatch { end_time: Some(Utc::now()), ..Default::default() };
        ctx.store.update_transaction(&tx.id, &patch).await
    }

    /// Runs the step for the current state and persists the result.
    async fn change_state(&self, tx: &BridgeTransaction) -> Result<BridgeTransaction> {
        let transition = find_transition(self.transitions(), tx.state).ok_or_else(|| {
            BridgeError::Configuration(format!("{} has no transition from {}", tx.kind, tx.state))
        })?;

        debug!(tx_id = %tx.id, state = %tx.state, step = transition.step.name(), "running bridge step");
        let handler = async {
            if needs_signature(tx, transition.step) {
                self.check_submit(tx, transition.step).await?;
                self.before_submit(tx).await?;
            }
            let patch = self.run_step(tx, transition.step).await?;
            Ok::<_, BridgeError>(patch)
        };
        handle_state(self.context(), tx, transition.next, transition.reject, handler).await
    }

    /// Drives the transaction until it reaches a terminal state.
    ///
    /// `finished` is set when this run made the terminal transition, or
    /// completed a done record left without `end_time`.
    async fn process(&self, id: &str) -> Result<ReducerRun> {
        let ctx = self.context();
        let mut tx = ctx.store.get_transaction(id).await?;
        let boundary = ctx.boundary.get(tx.kind)?.clone();
        let mut finished = needs_completion(&boundary, &tx);

        // Every transition moves forward, so the chain is never longer than the table
        let mut remaining = self.transitions().len();
        while !boundary.is_terminal(tx.state) {
            if remaining == 0 {
                return Err(BridgeError::Configuration(format!(
                    "{} did not reach a terminal state from {}",
                    tx.kind, tx.state
                )));
            }
            if ctx.cancel.is_cancelled() {
                return Err(BridgeError::Cancelled);
            }
            remaining -= 1;
            tx = self.change_state(&tx).await?;
            finished = true;
        }
        if boundary.is_done(tx.state) && finished {
            tx = self.on_complete(&tx).await?;
        }
        Ok(ReducerRun { transaction: tx, finished })
    }
}

/// What one `BridgeReducer::process` call did.
#[derive(Debug, Clone, PartialEq)]
pub struct ReducerRun {
    pub transaction: BridgeTransaction,
    /// This run reached the terminal state (completion side effects are due)
    pub finished: bool,
}

/// Done, but the completion step never ran to the end.
pub fn needs_completion(boundary: &BoundaryStates, tx: &BridgeTransaction) -> bool {
    boundary.is_done(tx.state) && tx.end_time.is_none()
}

/// True when the step's leg is already on record, so no new signature is needed.
pub fn leg_recorded(tx: &BridgeTransaction, step: Step) -> bool {
    match step {
        Step::SubmitSora => tx.tx_id.is_some(),
        Step::SubmitExternal => tx.external_hash.is_some(),
        _ => false,
    }
}

pub fn needs_signature(tx: &BridgeTransaction, step: Step) -> bool {
    step.requires_signature() && !leg_recorded(tx, step)
}

/// Constructs a reducer for one `process` call.
pub trait ReducerFactory: Send + Sync {
    fn create(&self, ctx: ReducerContext) -> Box<dyn BridgeReducer>;
}

impl<F> ReducerFactory for F
where
    F: Fn(ReducerContext) -> Box<dyn BridgeReducer> + Send + Sync,
{
    fn create(&self, ctx: ReducerContext) -> Box<dyn BridgeReducer> {
        self(ctx)
    }
}

pub fn find_transition(transitions: &[Transition], state: BridgeState) -> Option<&Transition> {
    transitions.iter().find(|t| t.from == state)
}

/// Runs `handler` and persists `next` on success. Reaching the done state
/// stamps `end_time` in the same write.
///
/// A step rejection persists `reject` with the error marker instead. Any
/// other error propagates and leaves the stored state untouched.
pub async fn handle_state<F>(
    ctx: &ReducerContext,
    tx: &BridgeTransaction,
    next: BridgeState,
    reject: BridgeState,
    handler: F,
) -> Result<BridgeTransaction>
where
    F: Future<Output = Result<TransactionPatch>> + Send,
{
    let reaches_done = ctx.boundary.get(tx.kind)?.is_done(next);
    let patch = match handler.await {
        Ok(patch) if reaches_done => {
            TransactionPatch { state: Some(next), end_time: Some(Utc::now()), ..patch }
        }
        Ok(patch) => TransactionPatch { state: Some(next), ..patch },
        Err(err) if err.is_step_rejection() => {
            warn!(tx_id = %tx.id, state = %tx.state, reject_state = %reject, error = %err, "bridge step rejected");
            ctx.publish(BridgeEvent::StepRejected {
                tx_id: tx.id.clone(),
                state: tx.state,
                reject_state: reject,
                error: err.to_string(),
                timestamp: Utc::now(),
            });
            TransactionPatch { end_time: Some(Utc::now()), ..TransactionPatch::state(reject) }
                .with_error(err.to_string())
        }
        Err(err) => return Err(err),
    };

    let updated = ctx.store.update_transaction(&tx.id, &patch).await?;
    ctx.publish(BridgeEvent::StateChanged {
        tx_id: tx.id.clone(),
        from: tx.state,
        to: updated.state,
        timestamp: Utc::now(),
    });
    Ok(updated)
}

/// Default leg handling shared by the families.
///
/// Submit steps are skipped when the leg's id is already recorded, so a
/// resumed transaction never signs the same leg twice.
pub async fn run_leg(
    ctx: &ReducerContext,
    sora: &dyn SoraChain,
    external: &dyn ExternalChain,
    tx: &BridgeTransaction,
    step: Step,
) -> Result<TransactionPatch> {
    match step {
        Step::SubmitSora => {
            if leg_recorded(tx, step) {
                debug!(tx_id = %tx.id, "SORA leg already submitted, skipping signature");
                return Ok(TransactionPatch::default());
            }
            Ok(sora_patch(sora.sign_sora(tx).await?))
        }
        Step::WaitSora => {
            let receipt = poll_observation(step.name(), &ctx.polling.sora, &ctx.cancel, || {
                sora.observe_extrinsic(tx)
            })
            .await?;
            Ok(sora_patch(receipt))
        }
        Step::SubmitExternal => {
            if leg_recorded(tx, step) {
                debug!(tx_id = %tx.id, "external leg already submitted, skipping signature");
                return Ok(TransactionPatch::default());
            }
            Ok(external_patch(external.sign_external(tx).await?))
        }
        Step::WaitExternal => {
            let receipt = poll_observation(step.name(), &ctx.polling.external, &ctx.cancel, || {
                external.observe_transaction(tx)
            })
            .await?;
            Ok(external_patch(receipt))
        }
        Step::AwaitCounterpart(counterpart) => {
            let receipt = poll_observation(step.name(), &ctx.polling.counterpart, &ctx.cancel, || {
                async move {
                    if counterpart.on_sora() {
                        sora.observe_counterpart(tx, counterpart).await
                    } else {
                        external.observe_counterpart(tx, counterpart).await
                    }
                }
            })
            .await?;
            Ok(if counterpart.on_sora() { sora_patch(receipt) } else { external_patch(receipt) })
        }
    }
}

pub fn sora_patch(receipt: LegReceipt) -> TransactionPatch {
    TransactionPatch {
        block_id: receipt.block_id,
        tx_id: receipt.tx_id,
        hash: receipt.hash,
        ..Default::default()
    }
}

pub fn external_patch(receipt: LegReceipt) -> TransactionPatch {
    TransactionPatch {
        external_hash: receipt.hash.or(receipt.tx_id),
        external_block_id: receipt.block_id,
        ..Default::default()
    }
}

async fn register_asset(assets: &dyn AssetRegistry, address: &str) {
    match assets.get_asset_by_address(address).await {
        Ok(Some(_)) => {}
        Ok(None) => {
            if let Err(e) = assets.add_asset(address).await {
                warn!(asset = %address, error = %e, "failed to add received asset");
            }
        }
        Err(e) => warn!(asset = %address, error = %e, "failed to look up received asset"),
    }
}

/// Checks a transition table against the boundary states of its type.
///
/// The table must be linear (one edge per state), start at `Initial`, never
/// leave a terminal state, reject only into failed states, and reach the
/// done state without revisiting a state.
pub fn validate_transitions(
    kind: TransactionType,
    transitions: &[Transition],
    boundary: &BoundaryStates,
) -> Result<()> {
    let config_err = |msg: String| Err(BridgeError::Configuration(format!("{}: {}", kind, msg)));

    let mut sources = HashSet::new();
    for t in transitions {
        if !sources.insert(t.from) {
            return config_err(format!("more than one transition from {}", t.from));
        }
        if boundary.is_terminal(t.from) {
            return config_err(format!("transition out of terminal state {}", t.from));
        }
        if !boundary.is_failed(t.reject) {
            return config_err(format!("reject state {} of {} is not a failed state", t.reject, t.from));
        }
    }

    let mut state = BridgeState::Initial;
    let mut visited = HashSet::new();
    while !boundary.is_done(state) {
        if !visited.insert(state) {
            return config_err(format!("cycle through {}", state));
        }
        match find_transition(transitions, state) {
            Some(t) => state = t.next,
            None => return config_err(format!("chain stops at non-terminal state {}", state)),
        }
    }

    if visited.len() != transitions.len() {
        return config_err("transitions unreachable from Initial".to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use BridgeState::*;

    const CHAIN: &[Transition] = &[
        Transition::new(Initial, Step::SubmitSora, SoraSubmitted, SoraRejected),
        Transition::new(SoraSubmitted, Step::WaitSora, SoraCommitted, SoraRejected),
    ];

    fn boundary() -> BoundaryStates {
        BoundaryStates::new(SoraCommitted, vec![SoraRejected, ExternalRejected])
    }

    #[test]
    fn test_valid_chain() {
        assert!(validate_transitions(TransactionType::EvmOutgoing, CHAIN, &boundary()).is_ok());
    }

    #[test]
    fn test_cycle_is_rejected() {
        let cyclic = [
            Transition::new(Initial, Step::SubmitSora, SoraSubmitted, SoraRejected),
            Transition::new(SoraSubmitted, Step::WaitSora, Initial, SoraRejected),
        ];
        let err = validate_transitions(TransactionType::EvmOutgoing, &cyclic, &boundary());
        assert!(matches!(err, Err(BridgeError::Configuration(msg)) if msg.contains("cycle")));
    }

    #[test]
    fn test_reject_must_be_failed_state() {
        let table = [Transition::new(Initial, Step::SubmitSora, SoraCommitted, ExternalPending)];
        assert!(validate_transitions(TransactionType::EvmOutgoing, &table, &boundary()).is_err());
    }

    #[test]
    fn test_dead_end_is_rejected() {
        let table = [Transition::new(Initial, Step::SubmitSora, SoraSubmitted, SoraRejected)];
        assert!(validate_transitions(TransactionType::EvmOutgoing, &table, &boundary()).is_err());
    }

    #[test]
    fn test_unreachable_transition_is_rejected() {
        let table = [
            Transition::new(Initial, Step::SubmitSora, SoraCommitted, SoraRejected),
            Transition::new(ExternalPending, Step::WaitExternal, SoraCommitted, ExternalRejected),
        ];
        assert!(validate_transitions(TransactionType::EvmOutgoing, &table, &boundary()).is_err());
    }

    #[test]
    fn test_external_patch_falls_back_to_tx_id() {
        let patch = external_patch(LegReceipt {
            block_id: Some("0xb".to_string()),
            tx_id: Some("0xt".to_string()),
            hash: None,
        });
        assert_eq!(patch.external_hash.as_deref(), Some("0xt"));
        assert_eq!(patch.external_block_id.as_deref(), Some("0xb"));
        assert!(patch.state.is_none());
    }
}
