//! Bridge orchestrator: reducer registry, single driver per transaction,
//! in-progress bookkeeping and completion side effects.

use chrono::Utc;
use futures::future::{join_all, BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::events::{BridgeEvent, EventBus};
use super::hooks::{BridgeHooks, NoopHooks};
use super::reducer::{needs_completion, validate_transitions, ReducerContext, ReducerFactory};
use super::{BoundaryTable, BridgeTransaction, NewTransfer, TransactionType};
use crate::blockchain::traits::AssetRegistry;
use crate::core::config::PollingConfig;
use crate::core::errors::{BridgeError, Result};
use crate::core::validation::validate_transfer;
use crate::storage::TransactionStore;

/// How a driven transaction ended.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessOutcome {
    /// Reached the done state of its type
    Completed(BridgeTransaction),
    /// Reached one of the failed states of its type
    Failed(BridgeTransaction),
}

impl ProcessOutcome {
    pub fn transaction(&self) -> &BridgeTransaction {
        match self {
            ProcessOutcome::Completed(tx) | ProcessOutcome::Failed(tx) => tx,
        }
    }

    pub fn into_transaction(self) -> BridgeTransaction {
        match self {
            ProcessOutcome::Completed(tx) | ProcessOutcome::Failed(tx) => tx,
        }
    }

    pub fn is_completed(&self) -> bool {
        matches!(self, ProcessOutcome::Completed(_))
    }
}

type PendingOutcome = Shared<BoxFuture<'static, Result<ProcessOutcome>>>;

struct BridgeInner {
    registry: HashMap<TransactionType, Arc<dyn ReducerFactory>>,
    boundary: Arc<BoundaryTable>,
    store: Arc<dyn TransactionStore>,
    hooks: Arc<dyn BridgeHooks>,
    assets: Arc<dyn AssetRegistry>,
    events: Option<Arc<EventBus>>,
    polling: PollingConfig,
    cancel: CancellationToken,
    in_progress: Mutex<HashMap<String, PendingOutcome>>,
}

/// Bridge orchestrator. Cheap to clone; clones share the registry and the
/// in-progress set.
#[derive(Clone)]
pub struct Bridge {
    inner: Arc<BridgeInner>,
}

/// Removes the in-progress entry when the driver ends, however it ends.
/// The progress hooks fire only once the driver has work to do.
struct ProgressGuard {
    inner: Arc<BridgeInner>,
    id: String,
    announced: bool,
}

impl ProgressGuard {
    fn announce(&mut self) {
        self.inner.hooks.add_transaction_to_progress(&self.id);
        self.announced = true;
    }
}

impl Drop for ProgressGuard {
    fn drop(&mut self) {
        self.inner.in_progress.lock().remove(&self.id);
        if self.announced {
            self.inner.hooks.remove_transaction_from_progress(&self.id);
        }
    }
}

impl Bridge {
    pub fn builder(store: Arc<dyn TransactionStore>, assets: Arc<dyn AssetRegistry>) -> BridgeBuilder {
        BridgeBuilder::new(store, assets)
    }

    pub fn store(&self) -> &Arc<dyn TransactionStore> {
        &self.inner.store
    }

    pub fn boundary(&self) -> &BoundaryTable {
        &self.inner.boundary
    }

    pub fn events(&self) -> Option<&Arc<EventBus>> {
        self.inner.events.as_ref()
    }

    pub fn is_registered(&self, kind: TransactionType) -> bool {
        self.inner.registry.contains_key(&kind)
    }

    /// Ids currently being driven, sorted.
    pub fn in_progress(&self) -> Vec<String> {
        let mut ids: Vec<_> = self.inner.in_progress.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn is_in_progress(&self, id: &str) -> bool {
        self.inner.in_progress.lock().contains_key(id)
    }

    /// Validates and persists a new transfer at its initial state.
    /// Driving it is a separate `process` call.
    pub async fn create_transaction(&self, request: NewTransfer) -> Result<BridgeTransaction> {
        if !self.is_registered(request.kind) {
            return Err(BridgeError::NoReducer(request.kind.to_string()));
        }
        validate_transfer(&request)?;

        let tx = BridgeTransaction::new(&request);
        self.inner.store.insert_transaction(&tx).await?;
        info!(tx_id = %tx.id, kind = %tx.kind, amount = %tx.amount, "bridge transaction created");
        Ok(tx)
    }

    /// Drives a transaction to a terminal state.
    ///
    /// A second call for an id that is already being driven joins the running
    /// driver and gets its outcome. A transaction already terminal is
    /// returned as is, without side effects. A done record whose completion
    /// never finished (no `end_time`) is completed again.
    pub async fn process(&self, id: &str) -> Result<ProcessOutcome> {
        let tx = self.inner.store.get_transaction(id).await?;
        let factory = self
            .inner
            .registry
            .get(&tx.kind)
            .cloned()
            .ok_or_else(|| BridgeError::NoReducer(tx.kind.to_string()))?;
        if let Some(outcome) = self.settled(&tx)? {
            return Ok(outcome);
        }

        let pending = {
            let mut in_progress = self.inner.in_progress.lock();
            match in_progress.get(id) {
                Some(pending) => {
                    debug!(tx_id = %id, "transaction already in progress, joining driver");
                    pending.clone()
                }
                None => {
                    let guard =
                        ProgressGuard { inner: self.inner.clone(), id: id.to_string(), announced: false };
                    let driver = tokio::spawn(self.clone().drive(id.to_string(), factory, guard));
                    let pending = async move {
                        driver.await.map_err(BridgeError::from).and_then(|outcome| outcome)
                    }
                    .boxed()
                    .shared();
                    in_progress.insert(id.to_string(), pending.clone());
                    pending
                }
            }
        };
        pending.await
    }

    /// Picks up a transaction left non-terminal by a previous run. Same
    /// contract as `process`; the stored state is the only checkpoint.
    pub async fn resume(&self, id: &str) -> Result<ProcessOutcome> {
        self.process(id).await
    }

    /// Resumes every stored transaction of a registered type that still needs
    /// driving, including done records whose completion never finished.
    pub async fn resume_all(&self) -> Result<Vec<(String, Result<ProcessOutcome>)>> {
        let pending: Vec<_> = self
            .inner
            .store
            .list_transactions()
            .await?
            .into_iter()
            .filter(|tx| self.is_registered(tx.kind))
            .filter(|tx| matches!(self.settled(tx), Ok(None)))
            .map(|tx| tx.id)
            .collect();

        info!(count = pending.len(), "resuming unfinished bridge transactions");
        let results = join_all(pending.iter().map(|id| self.resume(id))).await;
        Ok(pending.into_iter().zip(results).collect())
    }

    /// Cancels running drivers and waits for them to stop. Interrupted
    /// transactions keep their last persisted state.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let running: Vec<_> = self.inner.in_progress.lock().values().cloned().collect();
        info!(running = running.len(), "shutting down bridge orchestrator");
        join_all(running).await;
    }

    /// Outcome of a transaction that needs no driving.
    fn settled(&self, tx: &BridgeTransaction) -> Result<Option<ProcessOutcome>> {
        let boundary = self.inner.boundary.get(tx.kind)?;
        if boundary.is_done(tx.state) && !needs_completion(boundary, tx) {
            return Ok(Some(ProcessOutcome::Completed(tx.clone())));
        }
        if boundary.is_failed(tx.state) {
            return Ok(Some(ProcessOutcome::Failed(tx.clone())));
        }
        Ok(None)
    }

    fn context(&self) -> ReducerContext {
        ReducerContext {
            store: self.inner.store.clone(),
            boundary: self.inner.boundary.clone(),
            hooks: self.inner.hooks.clone(),
            assets: self.inner.assets.clone(),
            events: self.inner.events.clone(),
            polling: self.inner.polling.clone(),
            cancel: self.inner.cancel.clone(),
        }
    }

    fn publish(&self, event: BridgeEvent) {
        if let Some(events) = &self.inner.events {
            events.publish(event);
        }
    }

    async fn drive(
        self,
        id: String,
        factory: Arc<dyn ReducerFactory>,
        mut guard: ProgressGuard,
    ) -> Result<ProcessOutcome> {
        // The caller's snapshot may predate a driver that has just finished
        let tx = self.inner.store.get_transaction(&id).await?;
        if let Some(outcome) = self.settled(&tx)? {
            debug!(tx_id = %id, state = %tx.state, "transaction settled before driver started");
            return Ok(outcome);
        }
        guard.announce();

        let started = Utc::now();
        self.publish(BridgeEvent::TransactionStarted {
            tx_id: tx.id.clone(),
            kind: tx.kind,
            state: tx.state,
            timestamp: started,
        });

        let reducer = factory.create(self.context());
        let result = reducer.process(&tx.id).await;
        drop(guard);

        let run = match result {
            Ok(run) => run,
            Err(err) => {
                error!(tx_id = %tx.id, state = %tx.state, error = %err, "bridge driver stopped");
                self.publish(BridgeEvent::DriverError {
                    tx_id: tx.id.clone(),
                    error: err.to_string(),
                    timestamp: Utc::now(),
                });
                return Err(err);
            }
        };

        let finished = run.transaction;
        let done = self.inner.boundary.is_done(&finished)?;
        if !run.finished {
            debug!(tx_id = %finished.id, state = %finished.state, "no transition made by this driver");
            return Ok(if done {
                ProcessOutcome::Completed(finished)
            } else {
                ProcessOutcome::Failed(finished)
            });
        }

        if done {
            self.inner.hooks.update_history();
            let duration_ms = (Utc::now() - started).num_milliseconds().max(0) as u64;
            self.publish(BridgeEvent::TransactionCompleted {
                tx_id: finished.id.clone(),
                kind: finished.kind,
                duration_ms,
                timestamp: Utc::now(),
            });
            Ok(ProcessOutcome::Completed(finished))
        } else {
            self.inner.hooks.show_notification(&finished);
            self.publish(BridgeEvent::TransactionFailed {
                tx_id: finished.id.clone(),
                kind: finished.kind,
                state: finished.state,
                error: finished.error.clone(),
                timestamp: Utc::now(),
            });
            Ok(ProcessOutcome::Failed(finished))
        }
    }
}

/// Assembles a `Bridge`, validating every table before it can run.
pub struct BridgeBuilder {
    registry: HashMap<TransactionType, Arc<dyn ReducerFactory>>,
    boundary: BoundaryTable,
    store: Arc<dyn TransactionStore>,
    hooks: Arc<dyn BridgeHooks>,
    assets: Arc<dyn AssetRegistry>,
    events: Option<Arc<EventBus>>,
    polling: PollingConfig,
    cancel: CancellationToken,
}

impl BridgeBuilder {
    pub fn new(store: Arc<dyn TransactionStore>, assets: Arc<dyn AssetRegistry>) -> Self {
        Self {
            registry: HashMap::new(),
            boundary: BoundaryTable::standard(),
            store,
            hooks: Arc::new(NoopHooks),
            assets,
            events: None,
            polling: PollingConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn boundary_table(mut self, boundary: BoundaryTable) -> Self {
        self.boundary = boundary;
        self
    }

    pub fn hooks(mut self, hooks: Arc<dyn BridgeHooks>) -> Self {
        self.hooks = hooks;
        self
    }

    pub fn events(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn polling(mut self, polling: PollingConfig) -> Self {
        self.polling = polling;
        self
    }

    /// Token shared with an outer shutdown signal.
    pub fn cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn register(mut self, kind: TransactionType, factory: Arc<dyn ReducerFactory>) -> Self {
        if self.registry.insert(kind, factory).is_some() {
            warn!(kind = %kind, "replacing registered reducer");
        }
        self
    }

    /// Registers the factories of a family (see `hashi::reducers` and friends).
    pub fn register_all(
        mut self,
        factories: impl IntoIterator<Item = (TransactionType, Arc<dyn ReducerFactory>)>,
    ) -> Self {
        for (kind, factory) in factories {
            self = self.register(kind, factory);
        }
        self
    }

    pub fn build(self) -> Result<Bridge> {
        self.boundary.validate()?;
        self.polling.validate()?;

        let inner = BridgeInner {
            registry: self.registry,
            boundary: Arc::new(self.boundary),
            store: self.store,
            hooks: self.hooks,
            assets: self.assets,
            events: self.events,
            polling: self.polling,
            cancel: self.cancel,
            in_progress: Mutex::new(HashMap::new()),
        };
        let bridge = Bridge { inner: Arc::new(inner) };

        for (kind, factory) in &bridge.inner.registry {
            let states = bridge.inner.boundary.get(*kind)?;
            let reducer = factory.create(bridge.context());
            if reducer.kind() != *kind {
                return Err(BridgeError::Configuration(format!(
                    "reducer registered for {} drives {}",
                    kind,
                    reducer.kind()
                )));
            }
            validate_transitions(*kind, reducer.transitions(), states)?;
        }

        info!(reducers = bridge.inner.registry.len(), "bridge orchestrator ready");
        Ok(bridge)
    }
}
