// tests/util.rs
#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use sora_bridge_engine::blockchain::bridge::simulated::MemoryAssetRegistry;
use sora_bridge_engine::blockchain::bridge::{
    evm, hashi, substrate, BridgeHooks, EventBus, TransactionPatch,
};
use sora_bridge_engine::blockchain::traits::{
    Counterpart, ExternalChain, LegReceipt, Observation, SoraChain,
};
use sora_bridge_engine::core::config::{PollPolicy, PollingConfig};
use sora_bridge_engine::storage::{MemoryStore, TransactionStore};
use sora_bridge_engine::{
    Bridge, BridgeError, BridgeState, BridgeTransaction, NewTransfer, Result, TransactionType,
};

pub const EVM_ADDRESS: &str = "0x5aaeb6053f3e94c9b9a09f33669435e7ef1beaed";

pub fn asset_address() -> String {
    format!("0x{}", "02".repeat(32))
}

fn ss58(prefix_bytes: &[u8]) -> String {
    let mut raw = prefix_bytes.to_vec();
    raw.extend_from_slice(&[7u8; 32]);
    raw.extend_from_slice(&[0xab, 0xcd]);
    bs58::encode(raw).into_string()
}

/// SS58 address with the SORA prefix (69).
pub fn sora_address() -> String {
    ss58(&[0x51, 0x40])
}

/// SS58 address with the Kusama prefix (2).
pub fn parachain_address() -> String {
    ss58(&[2])
}

/// A valid transfer request of the given type.
pub fn transfer(kind: TransactionType) -> NewTransfer {
    use sora_bridge_engine::blockchain::bridge::{BridgeFamily, TransferDirection};

    let external = match kind.family() {
        BridgeFamily::Substrate => parachain_address(),
        _ => EVM_ADDRESS.to_string(),
    };
    let (from, to) = match kind.direction() {
        TransferDirection::Outgoing => (sora_address(), external),
        TransferDirection::Incoming => (external, sora_address()),
    };
    NewTransfer {
        kind,
        asset_address: asset_address(),
        amount: "1.5".to_string(),
        from,
        to,
        network: match kind.family() {
            BridgeFamily::Substrate => Some("moonbase".to_string()),
            _ => None,
        },
    }
}

/// Fast polling so tests finish in milliseconds.
pub fn fast_polling(max_attempts: usize) -> PollingConfig {
    PollingConfig::uniform(PollPolicy::new(Duration::from_millis(5), max_attempts))
}

/// Chain mock with a scripted observation queue and call counters.
///
/// Once the queue is empty every observation confirms with `receipt`.
pub struct MockChain {
    network: String,
    receipt: LegReceipt,
    sign_error: Mutex<Option<BridgeError>>,
    observations: Mutex<VecDeque<Result<Observation>>>,
    sign_calls: AtomicUsize,
    observe_calls: AtomicUsize,
    counterparts: Mutex<Vec<Counterpart>>,
}

impl MockChain {
    pub fn new(network: &str, receipt: LegReceipt) -> Self {
        Self {
            network: network.to_string(),
            receipt,
            sign_error: Mutex::new(None),
            observations: Mutex::new(VecDeque::new()),
            sign_calls: AtomicUsize::new(0),
            observe_calls: AtomicUsize::new(0),
            counterparts: Mutex::new(Vec::new()),
        }
    }

    /// SORA mock from the happy-path scenario: block b1, extrinsic t1, hash 0xabc.
    pub fn sora() -> Self {
        Self::new(
            "sora",
            LegReceipt {
                block_id: Some("b1".to_string()),
                tx_id: Some("t1".to_string()),
                hash: Some("0xabc".to_string()),
            },
        )
    }

    pub fn external(network: &str) -> Self {
        Self::new(
            network,
            LegReceipt {
                block_id: Some("eb1".to_string()),
                tx_id: None,
                hash: Some("0xdef".to_string()),
            },
        )
    }

    pub fn fail_signing(&self, err: BridgeError) {
        *self.sign_error.lock() = Some(err);
    }

    /// Queues observations returned before the default confirmation.
    pub fn script(&self, observations: impl IntoIterator<Item = Result<Observation>>) {
        self.observations.lock().extend(observations);
    }

    /// Every observation stays pending.
    pub fn never_confirm(&self, looks: usize) {
        self.script((0..looks).map(|_| Ok(Observation::Pending)));
    }

    pub fn sign_calls(&self) -> usize {
        self.sign_calls.load(Ordering::SeqCst)
    }

    pub fn observe_calls(&self) -> usize {
        self.observe_calls.load(Ordering::SeqCst)
    }

    pub fn counterparts(&self) -> Vec<Counterpart> {
        self.counterparts.lock().clone()
    }

    fn sign(&self) -> Result<LegReceipt> {
        self.sign_calls.fetch_add(1, Ordering::SeqCst);
        match self.sign_error.lock().clone() {
            Some(err) => Err(err),
            // Broadcast, not yet in a block
            None => Ok(LegReceipt { block_id: None, ..self.receipt.clone() }),
        }
    }

    fn observe(&self) -> Result<Observation> {
        self.observe_calls.fetch_add(1, Ordering::SeqCst);
        self.observations
            .lock()
            .pop_front()
            .unwrap_or_else(|| Ok(Observation::Confirmed(self.receipt.clone())))
    }
}

#[async_trait]
impl SoraChain for MockChain {
    async fn sign_sora(&self, _tx: &BridgeTransaction) -> Result<LegReceipt> {
        self.sign()
    }

    async fn observe_extrinsic(&self, _tx: &BridgeTransaction) -> Result<Observation> {
        self.observe()
    }

    async fn observe_counterpart(
        &self,
        _tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation> {
        self.counterparts.lock().push(counterpart);
        self.observe()
    }
}

#[async_trait]
impl ExternalChain for MockChain {
    fn network_name(&self) -> &str {
        &self.network
    }

    async fn sign_external(&self, _tx: &BridgeTransaction) -> Result<LegReceipt> {
        self.sign()
    }

    async fn observe_transaction(&self, _tx: &BridgeTransaction) -> Result<Observation> {
        self.observe()
    }

    async fn observe_counterpart(
        &self,
        _tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation> {
        self.counterparts.lock().push(counterpart);
        self.observe()
    }
}

/// Hooks that record every call.
#[derive(Default)]
pub struct RecordingHooks {
    decline: AtomicBool,
    before_submit_calls: AtomicUsize,
    history_updates: AtomicUsize,
    notifications: Mutex<Vec<String>>,
    progress: Mutex<Vec<String>>,
}

impl RecordingHooks {
    /// Declines every signature request before it reaches the signer.
    pub fn decline_signatures(&self) {
        self.decline.store(true, Ordering::SeqCst);
    }

    pub fn before_submit_calls(&self) -> usize {
        self.before_submit_calls.load(Ordering::SeqCst)
    }

    pub fn history_updates(&self) -> usize {
        self.history_updates.load(Ordering::SeqCst)
    }

    pub fn notifications(&self) -> Vec<String> {
        self.notifications.lock().clone()
    }

    /// `+id` for each add, `-id` for each removal, in call order.
    pub fn progress_log(&self) -> Vec<String> {
        self.progress.lock().clone()
    }
}

#[async_trait]
impl BridgeHooks for RecordingHooks {
    async fn before_submit(&self, _tx: &BridgeTransaction) -> Result<()> {
        self.before_submit_calls.fetch_add(1, Ordering::SeqCst);
        if self.decline.load(Ordering::SeqCst) {
            return Err(BridgeError::SignatureRejected("cancelled by user".to_string()));
        }
        Ok(())
    }

    fn show_notification(&self, tx: &BridgeTransaction) {
        self.notifications.lock().push(tx.id.clone());
    }

    fn update_history(&self) {
        self.history_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn add_transaction_to_progress(&self, id: &str) {
        self.progress.lock().push(format!("+{}", id));
    }

    fn remove_transaction_from_progress(&self, id: &str) {
        self.progress.lock().push(format!("-{}", id));
    }
}

/// Orchestrator wired with mocks for all three families.
pub struct Harness {
    pub bridge: Bridge,
    pub store: Arc<dyn TransactionStore>,
    pub sora: Arc<MockChain>,
    pub external: Arc<MockChain>,
    pub hooks: Arc<RecordingHooks>,
    pub assets: Arc<MemoryAssetRegistry>,
    pub events: Arc<EventBus>,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), fast_polling(20))
    }

    pub fn with_polling(polling: PollingConfig) -> Self {
        Self::with_store(Arc::new(MemoryStore::new()), polling)
    }

    pub fn with_store(store: Arc<dyn TransactionStore>, polling: PollingConfig) -> Self {
        let sora = Arc::new(MockChain::sora());
        let external = Arc::new(MockChain::external("ethereum"));
        let hooks = Arc::new(RecordingHooks::default());
        let assets = Arc::new(MemoryAssetRegistry::new());
        let events = Arc::new(EventBus::new(100));

        let bridge = Bridge::builder(store.clone(), assets.clone())
            .hooks(hooks.clone())
            .events(events.clone())
            .polling(polling)
            .register_all(hashi::reducers(sora.clone(), external.clone()))
            .register_all(evm::reducers(sora.clone(), external.clone()))
            .register_all(substrate::reducers(sora.clone(), external.clone()))
            .build()
            .expect("mock bridge should build");

        Self { bridge, store, sora, external, hooks, assets, events }
    }

    pub async fn create(&self, kind: TransactionType) -> BridgeTransaction {
        self.bridge.create_transaction(transfer(kind)).await.unwrap()
    }

    /// Stores a transaction as if a previous run had left it at `state`.
    pub async fn seed(
        &self,
        kind: TransactionType,
        state: BridgeState,
        patch: TransactionPatch,
    ) -> BridgeTransaction {
        let tx = BridgeTransaction::new(&transfer(kind));
        self.store.insert_transaction(&tx).await.unwrap();
        self.store.update_transaction(&tx.id, &patch.with_state(state)).await.unwrap()
    }
}
