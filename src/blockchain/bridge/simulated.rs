//! Deterministic in-process chain backends.
//!
//! Every leg reports `Pending` a fixed number of times before it confirms,
//! with receipts derived from the transaction id. Used by the CLI and for
//! local runs; never wire these into a production signer path.

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::env;
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::BridgeTransaction;
use crate::blockchain::traits::{
    AssetInfo, AssetRegistry, Counterpart, ExternalChain, LegReceipt, Observation, SoraChain,
};
use crate::core::errors::{BridgeError, Result};

/// Environment switch that enables simulated backends outside tests.
pub const ALLOW_SIMULATION_ENV: &str = "ALLOW_BRIDGE_SIMULATION";

/// True when `ALLOW_BRIDGE_SIMULATION` is set to a truthy value.
pub fn simulation_allowed() -> bool {
    match env::var(ALLOW_SIMULATION_ENV) {
        Ok(val) => {
            let v = val.trim();
            v == "1" || v.eq_ignore_ascii_case("true") || v.eq_ignore_ascii_case("yes")
        }
        Err(_) => false,
    }
}

pub fn ensure_simulation_allowed() -> Result<()> {
    if simulation_allowed() {
        Ok(())
    } else {
        Err(BridgeError::Configuration(format!(
            "simulated chain backends are disabled; set {}=1 to enable them",
            ALLOW_SIMULATION_ENV
        )))
    }
}

fn derive_hash(tx_id: &str, leg: &str) -> String {
    let digest = Sha256::digest(format!("{}:{}", tx_id, leg).as_bytes());
    format!("0x{}", hex::encode(digest))
}

fn receipt(tx_id: &str, leg: &str) -> LegReceipt {
    let hash = derive_hash(tx_id, leg);
    LegReceipt {
        block_id: Some(derive_hash(&hash, "block")),
        tx_id: Some(format!("{}-{}", &hash[..18], leg)),
        hash: Some(hash),
    }
}

/// Counts looks per `(tx, leg)` and confirms after `confirm_after` pending ones.
#[derive(Debug, Default)]
struct Finality {
    confirm_after: usize,
    polls: Mutex<HashMap<(String, String), usize>>,
}

impl Finality {
    fn new(confirm_after: usize) -> Self {
        Self { confirm_after, polls: Mutex::new(HashMap::new()) }
    }

    fn observe(&self, tx_id: &str, leg: &str) -> Observation {
        let mut polls = self.polls.lock();
        let count = polls.entry((tx_id.to_string(), leg.to_string())).or_insert(0);
        *count += 1;
        if *count > self.confirm_after {
            Observation::Confirmed(receipt(tx_id, leg))
        } else {
            Observation::Pending
        }
    }
}

/// Simulated SORA node and signer.
#[derive(Debug)]
pub struct SimulatedSora {
    finality: Finality,
    decline_signatures: bool,
}

impl SimulatedSora {
    pub fn new(confirm_after: usize) -> Self {
        Self { finality: Finality::new(confirm_after), decline_signatures: false }
    }

    /// Every signature request is declined, as if by the user.
    pub fn declining(mut self) -> Self {
        self.decline_signatures = true;
        self
    }
}

#[async_trait]
impl SoraChain for SimulatedSora {
    async fn sign_sora(&self, tx: &BridgeTransaction) -> Result<LegReceipt> {
        if self.decline_signatures {
            return Err(BridgeError::SignatureRejected("declined by simulated signer".to_string()));
        }
        info!(tx_id = %tx.id, "simulated SORA extrinsic broadcast");
        let sent = receipt(&tx.id, "sora");
        Ok(LegReceipt { block_id: None, ..sent })
    }

    async fn observe_extrinsic(&self, tx: &BridgeTransaction) -> Result<Observation> {
        Ok(self.finality.observe(&tx.id, "sora"))
    }

    async fn observe_counterpart(
        &self,
        tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation> {
        debug!(tx_id = %tx.id, ?counterpart, "simulated SORA counterpart lookup");
        Ok(self.finality.observe(&tx.id, &format!("{:?}", counterpart)))
    }
}

/// Simulated external network (EVM chain or parachain).
#[derive(Debug)]
pub struct SimulatedExternal {
    network: String,
    finality: Finality,
    decline_signatures: bool,
}

impl SimulatedExternal {
    pub fn new(network: impl Into<String>, confirm_after: usize) -> Self {
        Self { network: network.into(), finality: Finality::new(confirm_after), decline_signatures: false }
    }

    pub fn declining(mut self) -> Self {
        self.decline_signatures = true;
        self
    }
}

#[async_trait]
impl ExternalChain for SimulatedExternal {
    fn network_name(&self) -> &str {
        &self.network
    }

    async fn sign_external(&self, tx: &BridgeTransaction) -> Result<LegReceipt> {
        if self.decline_signatures {
            return Err(BridgeError::SignatureRejected("declined by simulated signer".to_string()));
        }
        info!(tx_id = %tx.id, network = %self.network, "simulated external transaction broadcast");
        Ok(LegReceipt::with_hash(derive_hash(&tx.id, "external")))
    }

    async fn observe_transaction(&self, tx: &BridgeTransaction) -> Result<Observation> {
        Ok(self.finality.observe(&tx.id, "external"))
    }

    async fn observe_counterpart(
        &self,
        tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation> {
        debug!(tx_id = %tx.id, ?counterpart, network = %self.network, "simulated external counterpart lookup");
        Ok(self.finality.observe(&tx.id, &format!("{:?}", counterpart)))
    }
}

/// In-memory asset list.
#[derive(Debug, Default)]
pub struct MemoryAssetRegistry {
    assets: RwLock<HashMap<String, AssetInfo>>,
}

impl MemoryAssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_assets(assets: impl IntoIterator<Item = AssetInfo>) -> Self {
        let map = assets.into_iter().map(|a| (a.address.clone(), a)).collect();
        Self { assets: RwLock::new(map) }
    }

    pub async fn len(&self) -> usize {
        self.assets.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.assets.read().await.is_empty()
    }
}

#[async_trait]
impl AssetRegistry for MemoryAssetRegistry {
    async fn get_asset_by_address(&self, address: &str) -> Result<Option<AssetInfo>> {
        Ok(self.assets.read().await.get(address).cloned())
    }

    async fn add_asset(&self, address: &str) -> Result<()> {
        let mut assets = self.assets.write().await;
        assets.entry(address.to_string()).or_insert_with(|| AssetInfo {
            address: address.to_string(),
            symbol: format!("{}..", address.chars().take(8).collect::<String>()),
            decimals: 18,
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::bridge::{NewTransfer, TransactionType};
    use serial_test::serial;

    fn tx() -> BridgeTransaction {
        BridgeTransaction::new(&NewTransfer {
            kind: TransactionType::EvmOutgoing,
            asset_address: format!("0x{}", "02".repeat(32)),
            amount: "1".to_string(),
            from: "sora".to_string(),
            to: "evm".to_string(),
            network: None,
        })
    }

    #[tokio::test]
    async fn test_confirms_after_configured_polls() {
        let sora = SimulatedSora::new(2);
        let tx = tx();
        assert_eq!(sora.observe_extrinsic(&tx).await.unwrap(), Observation::Pending);
        assert_eq!(sora.observe_extrinsic(&tx).await.unwrap(), Observation::Pending);
        match sora.observe_extrinsic(&tx).await.unwrap() {
            Observation::Confirmed(receipt) => {
                assert_eq!(receipt.hash, Some(derive_hash(&tx.id, "sora")));
                assert!(receipt.block_id.is_some());
            }
            other => panic!("expected confirmation, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_legs_are_counted_separately() {
        let external = SimulatedExternal::new("ethereum", 1);
        let tx = tx();
        assert_eq!(external.observe_transaction(&tx).await.unwrap(), Observation::Pending);
        assert_eq!(
            external.observe_counterpart(&tx, Counterpart::ExternalReceived).await.unwrap(),
            Observation::Pending
        );
        assert!(matches!(external.observe_transaction(&tx).await.unwrap(), Observation::Confirmed(_)));
    }

    #[tokio::test]
    async fn test_declining_signer() {
        let sora = SimulatedSora::new(0).declining();
        assert!(matches!(sora.sign_sora(&tx()).await, Err(BridgeError::SignatureRejected(_))));
    }

    #[tokio::test]
    async fn test_asset_registry_add_is_idempotent() {
        let registry = MemoryAssetRegistry::new();
        let address = format!("0x{}", "03".repeat(32));
        assert!(registry.get_asset_by_address(&address).await.unwrap().is_none());
        registry.add_asset(&address).await.unwrap();
        registry.add_asset(&address).await.unwrap();
        assert_eq!(registry.len().await, 1);
    }

    #[test]
    #[serial]
    fn test_simulation_guard() {
        env::remove_var(ALLOW_SIMULATION_ENV);
        assert!(!simulation_allowed());
        assert!(ensure_simulation_allowed().is_err());

        env::set_var(ALLOW_SIMULATION_ENV, "yes");
        assert!(simulation_allowed());

        env::set_var(ALLOW_SIMULATION_ENV, "0");
        assert!(!simulation_allowed());
        env::remove_var(ALLOW_SIMULATION_ENV);
    }
}
