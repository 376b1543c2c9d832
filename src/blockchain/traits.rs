use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::{blockchain::bridge::BridgeTransaction, core::errors::BridgeError};

/// Identifiers a chain reports for one leg of a transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegReceipt {
    pub block_id: Option<String>,
    pub tx_id: Option<String>,
    pub hash: Option<String>,
}

impl LegReceipt {
    pub fn with_hash(hash: impl Into<String>) -> Self {
        Self { hash: Some(hash.into()), ..Default::default() }
    }
}

/// Result of a single look at the chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Not there yet, poll again
    Pending,
    /// Included and final
    Confirmed(LegReceipt),
    /// The chain executed the leg and it failed
    Failed(String),
    /// The chain proves the leg never landed (replaced, expired, pruned)
    Dropped(String),
}

/// The other chain's leg a transfer has to wait for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Counterpart {
    /// HASHI peers signed the outgoing/incoming request on SORA
    RequestApproved,
    /// Funds credited on SORA
    SoraReceived,
    /// Relay chain accepted the outbound message
    RelayAccepted,
    /// Funds credited on the external chain
    ExternalReceived,
}

impl Counterpart {
    pub fn on_sora(&self) -> bool {
        matches!(self, Counterpart::RequestApproved | Counterpart::SoraReceived)
    }
}

/// SORA side of a bridge family.
#[async_trait]
pub trait SoraChain: Send + Sync {
    /// Signs and broadcasts the SORA leg. Returns once the network accepted
    /// the extrinsic, not when it is final.
    async fn sign_sora(&self, tx: &BridgeTransaction) -> Result<LegReceipt, BridgeError>;

    /// Looks up the submitted extrinsic.
    async fn observe_extrinsic(&self, tx: &BridgeTransaction) -> Result<Observation, BridgeError>;

    /// Looks up a SORA-side counterpart of the transfer.
    async fn observe_counterpart(
        &self,
        tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation, BridgeError>;
}

/// External (EVM or parachain) side of a bridge family.
#[async_trait]
pub trait ExternalChain: Send + Sync {
    /// Returns the name of the network (e.g., "ethereum", "moonbase").
    fn network_name(&self) -> &str;

    /// Signs and broadcasts the external leg.
    async fn sign_external(&self, tx: &BridgeTransaction) -> Result<LegReceipt, BridgeError>;

    /// Looks up the submitted external transaction (mined and confirmed).
    async fn observe_transaction(&self, tx: &BridgeTransaction) -> Result<Observation, BridgeError>;

    /// Looks up an external-side counterpart of the transfer.
    async fn observe_counterpart(
        &self,
        tx: &BridgeTransaction,
        counterpart: Counterpart,
    ) -> Result<Observation, BridgeError>;
}

/// Token metadata known to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetInfo {
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Read-mostly token registry.
#[async_trait]
pub trait AssetRegistry: Send + Sync {
    async fn get_asset_by_address(&self, address: &str) -> Result<Option<AssetInfo>, BridgeError>;

    /// Adds the asset to the account's asset list.
    async fn add_asset(&self, address: &str) -> Result<(), BridgeError>;
}
